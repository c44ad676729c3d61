//! Text rewriting: symbol substitution markup and span merging.
//!
//! The rewrite round-trips through a self-describing markup form,
//! `<emoji id="TARGET">SYMBOL</emoji>`, so the final text is byte-identical
//! to the input and only the span set changes. That keeps every pre-existing
//! span offset valid without adjustment.

use regex::Regex;

use crate::domain::ChannelId;
use crate::rules::RuleStore;
use crate::spans::{sort_spans, utf16_len, FormatSpan, SpanKind};
use crate::symbols;
use crate::{Error, Result};

/// Prefix of the engine's own markup; its presence in raw text means the
/// message was already rewritten (or an unparsed tag was left behind).
const MARKUP_SENTINEL: &str = "<emoji id=";

#[derive(Clone, Debug)]
pub struct Rewrite {
    pub text: String,
    pub spans: Vec<FormatSpan>,
    pub changed: bool,
}

impl Rewrite {
    fn unchanged(text: &str, spans: &[FormatSpan]) -> Self {
        Self {
            text: text.to_string(),
            spans: spans.to_vec(),
            changed: false,
        }
    }
}

pub fn contains_markup(text: &str) -> bool {
    text.contains(MARKUP_SENTINEL)
}

/// Rewrite `text` for `channel`, substituting every symbol that resolves to
/// a premium emoji target.
///
/// Returns `changed = false` when the message was already rewritten, no
/// symbol resolves, or the merged span set equals the existing one. A markup
/// parse failure aborts the rewrite of this message only; the caller logs it
/// and applies no partial edit.
pub fn rewrite(
    rules: &RuleStore,
    channel: ChannelId,
    text: &str,
    existing_spans: &[FormatSpan],
) -> Result<Rewrite> {
    // Re-processing our own edit event would loop forever.
    if existing_spans.iter().any(|s| s.kind.is_substitution()) || contains_markup(text) {
        return Ok(Rewrite::unchanged(text, existing_spans));
    }

    let mut targets: Vec<(String, i64)> = symbols::extract(text)
        .into_iter()
        .filter_map(|symbol| rules.resolve(channel, &symbol).map(|id| (symbol, id)))
        .collect();
    if targets.is_empty() {
        return Ok(Rewrite::unchanged(text, existing_spans));
    }

    // Longest symbol wins when two targets could match at the same position,
    // so a compound sequence is never broken by a rule for its base.
    targets.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

    let marked = apply_markup(text, &targets);
    let (final_text, substitution_spans) = parse_markup(&marked)?;

    let mut merged: Vec<FormatSpan> = existing_spans
        .iter()
        .filter(|s| !s.kind.is_substitution())
        .cloned()
        .collect();
    merged.extend(substitution_spans);
    sort_spans(&mut merged);

    let mut original = existing_spans.to_vec();
    sort_spans(&mut original);
    let changed = final_text != text || merged != original;

    Ok(Rewrite {
        text: final_text,
        spans: merged,
        changed,
    })
}

/// Replace every literal occurrence of each target symbol with its markup
/// form, in one left-to-right pass.
fn apply_markup(text: &str, targets: &[(String, i64)]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut i = 0usize;

    'scan: while i < text.len() {
        for (symbol, target_id) in targets {
            if text[i..].starts_with(symbol.as_str()) {
                out.push_str(&format!("<emoji id=\"{target_id}\">{symbol}</emoji>"));
                i += symbol.len();
                continue 'scan;
            }
        }
        match text[i..].chars().next() {
            Some(c) => {
                out.push(c);
                i += c.len_utf8();
            }
            None => break,
        }
    }

    out
}

/// Parse emoji markup back into plain text plus substitution spans (UTF-16
/// offsets).
pub fn parse_markup(text: &str) -> Result<(String, Vec<FormatSpan>)> {
    let tag_re = Regex::new(r#"<emoji id="(\d+)">([^<]*)</emoji>"#).expect("valid regex");

    let mut out = String::with_capacity(text.len());
    let mut spans = Vec::new();
    let mut offset: u32 = 0;
    let mut last = 0usize;

    for caps in tag_re.captures_iter(text) {
        let Some(whole) = caps.get(0) else {
            continue;
        };

        let before = &text[last..whole.start()];
        out.push_str(before);
        offset += utf16_len(before);

        let emoji_id: i64 = caps[1]
            .parse()
            .map_err(|_| Error::Parse(format!("invalid emoji id in markup: {}", &caps[1])))?;
        let body = &caps[2];
        if body.is_empty() {
            return Err(Error::Parse("empty emoji markup body".to_string()));
        }

        let length = utf16_len(body);
        spans.push(FormatSpan {
            offset,
            length,
            kind: SpanKind::CustomEmoji { emoji_id },
        });
        out.push_str(body);
        offset += length;
        last = whole.end();
    }

    out.push_str(&text[last..]);

    if contains_markup(&out) {
        return Err(Error::Parse(
            "malformed emoji markup left in text".to_string(),
        ));
    }

    Ok((out, spans))
}
