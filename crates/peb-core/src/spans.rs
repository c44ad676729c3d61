//! Rich-text formatting spans over UTF-16 offset ranges.
//!
//! Telegram message entities address text in UTF-16 code units; spans keep
//! that convention so the adapter can map them 1:1.

/// Formatting kinds the bot preserves across rewrites and copies.
///
/// `CustomEmoji` is the substitution kind: it marks a symbol that has been
/// replaced by a premium emoji with the given document id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SpanKind {
    Bold,
    Italic,
    Underline,
    Strikethrough,
    Spoiler,
    Code,
    Pre { language: Option<String> },
    Link { url: String },
    CustomEmoji { emoji_id: i64 },
}

impl SpanKind {
    pub fn is_substitution(&self) -> bool {
        matches!(self, SpanKind::CustomEmoji { .. })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FormatSpan {
    pub offset: u32,
    pub length: u32,
    pub kind: SpanKind,
}

/// Length of `s` in UTF-16 code units.
pub fn utf16_len(s: &str) -> u32 {
    s.chars().map(|c| c.len_utf16() as u32).sum()
}

/// Sort spans ascending by start offset (ties by length).
pub fn sort_spans(spans: &mut [FormatSpan]) {
    spans.sort_by_key(|s| (s.offset, s.length));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf16_len_counts_surrogate_pairs() {
        assert_eq!(utf16_len("Great "), 6);
        assert_eq!(utf16_len("😀"), 2);
        assert_eq!(utf16_len("✅"), 1);
        assert_eq!(utf16_len("Great 😀 job ✅"), 14);
    }

    #[test]
    fn sort_orders_by_offset() {
        let mut spans = vec![
            FormatSpan {
                offset: 7,
                length: 1,
                kind: SpanKind::Bold,
            },
            FormatSpan {
                offset: 0,
                length: 3,
                kind: SpanKind::Italic,
            },
        ];
        sort_spans(&mut spans);
        assert_eq!(spans[0].offset, 0);
        assert_eq!(spans[1].offset, 7);
    }
}
