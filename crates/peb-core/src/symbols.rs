//! Symbol extraction: which text tokens are eligible for substitution.
//!
//! A symbol is one base codepoint from a fixed whitelist of Unicode ranges,
//! optionally followed by a variation selector, optionally followed by a
//! zero-width joiner plus a second whitelisted base (simple compound
//! sequences). Codepoints outside the whitelist are ignored even when they
//! look symbol-like; the whitelist is the boundary, not a heuristic.

const ZWJ: char = '\u{200D}';

/// Single-codepoint symbols the range scan alone might miss (bullets, check
/// and cross marks, arrows). Merged into the result without duplicates.
const FALLBACK_SYMBOLS: &[&str] = &[
    "•", "‣", "◦", "✓", "✔", "✗", "✘", "→", "←", "⇒", "‼", "⁉",
];

fn is_symbol_base(c: char) -> bool {
    matches!(c as u32,
        0x1F600..=0x1F64F       // emoticons
        | 0x1F300..=0x1F5FF     // symbols & pictographs
        | 0x1F680..=0x1F6FF     // transport & map
        | 0x1F1E6..=0x1F1FF     // regional indicators (flags)
        | 0x1F900..=0x1F9FF     // supplemental symbols
        | 0x2600..=0x26FF       // miscellaneous symbols
        | 0x2700..=0x27BF       // dingbats
        | 0x25A0..=0x25FF       // geometric shapes
        | 0x2190..=0x21FF       // arrows
        | 0x2022 | 0x2023 | 0x2043 | 0x203C | 0x2049 // bullets & doubled punctuation
    )
}

fn is_variation_selector(c: char) -> bool {
    matches!(c as u32, 0xFE00..=0xFE0F)
}

/// Extract the replaceable symbols of `text`: first-occurrence order,
/// de-duplicated.
pub fn extract(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut out: Vec<String> = Vec::new();

    let mut i = 0usize;
    while i < chars.len() {
        if !is_symbol_base(chars[i]) {
            i += 1;
            continue;
        }

        let mut symbol = String::new();
        symbol.push(chars[i]);
        i += 1;

        if i < chars.len() && is_variation_selector(chars[i]) {
            symbol.push(chars[i]);
            i += 1;
        }

        if i + 1 < chars.len() && chars[i] == ZWJ && is_symbol_base(chars[i + 1]) {
            symbol.push(ZWJ);
            symbol.push(chars[i + 1]);
            i += 2;
        }

        if !out.contains(&symbol) {
            out.push(symbol);
        }
    }

    for fallback in FALLBACK_SYMBOLS {
        // A captured symbol starting with the fallback char (its
        // variation-selector form) already covers it.
        if text.contains(fallback) && !out.iter().any(|s| s.starts_with(fallback)) {
            out.push((*fallback).to_string());
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_in_first_occurrence_order() {
        assert_eq!(extract("Great 😀 job ✅"), vec!["😀", "✅"]);
    }

    #[test]
    fn deduplicates_repeated_symbols() {
        assert_eq!(extract("😀😀 and 😀 again"), vec!["😀"]);
    }

    #[test]
    fn ignores_plain_text_and_non_whitelisted_codepoints() {
        assert!(extract("hello world № 42 £").is_empty());
    }

    #[test]
    fn captures_variation_selector() {
        let syms = extract("done ✔️");
        assert_eq!(syms, vec!["✔\u{FE0F}"]);
    }

    #[test]
    fn captures_simple_zwj_compound_as_one_symbol() {
        // U+2764 U+FE0F U+200D U+1F525 (heart on fire)
        let syms = extract("wow ❤️‍🔥!");
        assert_eq!(syms, vec!["❤\u{FE0F}\u{200D}🔥"]);
    }

    #[test]
    fn bare_base_and_compound_are_distinct_symbols() {
        let syms = extract("I ❤ this ❤️‍🔥 a lot");
        assert_eq!(syms, vec!["❤", "❤\u{FE0F}\u{200D}🔥"]);
    }

    #[test]
    fn fallback_table_merges_without_duplicates() {
        let syms = extract("• first ✓ second •");
        assert_eq!(syms, vec!["•", "✓"]);
    }
}
