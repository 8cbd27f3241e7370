// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Locale-aware segmentation for the full-text index (spec §4.2)
//!
//! The detector is a cheap quality knob, not a correctness requirement
//! (spec §9): it only has to apply the *same* transform to indexed content
//! and to search queries so that FTS MATCH stays consistent.

use unicode_segmentation::UnicodeSegmentation;

/// Detected script/language, used only to pick a segmentation strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lang {
    Japanese,
    Korean,
    Chinese,
    Amharic,
    Arabic,
    Hindi,
    Russian,
    Vietnamese,
    Yoruba,
    Igbo,
    German,
    Spanish,
    Portuguese,
    Turkish,
    Uzbek,
    Swahili,
    Afrikaans,
    Hausa,
    Zulu,
    English,
    French,
    Indonesian,
    Tagalog,
    Unknown,
}

const STOPWORDS: &[(Lang, &[&str])] = &[
    (Lang::Swahili, &["na", "ya", "wa", "kwa", "za"]),
    (Lang::Afrikaans, &["die", "en", "nie", "het", "is"]),
    (Lang::Hausa, &["da", "na", "a", "ba", "don"]),
    (Lang::Zulu, &["futhi", "kodwa", "uma", "nje", "kanye"]),
    (Lang::English, &["the", "and", "of", "to", "is"]),
    (Lang::French, &["le", "la", "et", "des", "est"]),
    (Lang::Portuguese, &["o", "a", "de", "que", "e"]),
    (Lang::Indonesian, &["yang", "dan", "di", "itu", "dengan"]),
    (Lang::Tagalog, &["ang", "at", "ng", "sa", "ay"]),
];

fn detect(input: &str) -> Lang {
    // Exact-script tests, in priority order.
    let mut has_hiragana_katakana = false;
    let mut has_hangul = false;
    let mut has_han = false;
    let mut has_ethiopic = false;
    let mut has_arabic = false;
    let mut has_devanagari = false;
    let mut has_cyrillic = false;
    let mut has_viet_tone = false;

    for ch in input.chars() {
        let cp = ch as u32;
        match cp {
            0x3040..=0x30FF => has_hiragana_katakana = true,
            0xAC00..=0xD7A3 => has_hangul = true,
            0x4E00..=0x9FFF => has_han = true,
            0x1200..=0x137F => has_ethiopic = true,
            0x0600..=0x06FF => has_arabic = true,
            0x0900..=0x097F => has_devanagari = true,
            0x0400..=0x04FF => has_cyrillic = true,
            _ => {}
        }
        if matches!(
            ch,
            '\u{1EA0}'..='\u{1EF9}' | 'ă' | 'â' | 'đ' | 'ơ' | 'ư'
        ) {
            has_viet_tone = true;
        }
    }

    if has_hiragana_katakana {
        return Lang::Japanese;
    }
    if has_hangul {
        return Lang::Korean;
    }
    if has_han {
        return Lang::Chinese;
    }
    if has_ethiopic {
        return Lang::Amharic;
    }
    if has_arabic {
        return Lang::Arabic;
    }
    if has_devanagari {
        return Lang::Hindi;
    }
    if has_cyrillic {
        return Lang::Russian;
    }
    if has_viet_tone {
        return Lang::Vietnamese;
    }

    // Characteristic Latin-extended characters.
    let lower = input.to_lowercase();
    if lower.contains('ẹ') || lower.contains('ọ') || lower.contains('ṣ') {
        return Lang::Yoruba;
    }
    if lower.contains('ị') || lower.contains('ụ') || lower.contains('ṅ') {
        return Lang::Igbo;
    }
    if lower.contains('ß') || lower.contains('ü') || lower.contains('ä') || lower.contains('ö') {
        return Lang::German;
    }
    if lower.contains('ñ') || lower.contains('¿') || lower.contains('¡') {
        return Lang::Spanish;
    }
    if lower.contains('ã') || lower.contains('õ') || lower.contains('ç') {
        return Lang::Portuguese;
    }
    if lower.contains('ş') || lower.contains('ı') || lower.contains('ğ') {
        return Lang::Turkish;
    }
    if lower.contains('ʻ') || lower.contains('oʻ') {
        return Lang::Uzbek;
    }

    // Common stopwords, checked against whitespace-split tokens.
    let words: std::collections::HashSet<&str> = lower.split_whitespace().collect();
    for (lang, list) in STOPWORDS {
        if list.iter().any(|w| words.contains(w)) {
            return *lang;
        }
    }

    if input.chars().any(|c| c.is_ascii_alphabetic()) {
        return Lang::English;
    }

    Lang::Unknown
}

/// Segment `input` into a space-joined sequence of word-like tokens.
///
/// Applies the same transform regardless of caller (indexing vs. querying)
/// so that FTS MATCH stays consistent (spec §4.2). The detected script picks
/// the segmentation strategy: CJK text runs without inter-word whitespace and
/// `unicode_words()`'s default word-break rules still glue whole runs of a
/// script (e.g. Katakana) into a single token, which would make a
/// shorter-than-a-run search query unmatchable; those scripts are segmented
/// per character instead.
pub fn segment(input: &str) -> String {
    if input.trim().is_empty() {
        return String::new();
    }

    match detect(input) {
        Lang::Japanese | Lang::Chinese | Lang::Korean => input
            .graphemes(true)
            .map(|g| g.to_lowercase())
            .filter(|g| g.chars().any(|c| c.is_alphanumeric()))
            .collect::<Vec<_>>()
            .join(" "),
        _ => input
            .unicode_words()
            .map(|w| w.to_lowercase())
            .collect::<Vec<_>>()
            .join(" "),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_whitespace_yield_empty() {
        assert_eq!(segment(""), "");
        assert_eq!(segment("   \t\n"), "");
    }

    #[test]
    fn idempotent() {
        let s = "Hello, World! This is a Test.";
        assert_eq!(segment(&segment(s)), segment(s));
    }

    #[test]
    fn lowercases_and_strips_punctuation() {
        assert_eq!(segment("Hello, World!"), "hello world");
    }

    #[test]
    fn detects_japanese_script() {
        assert_eq!(detect("こんにちは"), Lang::Japanese);
    }

    #[test]
    fn detects_korean_script() {
        assert_eq!(detect("안녕하세요"), Lang::Korean);
    }

    #[test]
    fn detects_cyrillic_script() {
        assert_eq!(detect("Привет мир"), Lang::Russian);
    }

    #[test]
    fn falls_back_to_english_for_latin() {
        assert_eq!(detect("hello there"), Lang::English);
    }

    #[test]
    fn search_substring_matches_token_sequence() {
        let content = segment("The quick brown fox jumps");
        let query = segment("brown fox");
        assert!(content.contains(&query));
    }

    #[test]
    fn katakana_run_is_split_per_character_not_glued_into_one_token() {
        // "computer" in Katakana: unicode_words() keeps a Katakana run as a
        // single token (its word-break rules never split Katakana from
        // Katakana), which would make a search for just "コン" fail to match.
        // The CJK branch must split it per character instead.
        let segmented = segment("コンピューター");
        let tokens: Vec<&str> = segmented.split(' ').collect();
        assert_eq!(tokens.len(), "コンピューター".chars().count());
    }

    #[test]
    fn cjk_segmentation_is_idempotent() {
        let s = "こんにちは";
        assert_eq!(segment(&segment(s)), segment(s));
    }

    #[test]
    fn korean_query_matches_within_a_longer_phrase() {
        let content = segment("안녕하세요 반갑습니다");
        let query = segment("하세요");
        assert!(content.contains(&query));
    }
}
