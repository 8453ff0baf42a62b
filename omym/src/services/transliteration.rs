//! Script detection and Latin transliteration
//!
//! Japanese kana go through a Hepburn converter; ideographs and every
//! other script fold through `any_ascii`. Detection is a Unicode-block
//! classifier: any kana marks the text as Japanese, ideographs without kana
//! as Chinese.

use any_ascii::any_ascii;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use unicode_normalization::UnicodeNormalization;

/// Script family that decides which transliterator applies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    Japanese,
    Chinese,
    Other,
}

impl Script {
    /// Scripts that need romanization before they can be used in paths
    pub fn needs_romanization(&self) -> bool {
        matches!(self, Script::Japanese | Script::Chinese)
    }
}

fn is_kana(c: char) -> bool {
    matches!(c,
        '\u{3040}'..='\u{309F}'   // Hiragana
        | '\u{30A0}'..='\u{30FF}' // Katakana
        | '\u{31F0}'..='\u{31FF}' // Katakana phonetic extensions
        | '\u{FF66}'..='\u{FF9F}' // Halfwidth katakana
    )
}

fn is_cjk_ideograph(c: char) -> bool {
    matches!(c,
        '\u{4E00}'..='\u{9FFF}'
        | '\u{3400}'..='\u{4DBF}'
        | '\u{F900}'..='\u{FAFF}'
        | '\u{20000}'..='\u{2A6DF}'
    )
}

fn is_latin_letter(c: char) -> bool {
    c.is_ascii_alphabetic()
        || matches!(c,
            '\u{00AA}' | '\u{00BA}'
            | '\u{00C0}'..='\u{024F}'   // Latin-1 supplement, Extended-A/B
            | '\u{1E00}'..='\u{1EFF}'   // Latin Extended Additional
            | '\u{2C60}'..='\u{2C7F}'
            | '\u{A720}'..='\u{A7FF}'
            | '\u{AB30}'..='\u{AB6F}'
            | '\u{FF21}'..='\u{FF3A}'   // Fullwidth A-Z
            | '\u{FF41}'..='\u{FF5A}'   // Fullwidth a-z
        )
}

/// Classify the dominant script of `text`
pub fn detect_script(text: &str) -> Script {
    if text.chars().any(is_kana) {
        Script::Japanese
    } else if text.chars().any(is_cjk_ideograph) {
        Script::Chinese
    } else {
        Script::Other
    }
}

/// True when every letter in `text` is Latin
pub fn is_latin_text(text: &str) -> bool {
    text.chars()
        .filter(|c| c.is_alphabetic())
        .all(is_latin_letter)
}

/// Generic Unicode to ASCII folding
pub fn fold_ascii(text: &str) -> String {
    any_ascii(text)
}

/// Script-appropriate transliteration to ASCII
pub fn transliterate(text: &str) -> String {
    match detect_script(text) {
        Script::Japanese | Script::Chinese => hepburn(text),
        Script::Other => fold_ascii(text),
    }
}

/// Readable romanization used when no external source answered
///
/// Hepburn for kana, ASCII folding for everything else, with each word
/// capitalized.
pub fn romanize_fallback(text: &str) -> String {
    let romanized = transliterate(text);
    romanized
        .split_whitespace()
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

static KANA_TABLE: Lazy<HashMap<char, &'static str>> = Lazy::new(|| {
    [
        ('あ', "a"), ('い', "i"), ('う', "u"), ('え', "e"), ('お', "o"),
        ('か', "ka"), ('き', "ki"), ('く', "ku"), ('け', "ke"), ('こ', "ko"),
        ('が', "ga"), ('ぎ', "gi"), ('ぐ', "gu"), ('げ', "ge"), ('ご', "go"),
        ('さ', "sa"), ('し', "shi"), ('す', "su"), ('せ', "se"), ('そ', "so"),
        ('ざ', "za"), ('じ', "ji"), ('ず', "zu"), ('ぜ', "ze"), ('ぞ', "zo"),
        ('た', "ta"), ('ち', "chi"), ('つ', "tsu"), ('て', "te"), ('と', "to"),
        ('だ', "da"), ('ぢ', "ji"), ('づ', "zu"), ('で', "de"), ('ど', "do"),
        ('な', "na"), ('に', "ni"), ('ぬ', "nu"), ('ね', "ne"), ('の', "no"),
        ('は', "ha"), ('ひ', "hi"), ('ふ', "fu"), ('へ', "he"), ('ほ', "ho"),
        ('ば', "ba"), ('び', "bi"), ('ぶ', "bu"), ('べ', "be"), ('ぼ', "bo"),
        ('ぱ', "pa"), ('ぴ', "pi"), ('ぷ', "pu"), ('ぺ', "pe"), ('ぽ', "po"),
        ('ま', "ma"), ('み', "mi"), ('む', "mu"), ('め', "me"), ('も', "mo"),
        ('や', "ya"), ('ゆ', "yu"), ('よ', "yo"),
        ('ら', "ra"), ('り', "ri"), ('る', "ru"), ('れ', "re"), ('ろ', "ro"),
        ('わ', "wa"), ('ゐ', "wi"), ('ゑ', "we"), ('を', "o"), ('ん', "n"),
        ('ゔ', "vu"), ('ゕ', "ka"), ('ゖ', "ke"),
        ('ぁ', "a"), ('ぃ', "i"), ('ぅ', "u"), ('ぇ', "e"), ('ぉ', "o"),
        ('ゃ', "ya"), ('ゅ', "yu"), ('ょ', "yo"), ('ゎ', "wa"),
        ('ヷ', "va"), ('ヸ', "vi"), ('ヹ', "ve"), ('ヺ', "vo"),
    ]
    .into_iter()
    .collect()
});

fn small_glide(c: char) -> Option<char> {
    match c {
        'ゃ' => Some('a'),
        'ゅ' => Some('u'),
        'ょ' => Some('o'),
        _ => None,
    }
}

fn small_vowel(c: char) -> Option<char> {
    match c {
        'ぁ' => Some('a'),
        'ぃ' => Some('i'),
        'ぅ' => Some('u'),
        'ぇ' => Some('e'),
        'ぉ' => Some('o'),
        _ => None,
    }
}

fn is_vowel(c: char) -> bool {
    matches!(c, 'a' | 'i' | 'u' | 'e' | 'o')
}

/// Katakana folds onto hiragana so one table covers both
fn to_hiragana(c: char) -> char {
    match c {
        '\u{30A1}'..='\u{30F6}' => char::from_u32(c as u32 - 0x60).unwrap_or(c),
        _ => c,
    }
}

/// Hepburn romanization of kana; non-kana characters fold through `any_ascii`
///
/// **Algorithm:**
/// 1. NFKC (halfwidth katakana become fullwidth), katakana mapped to hiragana
/// 2. Contracted sounds: a kana ending in "i" followed by small ya/yu/yo
///    merges ("ki"+"ya" -> "kya", "shi"+"ya" -> "sha")
/// 3. Small vowels after a syllable replace its vowel ("fu"+"a" -> "fa")
/// 4. Sokuon doubles the next consonant ("tch" before "ch")
/// 5. The long-vowel mark repeats the previous vowel
pub fn hepburn(text: &str) -> String {
    let chars: Vec<char> = text.nfkc().map(to_hiragana).collect();
    let mut out = String::with_capacity(chars.len() * 2);
    let mut geminate = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c == 'っ' {
            geminate = true;
            i += 1;
            continue;
        }

        if c == 'ー' {
            if let Some(last) = out.chars().last().filter(|l| is_vowel(*l)) {
                out.push(last);
            }
            i += 1;
            continue;
        }

        let Some(base) = KANA_TABLE.get(&c) else {
            geminate = false;
            out.push_str(&any_ascii(&c.to_string()));
            i += 1;
            continue;
        };

        let mut syllable = base.to_string();
        let next = chars.get(i + 1).copied();

        if let Some(glide) = next.and_then(small_glide) {
            if syllable.len() >= 2 && syllable.ends_with('i') {
                syllable.pop();
                if !matches!(syllable.as_str(), "sh" | "ch" | "j") {
                    syllable.push('y');
                }
                syllable.push(glide);
                i += 1;
            }
        } else if let Some(vowel) = next.and_then(small_vowel) {
            if syllable == "u" {
                syllable = format!("w{}", vowel);
                i += 1;
            } else if syllable.len() >= 2 {
                syllable.pop();
                syllable.push(vowel);
                i += 1;
            }
        }

        if geminate {
            if syllable.starts_with("ch") {
                out.push('t');
            } else if let Some(first) = syllable.chars().next().filter(|f| !is_vowel(*f) && *f != 'n') {
                out.push(first);
            }
            geminate = false;
        }

        out.push_str(&syllable);
        i += 1;
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_script() {
        assert_eq!(detect_script("Queen"), Script::Other);
        assert_eq!(detect_script("Björk"), Script::Other);
        assert_eq!(detect_script("ひらがな"), Script::Japanese);
        assert_eq!(detect_script("宇多田ヒカル"), Script::Japanese);
        assert_eq!(detect_script("王菲"), Script::Chinese);
        assert_eq!(detect_script("Кино"), Script::Other);
    }

    #[test]
    fn test_is_latin_text() {
        assert!(is_latin_text("Sigur Rós"));
        assert!(is_latin_text("AC/DC 2024"));
        assert!(is_latin_text(""));
        assert!(!is_latin_text("Utada ヒカル"));
        assert!(!is_latin_text("Кино"));
    }

    #[test]
    fn test_hepburn_basic() {
        assert_eq!(hepburn("ひかる"), "hikaru");
        assert_eq!(hepburn("ヒカル"), "hikaru");
        assert_eq!(hepburn("にほん"), "nihon");
    }

    #[test]
    fn test_hepburn_contracted_sounds() {
        assert_eq!(hepburn("きょうと"), "kyouto");
        assert_eq!(hepburn("シャ"), "sha");
        assert_eq!(hepburn("じゅう"), "juu");
        assert_eq!(hepburn("ちゃ"), "cha");
    }

    #[test]
    fn test_hepburn_sokuon_and_long_vowel() {
        assert_eq!(hepburn("がっこう"), "gakkou");
        assert_eq!(hepburn("まっちゃ"), "matcha");
        assert_eq!(hepburn("ラーメン"), "raamen");
        assert_eq!(hepburn("コーヒー"), "koohii");
    }

    #[test]
    fn test_hepburn_small_vowels() {
        assert_eq!(hepburn("ファン"), "fan");
        assert_eq!(hepburn("ウィ"), "wi");
    }

    #[test]
    fn test_hepburn_halfwidth_and_mixed() {
        assert_eq!(hepburn("ｶﾀｶﾅ"), "katakana");
        assert_eq!(hepburn("DJ ヒカル"), "DJ hikaru");
    }

    #[test]
    fn test_romanize_fallback_capitalizes_words() {
        assert_eq!(romanize_fallback("ひかる　うただ"), "Hikaru Utada");
        assert_eq!(romanize_fallback("Кино"), "Kino");
    }
}
