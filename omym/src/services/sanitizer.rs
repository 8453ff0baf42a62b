//! Path component sanitization
//!
//! **Algorithm:**
//! 1. NFKC-normalize (fullwidth forms fold to ASCII, compatibility
//!    ideographs to their canonical form)
//! 2. Drop apostrophes ("Don't" -> "Dont")
//! 3. Replace every character that is not an ASCII letter, digit, hyphen,
//!    or a non-ASCII letter/digit with a hyphen
//! 4. Collapse hyphen runs and trim hyphens at both ends
//! 5. Optionally truncate to a UTF-8 byte budget on a character boundary,
//!    then trim trailing hyphens again
//!
//! Underscore is replaced too: it separates the fields of generated file
//! names.

use unicode_normalization::UnicodeNormalization;

/// Byte budget for artist directory names
pub const ARTIST_MAX_BYTES: usize = 50;
/// Byte budget for album directory names
pub const ALBUM_MAX_BYTES: usize = 90;
/// Byte budget for track titles
pub const TITLE_MAX_BYTES: usize = 90;

/// Placeholder used when a title sanitizes to nothing
pub const UNKNOWN_TITLE: &str = "Unknown-Title";

/// Sanitize `text` for use as a single path component
///
/// With `preserve_extension`, a trailing alphanumeric `.ext` survives and
/// counts against `max_length`.
pub fn sanitize(text: &str, max_length: Option<usize>, preserve_extension: bool) -> String {
    if preserve_extension {
        if let Some((stem, ext)) = split_extension(text) {
            let ext_budget = ext.len() + 1;
            let stem_limit = max_length.map(|max| max.saturating_sub(ext_budget));
            let stem = sanitize(stem, stem_limit, false);
            if stem.is_empty() {
                return stem;
            }
            return format!("{}.{}", stem, ext);
        }
    }

    let normalized: String = text.nfkc().filter(|c| *c != '\'').collect();

    let mut out = String::with_capacity(normalized.len());
    for c in normalized.chars() {
        let keep = c.is_ascii_alphanumeric() || c == '-' || (!c.is_ascii() && c.is_alphanumeric());
        let c = if keep { c } else { '-' };
        if c == '-' && out.ends_with('-') {
            continue;
        }
        out.push(c);
    }

    let mut out = out.trim_matches('-').to_string();

    if let Some(max) = max_length {
        truncate_to_char_boundary(&mut out, max);
        let trimmed_len = out.trim_end_matches('-').len();
        out.truncate(trimmed_len);
    }

    out
}

/// Artist directory component
pub fn sanitize_artist(name: &str) -> String {
    sanitize(name, Some(ARTIST_MAX_BYTES), false)
}

/// Album directory component
pub fn sanitize_album(name: &str) -> String {
    sanitize(name, Some(ALBUM_MAX_BYTES), false)
}

/// Title field of a file name; never empty
pub fn sanitize_title(title: &str) -> String {
    let sanitized = sanitize(title, Some(TITLE_MAX_BYTES), false);
    if sanitized.is_empty() {
        UNKNOWN_TITLE.to_string()
    } else {
        sanitized
    }
}

fn split_extension(text: &str) -> Option<(&str, &str)> {
    let (stem, ext) = text.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some((stem, ext))
}

fn truncate_to_char_boundary(text: &mut String, max_bytes: usize) {
    if text.len() <= max_bytes {
        return;
    }
    let mut cut = max_bytes;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
}
