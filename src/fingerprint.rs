// src/fingerprint.rs
//! Dedup keys for detections: lower-cased, whitespace-collapsed, length-bounded text.

use sha2::{Digest, Sha256};

/// Upper bound on fingerprint length, in characters.
pub const MAX_FINGERPRINT_CHARS: usize = 200;

/// Minimum fingerprint length the pipeline accepts by default.
pub const DEFAULT_MIN_FINGERPRINT_LEN: usize = 6;

/// Normalize `text` into a stable dedup key.
///
/// Lower-cases, collapses every whitespace run (NBSP included) into one ASCII
/// space, trims both ends and keeps at most [`MAX_FINGERPRINT_CHARS`] characters.
/// Empty input yields an empty key, which is never admissible.
pub fn fingerprint(text: &str) -> String {
    let lowered = text.to_lowercase();
    let mut out = String::with_capacity(lowered.len().min(MAX_FINGERPRINT_CHARS * 4));
    let mut taken = 0usize;

    // `split_whitespace` follows the Unicode White_Space property, so U+00A0 splits too.
    for word in lowered.split_whitespace() {
        if taken >= MAX_FINGERPRINT_CHARS {
            break;
        }
        if !out.is_empty() {
            out.push(' ');
            taken += 1;
        }
        for ch in word.chars() {
            if taken >= MAX_FINGERPRINT_CHARS {
                break;
            }
            out.push(ch);
            taken += 1;
        }
    }

    // A cut right after a separator would leave a trailing space.
    if out.ends_with(' ') {
        out.pop();
    }
    out
}

/// Fingerprint of a detection: the text, or the page URL when the text is blank.
pub fn fingerprint_detection(text: &str, url: &str) -> String {
    let fp = fingerprint(text);
    if fp.is_empty() {
        fingerprint(url)
    } else {
        fp
    }
}

/// True when `fp` is long enough to be worth deduplicating.
pub fn is_admissible(fp: &str, min_len: usize) -> bool {
    !fp.is_empty() && fp.chars().count() >= min_len
}

/// Short, non-reversible id for log fields. Never log the raw page text.
pub fn short_id(fp: &str) -> String {
    let digest = Sha256::digest(fp.as_bytes());
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_and_whitespace_variants_collapse() {
        let a = fingerprint("Share  10.50");
        let b = fingerprint("share 10.50");
        let c = fingerprint("SHARE 10.50  ");
        assert_eq!(a, "share 10.50");
        assert_eq!(a, b);
        assert_eq!(b, c);
    }

    #[test]
    fn nbsp_and_newlines_are_whitespace() {
        assert_eq!(
            fingerprint("\u{00A0}Join\u{00A0}\u{00A0}NOW\n\tto get"),
            "join now to get"
        );
    }

    #[test]
    fn idempotent() {
        let once = fingerprint("  Rain   IS live — Share 3,20 ");
        assert_eq!(fingerprint(&once), once);
    }

    #[test]
    fn bounded_to_200_chars() {
        let long = "ab ".repeat(300);
        let fp = fingerprint(&long);
        assert!(fp.chars().count() <= MAX_FINGERPRINT_CHARS);
        assert!(!fp.ends_with(' '));

        let wide = "é".repeat(500);
        assert_eq!(fingerprint(&wide).chars().count(), MAX_FINGERPRINT_CHARS);
    }

    #[test]
    fn empty_input_is_empty_key() {
        assert_eq!(fingerprint(""), "");
        assert_eq!(fingerprint(" \u{00A0}\n"), "");
        assert!(!is_admissible("", 0));
    }

    #[test]
    fn url_fallback_only_when_text_blank() {
        assert_eq!(
            fingerprint_detection("   ", "https://Bandit.Camp/"),
            "https://bandit.camp/"
        );
        assert_eq!(fingerprint_detection("Share 1", "https://x"), "share 1");
    }

    #[test]
    fn admissibility_respects_min_len() {
        assert!(!is_admissible("short", 6));
        assert!(is_admissible("share1", 6));
    }

    #[test]
    fn short_id_is_stable_hex() {
        let id = short_id("share 10.50");
        assert_eq!(id.len(), 12);
        assert_eq!(id, short_id("share 10.50"));
        assert_ne!(id, short_id("share 10.51"));
    }
}
