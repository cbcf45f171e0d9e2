// src/amount.rs
//! Pulls the announced amount (`share 12,50`) out of matched page text.

use once_cell::sync::OnceCell;
use regex::Regex;

/// Keyword that precedes the amount in the rain banner.
pub const DEFAULT_AMOUNT_KEYWORD: &str = "share";

/// Compiled `<keyword> <number>` matcher.
#[derive(Debug, Clone)]
pub struct AmountExtractor {
    re: Regex,
}

impl AmountExtractor {
    /// Build a matcher for `keyword` (matched literally, case-insensitive).
    /// Digits are ASCII only; other scripts' digits never parse as `f64`.
    pub fn new(keyword: &str) -> anyhow::Result<Self> {
        let pattern = format!(
            r"(?i){}\s+([0-9]+(?:[.,][0-9]+)?)",
            regex::escape(keyword.trim())
        );
        Ok(Self {
            re: Regex::new(&pattern)?,
        })
    }

    /// First amount in `text`, with `,` accepted as the decimal separator.
    /// `None` means "no amount", which is not the same as `Some(0.0)`.
    pub fn extract(&self, text: &str) -> Option<f64> {
        let caps = self.re.captures(text)?;
        let raw = caps.get(1)?.as_str().replacen(',', ".", 1);
        raw.parse::<f64>().ok().filter(|v| v.is_finite())
    }
}

fn default_extractor() -> &'static AmountExtractor {
    static DEFAULT: OnceCell<AmountExtractor> = OnceCell::new();
    DEFAULT.get_or_init(|| {
        AmountExtractor::new(DEFAULT_AMOUNT_KEYWORD).expect("default amount pattern compiles")
    })
}

/// [`AmountExtractor::extract`] with the default `share` keyword.
pub fn extract_amount(text: &str) -> Option<f64> {
    default_extractor().extract(text)
}
