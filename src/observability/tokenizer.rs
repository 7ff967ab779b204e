use std::sync::OnceLock;

use tiktoken_rs::CoreBPE;

/// cl100k_base token counter shared by the usage paths.
///
/// The BPE tables load lazily on first use. A failed load degrades to zero
/// counts with a warning instead of failing requests, so usage reporting is
/// best-effort by construction.
pub struct Tokenizer {
    encoder: OnceLock<Option<CoreBPE>>,
}

impl Tokenizer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            encoder: OnceLock::new(),
        }
    }

    /// Number of cl100k_base tokens in `text`; 0 when the encoder is
    /// unavailable.
    #[must_use]
    pub fn count(&self, text: &str) -> u64 {
        match self.encoder.get_or_init(|| match tiktoken_rs::cl100k_base() {
            Ok(bpe) => Some(bpe),
            Err(err) => {
                tracing::warn!(error = %err, "failed to init tokenizer, usage counts disabled");
                None
            }
        }) {
            Some(bpe) => bpe.encode_ordinary(text).len() as u64,
            None => 0,
        }
    }
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_counts_zero() {
        let tokenizer = Tokenizer::new();
        assert_eq!(tokenizer.count(""), 0);
    }

    #[test]
    fn nonempty_text_counts_positive() {
        let tokenizer = Tokenizer::new();
        assert!(tokenizer.count("Hello, world!") > 0);
    }

    #[test]
    fn counting_is_deterministic() {
        let tokenizer = Tokenizer::new();
        let text = "The quick brown fox jumps over the lazy dog.";
        assert_eq!(tokenizer.count(text), tokenizer.count(text));
    }

    #[test]
    fn longer_text_counts_more() {
        let tokenizer = Tokenizer::new();
        let short = tokenizer.count("hello");
        let long = tokenizer.count("hello hello hello hello hello");
        assert!(long > short);
    }
}
