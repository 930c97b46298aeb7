//! Text → block tokenizer
//!
//! The fingerprint calculator treats tokenization as a black box that turns a
//! record's text into opaque string blocks. [`LexicalTokenizer`] is the
//! default: lowercase word unigrams plus adjacent-word bigrams, with short
//! words and common stopwords removed.

use regex::Regex;
use std::collections::BTreeSet;
use suggest_common::{Error, Result};

/// Black-box text → blocks extraction
pub trait Tokenizer: Send + Sync {
    /// Extract the distinct blocks of `text`; order is not significant
    fn blocks(&self, text: &str) -> Result<Vec<String>>;
}

const MIN_WORD_LEN: usize = 3;

const STOPWORDS: &[&str] = &[
    "and", "are", "but", "for", "from", "has", "have", "into", "its", "not", "of", "that", "the",
    "then", "this", "was", "were", "which", "with",
];

/// Word unigram + bigram tokenizer
#[derive(Debug, Clone)]
pub struct LexicalTokenizer {
    word_regex: Regex,
    stopwords: BTreeSet<&'static str>,
}

impl LexicalTokenizer {
    pub fn new() -> Result<Self> {
        let word_regex = Regex::new(r"[\p{L}\p{N}][\p{L}\p{N}\-]*")
            .map_err(|e| Error::Tokenizer(format!("failed to compile word regex: {}", e)))?;
        Ok(Self {
            word_regex,
            stopwords: STOPWORDS.iter().copied().collect(),
        })
    }

    fn words(&self, text: &str) -> Vec<String> {
        self.word_regex
            .find_iter(text)
            .map(|m| m.as_str().trim_end_matches('-').to_lowercase())
            .filter(|w| w.chars().count() >= MIN_WORD_LEN && !self.stopwords.contains(w.as_str()))
            .collect()
    }
}

impl Tokenizer for LexicalTokenizer {
    fn blocks(&self, text: &str) -> Result<Vec<String>> {
        let words = self.words(text);
        let mut blocks: BTreeSet<String> = words.iter().cloned().collect();
        for pair in words.windows(2) {
            blocks.insert(format!("{} {}", pair[0], pair[1]));
        }
        Ok(blocks.into_iter().collect())
    }
}
