//! Token counting backed by tiktoken-rs with a memo cache
//!
//! Counts are advisory sizing data for budget checks; providers remain the
//! source of truth for billed usage.

use moka::sync::Cache;
use thiserror::Error;
use tiktoken_rs::{CoreBPE, cl100k_base, get_bpe_from_model, o200k_base};
use tracing::debug;
use xxhash_rust::xxh64::xxh64;

/// Errors loading a tokenizer
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("failed to load tokenizer: {0}")]
    Encoding(String),
}

/// Tokenizer plus an xxh64-keyed count memo
pub struct TokenCounter {
    bpe: CoreBPE,
    memo: Cache<u64, usize>,
}

impl TokenCounter {
    /// Build a counter for a model or encoding name.
    ///
    /// Model ids may carry a provider prefix (`openai/gpt-4o-mini`); only the
    /// trailing segment selects the encoding. Unrecognized names fall back to
    /// `cl100k_base`, keeping counts usable for any model.
    pub fn for_model(model: &str) -> Result<Self, TokenError> {
        let name = model.rsplit('/').next().unwrap_or(model).to_ascii_lowercase();

        let bpe = match get_bpe_from_model(&name) {
            Ok(b) => b,
            Err(_) => match name.as_str() {
                "o200k_base" => o200k_base().map_err(|e| TokenError::Encoding(e.to_string()))?,
                "cl100k_base" => cl100k_base().map_err(|e| TokenError::Encoding(e.to_string()))?,
                _ => {
                    debug!(%model, "for_model: no tokenizer for model, falling back to cl100k_base");
                    cl100k_base().map_err(|e| TokenError::Encoding(e.to_string()))?
                }
            },
        };

        Ok(Self {
            bpe,
            memo: Cache::new(100_000),
        })
    }

    /// Count tokens in `text`. Empty input is always zero; repeated inputs
    /// hit the memo instead of re-encoding.
    pub fn count(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }

        let key = xxh64(text.as_bytes(), 0);
        if let Some(n) = self.memo.get(&key) {
            return n;
        }

        let n = self.bpe.encode_ordinary(text).len();
        self.memo.insert(key, n);
        n
    }
}
