//! Directory-to-text bundling: selection, decoding, and rendering

pub mod concat;
pub mod select;

pub use concat::{ConcatError, ReadOutcome, parse, read_sources, render};
pub use select::{DEFAULT_EXCLUDES, DEFAULT_MAX_FILE_SIZE, SelectError, Selector};

use crate::tokens::TokenCounter;

/// One selected file: relative POSIX path, decoded content, measured tokens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Path relative to the bundle root, `/`-separated, no leading slash
    pub path: String,

    /// Exact decoded file content
    pub content: String,

    /// Token count of `content` under the bundle's tokenizer
    pub token_count: usize,
}

/// Ordered records plus their total token count
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Bundle {
    pub records: Vec<FileRecord>,
    pub total_tokens: usize,
}

impl Bundle {
    /// Build a bundle from decoded (path, content) pairs, counting tokens
    /// per file. The total is always the sum of the per-record counts.
    pub fn assemble(pairs: Vec<(String, String)>, counter: &TokenCounter) -> Self {
        let records: Vec<FileRecord> = pairs
            .into_iter()
            .map(|(path, content)| {
                let token_count = counter.count(&content);
                FileRecord {
                    path,
                    content,
                    token_count,
                }
            })
            .collect();
        let total_tokens = records.iter().map(|r| r.token_count).sum();
        Self {
            records,
            total_tokens,
        }
    }

    pub fn file_count(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Render to the canonical concatenated text
    pub fn render(&self) -> String {
        concat::render(&self.records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assemble_totals_are_sums() {
        let counter = TokenCounter::for_model("gpt-4o-mini").unwrap();
        let bundle = Bundle::assemble(
            vec![
                ("a.py".to_string(), "def main():\n    return 42\n".to_string()),
                ("b.py".to_string(), "value = 'hello world'\n".to_string()),
                ("empty.py".to_string(), String::new()),
            ],
            &counter,
        );

        assert_eq!(bundle.file_count(), 3);
        assert!(bundle.records[0].token_count > 0);
        assert_eq!(bundle.records[2].token_count, 0);
        let sum: usize = bundle.records.iter().map(|r| r.token_count).sum();
        assert_eq!(bundle.total_tokens, sum);
    }

    #[test]
    fn test_empty_bundle() {
        let counter = TokenCounter::for_model("gpt-4o-mini").unwrap();
        let bundle = Bundle::assemble(vec![], &counter);
        assert!(bundle.is_empty());
        assert_eq!(bundle.total_tokens, 0);
        assert_eq!(bundle.render(), "");
    }
}
