//! Canonical bundle text format
//!
//! Every section is `File: <relative path>`, a newline, the file's exact
//! content, then one blank line before the next marker. Nothing follows the
//! final section, so identical inputs always render to identical bytes and
//! `parse` recovers exactly the (path, content) pairs that were rendered.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

use super::FileRecord;

/// Section marker prefix
pub const MARKER: &str = "File: ";

/// Separator appended between sections (one blank line)
const SEPARATOR: &str = "\n\n";

/// Errors from reading source files or parsing bundle text
#[derive(Debug, Error)]
pub enum ConcatError {
    #[error("file is not valid UTF-8: {path}")]
    NonUtf8 { path: PathBuf },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed bundle text: {0}")]
    Malformed(String),
}

/// Render records into the canonical concatenated form.
///
/// Pure function of its input: same records, same output bytes.
pub fn render(records: &[FileRecord]) -> String {
    let sections: Vec<String> = records
        .iter()
        .map(|record| format!("{MARKER}{}\n{}", record.path, record.content))
        .collect();
    sections.join(SEPARATOR)
}

/// Recover (path, content) pairs from rendered bundle text.
///
/// Inverse of [`render`] as long as no file's content itself contains a
/// blank line directly followed by a `File: ` marker; such content is
/// indistinguishable from a section boundary.
pub fn parse(text: &str) -> Result<Vec<(String, String)>, ConcatError> {
    if text.is_empty() {
        return Ok(Vec::new());
    }
    if !text.starts_with(MARKER) {
        return Err(ConcatError::Malformed(format!(
            "expected text to start with '{MARKER}'"
        )));
    }

    let boundary = format!("{SEPARATOR}{MARKER}");
    let mut sections = Vec::new();
    let mut start = 0;
    for (idx, _) in text.match_indices(&boundary) {
        sections.push(&text[start..idx]);
        start = idx + SEPARATOR.len();
    }
    sections.push(&text[start..]);

    let mut pairs = Vec::with_capacity(sections.len());
    for section in sections {
        let body = section
            .strip_prefix(MARKER)
            .ok_or_else(|| ConcatError::Malformed("section missing marker".to_string()))?;
        let (path, content) = match body.find('\n') {
            Some(nl) => (&body[..nl], &body[nl + 1..]),
            None => (body, ""),
        };
        pairs.push((path.to_string(), content.to_string()));
    }
    Ok(pairs)
}

/// Decoded sources plus the paths that were dropped on the way
#[derive(Debug, Default)]
pub struct ReadOutcome {
    pub pairs: Vec<(String, String)>,
    pub skipped: Vec<String>,
}

/// Read selected paths under `root`, decoding each as UTF-8.
///
/// In the default lenient mode an unreadable or non-UTF-8 file is recorded
/// in `skipped` and the rest of the bundle proceeds; with `strict` set the
/// first bad file fails the whole read.
pub fn read_sources(root: &Path, paths: &[String], strict: bool) -> Result<ReadOutcome, ConcatError> {
    debug!(count = paths.len(), strict, "read_sources: called");
    let mut outcome = ReadOutcome::default();

    for rel in paths {
        let full = root.join(rel);
        let bytes = match fs::read(&full) {
            Ok(b) => b,
            Err(source) if strict => return Err(ConcatError::Io { path: full, source }),
            Err(e) => {
                warn!(path = %rel, error = %e, "read_sources: unreadable file, skipping");
                outcome.skipped.push(rel.clone());
                continue;
            }
        };
        match String::from_utf8(bytes) {
            Ok(content) => outcome.pairs.push((rel.clone(), content)),
            Err(_) if strict => return Err(ConcatError::NonUtf8 { path: full }),
            Err(_) => {
                debug!(path = %rel, "read_sources: not valid UTF-8, skipping");
                outcome.skipped.push(rel.clone());
            }
        }
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn record(path: &str, content: &str) -> FileRecord {
        FileRecord {
            path: path.to_string(),
            content: content.to_string(),
            token_count: 0,
        }
    }

    #[test]
    fn test_render_two_files_exact_bytes() {
        let records = vec![record("src/main.py", "x = 1"), record("src/util.py", "y = 2")];
        let text = render(&records);
        assert_eq!(text, "File: src/main.py\nx = 1\n\nFile: src/util.py\ny = 2");
    }

    #[test]
    fn test_render_preserves_trailing_newlines() {
        let records = vec![record("a.py", "x = 1\n"), record("b.py", "y = 2\n")];
        let text = render(&records);
        assert_eq!(text, "File: a.py\nx = 1\n\n\nFile: b.py\ny = 2\n");
    }

    #[test]
    fn test_render_empty_bundle_is_empty() {
        assert_eq!(render(&[]), "");
    }

    #[test]
    fn test_render_is_deterministic() {
        let records = vec![record("a.py", "x"), record("b.py", "y")];
        assert_eq!(render(&records), render(&records));
    }

    #[test]
    fn test_parse_recovers_pairs() {
        let text = "File: a.py\nx = 1\n\nFile: sub/b.py\ny = 2";
        let pairs = parse(text).unwrap();
        assert_eq!(
            pairs,
            vec![
                ("a.py".to_string(), "x = 1".to_string()),
                ("sub/b.py".to_string(), "y = 2".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_empty_content_section() {
        let records = vec![record("empty.py", ""), record("b.py", "y = 2")];
        let pairs = parse(&render(&records)).unwrap();
        assert_eq!(pairs[0], ("empty.py".to_string(), String::new()));
        assert_eq!(pairs[1], ("b.py".to_string(), "y = 2".to_string()));
    }

    #[test]
    fn test_parse_empty_text() {
        assert!(parse("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_rejects_missing_marker() {
        let err = parse("not a bundle").unwrap_err();
        assert!(matches!(err, ConcatError::Malformed(_)));
    }

    #[test]
    fn test_read_sources_lenient_skips_non_utf8() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("good.py"), "x = 1\n").unwrap();
        std::fs::write(dir.path().join("bad.py"), [0xFF, 0xFE, 0x01]).unwrap();

        let paths = vec!["bad.py".to_string(), "good.py".to_string()];
        let outcome = read_sources(dir.path(), &paths, false).unwrap();
        assert_eq!(outcome.pairs, vec![("good.py".to_string(), "x = 1\n".to_string())]);
        assert_eq!(outcome.skipped, vec!["bad.py".to_string()]);
    }

    #[test]
    fn test_read_sources_strict_fails_on_non_utf8() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("bad.py"), [0xFF, 0xFE, 0x01]).unwrap();

        let err = read_sources(dir.path(), &["bad.py".to_string()], true).unwrap_err();
        assert!(matches!(err, ConcatError::NonUtf8 { .. }));
    }

    #[test]
    fn test_read_sources_lenient_skips_missing_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("here.py"), "x = 1\n").unwrap();

        let paths = vec!["gone.py".to_string(), "here.py".to_string()];
        let outcome = read_sources(dir.path(), &paths, false).unwrap();
        assert_eq!(outcome.pairs.len(), 1);
        assert_eq!(outcome.skipped, vec!["gone.py".to_string()]);
    }

    proptest! {
        #[test]
        fn test_render_parse_round_trip(
            pairs in prop::collection::vec(
                ("[a-z0-9_]{1,8}(/[a-z0-9_]{1,8}){0,2}\\.[a-z]{1,3}", "(?s).{0,40}"),
                0..6,
            )
        ) {
            for (_, content) in &pairs {
                prop_assume!(!content.contains("\n\nFile: "));
                prop_assume!(!content.starts_with("File: "));
            }

            let records: Vec<FileRecord> = pairs
                .iter()
                .map(|(path, content)| FileRecord {
                    path: path.clone(),
                    content: content.clone(),
                    token_count: 0,
                })
                .collect();

            let recovered = parse(&render(&records)).unwrap();
            prop_assert_eq!(recovered, pairs);
        }
    }
}
