//! Result persistence: one folder per analyzed directory
//!
//! Layout under the output root:
//!
//! ```text
//! <output-root>/<directory-key>/
//!   concatenated.txt
//!   response.json
//! ```
//!
//! Both artifacts are written to a temporary file first and renamed into
//! place, so a crash never leaves a partial file at the final path and
//! re-running simply replaces the previous output.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

use crate::llm::LLMResponse;

pub const BUNDLE_FILE: &str = "concatenated.txt";
pub const RESPONSE_FILE: &str = "response.json";

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to create output directory {path}: {source}")]
    CreateDir { path: PathBuf, source: std::io::Error },

    #[error("Failed to write {path}: {source}")]
    Write { path: PathBuf, source: std::io::Error },

    #[error("Failed to encode response: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Where one directory's artifacts landed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenResult {
    pub dir: PathBuf,
    pub bundle_path: PathBuf,
    pub response_path: PathBuf,
}

/// Reduce a directory identifier to a single safe path component.
///
/// `src/module` becomes `src_module`; the repository root (empty or `.`)
/// becomes `root`.
pub fn directory_key(dir: &str) -> String {
    let mut trimmed = dir.trim();
    while let Some(rest) = trimmed.strip_prefix("./") {
        trimmed = rest;
    }
    let trimmed = trimmed.trim_matches('/');
    if trimmed.is_empty() || trimmed == "." {
        return "root".to_string();
    }

    trimmed
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Persist one directory's bundle and response under `output_root/key/`
pub fn write(
    output_root: &Path,
    key: &str,
    bundle_text: &str,
    response: &LLMResponse,
) -> Result<WrittenResult, OutputError> {
    let dir = output_root.join(key);
    std::fs::create_dir_all(&dir).map_err(|source| OutputError::CreateDir {
        path: dir.clone(),
        source,
    })?;

    let bundle_path = write_atomic(&dir, BUNDLE_FILE, bundle_text.as_bytes())?;

    let mut encoded = serde_json::to_vec_pretty(response)?;
    encoded.push(b'\n');
    let response_path = write_atomic(&dir, RESPONSE_FILE, &encoded)?;

    debug!(dir = %dir.display(), "write: persisted bundle and response");
    Ok(WrittenResult {
        dir,
        bundle_path,
        response_path,
    })
}

fn write_atomic(dir: &Path, name: &str, bytes: &[u8]) -> Result<PathBuf, OutputError> {
    let path = dir.join(name);

    // Same directory as the target, so the rename cannot cross filesystems
    let mut tmp = NamedTempFile::new_in(dir).map_err(|source| OutputError::Write {
        path: path.clone(),
        source,
    })?;
    tmp.write_all(bytes).map_err(|source| OutputError::Write {
        path: path.clone(),
        source,
    })?;
    tmp.persist(&path).map_err(|e| OutputError::Write {
        path: path.clone(),
        source: e.error,
    })?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::TokenUsage;
    use serde_json::json;

    fn test_response(text: &str) -> LLMResponse {
        LLMResponse::new("resp-1", text, Default::default(), TokenUsage::new(12, 4))
            .with_meta("model", json!("openai/gpt-4o-mini"))
            .with_meta("cache_hit", json!(false))
    }

    #[test]
    fn test_directory_key_sanitization() {
        assert_eq!(directory_key("src"), "src");
        assert_eq!(directory_key("src/module"), "src_module");
        assert_eq!(directory_key("./src/module/"), "src_module");
        assert_eq!(directory_key("tests/unit tests"), "tests_unit_tests");
        assert_eq!(directory_key("."), "root");
        assert_eq!(directory_key(""), "root");
        assert_eq!(directory_key("/"), "root");
    }

    #[test]
    fn test_write_persists_both_artifacts() {
        let root = tempfile::tempdir().unwrap();
        let response = test_response("analysis text");
        let bundle = "File: a.py\nx = 1\n\nFile: b.py\ny = 2";

        let written = write(root.path(), "src", bundle, &response).unwrap();

        assert_eq!(written.dir, root.path().join("src"));
        let bundle_back = std::fs::read_to_string(&written.bundle_path).unwrap();
        assert_eq!(bundle_back, bundle);

        let raw = std::fs::read_to_string(&written.response_path).unwrap();
        let back: LLMResponse = serde_json::from_str(&raw).unwrap();
        assert_eq!(back, response);
    }

    #[test]
    fn test_write_creates_missing_root() {
        let root = tempfile::tempdir().unwrap();
        let nested = root.path().join("deep/output");

        let written = write(&nested, "lib", "File: a.py\nx = 1", &test_response("ok")).unwrap();
        assert!(written.bundle_path.exists());
    }

    #[test]
    fn test_write_overwrites_idempotently() {
        let root = tempfile::tempdir().unwrap();

        write(root.path(), "src", "old bundle", &test_response("old")).unwrap();
        let written = write(root.path(), "src", "new bundle", &test_response("new")).unwrap();

        assert_eq!(std::fs::read_to_string(&written.bundle_path).unwrap(), "new bundle");
        let back: LLMResponse =
            serde_json::from_str(&std::fs::read_to_string(&written.response_path).unwrap()).unwrap();
        assert_eq!(back.response(), "new");

        // No stray temp files left behind
        let entries: Vec<_> = std::fs::read_dir(&written.dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(entries.len(), 2, "unexpected files: {entries:?}");
    }
}
