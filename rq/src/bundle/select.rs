//! Deterministic file selection for bundling
//!
//! Walks a directory tree and produces the sorted set of relative paths
//! that survive include/exclude patterns, depth, size, and binary checks.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use glob::Pattern;
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Patterns excluded by default, mirroring what users never want bundled:
/// VCS internals, build output, lockfiles, media, archives, and logs.
pub const DEFAULT_EXCLUDES: &[&str] = &[
    // Version control
    ".git/*",
    ".gitignore",
    ".gitattributes",
    ".github/*",
    ".gitlab/*",
    ".svn/*",
    // IDE and editor files
    ".vscode/*",
    ".idea/*",
    ".vs/*",
    "*.swp",
    "*.swo",
    // Build and dependency directories
    "node_modules/*",
    "dist/*",
    "build/*",
    "target/*",
    "__pycache__/*",
    "*.pyc",
    "*.pyo",
    "*.pyd",
    "*.so",
    "*.dll",
    "*.dylib",
    // Package management
    "package-lock.json",
    "yarn.lock",
    "poetry.lock",
    "Pipfile.lock",
    // Documentation
    "*.md",
    "*.rst",
    "*.txt",
    "docs/*",
    "doc/*",
    // Configuration files
    "*.json",
    "*.yaml",
    "*.yml",
    "*.toml",
    "*.ini",
    "*.cfg",
    "*.conf",
    // Data files
    "*.csv",
    "*.tsv",
    "*.xlsx",
    "*.xls",
    "*.db",
    "*.sqlite",
    "*.sqlite3",
    // Media files
    "*.png",
    "*.jpg",
    "*.jpeg",
    "*.gif",
    "*.bmp",
    "*.ico",
    "*.svg",
    "*.mp3",
    "*.mp4",
    "*.wav",
    "*.avi",
    // Archive files
    "*.zip",
    "*.tar",
    "*.gz",
    "*.rar",
    "*.7z",
    // Binary files
    "*.exe",
    "*.bin",
    "*.dat",
    // Log files
    "*.log",
    "logs/*",
    // Test files and directories
    "tests/*",
    "test/*",
    "*_test.go",
    "*_test.py",
    "*_test.js",
    "*_test.ts",
    "*_spec.rb",
    // Other
    ".DS_Store",
    "Thumbs.db",
];

/// Default cap on individual file size (1 MiB)
pub const DEFAULT_MAX_FILE_SIZE: u64 = 1024 * 1024;

/// Bytes sniffed from the head of each file for the NUL-byte binary check
const BINARY_SNIFF_LEN: usize = 1024;

/// Errors from compiling patterns or walking the tree
#[derive(Debug, Error)]
pub enum SelectError {
    #[error("invalid glob pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("path not found or not a directory: {0}")]
    PathNotFound(PathBuf),
}

/// Compiled selection rules, applied identically to every walk
#[derive(Debug, Clone)]
pub struct Selector {
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
    max_depth: Option<usize>,
    max_file_size: u64,
}

impl Selector {
    /// Compile include/exclude globs into a selector.
    ///
    /// An empty include list matches everything. Pattern syntax errors are
    /// reported with the offending pattern so the caller can fix its input.
    pub fn new(include: &[String], exclude: &[String], max_depth: Option<usize>) -> Result<Self, SelectError> {
        debug!(includes = include.len(), excludes = exclude.len(), ?max_depth, "Selector::new: called");
        Ok(Self {
            include: compile_patterns(include)?,
            exclude: compile_patterns(exclude)?,
            max_depth,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        })
    }

    /// Override the per-file size cap
    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    /// Walk `root` and return the matching file paths, relative to `root`,
    /// with `/` separators, in lexicographic order.
    ///
    /// The same tree always yields the same list: symlinks are not followed,
    /// non-regular files are skipped, and files that are oversized or look
    /// binary are dropped rather than failing the walk.
    pub fn select(&self, root: &Path) -> Result<Vec<String>, SelectError> {
        if !root.is_dir() {
            return Err(SelectError::PathNotFound(root.to_path_buf()));
        }

        let mut walker = WalkDir::new(root).follow_links(false);
        if let Some(depth) = self.max_depth {
            walker = walker.max_depth(depth);
        }

        let mut selected = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!(error = %e, "select: unreadable entry, skipping");
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let rel = match entry.path().strip_prefix(root) {
                Ok(r) => to_posix(r),
                Err(_) => continue,
            };

            if !self.include.is_empty() && !matches_any(&self.include, &rel) {
                continue;
            }
            if matches_any(&self.exclude, &rel) {
                debug!(path = %rel, "select: excluded by pattern");
                continue;
            }

            match entry.metadata() {
                Ok(md) if md.len() > self.max_file_size => {
                    debug!(path = %rel, size = md.len(), "select: file too large, skipping");
                    continue;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(path = %rel, error = %e, "select: failed to stat, skipping");
                    continue;
                }
            }

            match looks_binary(entry.path()) {
                Ok(true) => {
                    debug!(path = %rel, "select: binary content, skipping");
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(path = %rel, error = %e, "select: failed to read, skipping");
                    continue;
                }
            }

            selected.push(rel);
        }

        selected.sort();
        debug!(count = selected.len(), root = %root.display(), "select: complete");
        Ok(selected)
    }
}

fn compile_patterns(patterns: &[String]) -> Result<Vec<Pattern>, SelectError> {
    patterns
        .iter()
        .map(|p| {
            Pattern::new(p).map_err(|source| SelectError::InvalidPattern {
                pattern: p.clone(),
                source,
            })
        })
        .collect()
}

/// Match a relative path against the pattern set.
///
/// Patterns are right-anchored at component boundaries: `node_modules/*`
/// matches a nested `a/node_modules/b.js`, and `*.pyc` matches by file name
/// anywhere in the tree.
fn matches_any(patterns: &[Pattern], rel: &str) -> bool {
    patterns.iter().any(|pattern| {
        if pattern.matches(rel) {
            return true;
        }
        let mut start = 0;
        while let Some(pos) = rel[start..].find('/') {
            start += pos + 1;
            if pattern.matches(&rel[start..]) {
                return true;
            }
        }
        false
    })
}

/// A file is considered binary when its first KiB contains a NUL byte
fn looks_binary(path: &Path) -> std::io::Result<bool> {
    let mut head = [0u8; BINARY_SNIFF_LEN];
    let mut file = File::open(path)?;
    let n = file.read(&mut head)?;
    Ok(head[..n].contains(&0))
}

fn to_posix(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
