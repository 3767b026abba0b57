//! Repository acquisition and target parsing

mod manager;
mod url;

pub use manager::AcquiredRepo;
pub use url::{RepoSource, RepoTargets, RepoUrl, is_github_url, parse_github_url, parse_targets};

use std::path::PathBuf;
use thiserror::Error;

/// Errors from target parsing and repository acquisition
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("Invalid URL or path: {0}")]
    InvalidUrl(String),

    #[error("No targets provided")]
    NoTargets,

    #[error("All targets must be from the same repository")]
    RepoMismatch,

    #[error("All targets must use the same branch")]
    BranchMismatch,

    #[error("Targets must be all GitHub URLs or all local paths")]
    MixedTargets,

    #[error("Local paths must be all absolute or all relative")]
    MixedPathForms,

    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("Failed to clone repository: {0}")]
    CloneFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
