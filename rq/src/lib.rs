//! repoquery - deterministic repository bundles, analyzed by LLMs
//!
//! repoquery turns directories of source code into a single deterministic
//! text bundle, counts its tokens, and submits it to an LLM provider through
//! a caching and retrying query layer. Multiple directories of one
//! repository are analyzed concurrently, with per-directory results written
//! to disk.
//!
//! # Core Concepts
//!
//! - **Deterministic Bundles**: The same tree always renders to the same
//!   text, so bundles hash to stable cache keys
//! - **Cache Before Provider**: Every query is looked up by content hash
//!   first; Redis when reachable, in-process otherwise
//! - **Failure Isolation**: One directory failing never stops its siblings
//! - **Acquire Once**: A repository is cloned (or opened) once and shared by
//!   every directory task, then cleaned up after all of them finish
//!
//! # Modules
//!
//! - [`bundle`] - File selection, decoding, and bundle rendering
//! - [`tokens`] - Token counting with a memoizing tiktoken wrapper
//! - [`llm`] - Provider clients and the caching/retrying query engine
//! - [`cache`] - Redis-or-local response cache
//! - [`repo`] - Target parsing and repository acquisition
//! - [`coordinator`] - Concurrent fan-out across directories
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod bundle;
pub mod cache;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod llm;
pub mod output;
pub mod pipeline;
pub mod repo;
pub mod tokens;

// Re-export commonly used types
pub use bundle::{Bundle, FileRecord, Selector};
pub use cache::QueryCache;
pub use config::{CacheConfig, Config, LlmConfig, SelectionConfig};
pub use coordinator::{AnalysisReport, Coordinator};
pub use llm::{LLMResponse, LlmClient, LlmError, QueryEngine, QueryRequest, StreamChunk, TokenUsage};
pub use output::WrittenResult;
pub use pipeline::{AnalysisTask, DirectoryOutcome, PipelineContext, TaskError};
pub use repo::{AcquiredRepo, RepoError, RepoTargets};
pub use tokens::TokenCounter;
