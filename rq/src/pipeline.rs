//! The per-directory analysis pipeline
//!
//! One task runs `select → read → assemble → query → persist` against a
//! single directory and either produces a [`DirectoryOutcome`] or fails with
//! a [`TaskError`]. Tasks share nothing mutable beyond the cache inside the
//! query engine, so the coordinator can run any number of them concurrently.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::bundle::{Bundle, ConcatError, SelectError, Selector, read_sources};
use crate::llm::{LlmError, LLMResponse, QueryEngine, QueryRequest};
use crate::output::{self, OutputError, WrittenResult, directory_key};
use crate::tokens::TokenCounter;

/// Why one directory's task failed; siblings are unaffected
#[derive(Debug, Error)]
pub enum TaskError {
    #[error(transparent)]
    Select(#[from] SelectError),

    #[error(transparent)]
    Read(#[from] ConcatError),

    #[error(transparent)]
    Query(#[from] LlmError),

    #[error(transparent)]
    Persist(#[from] OutputError),

    #[error("No files found matching criteria")]
    NoFiles,

    #[error("Task canceled")]
    Canceled,
}

/// One unit of work: a directory to bundle and the query to run over it
#[derive(Debug, Clone)]
pub struct AnalysisTask {
    /// Directory label relative to the repository root, `.` for the root
    pub directory: String,
    pub model: String,
    /// Instruction prepended to the bundle content; the bundle alone is the
    /// prompt when absent
    pub prompt: Option<String>,
    pub system_prompt: String,
    pub max_tokens: u32,
    pub stream: bool,
}

/// Everything a directory task needs, shared read-only across tasks
pub struct PipelineContext {
    pub selector: Arc<Selector>,
    pub counter: Arc<TokenCounter>,
    pub engine: Arc<QueryEngine>,
    pub output_root: PathBuf,
    /// Fail on undecodable files instead of skipping them
    pub strict: bool,
}

/// A completed directory analysis
#[derive(Debug)]
pub struct DirectoryOutcome {
    pub directory: String,
    pub response: LLMResponse,
    pub bundle_tokens: usize,
    pub file_count: usize,
    pub written: WrittenResult,
}

/// Run the full pipeline for one directory rooted at `dir_path`.
///
/// `task.directory` is only a label here; the caller resolves it to a path
/// so local and cloned checkouts look the same.
pub async fn run_directory(
    ctx: &PipelineContext,
    dir_path: &Path,
    task: &AnalysisTask,
) -> Result<DirectoryOutcome, TaskError> {
    info!(directory = %task.directory, path = %dir_path.display(), "analyzing directory");

    let paths = ctx.selector.select(dir_path)?;
    if paths.is_empty() {
        return Err(TaskError::NoFiles);
    }

    let read = read_sources(dir_path, &paths, ctx.strict)?;
    if read.pairs.is_empty() {
        return Err(TaskError::NoFiles);
    }
    let bundle = Bundle::assemble(read.pairs, &ctx.counter);
    info!(
        directory = %task.directory,
        files = bundle.file_count(),
        skipped = read.skipped.len(),
        tokens = bundle.total_tokens,
        "bundle assembled"
    );

    let bundle_text = bundle.render();
    let content = match &task.prompt {
        Some(prompt) => format!("{prompt}\n\n{bundle_text}"),
        None => bundle_text.clone(),
    };
    let request = QueryRequest {
        model: task.model.clone(),
        content,
        system_prompt: task.system_prompt.clone(),
        max_tokens: task.max_tokens,
    };

    let response = if task.stream {
        query_streaming(ctx, &request).await?
    } else {
        ctx.engine.query(&request).await?
    };

    // The persisted bundle stays parseable; any instruction lives only in
    // the request
    let key = directory_key(&task.directory);
    let written = output::write(&ctx.output_root, &key, &bundle_text, &response)?;
    debug!(directory = %task.directory, "run_directory: complete");

    Ok(DirectoryOutcome {
        directory: task.directory.clone(),
        response,
        bundle_tokens: bundle.total_tokens,
        file_count: bundle.file_count(),
        written,
    })
}

/// Streaming variant: chunks have no live consumer during directory
/// analysis, so drain them and keep only the folded response, then write it
/// back to the cache the way a non-streaming query would have.
async fn query_streaming(ctx: &PipelineContext, request: &QueryRequest) -> Result<LLMResponse, LlmError> {
    let (tx, mut rx) = mpsc::channel(32);
    let drain = async {
        while rx.recv().await.is_some() {}
    };
    let (result, ()) = tokio::join!(ctx.engine.query_stream(request, tx), drain);

    let response = result?;
    ctx.engine.store(request, &response).await;
    Ok(response)
}
