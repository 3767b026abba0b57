//! Fan-out across directories of one acquired repository
//!
//! The repository is acquired once; each directory gets its own pipeline
//! task under a concurrency limit. A directory failing never stops its
//! siblings, and the checkout's temporary directory is removed exactly
//! once, after every task has joined.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::json;
use tokio::sync::Semaphore;
use tracing::{info, warn};
use uuid::Uuid;

use crate::bundle::{Bundle, read_sources};
use crate::llm::{LLMResponse, QueryRequest, TokenUsage};
use crate::output::{self, directory_key};
use crate::pipeline::{AnalysisTask, DirectoryOutcome, PipelineContext, TaskError, run_directory};
use crate::repo::AcquiredRepo;

/// Key under which a combined analysis is reported and persisted
pub const COMBINED_KEY: &str = "combined";

/// Aggregate result of one run, keyed by directory label
#[derive(Debug, Default)]
pub struct AnalysisReport {
    pub outcomes: BTreeMap<String, Result<DirectoryOutcome, String>>,
}

impl AnalysisReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.values().filter(|r| r.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    /// Provider-reported tokens across all successful directories
    pub fn total_tokens(&self) -> u64 {
        self.outcomes
            .values()
            .filter_map(|r| r.as_ref().ok())
            .map(|o| o.response.usage().total_tokens)
            .sum()
    }

    /// A whole run only counts as failed when nothing succeeded
    pub fn all_failed(&self) -> bool {
        !self.outcomes.is_empty() && self.succeeded() == 0
    }

    fn record(&mut self, directory: &str, result: Result<DirectoryOutcome, String>) {
        if let Err(reason) = &result {
            warn!(%directory, %reason, "directory analysis failed");
        }
        self.outcomes.insert(directory.to_string(), result);
    }
}

/// Runs directory tasks against one repository checkout
pub struct Coordinator {
    ctx: Arc<PipelineContext>,
    max_parallel: usize,
}

impl Coordinator {
    pub fn new(ctx: Arc<PipelineContext>, max_parallel: usize) -> Self {
        Self {
            ctx,
            max_parallel: max_parallel.max(1),
        }
    }

    /// Analyze each task's directory independently.
    ///
    /// Tasks run concurrently up to the parallelism limit; results complete
    /// in any order and are keyed by directory. The checkout is cleaned up
    /// after every task has joined.
    pub async fn run(&self, repo: AcquiredRepo, tasks: Vec<AnalysisTask>) -> AnalysisReport {
        info!(dirs = tasks.len(), root = %repo.root().display(), "starting analysis");
        let semaphore = Arc::new(Semaphore::new(self.max_parallel));
        let mut handles = Vec::with_capacity(tasks.len());

        for task in tasks {
            let ctx = self.ctx.clone();
            let semaphore = semaphore.clone();
            let dir_path = repo.dir_path(&task.directory);
            let directory = task.directory.clone();

            let handle = tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.map_err(|_| TaskError::Canceled)?;
                run_directory(&ctx, &dir_path, &task).await
            });
            handles.push((directory, handle));
        }

        let mut report = AnalysisReport::default();
        for (directory, handle) in handles {
            let result = match handle.await {
                Ok(result) => result.map_err(|e| e.to_string()),
                Err(e) => Err(format!("task failed: {e}")),
            };
            report.record(&directory, result);
        }

        repo.cleanup();
        info!(succeeded = report.succeeded(), failed = report.failed(), "analysis complete");
        report
    }

    /// Analyze every directory as one conversation.
    ///
    /// All bundles are stitched into a single prompt when they fit the
    /// engine's token limit. Otherwise each directory is queried separately
    /// and the answers are folded into one synthetic response. Either way
    /// the result is persisted under the `combined` key. Query parameters
    /// come from the first task; directories that fail to bundle are
    /// reported individually and left out of the combined prompt.
    pub async fn run_combined(&self, repo: AcquiredRepo, tasks: Vec<AnalysisTask>) -> AnalysisReport {
        let mut report = AnalysisReport::default();
        let Some(spec) = tasks.first().cloned() else {
            repo.cleanup();
            return report;
        };
        info!(dirs = tasks.len(), "starting combined analysis");

        // Bundle every directory up front so the size decision sees them all
        let mut bundles: Vec<(String, String, usize)> = Vec::new();
        let mut total_tokens = 0usize;
        let mut total_files = 0usize;
        for task in &tasks {
            match self.bundle_directory(&repo, &task.directory) {
                Ok((content, files)) => {
                    let tokens = self.ctx.counter.count(&content);
                    total_tokens += tokens;
                    total_files += files;
                    bundles.push((task.directory.clone(), content, tokens));
                }
                Err(e) => report.record(&task.directory, Err(e.to_string())),
            }
        }
        repo.cleanup();

        if bundles.is_empty() {
            return report;
        }

        let combined_text = bundles
            .iter()
            .map(|(dir, content, _)| format!("Content for {dir}:\n{content}"))
            .collect::<Vec<_>>()
            .join("\n\n");

        let result = if total_tokens > self.ctx.engine.token_limit() {
            warn!(
                total_tokens,
                limit = self.ctx.engine.token_limit(),
                "combined content over token limit, querying directories individually"
            );
            self.query_split(&spec, &bundles, total_tokens).await
        } else {
            let request = QueryRequest {
                model: spec.model.clone(),
                content: prompted(&spec, &combined_text),
                system_prompt: spec.system_prompt.clone(),
                max_tokens: spec.max_tokens,
            };
            self.ctx.engine.query(&request).await.map_err(|e| e.to_string())
        };

        match result {
            Ok(response) => {
                let written = output::write(
                    &self.ctx.output_root,
                    &directory_key(COMBINED_KEY),
                    &combined_text,
                    &response,
                );
                match written {
                    Ok(written) => report.record(
                        COMBINED_KEY,
                        Ok(DirectoryOutcome {
                            directory: COMBINED_KEY.to_string(),
                            response,
                            bundle_tokens: total_tokens,
                            file_count: total_files,
                            written,
                        }),
                    ),
                    Err(e) => report.record(COMBINED_KEY, Err(e.to_string())),
                }
            }
            Err(reason) => report.record(COMBINED_KEY, Err(reason)),
        }

        report
    }

    fn bundle_directory(&self, repo: &AcquiredRepo, directory: &str) -> Result<(String, usize), TaskError> {
        let dir_path = repo.dir_path(directory);
        let paths = self.ctx.selector.select(&dir_path)?;
        if paths.is_empty() {
            return Err(TaskError::NoFiles);
        }
        let read = read_sources(&dir_path, &paths, self.ctx.strict)?;
        if read.pairs.is_empty() {
            return Err(TaskError::NoFiles);
        }
        let bundle = Bundle::assemble(read.pairs, &self.ctx.counter);
        Ok((bundle.render(), bundle.file_count()))
    }

    /// Query each directory on its own and fold the answers into one
    /// synthetic response
    async fn query_split(
        &self,
        spec: &AnalysisTask,
        bundles: &[(String, String, usize)],
        total_bundle_tokens: usize,
    ) -> Result<LLMResponse, String> {
        let mut sections = Vec::new();
        let mut usage = TokenUsage::default();
        let mut failures = Vec::new();

        for (dir, content, _) in bundles {
            let request = QueryRequest {
                model: spec.model.clone(),
                content: prompted(spec, content),
                system_prompt: spec.system_prompt.clone(),
                max_tokens: spec.max_tokens,
            };
            match self.ctx.engine.query(&request).await {
                Ok(response) => {
                    let part = response.usage();
                    usage = TokenUsage::new(
                        usage.prompt_tokens + part.prompt_tokens,
                        usage.completion_tokens + part.completion_tokens,
                    );
                    sections.push(format!("Analysis for {dir}:\n{}", response.response()));
                }
                Err(e) => {
                    warn!(directory = %dir, error = %e, "split query failed");
                    failures.push(format!("{dir}: {e}"));
                }
            }
        }

        if sections.is_empty() {
            return Err(format!("all split queries failed: {}", failures.join("; ")));
        }

        let directories: Vec<&str> = bundles.iter().map(|(dir, _, _)| dir.as_str()).collect();
        Ok(
            LLMResponse::new(Uuid::now_v7().to_string(), sections.join("\n\n"), Default::default(), usage)
                .with_meta("model", json!(spec.model))
                .with_meta("analysis_type", json!("combined"))
                .with_meta("directories", json!(directories))
                .with_meta("total_tokens", json!(total_bundle_tokens))
                .with_meta("cache_hit", json!(false)),
        )
    }
}

/// Prepend the task's instruction to query content when one is set
fn prompted(spec: &AnalysisTask, content: &str) -> String {
    match &spec.prompt {
        Some(prompt) => format!("{prompt}\n\n{content}"),
        None => content.to_string(),
    }
}
