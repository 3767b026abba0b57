//! repoquery - repository analysis with LLMs
//!
//! CLI entry point: bundles directories into deterministic text, queries an
//! LLM provider through a caching layer, and writes the results.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{CommandFactory, Parser};
use colored::Colorize;
use eyre::{Context, Result};
use tokio::sync::mpsc;
use tracing::info;

use repoquery::bundle::{Bundle, Selector, read_sources};
use repoquery::cache::QueryCache;
use repoquery::cli::{AnalyzeArgs, AskArgs, Cli, Command};
use repoquery::config::Config;
use repoquery::coordinator::{AnalysisReport, Coordinator};
use repoquery::llm::{
    LLMResponse, QueryEngine, QueryEngineConfig, QueryRequest, StreamChunk, create_client, split_model,
};
use repoquery::pipeline::{AnalysisTask, PipelineContext};
use repoquery::repo::{AcquiredRepo, RepoSource, is_github_url, parse_github_url, parse_targets};
use repoquery::tokens::TokenCounter;

fn setup_logging(level: Option<&str>) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("repoquery")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let level = match level {
        Some(value) => value
            .parse::<tracing::Level>()
            .map_err(|_| eyre::eyre!("Invalid log level: {value}. Use: trace, debug, info, warn, or error"))?,
        None => tracing::Level::INFO,
    };

    // Setup tracing subscriber - write to log file, not stdout/stderr
    let log_file = fs::File::create(log_dir.join("repoquery.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration first: the log level can come from it
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    setup_logging(cli.log_level.as_deref().or(config.log_level.as_deref())).context("Failed to setup logging")?;

    info!("repoquery loaded config: model={}", config.llm.model);

    match cli.command {
        Some(Command::Ask(args)) => cmd_ask(config, args).await,
        Some(Command::Analyze(args)) => cmd_analyze(config, args).await,
        None => {
            Cli::command().print_help()?;
            println!();
            Ok(())
        }
    }
}

/// Fold command-line overrides into the loaded configuration
fn apply_overrides(config: &mut Config, model: Option<String>, system_prompt: Option<String>, max_tokens: Option<u32>) {
    if let Some(model) = model {
        config.llm.model = model;
    }
    if let Some(prompt) = system_prompt {
        config.llm.system_prompt = prompt;
    }
    if let Some(max) = max_tokens {
        config.llm.max_tokens = max;
    }
}

fn build_selector(config: &Config, include: &[String], exclude: &[String], max_depth: Option<usize>) -> Result<Selector> {
    let includes = config.selection.effective_includes(include);
    let excludes = config.selection.effective_excludes(exclude);
    let depth = max_depth.or(config.selection.max_depth);
    let selector = Selector::new(&includes, &excludes, depth)?.with_max_file_size(config.selection.max_file_size);
    Ok(selector)
}

async fn build_engine(config: &Config) -> Result<(Arc<TokenCounter>, Arc<QueryEngine>)> {
    let (_, bare_model) = split_model(&config.llm.model);
    let counter = Arc::new(TokenCounter::for_model(bare_model).context("Failed to load tokenizer")?);
    let client = create_client(&config.llm, &config.llm.model).context("Failed to create LLM client")?;

    let cache = Arc::new(QueryCache::connect(&config.cache).await);
    info!("Cache backend: {}", cache.backend());

    let engine = Arc::new(QueryEngine::new(
        client,
        cache,
        counter.clone(),
        QueryEngineConfig::from(&config.llm),
    ));
    Ok((counter, engine))
}

/// Resolve an ask target into a checkout plus the directory to bundle
async fn acquire_target(target: &str) -> Result<(AcquiredRepo, String)> {
    if is_github_url(target) {
        let parsed = parse_github_url(target)?;
        eprintln!("Cloning GitHub repository: {}", parsed.repo_url);
        let repo = AcquiredRepo::clone_from(&parsed.repo_url, parsed.branch.as_deref()).await?;
        eprintln!("Repository cloned to: {}", repo.root().display());
        let dir = if parsed.subpath.is_empty() {
            ".".to_string()
        } else {
            parsed.subpath
        };
        Ok((repo, dir))
    } else {
        let repo = AcquiredRepo::local(Path::new(target))?;
        Ok((repo, ".".to_string()))
    }
}

/// Bundle one directory and ask a single question about it
async fn cmd_ask(mut config: Config, args: AskArgs) -> Result<()> {
    apply_overrides(&mut config, args.model, args.system_prompt, args.max_tokens);
    config.validate()?;

    eprintln!("Starting analysis of repository: {}", args.target);
    eprintln!("Question: {}", args.question);
    eprintln!("Using model: {}", config.llm.model);

    let (repo, dir) = acquire_target(&args.target).await?;
    let selector = build_selector(&config, &args.include, &args.exclude, args.max_depth)?;
    let (counter, engine) = build_engine(&config).await?;

    let dir_path = repo.dir_path(&dir);
    let paths = selector.select(&dir_path)?;
    let read = read_sources(&dir_path, &paths, config.selection.strict)?;
    if read.pairs.is_empty() {
        return Err(eyre::eyre!("No files found matching criteria"));
    }
    let bundle = Bundle::assemble(read.pairs, &counter);
    eprintln!("Bundled {} files ({} tokens)", bundle.file_count(), bundle.total_tokens);

    let request = QueryRequest {
        model: config.llm.model.clone(),
        content: format!(
            "Analyze this repository and answer: {}\n\n{}",
            args.question,
            bundle.render()
        ),
        system_prompt: config.llm.system_prompt.clone(),
        max_tokens: config.llm.max_tokens,
    };

    let response = if args.stream {
        stream_to_stdout(&engine, &request).await?
    } else {
        let response = engine.query(&request).await?;
        println!("{}", response.response());
        response
    };

    eprintln!("\nTokens used: {}", response.usage().total_tokens);
    repo.cleanup();
    Ok(())
}

/// Print stream chunks as they arrive, then return the folded response.
///
/// Streamed text cannot be replayed, so the folded response is written back
/// to the cache once the stream completes.
async fn stream_to_stdout(engine: &QueryEngine, request: &QueryRequest) -> Result<LLMResponse> {
    let (tx, mut rx) = mpsc::channel(32);
    let printer = async {
        let mut out = std::io::stdout();
        while let Some(chunk) = rx.recv().await {
            match chunk {
                StreamChunk::TextDelta(text) => {
                    let _ = write!(out, "{text}");
                    let _ = out.flush();
                }
                StreamChunk::Done { .. } => {}
                StreamChunk::Error(message) => eprintln!("\n{} {}", "Stream error:".red(), message),
            }
        }
        let _ = writeln!(out);
    };

    let (result, ()) = tokio::join!(engine.query_stream(request, tx), printer);
    let response = result?;
    engine.store(request, &response).await;
    Ok(response)
}

/// Fan analysis out across the target directories and print a summary
async fn cmd_analyze(mut config: Config, args: AnalyzeArgs) -> Result<()> {
    apply_overrides(&mut config, args.model, args.system_prompt, args.max_tokens);
    if let Some(output) = args.output {
        config.output.dir = output;
    }
    config.validate()?;

    let targets = parse_targets(&args.targets)?;
    eprintln!("Directories to process: {}", targets.dirs.len());

    let repo = match &targets.source {
        RepoSource::Remote { repo_url } => {
            eprintln!("Processing repository: {repo_url}");
            if let Some(branch) = &targets.branch {
                eprintln!("Branch: {branch}");
            }
            AcquiredRepo::clone_from(repo_url, targets.branch.as_deref()).await?
        }
        RepoSource::Local { root } => AcquiredRepo::local(root)?,
    };

    let selector = build_selector(&config, &args.include, &args.exclude, args.max_depth)?;
    let (counter, engine) = build_engine(&config).await?;
    let output_root = config.output.dir.clone();
    let ctx = Arc::new(PipelineContext {
        selector: Arc::new(selector),
        counter,
        engine,
        output_root: output_root.clone(),
        strict: config.selection.strict,
    });

    let tasks: Vec<AnalysisTask> = targets
        .dirs
        .iter()
        .map(|dir| AnalysisTask {
            directory: dir.clone(),
            model: config.llm.model.clone(),
            prompt: None,
            system_prompt: config.llm.system_prompt.clone(),
            max_tokens: config.llm.max_tokens,
            stream: false,
        })
        .collect();

    let coordinator = Coordinator::new(ctx, config.concurrency.max_parallel_dirs);
    let started = Instant::now();
    let report = if args.combined {
        eprintln!("Using combined analysis");
        coordinator.run_combined(repo, tasks).await
    } else {
        coordinator.run(repo, tasks).await
    };

    print_report(&report, started.elapsed(), &output_root);
    if report.all_failed() {
        std::process::exit(1);
    }
    Ok(())
}

fn print_report(report: &AnalysisReport, elapsed: Duration, output_root: &Path) {
    println!();
    for (directory, outcome) in &report.outcomes {
        match outcome {
            Ok(outcome) => println!(
                "{} {} ({} files, {} tokens)",
                "✓".green(),
                directory,
                outcome.file_count,
                outcome.response.usage().total_tokens
            ),
            Err(reason) => println!("{} {}: {}", "✗".red(), directory, reason),
        }
    }
    println!();
    println!("Analysis completed in {:.2} seconds", elapsed.as_secs_f64());
    println!("Total tokens processed: {}", report.total_tokens());
    println!("Results saved in: {}", output_root.display());
}
