//! CLI command definitions and subcommands

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// repoquery - repository analysis with LLMs
#[derive(Parser)]
#[command(
    name = "rq",
    about = "Bundle repository directories into deterministic text and analyze them with LLMs",
    version = env!("GIT_DESCRIBE"),
    after_help = "Logs are written to: ~/.local/share/repoquery/logs/repoquery.log"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Subcommand)]
pub enum Command {
    /// Ask a question about a repository or directory
    Ask(AskArgs),

    /// Analyze repository directories and save the results
    Analyze(AnalyzeArgs),
}

/// Arguments for `rq ask`
#[derive(Args)]
pub struct AskArgs {
    /// Local directory or GitHub repository URL
    #[arg(value_name = "TARGET")]
    pub target: String,

    /// The question to ask about the code
    #[arg(value_name = "QUESTION")]
    pub question: String,

    /// Model ID to use (provider/name)
    #[arg(short, long)]
    pub model: Option<String>,

    /// Stream the response as it arrives
    #[arg(long)]
    pub stream: bool,

    /// Custom system prompt for the LLM
    #[arg(long, value_name = "TEXT")]
    pub system_prompt: Option<String>,

    /// Only include files matching this glob (repeatable)
    #[arg(long = "include", value_name = "GLOB")]
    pub include: Vec<String>,

    /// Exclude files matching this glob (repeatable)
    #[arg(long = "exclude", value_name = "GLOB")]
    pub exclude: Vec<String>,

    /// Maximum directory depth to walk
    #[arg(long, value_name = "N")]
    pub max_depth: Option<usize>,

    /// Maximum tokens for the LLM response
    #[arg(long, value_name = "N")]
    pub max_tokens: Option<u32>,
}

/// Arguments for `rq analyze`
#[derive(Args)]
pub struct AnalyzeArgs {
    /// GitHub tree URLs (same repository and branch) or local directories prefixed with @
    #[arg(value_name = "TARGET", required = true)]
    pub targets: Vec<String>,

    /// Model ID to use (provider/name)
    #[arg(short, long)]
    pub model: Option<String>,

    /// Output directory for analysis results
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Custom system prompt for the LLM
    #[arg(long, value_name = "TEXT")]
    pub system_prompt: Option<String>,

    /// Only include files matching this glob (repeatable)
    #[arg(long = "include", value_name = "GLOB")]
    pub include: Vec<String>,

    /// Exclude files matching this glob (repeatable)
    #[arg(long = "exclude", value_name = "GLOB")]
    pub exclude: Vec<String>,

    /// Maximum directory depth to walk
    #[arg(long, value_name = "N")]
    pub max_depth: Option<usize>,

    /// Maximum tokens for the LLM response
    #[arg(long, value_name = "N")]
    pub max_tokens: Option<u32>,

    /// Analyze all directories together in one query
    #[arg(long)]
    pub combined: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_no_command() {
        let cli = Cli::parse_from(["rq"]);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_cli_parse_ask() {
        let cli = Cli::parse_from(["rq", "ask", "./src", "What does this module do?"]);
        if let Some(Command::Ask(args)) = cli.command {
            assert_eq!(args.target, "./src");
            assert_eq!(args.question, "What does this module do?");
            assert!(args.model.is_none());
            assert!(!args.stream);
        } else {
            panic!("Expected Ask command");
        }
    }

    #[test]
    fn test_cli_parse_ask_with_options() {
        let cli = Cli::parse_from([
            "rq",
            "ask",
            "https://github.com/owner/repo",
            "Summarize the error handling",
            "--model",
            "anthropic/claude-sonnet-4-20250514",
            "--stream",
            "--include",
            "*.rs",
            "--include",
            "*.toml",
            "--max-depth",
            "2",
        ]);
        if let Some(Command::Ask(args)) = cli.command {
            assert_eq!(args.model.as_deref(), Some("anthropic/claude-sonnet-4-20250514"));
            assert!(args.stream);
            assert_eq!(args.include, vec!["*.rs", "*.toml"]);
            assert_eq!(args.max_depth, Some(2));
        } else {
            panic!("Expected Ask command");
        }
    }

    #[test]
    fn test_cli_parse_analyze() {
        let cli = Cli::parse_from([
            "rq",
            "analyze",
            "https://github.com/owner/repo/tree/main/src",
            "https://github.com/owner/repo/tree/main/docs",
            "-o",
            "results",
            "--combined",
        ]);
        if let Some(Command::Analyze(args)) = cli.command {
            assert_eq!(args.targets.len(), 2);
            assert_eq!(args.output, Some(PathBuf::from("results")));
            assert!(args.combined);
        } else {
            panic!("Expected Analyze command");
        }
    }

    #[test]
    fn test_cli_parse_analyze_local_targets() {
        let cli = Cli::parse_from(["rq", "analyze", "@src", "@tests"]);
        if let Some(Command::Analyze(args)) = cli.command {
            assert_eq!(args.targets, vec!["@src", "@tests"]);
            assert!(!args.combined);
        } else {
            panic!("Expected Analyze command");
        }
    }

    #[test]
    fn test_cli_parse_analyze_requires_target() {
        assert!(Cli::try_parse_from(["rq", "analyze"]).is_err());
    }

    #[test]
    fn test_cli_parse_ask_requires_question() {
        assert!(Cli::try_parse_from(["rq", "ask", "./src"]).is_err());
    }

    #[test]
    fn test_cli_with_config() {
        let cli = Cli::parse_from(["rq", "-c", "/path/to/config.yml", "ask", "src", "why?"]);
        assert_eq!(cli.config, Some(PathBuf::from("/path/to/config.yml")));
    }

    #[test]
    fn test_cli_log_level_global() {
        let cli = Cli::parse_from(["rq", "--log-level", "debug", "analyze", "@src"]);
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
    }
}
