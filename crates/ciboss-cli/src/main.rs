//! ciboss - CI orchestration for a single commit or pull request
//!
//! ## Commands
//!
//! - `run`: gather change metadata, run the tests, track failures and report
//!   back; prints the final Run State as JSON
//! - `config`: show which integrations are enabled (secrets are never shown)

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;

use ciboss_ci::TestCommand;
use ciboss_core::{CiBossConfig, OrchestratorBuilder, RunInput, RunState, TestStatus};

#[derive(Parser)]
#[command(name = "ciboss")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(
    about = "CI orchestration: run tests, track failures, report on the change",
    long_about = None
)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one orchestration for a commit or pull request
    Run(RunArgs),

    /// Show the effective configuration
    Config,
}

#[derive(clap::Args, Debug, Default)]
struct RunArgs {
    /// Repository in owner/name form
    #[arg(long, env = "GITHUB_REPOSITORY")]
    repo: Option<String>,

    /// Pull request number
    #[arg(long)]
    pr: Option<u64>,

    /// Commit SHA
    #[arg(long)]
    sha: Option<String>,

    /// JSON run input file; flags above take precedence over its fields
    #[arg(long)]
    input: Option<PathBuf>,

    /// Test command line (overrides PLAYWRIGHT_COMMAND)
    #[arg(long = "test-command")]
    test_command: Option<String>,

    /// Working directory for the test command
    #[arg(long)]
    working_dir: Option<PathBuf>,

    /// Test timeout in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Maximum test executions per run
    #[arg(long)]
    max_cycles: Option<u32>,

    /// Write the final state here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Exit with status 1 when the tests failed
    #[arg(long)]
    exit_code: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    ciboss_core::telemetry::init_tracing(cli.json, ciboss_core::telemetry::level_for(cli.verbose));

    let config = CiBossConfig::from_env().context("Invalid ciboss configuration")?;

    match cli.command {
        Commands::Run(args) => {
            let status = cmd_run(config, &args).await?;
            if args.exit_code && status == TestStatus::Failed {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Config => cmd_config(&config, cli.json),
    }
}

/// Run one orchestration and print the final state.
async fn cmd_run(mut config: CiBossConfig, args: &RunArgs) -> Result<TestStatus> {
    apply_overrides(&mut config, args);
    let input = build_input(args)?;
    let state = RunState::from_input(input).context("Invalid run input")?;

    info!(
        run_id = %state.run_id,
        repository = %state.repository,
        pr = ?state.pr_number,
        sha = ?state.commit_sha(),
        "Starting run"
    );

    let orchestrator = OrchestratorBuilder::from_config(&config)
        .context("Failed to set up integrations")?
        .build();
    let report = orchestrator.run(state).await;

    let rendered = serde_json::to_string_pretty(&report.state)?;
    match &args.output {
        Some(path) => {
            std::fs::write(path, format!("{rendered}\n"))
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(path = %path.display(), "Final state written");
        }
        None => println!("{rendered}"),
    }

    Ok(report.state.test_status())
}

/// Print which integrations are enabled.
fn cmd_config(config: &CiBossConfig, json: bool) -> Result<()> {
    let report = config.report();
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("ciboss {}", ciboss_core::VERSION);
    println!("GitHub:       {}", report.github);
    println!("Linear:       {}", report.linear);
    println!("Planner:      {}", report.planner);
    println!("Test command: {} ({})", report.test_command, report.test_name);
    if let Some(dir) = &report.working_dir {
        println!("Working dir:  {}", dir);
    }
    println!("Timeout:      {}s", report.timeout_secs);
    println!("Max cycles:   {}", report.max_cycles);
    Ok(())
}

fn apply_overrides(config: &mut CiBossConfig, args: &RunArgs) {
    if let Some(line) = &args.test_command {
        let name = config.test_command.name.clone();
        let previous = std::mem::replace(
            &mut config.test_command,
            TestCommand::shell(name, line.clone()),
        );
        config.test_command.working_dir = previous.working_dir;
        config.test_command.timeout_secs = previous.timeout_secs;
    }
    if let Some(dir) = &args.working_dir {
        config.test_command.working_dir = Some(dir.clone());
    }
    if let Some(secs) = args.timeout_secs {
        config.test_command.timeout_secs = secs.max(1);
    }
    if let Some(cycles) = args.max_cycles {
        config.max_cycles = cycles.max(1);
    }
}

/// Merge the optional input file with command-line flags.
fn build_input(args: &RunArgs) -> Result<RunInput> {
    let mut input = match &args.input {
        Some(path) => read_input(path)?,
        None => RunInput::default(),
    };

    if let Some(repo) = &args.repo {
        input.repository = repo.clone();
    }
    if args.pr.is_some() {
        input.pr_number = args.pr;
    }
    if args.sha.is_some() {
        input.commit_sha = args.sha.clone();
    }

    if input.repository.trim().is_empty() {
        bail!("A repository is required (--repo, GITHUB_REPOSITORY or the input file)");
    }
    if input.pr_number.is_none() && input.commit_sha.is_none() {
        bail!("Either --pr or --sha is required");
    }
    Ok(input)
}

fn read_input(path: &Path) -> Result<RunInput> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read run input {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Invalid run input JSON in {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_args(argv: &[&str]) -> RunArgs {
        let cli = Cli::try_parse_from(argv).expect("parse");
        match cli.command {
            Commands::Run(args) => args,
            Commands::Config => panic!("Expected run command"),
        }
    }

    #[test]
    fn test_parse_run_flags() {
        let args = run_args(&[
            "ciboss", "run", "--repo", "acme/widgets", "--pr", "42", "--exit-code",
        ]);
        assert_eq!(args.repo.as_deref(), Some("acme/widgets"));
        assert_eq!(args.pr, Some(42));
        assert!(args.exit_code);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["ciboss", "config", "--json", "-v"]).expect("parse");
        assert!(cli.json);
        assert!(cli.verbose);
    }

    #[test]
    fn test_build_input_requires_change_reference() {
        let args = RunArgs {
            repo: Some("acme/widgets".to_string()),
            ..RunArgs::default()
        };
        assert!(build_input(&args).is_err());
    }

    #[test]
    fn test_flags_override_input_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.json");
        std::fs::write(
            &path,
            r#"{"repository": "acme/widgets", "commit_sha": "abc123", "changed_files": ["a.ts"]}"#,
        )
        .unwrap();

        let args = RunArgs {
            input: Some(path),
            sha: Some("def456".to_string()),
            ..RunArgs::default()
        };
        let input = build_input(&args).unwrap();
        assert_eq!(input.repository, "acme/widgets");
        assert_eq!(input.commit_sha.as_deref(), Some("def456"));
        assert_eq!(input.changed_files, Some(vec!["a.ts".to_string()]));
    }

    #[test]
    fn test_overrides_keep_timeout_when_replacing_command() {
        let mut config = CiBossConfig::default();
        config.test_command.timeout_secs = 120;
        let args = RunArgs {
            test_command: Some("npm test".to_string()),
            max_cycles: Some(0),
            ..RunArgs::default()
        };
        apply_overrides(&mut config, &args);
        assert_eq!(config.test_command.display_line(), "npm test");
        assert_eq!(config.test_command.timeout_secs, 120);
        assert_eq!(config.max_cycles, 1);
    }
}
