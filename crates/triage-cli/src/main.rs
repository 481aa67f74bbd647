//! CI Triage CLI
//!
//! The `triage` command files tracker issues for the failures of one CI job
//! run, or reconciles previously filed issues when the job passed.
//!
//! ## Commands
//!
//! - `report`: classify failures and file, comment on, or reconcile issues
//! - `validate-config`: check a rule configuration without contacting Jira

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use jira_tracker::{JiraClient, JiraConfig, RetryPolicy};
use triage_core::fakes::MemoryTracker;
use triage_core::telemetry::level_for_verbosity;
use triage_core::{
    load_additional_labels, run_triage, Configuration, FailureManifest, IssueTracker, JobContext,
    ReportOptions, RuleDefaults, TriageReport,
};

#[derive(Parser)]
#[command(name = "triage")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(
    about = "File and reconcile issue tracker tickets for CI job failures",
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
    /// Triage the failures of one job run
    Report(ReportArgs),

    /// Load and validate a rule configuration
    ValidateConfig {
        /// Rule configuration file (JSON)
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[derive(Args, Debug)]
struct ReportArgs {
    /// Name of the CI job
    #[arg(long, env = "JOB_NAME")]
    job_name: String,

    /// Build identifier of this run
    #[arg(long, env = "BUILD_ID")]
    build_id: String,

    /// Link to the build page
    #[arg(long)]
    job_url: Option<String>,

    /// Rule configuration file (JSON)
    #[arg(short, long)]
    config: PathBuf,

    /// Failure manifest (JSON). Omit for a run without failures.
    #[arg(short, long)]
    failures: Option<PathBuf>,

    /// Jira server URL
    #[arg(long, env = "JIRA_SERVER")]
    jira_server: Option<String>,

    /// File holding the Jira access token
    #[arg(long)]
    jira_token_file: Option<PathBuf>,

    /// Jira access token (prefer --jira-token-file)
    #[arg(long, env = "JIRA_TOKEN", hide_env_values = true)]
    jira_token: Option<String>,

    /// Attempts per Jira call
    #[arg(long, default_value = "3")]
    jira_attempts: u32,

    /// Seconds between Jira call attempts
    #[arg(long, default_value = "2")]
    jira_retry_delay: u64,

    /// File one issue per failed test instead of one per failed step
    #[arg(long)]
    verbose_test_failure_reporting: bool,

    /// Maximum new issues per run (verbose test failure reporting only)
    #[arg(long)]
    max_tickets: Option<usize>,

    /// Labels to add to every new issue (JSON array or one per line)
    #[arg(long)]
    additional_labels_file: Option<PathBuf>,

    /// Exit non-zero when test failures remain after triage
    #[arg(long)]
    fail_with_test_failures: bool,

    /// Exit non-zero when pod failures remain after triage
    #[arg(long)]
    fail_with_pod_failures: bool,

    /// Do not annotate open issues when the job passes
    #[arg(long)]
    no_passing_notification: bool,

    /// Step name given to secret-scan detections
    #[arg(long, default_value = triage_core::failure::SECRET_SCAN_STEP)]
    secret_scan_step: String,

    /// Write the run report as JSON to this file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Run against an in-memory tracker instead of Jira
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    triage_core::init_tracing(cli.json, level_for_verbosity(cli.verbose));

    match cli.command {
        Commands::Report(args) => {
            let code = cmd_report(&args).await?;
            if code != 0 {
                std::process::exit(code);
            }
            Ok(())
        }
        Commands::ValidateConfig { config } => cmd_validate_config(&config),
    }
}

fn load_configuration(path: &Path) -> Result<Configuration> {
    Configuration::from_file(path, &RuleDefaults::from_env())
        .with_context(|| format!("Invalid configuration in {}", path.display()))
}

fn report_options(args: &ReportArgs) -> Result<ReportOptions> {
    let additional_labels = match &args.additional_labels_file {
        Some(path) => load_additional_labels(path)
            .with_context(|| format!("Invalid additional labels file {}", path.display()))?,
        None => Vec::new(),
    };

    Ok(ReportOptions {
        verbose_test_failure_reporting: args.verbose_test_failure_reporting,
        max_tickets: args.max_tickets,
        additional_labels,
        fail_with_test_failures: args.fail_with_test_failures,
        fail_with_pod_failures: args.fail_with_pod_failures,
        notify_passing: !args.no_passing_notification,
        secret_scan_step: args.secret_scan_step.clone(),
    })
}

fn jira_client(args: &ReportArgs) -> Result<JiraClient> {
    let server = args
        .jira_server
        .as_deref()
        .context("--jira-server (or JIRA_SERVER) is required")?;

    let config = match (&args.jira_token_file, &args.jira_token) {
        (Some(path), _) => JiraConfig::with_token_file(server, path)
            .context("Failed to read Jira token file")?,
        (None, Some(token)) => JiraConfig::new(server, token.as_str()),
        (None, None) => anyhow::bail!("--jira-token-file or JIRA_TOKEN is required"),
    };
    let retry = RetryPolicy::new(args.jira_attempts, Duration::from_secs(args.jira_retry_delay));

    JiraClient::new(config.with_retry(retry)).context("Failed to create Jira client")
}

/// Run triage and return the requested exit status.
async fn cmd_report(args: &ReportArgs) -> Result<i32> {
    let config = load_configuration(&args.config)?;
    let options = report_options(args)?;

    let failures = match &args.failures {
        Some(path) => FailureManifest::from_file(path)
            .with_context(|| format!("Invalid failure manifest {}", path.display()))?
            .into_failures(&options.secret_scan_step),
        None => Vec::new(),
    };

    let mut job = JobContext::new(&args.job_name, &args.build_id);
    if let Some(url) = &args.job_url {
        job = job.with_url(url);
    }

    let tracker: Box<dyn IssueTracker> = if args.dry_run {
        info!("dry run, no Jira calls will be made");
        Box::new(MemoryTracker::new())
    } else {
        Box::new(jira_client(args)?)
    };

    let report = run_triage(tracker.as_ref(), &config, &job, &options, failures).await;

    print_summary(&report);
    if let Some(path) = &args.output {
        let rendered = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, rendered)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        info!(path = %path.display(), "wrote triage report");
    }

    Ok(report.exit_code)
}

fn print_summary(report: &TriageReport) {
    println!("Job: {} (build {})", report.job.name, report.job.build_id);
    println!(
        "Failures: {} ({} ignored)",
        report.failures.len(),
        report.ignored.len()
    );

    for filed in &report.filing.filed {
        println!("  filed     {} [{}] {}", filed.key, filed.classification, filed.step);
    }
    for duplicate in &report.filing.duplicates_updated {
        println!("  duplicate {} {}", duplicate.key, duplicate.step);
    }
    if report.filing.ticket_limit_reached {
        println!(
            "  ticket limit reached, {} issue(s) not filed",
            report.filing.skipped_by_ticket_limit
        );
    }

    if let Some(reconciliation) = &report.reconciliation {
        for key in &reconciliation.annotated {
            println!("  passing   {key}");
        }
        for transitioned in &reconciliation.transitioned {
            println!("  closed    {} ({})", transitioned.key, transitioned.transition);
        }
        for key in &reconciliation.success_issues {
            println!("  success   {key}");
        }
    }

    let errors = report.error_count();
    if errors > 0 {
        println!("Tracker errors: {errors}");
    }
}

fn cmd_validate_config(path: &Path) -> Result<()> {
    let config = load_configuration(path)?;

    println!("Configuration OK: {}", path.display());
    println!("  default project: {}", config.default_project);
    println!("  failure rules:   {}", config.failure_rules.len());
    println!("  success rules:   {}", config.success_rules.len());
    if let Some(map) = &config.transition_map {
        println!("  transitions:     {}", map.0.len());
    }
    Ok(())
}
