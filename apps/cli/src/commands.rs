//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use leadpipe_core::{Pipeline, ProgressReporter, WorkflowOptions};
use leadpipe_shared::{
    AppConfig, OverallStatus, Phase, PipelineConfig, PracticeId, RecoveryPhase, WorkflowResult, init_config,
    load_config,
};
use tracing::info;

use crate::server;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Leadpipe: turn healthcare practice websites into scored leads and sites.
#[derive(Parser)]
#[command(
    name = "leadpipe",
    version,
    about = "Enrich, score, store and provision healthcare practice leads.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the full workflow for one practice website.
    Run {
        /// Practice website URL (scheme optional).
        url: String,

        /// Provision a practice site after persisting the lead.
        #[arg(long)]
        provision: bool,

        /// Print the full workflow result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Run the workflow for many websites in paced windows.
    Batch {
        /// Practice website URLs.
        urls: Vec<String>,

        /// File with one URL per line (`#` starts a comment).
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Targets processed concurrently per window.
        #[arg(short, long)]
        concurrency: Option<usize>,

        /// Provision a practice site for every lead.
        #[arg(long)]
        provision: bool,

        /// Print the results as a JSON array.
        #[arg(long)]
        json: bool,
    },

    /// Re-run persistence or provisioning for a practice id.
    Recover {
        /// Practice id from a previous workflow result.
        #[arg(long)]
        practice_id: String,

        /// Phase to re-run: persistence or provisioning.
        #[arg(long)]
        phase: String,
    },

    /// List stored leads, best score first.
    Leads {
        /// Maximum number of leads to show.
        #[arg(short, long, default_value_t = 20)]
        limit: u32,

        /// Print the records as a JSON array.
        #[arg(long)]
        json: bool,
    },

    /// Start the HTTP server.
    Serve {
        /// Address to bind (overrides `[server] bind`).
        #[arg(long)]
        bind: Option<String>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "leadpipe=info",
        1 => "leadpipe=debug",
        _ => "leadpipe=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).with_writer(std::io::stderr).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Run { url, provision, json } => cmd_run(&url, provision, json).await,
        Command::Batch {
            urls,
            file,
            concurrency,
            provision,
            json,
        } => cmd_batch(urls, file.as_deref(), concurrency, provision, json).await,
        Command::Recover { practice_id, phase } => cmd_recover(&practice_id, &phase).await,
        Command::Leads { limit, json } => cmd_leads(limit, json).await,
        Command::Serve { bind } => cmd_serve(bind).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

/// Load the user config and wire a pipeline from it.
async fn build_pipeline(adjust: impl FnOnce(&mut PipelineConfig)) -> Result<(AppConfig, Pipeline)> {
    let app = load_config()?;
    let mut config = PipelineConfig::from(&app);
    adjust(&mut config);
    let pipeline = Pipeline::from_app_config(&app, config).await?;
    Ok((app, pipeline))
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(url: &str, provision: bool, json: bool) -> Result<()> {
    let (_, pipeline) = build_pipeline(|_| {}).await?;
    let options = WorkflowOptions {
        provision: provision || pipeline.config().provision,
    };

    info!(url, provision = options.provision, "running workflow");

    let reporter = CliProgress::new();
    let outcome = pipeline.run_workflow(url, &options, &reporter).await;
    reporter.finish();
    let result = outcome?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
    }
    Ok(())
}

async fn cmd_batch(
    mut urls: Vec<String>,
    file: Option<&Path>,
    concurrency: Option<usize>,
    provision: bool,
    json: bool,
) -> Result<()> {
    if let Some(path) = file {
        urls.extend(read_targets(path)?);
    }
    if urls.is_empty() {
        return Err(eyre!("no targets given: pass URLs or --file"));
    }

    let (_, pipeline) = build_pipeline(|config| {
        if let Some(n) = concurrency {
            config.concurrency = n.max(1);
        }
    })
    .await?;
    let options = WorkflowOptions {
        provision: provision || pipeline.config().provision,
    };

    info!(
        targets = urls.len(),
        concurrency = pipeline.config().concurrency,
        provision = options.provision,
        "running batch"
    );

    let reporter = CliProgress::new();
    let results = pipeline.run_batch(&urls, &options, &reporter).await;
    reporter.finish();

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    for result in &results {
        print_result(result);
    }
    let summary = BatchSummary::from_results(&results);
    println!(
        "  Batch: {} targets, {} complete, {} partial, {} failed ({} rejected)",
        results.len(),
        summary.complete,
        summary.partial,
        summary.failed,
        summary.rejected,
    );
    println!();
    Ok(())
}

/// Status counts for one batch. Rejected targets are also counted as failed.
#[derive(Debug, Default, PartialEq, Eq)]
struct BatchSummary {
    complete: usize,
    partial: usize,
    failed: usize,
    rejected: usize,
}

impl BatchSummary {
    fn from_results(results: &[WorkflowResult]) -> Self {
        let mut summary = Self::default();
        for result in results {
            match result.overall_status {
                OverallStatus::Complete => summary.complete += 1,
                OverallStatus::PartialSuccess => summary.partial += 1,
                OverallStatus::Failed => summary.failed += 1,
            }
            if result.practice_id.is_none() {
                summary.rejected += 1;
            }
        }
        summary
    }
}

async fn cmd_recover(practice_id: &str, phase: &str) -> Result<()> {
    let phase: RecoveryPhase = phase.parse()?;
    let id = PracticeId::from_raw(practice_id.trim());
    if !PracticeId::is_well_formed(id.as_str()) {
        tracing::warn!(practice_id = %id, "practice id does not match the generated format");
    }

    let (_, pipeline) = build_pipeline(|_| {}).await?;
    let outcome = pipeline.recover(&id, phase).await;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

async fn cmd_leads(limit: u32, json: bool) -> Result<()> {
    let (_, pipeline) = build_pipeline(|_| {}).await?;
    let leads = pipeline.persister().list(limit).await?;

    if json {
        let records: Vec<_> = leads.iter().map(|stored| &stored.lead).collect();
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if leads.is_empty() {
        println!("No stored leads.");
        return Ok(());
    }
    let total = pipeline.persister().stored_count().await.unwrap_or(leads.len() as u64);
    println!();
    for stored in &leads {
        let lead = &stored.lead;
        println!("  {:>3}  {:<40} {}", lead.lead_score, lead.company, lead.domain);
        println!("       {}  updated {}", lead.practice_id, stored.updated_at.format("%Y-%m-%d %H:%M"));
    }
    println!();
    println!("  Showing {} of {total} stored leads", leads.len());
    Ok(())
}

async fn cmd_serve(bind: Option<String>) -> Result<()> {
    let (app, pipeline) = build_pipeline(|_| {}).await?;
    let bind = bind.unwrap_or(app.server.bind);
    server::serve(Arc::new(pipeline), &bind).await
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

/// Read one target per line, skipping blanks and `#` comments.
fn read_targets(path: &Path) -> Result<Vec<String>> {
    let content =
        std::fs::read_to_string(path).map_err(|e| eyre!("cannot read targets from '{}': {e}", path.display()))?;
    Ok(parse_targets(&content))
}

fn parse_targets(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect()
}

fn print_result(result: &WorkflowResult) {
    println!();
    let status = match result.overall_status {
        OverallStatus::Complete => "complete",
        OverallStatus::PartialSuccess => "partial-success",
        OverallStatus::Failed => "FAILED",
    };
    println!("  {} [{status}]", result.target);

    if let Some(error) = &result.error {
        println!("  Error:       {error}");
    }
    if let Some(id) = &result.practice_id {
        println!("  Practice ID: {id}");
    }
    if let Some(enrichment) = &result.phases.enrichment {
        let lead = &enrichment.data;
        println!("  Company:     {}", lead.company);
        println!("  Score:       {}", lead.lead_score);
        println!("  Type:        {}", lead.practice_type);
    }
    if let Some(persistence) = &result.phases.persistence {
        let note = if persistence.data.is_fallback { " (local)" } else { "" };
        println!("  Record:      {}{note}", persistence.data.record_id);
    }
    if let Some(provisioning) = &result.phases.provisioning {
        println!("  Provisioned: {}", provisioning.data.method);
        if let Some(url) = &provisioning.data.service_url {
            println!("  Site:        {url}");
        }
    }
    println!("  Time:        {:.1}s", result.timing.duration_seconds);
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, target: &str, phase: Phase) {
        self.spinner.set_message(format!("{target}: {phase}"));
    }

    fn window(&self, index: usize, total: usize, size: usize) {
        self.spinner
            .set_message(format!("Window [{}/{total}] {size} targets", index + 1));
    }

    fn done(&self, result: &WorkflowResult) {
        self.spinner
            .println(format!("  {} {}", result.overall_status, result.target));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn targets_file_skips_comments_and_blanks() {
        let content = "# clinics\nhttps://a.example.com\n\n  b.example.com  \n#c.example.com\n";
        assert_eq!(parse_targets(content), vec!["https://a.example.com", "b.example.com"]);
    }

    #[test]
    fn cli_parses_batch_flags() {
        let cli = Cli::try_parse_from([
            "leadpipe",
            "batch",
            "a.example.com",
            "b.example.com",
            "--concurrency",
            "5",
            "--provision",
        ])
        .unwrap();
        match cli.command {
            Command::Batch {
                urls,
                concurrency,
                provision,
                ..
            } => {
                assert_eq!(urls.len(), 2);
                assert_eq!(concurrency, Some(5));
                assert!(provision);
            }
            _ => panic!("expected batch command"),
        }
    }

    #[test]
    fn cli_parses_recover() {
        let cli = Cli::try_parse_from([
            "leadpipe",
            "recover",
            "--practice-id",
            "acme-dental-18f2a3b4c5d1a2b",
            "--phase",
            "provisioning",
        ])
        .unwrap();
        assert!(matches!(cli.command, Command::Recover { .. }));
    }

    #[test]
    fn cli_parses_leads() {
        let cli = Cli::try_parse_from(["leadpipe", "leads", "--limit", "5", "--json"]).unwrap();
        match cli.command {
            Command::Leads { limit, json } => {
                assert_eq!(limit, 5);
                assert!(json);
            }
            _ => panic!("expected leads command"),
        }
    }

    #[test]
    fn batch_summary_counts_only_this_batch() {
        let started = chrono::Utc::now();
        let finished = |status: OverallStatus| {
            let mut result = WorkflowResult::rejected("a.example.com", "unused", started);
            result.error = None;
            result.practice_id = Some(PracticeId::from_raw("a-18f2a3b4c5d1a2b"));
            result.overall_status = status;
            result
        };
        let results = vec![
            finished(OverallStatus::Complete),
            finished(OverallStatus::PartialSuccess),
            finished(OverallStatus::PartialSuccess),
            finished(OverallStatus::Failed),
            WorkflowResult::rejected("ftp://bad", "invalid target", started),
        ];

        assert_eq!(
            BatchSummary::from_results(&results),
            BatchSummary {
                complete: 1,
                partial: 2,
                failed: 2,
                rejected: 1,
            }
        );
        assert_eq!(BatchSummary::from_results(&[]), BatchSummary::default());
    }
}
