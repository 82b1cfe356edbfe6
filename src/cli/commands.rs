//! CLI commands implementation.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::{load_settings, Settings};
use crate::discovery::{ConventionAnalyzer, Dspl, DsplAnalyzer, HubValidator, StaticGazetteer};
use crate::fetch::{FetchClient, FetchClientConfig};
use crate::models::EventCategory;
use crate::repository::{
    self, SqliteAuditLog, SqliteCandidateStore, SqliteDeterminationLog, SqliteEventStore,
    SqliteFetchLog, SqliteHubStore,
};
use crate::server;
use crate::services::{
    CrawlService, JobRegistry, NullPlaybook, ProcessorDeps, RunConfigInput, RunPresetInput,
    RunSummary, SequenceResult, StepStatus, TelemetryBus,
};

#[derive(Parser)]
#[command(name = "hubscout")]
#[command(about = "News-site crawler and hub-discovery engine")]
#[command(version)]
pub struct Cli {
    /// Data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Config file path (default: ./config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the data directory and database
    Init,

    /// Start the HTTP service
    Serve {
        /// Bind host (default from config)
        #[arg(long)]
        host: Option<String>,
        /// Bind port (default from config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// List available operations and sequence presets
    Operations,

    /// Run a single operation to completion
    Run {
        /// Operation name (see `operations`)
        operation: String,
        /// Seed URL or host
        start_url: String,
        /// Overrides as JSON, e.g. '{"apply": true}'
        #[arg(short, long)]
        overrides: Option<String>,
        /// Shorthand for {"apply": true}
        #[arg(long)]
        apply: bool,
    },

    /// Run a sequence preset or a sequence config file
    Sequence {
        /// Preset name or config file name
        name: String,
        /// Seed URL or host
        start_url: Option<String>,
        /// Treat the name as a file-based sequence config
        #[arg(long)]
        from_config: bool,
        /// Directory holding sequence config files
        #[arg(long)]
        config_dir: Option<PathBuf>,
        /// Host scope for config lookup and playbook defaults
        #[arg(long)]
        config_host: Option<String>,
        /// Keep going when a step fails
        #[arg(long)]
        continue_on_error: bool,
        /// Shared overrides as JSON
        #[arg(short, long)]
        overrides: Option<String>,
        /// Extra values for @cli.* tokens, as JSON
        #[arg(long)]
        config_cli_overrides: Option<String>,
    },

    /// Show database status
    Status,
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(cli.config.as_deref(), cli.data_dir.as_deref())?;

    match cli.command {
        Commands::Init => cmd_init(&settings),
        Commands::Serve { host, port } => cmd_serve(&settings, host, port).await,
        Commands::Operations => cmd_operations(&settings),
        Commands::Run {
            operation,
            start_url,
            overrides,
            apply,
        } => cmd_run(&settings, &operation, &start_url, overrides, apply).await,
        Commands::Sequence {
            name,
            start_url,
            from_config,
            config_dir,
            config_host,
            continue_on_error,
            overrides,
            config_cli_overrides,
        } => {
            cmd_sequence(
                &settings,
                &name,
                start_url,
                from_config,
                config_dir,
                config_host,
                continue_on_error,
                overrides,
                config_cli_overrides,
            )
            .await
        }
        Commands::Status => cmd_status(&settings),
    }
}

/// Wire the service from settings: SQLite stores, the production fetch
/// client, the standard analyzer set.
fn build_service(settings: &Settings) -> anyhow::Result<Arc<CrawlService>> {
    std::fs::create_dir_all(&settings.data_dir)?;
    let db = &settings.db_path;

    let dspl = Dspl::builtin();
    let fetcher = FetchClient::new(FetchClientConfig {
        user_agent: settings.crawl.user_agent.clone(),
        rate_limit: std::time::Duration::from_millis(settings.crawl.rate_limit_ms),
        timeout: std::time::Duration::from_millis(settings.crawl.fetch_timeout_ms),
    })?;

    let deps = Arc::new(ProcessorDeps {
        fetch_log: Arc::new(SqliteFetchLog::new(db)?),
        candidates: Arc::new(SqliteCandidateStore::new(db)?),
        hubs: Arc::new(SqliteHubStore::new(db)?),
        audit: Arc::new(SqliteAuditLog::new(db)?),
        determinations: Arc::new(SqliteDeterminationLog::new(db)?),
        fetcher: Arc::new(fetcher),
        analyzers: vec![
            Arc::new(DsplAnalyzer::new(dspl.clone())),
            Arc::new(ConventionAnalyzer),
        ],
        places: Arc::new(StaticGazetteer),
        validator: HubValidator::default(),
        dspl,
    });

    let bus = Arc::new(TelemetryBus::new(Some(Arc::new(SqliteEventStore::new(db)?))));
    let jobs = Arc::new(JobRegistry::new(settings.crawl.allow_multi_jobs));

    Ok(Arc::new(CrawlService::new(
        deps,
        bus,
        jobs,
        settings.crawl_options(),
        settings.config_dir.clone(),
        Arc::new(NullPlaybook),
        settings.snapshot(),
    )))
}

fn cmd_init(settings: &Settings) -> anyhow::Result<()> {
    std::fs::create_dir_all(&settings.data_dir)?;
    let tables = repository::init_all(&settings.db_path)?;
    println!(
        "{} {}",
        style("Initialized").green().bold(),
        settings.db_path.display()
    );
    for table in tables {
        println!("  {}", table);
    }
    Ok(())
}

async fn cmd_serve(
    settings: &Settings,
    host: Option<String>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let service = build_service(settings)?;
    let host = host.unwrap_or_else(|| settings.server.host.clone());
    let port = port.unwrap_or(settings.server.port);
    server::serve(service, &host, port).await
}

fn cmd_operations(settings: &Settings) -> anyhow::Result<()> {
    let service = build_service(settings)?;
    let availability = service.availability();

    println!("{}", style("Operations").bold());
    for op in &availability.operations {
        println!("  {}  {}", style(&op.name).cyan(), op.summary);
    }
    println!();
    println!("{}", style("Sequence presets").bold());
    for preset in &availability.sequence_presets {
        let steps: Vec<&str> = preset.steps.iter().map(|s| s.operation.as_str()).collect();
        println!(
            "  {}  {} [{}]",
            style(&preset.name).cyan(),
            preset.description.as_deref().unwrap_or(""),
            steps.join(" -> ")
        );
    }
    Ok(())
}

fn parse_overrides(raw: Option<String>, apply: bool) -> anyhow::Result<serde_json::Value> {
    let mut value = match raw {
        Some(s) => serde_json::from_str(&s)
            .map_err(|e| anyhow::anyhow!("invalid JSON in --overrides: {}", e))?,
        None => serde_json::json!({}),
    };
    if apply {
        value["apply"] = serde_json::json!(true);
    }
    Ok(value)
}

/// Spinner following candidate progress on the telemetry bus.
fn spawn_progress(service: &Arc<CrawlService>) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(std::time::Duration::from_millis(120));

    let mut rx = service.bus().subscribe();
    let progress = pb.clone();
    tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            match event.category {
                EventCategory::Progress => {
                    if let Some(url) = event.data.get("url").and_then(|u| u.as_str()) {
                        progress.set_message(url.to_string());
                    }
                }
                EventCategory::Milestone => {
                    progress.println(format!(
                        "{} {}",
                        style("+").green(),
                        event.data.get("url").and_then(|u| u.as_str()).unwrap_or("")
                    ));
                }
                _ => {}
            }
        }
    });
    pb
}

async fn cmd_run(
    settings: &Settings,
    operation: &str,
    start_url: &str,
    overrides: Option<String>,
    apply: bool,
) -> anyhow::Result<()> {
    let service = build_service(settings)?;
    let overrides = parse_overrides(overrides, apply)?;

    let pb = spawn_progress(&service);
    let result = service.run_operation(operation, start_url, overrides).await;
    pb.finish_and_clear();

    let result = result?;
    if let Some(summary) = &result.stats {
        print_summary(summary);
    }
    if let Some(error) = &result.error {
        anyhow::bail!("{}: {}", error.code, error.message);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn cmd_sequence(
    settings: &Settings,
    name: &str,
    start_url: Option<String>,
    from_config: bool,
    config_dir: Option<PathBuf>,
    config_host: Option<String>,
    continue_on_error: bool,
    overrides: Option<String>,
    config_cli_overrides: Option<String>,
) -> anyhow::Result<()> {
    let service = build_service(settings)?;
    let shared_overrides = parse_overrides(overrides, false)?;
    let config_cli_overrides = parse_overrides(config_cli_overrides, false)?;
    let continue_on_error = continue_on_error.then_some(true);

    let pb = spawn_progress(&service);
    let result = if from_config {
        service
            .run_sequence_config(RunConfigInput {
                sequence_config_name: name.to_string(),
                config_dir,
                config_host,
                start_url,
                shared_overrides,
                step_overrides: HashMap::new(),
                config_cli_overrides,
                continue_on_error,
            })
            .await
            .map(|(result, metadata)| {
                for warning in &metadata.warnings {
                    eprintln!("{} {}", style("warning:").yellow(), warning);
                }
                result
            })
    } else {
        service
            .run_sequence_preset(RunPresetInput {
                sequence_name: name.to_string(),
                start_url,
                shared_overrides,
                step_overrides: HashMap::new(),
                continue_on_error,
                context: serde_json::json!({"source": "cli"}),
            })
            .await
    };
    pb.finish_and_clear();

    print_sequence(&result?);
    Ok(())
}

fn cmd_status(settings: &Settings) -> anyhow::Result<()> {
    if !settings.db_path.is_file() {
        println!(
            "{} no database at {} (run `hubscout init`)",
            style("!").yellow(),
            settings.db_path.display()
        );
        return Ok(());
    }

    println!("{} {}", style("Database").bold(), settings.db_path.display());
    for (table, count) in repository::table_counts(&settings.db_path)? {
        println!("  {:<24} {}", table, count);
    }
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    let determination = summary
        .determination
        .map(|d| d.as_str())
        .unwrap_or("unknown");
    println!(
        "{} {} ({})",
        style("Determination:").bold(),
        determination,
        summary
            .determination_reason
            .as_deref()
            .unwrap_or("no reason recorded")
    );
    println!(
        "  urls {}  fetched {}  cached {}  skipped {}  404s {}  errors {}",
        summary.total_urls,
        summary.fetched,
        summary.cached,
        summary.skipped + summary.skipped_recent_4xx,
        summary.stored_404,
        summary.errors
    );
    println!(
        "  hubs: {} inserted, {} updated  validation: {} passed, {} failed",
        summary.inserted_hubs,
        summary.updated_hubs,
        summary.validation_succeeded,
        summary.validation_failed
    );
    if !summary.validation_failure_reasons.is_empty() {
        for (reason, count) in &summary.validation_failure_reasons {
            println!("    {} x{}", reason, count);
        }
    }
}

fn print_sequence(result: &SequenceResult) {
    println!(
        "{} {} ({:?}, {} ms)",
        style("Sequence").bold(),
        result.name,
        result.status,
        result.elapsed_ms
    );
    for step in &result.steps {
        let marker = match step.status {
            StepStatus::Ok => style("ok").green(),
            StepStatus::Error => style("error").red(),
        };
        println!(
            "  [{}] {:<28} {} ({} ms)",
            step.sequence_index, step.id, marker, step.elapsed_ms
        );
        if let Some(error) = &step.error {
            println!("        {}", error.message);
        }
    }
}
