//! sqlite-doc-migrate CLI - SQLite snapshot to document store migration.

use clap::{Parser, Subcommand};
use sqlite_doc_migrate::{Config, MigrateError, Orchestrator};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Parser)]
#[command(name = "sqlite-doc-migrate")]
#[command(about = "Migrate a SQLite snapshot into a partitioned document store")]
#[command(version)]
struct Cli {
    /// Path to configuration file (.json, otherwise YAML)
    #[arg(short, long, env = "CONFIG_PATH", default_value = "config.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the migration
    Run {
        /// Download the snapshot from this object-store URL before the run
        #[arg(long, env = "SNAPSHOT_URL")]
        snapshot_url: Option<String>,

        /// Override the local audit CSV path
        #[arg(long, env = "ETL_LOG_CSV")]
        audit_log: Option<PathBuf>,

        /// Upload the audit CSV to this object-store URL after the run
        #[arg(long, env = "ETL_LOG_URL")]
        audit_export_url: Option<String>,

        /// Override rows per batch
        #[arg(long)]
        batch_size: Option<usize>,

        /// Override upsert workers per batch
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Check the configuration file without touching any data
    Validate,

    /// Open the snapshot and check every configured table exists
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format)
        .map_err(|e| MigrateError::Config(e.to_string()))?;

    let mut config = load_config(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::Run {
            snapshot_url,
            audit_log,
            audit_export_url,
            batch_size,
            concurrency,
        } => {
            // Apply overrides
            if snapshot_url.is_some() {
                config.source.snapshot_url = snapshot_url;
            }
            if let Some(path) = audit_log {
                config.audit.path = path.display().to_string();
            }
            if audit_export_url.is_some() {
                config.audit.export_url = audit_export_url;
            }
            if let Some(n) = batch_size {
                config.batch_size = n;
            }
            if let Some(n) = concurrency {
                config.concurrency = n;
            }
            config.validate()?;

            let orchestrator = Orchestrator::new(config).await?;
            let summary = orchestrator.run().await?;

            if cli.output_json {
                println!("{}", summary.to_json()?);
            } else {
                println!("\n{}", summary);
                if let Some(audit) = &summary.audit {
                    println!("\n{}", audit);
                }
                println!("\n  Run ID: {}", summary.run_id);
                println!("  Duration: {:.2}s", summary.duration_seconds);
            }
        }

        Commands::Validate => {
            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                println!("Configuration is valid");
                println!("  Database: {}", config.database);
                println!("  Batch size: {}", config.batch_size);
                println!("  Concurrency: {}", config.concurrency);
                for (table, table_config) in &config.containers {
                    println!(
                        "  {}: id={} pk={} bools={} dates={}",
                        table,
                        table_config.id_field,
                        config.pk_field(table_config),
                        table_config.bool_fields.len(),
                        table_config.date_fields.len()
                    );
                }
            }
        }

        Commands::HealthCheck => {
            let orchestrator = Orchestrator::new(config).await?;
            let result = orchestrator.health_check().await;
            orchestrator.close().await;
            let result = result?;

            if cli.output_json {
                println!("{}", result.to_json()?);
            } else {
                println!("Health Check Results:");
                println!("  Source: {}", result.source_path);
                println!(
                    "  Destination: {} (database: {})",
                    result.destination, result.database
                );
                for table in &result.tables {
                    match table.row_count {
                        Some(count) => println!("    {}: OK ({} rows)", table.table, count),
                        None => println!("    {}: MISSING", table.table),
                    }
                }
                println!(
                    "\n  Overall: {}",
                    if result.healthy() { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !result.healthy() {
                return Err(MigrateError::Snapshot("Health check failed".to_string()));
            }
        }
    }

    Ok(())
}

/// Load the configuration, reporting a missing file as a configuration error.
fn load_config(path: &Path) -> Result<Config, MigrateError> {
    if !path.is_file() {
        return Err(MigrateError::Config(format!(
            "configuration file not found: {}",
            path.display()
        )));
    }
    match Config::load(path) {
        Err(MigrateError::Json(e)) => Err(MigrateError::Config(format!(
            "{}: {}",
            path.display(),
            e
        ))),
        other => other,
    }
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Logs go to stderr so --output-json stays parseable.
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        "json" => subscriber.json().init(),
        "text" => subscriber.init(),
        other => return Err(format!("unknown log format: {}", other)),
    }

    Ok(())
}
