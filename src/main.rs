use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::{error, info};

use foundation::build::{self, BuildOptions, BuildSummary};
use foundation::config::Config;
use foundation::error::BuildError;
use foundation::logging::init_logging;
use foundation::metrics;

#[derive(Parser)]
#[command(name = "foundation")]
#[command(about = "Builds a validated reference database from local source files")]
#[command(version)]
struct Cli {
    /// Config file (default: foundation.toml, or $FOUNDATION_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug-level logging for this crate
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every extractor, validate its output and write the database
    Build {
        /// Database file to write (overrides paths.db_file)
        #[arg(long)]
        db: Option<PathBuf>,
        /// Validate everything but do not write the database
        #[arg(long)]
        dry_run: bool,
        /// Print the summary or failure as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the resolved execution order
    Plan,
    /// List registered table contracts
    Contracts,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ {e}");
            return ExitCode::from(BuildError::from(e).exit_code());
        }
    };

    let _guard = match init_logging(&config.logging, cli.verbose) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("❌ failed to initialize logging: {e:#}");
            return ExitCode::from(2);
        }
    };
    metrics::register_metrics();
    match &config.source {
        Some(path) => info!(path = %path.display(), extractors = config.extractors.len(), "loaded configuration"),
        None => info!("no config file, using defaults"),
    }

    match cli.command {
        Commands::Build { db, dry_run, json } => {
            let options = BuildOptions { db, dry_run };
            match build::build(&config, &options) {
                Ok(summary) => {
                    if json {
                        print_json(&summary);
                    } else {
                        print_summary(&summary);
                    }
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    error!(category = %e.category_label(), "build failed");
                    if json {
                        print_failure_json(&e);
                    } else {
                        eprintln!("❌ build failed ({}): {}", e.category_label(), e);
                    }
                    ExitCode::from(e.exit_code())
                }
            }
        }
        Commands::Plan => match build::plan(&config) {
            Ok(entries) => {
                println!("📋 Execution order ({} extractors):", entries.len());
                for (i, entry) in entries.iter().enumerate() {
                    println!("   {:>2}. {} -> {}", i + 1, entry.extractor, entry.outputs.join(", "));
                    if !entry.depends_on.is_empty() {
                        println!("       after: {}", entry.depends_on.join(", "));
                    }
                }
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("❌ {e}");
                ExitCode::from(e.exit_code())
            }
        },
        Commands::Contracts => match build::contracts(&config) {
            Ok(contracts) => {
                for contract in &contracts {
                    let key = if contract.primary_key.is_empty() {
                        String::from("none")
                    } else {
                        contract.primary_key.join(", ")
                    };
                    println!("📄 {} (key: {})", contract.table_name, key);
                    for column in &contract.columns {
                        let null = if column.nullable { "" } else { " not null" };
                        println!("     {:<24} {}{}", column.name, column.logical_type, null);
                    }
                }
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("❌ {e}");
                ExitCode::from(e.exit_code())
            }
        },
    }
}

fn print_summary(summary: &BuildSummary) {
    println!("\n📊 Build {}:", summary.run_id);
    for table in &summary.tables {
        println!(
            "   {:<20} {:>8} rows  {}  (from {})",
            table.table,
            table.rows,
            &table.fingerprint[..12.min(table.fingerprint.len())],
            table.producer
        );
    }
    println!("   Total rows: {}", summary.total_rows());
    match &summary.database {
        Some(path) => println!("✅ Wrote {}", path.display()),
        None => println!("✅ Dry run, nothing written"),
    }
    info!(tables = summary.tables.len(), rows = summary.total_rows(), "build finished");
}

fn print_json(summary: &BuildSummary) {
    match serde_json::to_string_pretty(&json!({ "status": "ok", "build": summary })) {
        Ok(text) => println!("{text}"),
        Err(e) => eprintln!("❌ failed to render summary: {e}"),
    }
}

fn print_failure_json(err: &BuildError) {
    let (extractor, validation) = match err {
        BuildError::Pipeline(e) => (e.extractor(), e.validation_failure()),
        _ => (None, None),
    };
    let body = json!({
        "status": "failed",
        "category": err.category_label(),
        "extractor": extractor,
        "message": err.to_string(),
        "validation": validation,
    });
    match serde_json::to_string_pretty(&body) {
        Ok(text) => println!("{text}"),
        Err(e) => eprintln!("❌ failed to render failure: {e}"),
    }
}
