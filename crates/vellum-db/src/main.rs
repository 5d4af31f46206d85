//! vellum CLI
//!
//! Plans and applies schema upgrades from a declared model file.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use vellum_core::upgrade::SchemaUpdater;
use vellum_core::{DbModel, SystemClock, Vendor};
use vellum_db::upgrade::{read_model, write_scripts};
use vellum_db::{connect, DbSettings, Upgrader, VersionStore};

/// Schema upgrades and version records for relational databases.
#[derive(Parser)]
#[command(name = "vellum")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database URL; overrides the settings file.
    #[arg(short, long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Declared model file (JSON); overrides the settings file.
    #[arg(short, long, env = "VELLUM_SCHEMA")]
    schema: Option<PathBuf>,

    /// Settings file (JSON).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the scripts an upgrade would run.
    Plan {
        /// Write the scripts to a file, separated by the vendor's batch
        /// separator.
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Print the diff as JSON.
        #[arg(long)]
        json: bool,

        /// Diff against an empty database instead of connecting.
        #[arg(long)]
        offline: bool,

        /// Vendor for offline plans (sqlite, postgres, mssql).
        #[arg(long)]
        vendor: Option<Vendor>,
    },

    /// Apply the scripts and record the new version.
    Upgrade {
        /// Upgrade even when the previous upgrade failed.
        #[arg(short, long)]
        force: bool,
    },

    /// Show the stored version record.
    Version,
}

fn settings(cli: &Cli) -> anyhow::Result<DbSettings> {
    let mut settings = match (&cli.settings, &cli.database_url) {
        (Some(path), _) => DbSettings::load(path)
            .with_context(|| format!("reading settings from {}", path.display()))?,
        (None, Some(url)) => DbSettings::new(url.clone()),
        (None, None) => anyhow::bail!("either --database-url or --settings is required"),
    };
    if let (Some(_), Some(url)) = (&cli.settings, &cli.database_url) {
        settings.url.clone_from(url);
    }
    if let Some(schema) = &cli.schema {
        settings.model = Some(schema.clone());
    }
    Ok(settings)
}

fn declared(settings: &DbSettings) -> anyhow::Result<DbModel> {
    let path = settings
        .model
        .as_ref()
        .context("no declared model; pass --schema or set VELLUM_SCHEMA")?;
    read_model(path).with_context(|| format!("reading model from {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match &cli.command {
        Commands::Plan {
            out,
            json,
            offline: true,
            vendor,
        } => {
            let vendor = match vendor {
                Some(vendor) => *vendor,
                None => settings(&cli)?.vendor()?,
            };
            let dialect = vendor
                .dialect()
                .with_context(|| format!("no DDL dialect for {vendor}"))?;
            let path = cli
                .schema
                .as_ref()
                .context("no declared model; pass --schema or set VELLUM_SCHEMA")?;
            let model = read_model(path)?;
            let diff = SchemaUpdater::new(dialect).diff(&model, &DbModel::new());
            if *json {
                println!("{}", serde_json::to_string_pretty(&diff)?);
            } else {
                print!("{}", diff.export(dialect.batch_separator()));
            }
            if let Some(out) = out {
                write_scripts(&diff, dialect.as_dialect(), out)?;
            }
        }

        Commands::Plan {
            out, json, vendor, ..
        } => {
            if vendor.is_some() {
                warn!("--vendor only applies to offline plans");
            }
            let settings = settings(&cli)?;
            let model = declared(&settings)?;
            let driver = connect(&settings).await?;
            let diff = Upgrader::new(driver.as_ref(), &settings, &SystemClock)
                .plan(&model)
                .await?;
            let separator = driver.dialect().batch_separator();
            if *json {
                println!("{}", serde_json::to_string_pretty(&diff)?);
            } else if diff.is_empty() {
                info!("Schema is up to date.");
            } else {
                print!("{}", diff.export(separator));
            }
            if let Some(out) = out {
                write_scripts(&diff, driver.dialect().as_dialect(), out)?;
            }
            driver.close().await;
        }

        Commands::Upgrade { force } => {
            let mut settings = settings(&cli)?;
            settings.force |= *force;
            let model = declared(&settings)?;
            let driver = connect(&settings).await?;
            let report = Upgrader::new(driver.as_ref(), &settings, &SystemClock)
                .upgrade(&model)
                .await;
            driver.close().await;
            let report = report?;
            info!(
                "Applied {} scripts; {} is at version {}.",
                report.applied, report.record.app_name, report.record.version
            );
        }

        Commands::Version => {
            let settings = settings(&cli)?;
            let driver = connect(&settings).await?;
            let store = VersionStore::new(driver.as_ref(), &SystemClock);
            store.ensure_table().await?;
            match store.read(&settings.app_name).await? {
                Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
                None => info!("No version recorded for {}.", settings.app_name),
            }
            driver.close().await;
        }
    }

    Ok(())
}
