use anyhow::Context;
use clap::{Parser, Subcommand};
use hoard_boot::{
    BootConfig, Booted, Bootstrap, FileLegacyIdentity, IdentityObserver, JsonFileCatalog,
};
use hoard_common::SystemInfo;
use hoard_game::{Slot, client_migrations, client_schema, equip_in_store};
use hoard_kernel::{Update, WriteReport};
use hoard_persist::FileAdapter;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hoard", about = "Inspect and edit a hoard client store")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Store directory
    #[arg(long, default_value = "./hoard_data")]
    data_dir: PathBuf,

    /// Item catalog (JSON object of item id -> descriptor)
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Directory holding a pre-store client's identity files
    #[arg(long)]
    legacy_dir: Option<PathBuf>,

    /// Skip identity observers
    #[arg(long)]
    no_telemetry: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and store info
    Info,
    /// Run startup and print what it did
    Boot,
    /// Print one field
    Get { field: String },
    /// Write one field (value is JSON)
    Set {
        field: String,
        value: String,
        /// Replace the value instead of merging into it
        #[arg(long)]
        replace: bool,
    },
    /// Print the full state
    Snapshot,
    /// Equip an owned item
    Equip {
        item: String,
        /// Target slot, e.g. hand_2
        slot: Option<Slot>,
    },
}

/// Logs the identity the store settled on.
struct LogIdentity;

impl IdentityObserver for LogIdentity {
    fn on_identity(&self, identity: &str, system: &SystemInfo) {
        tracing::debug!(identity, platform = ?system.platform, "identity observed");
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match &cli.command {
        Commands::Info => {
            let adapter = FileAdapter::open(&cli.data_dir)?;
            println!("hoard v{}", env!("CARGO_PKG_VERSION"));
            println!("store: {}", adapter.root().display());
            println!("format: v{}", adapter.meta().format_version);
            println!("keys: {}", adapter.keys()?.join(", "));
        }
        Commands::Boot => {
            let booted = boot(&cli)?;
            let report = &booted.report;
            println!(
                "identity: {} ({:?})",
                report.identity, report.identity_source
            );
            println!(
                "system: {:?}, specialized_hardware={}",
                report.system.platform, report.system.specialized_hardware
            );
            println!("loaded: {}", report.loaded_fields.join(", "));
            println!("migrations: {}", report.applied_migrations.join(", "));
            println!("committed: {}", report.committed_fields.join(", "));
            for e in &report.persistence_errors {
                println!("not durable: {e}");
            }
        }
        Commands::Get { field } => {
            let booted = boot(&cli)?;
            let value = booted.store.read(field)?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        Commands::Set {
            field,
            value,
            replace,
        } => {
            let value: serde_json::Value =
                serde_json::from_str(value).with_context(|| format!("invalid JSON: {value}"))?;
            let booted = boot(&cli)?;
            let update = if *replace {
                Update::new().replace(field.as_str(), value)
            } else {
                Update::new().set(field.as_str(), value)
            };
            print_write(&booted.store.write(update)?);
        }
        Commands::Snapshot => {
            let booted = boot(&cli)?;
            println!(
                "{}",
                serde_json::to_string_pretty(booted.store.snapshot().as_ref())?
            );
        }
        Commands::Equip { item, slot } => {
            let booted = boot(&cli)?;
            print_write(&equip_in_store(&booted.store, item, *slot)?);
            println!(
                "loadout: {}",
                booted.store.read(hoard_game::field::LOADOUT)?
            );
        }
    }

    Ok(())
}

fn boot(cli: &Cli) -> anyhow::Result<Booted> {
    let adapter = FileAdapter::open(&cli.data_dir)
        .with_context(|| format!("opening store at {}", cli.data_dir.display()))?;
    let mut bootstrap = Bootstrap::new(client_schema()?, Arc::new(adapter))
        .migrations(client_migrations()?)
        .observe_identity(Arc::new(LogIdentity))
        .config(BootConfig {
            run_telemetry: !cli.no_telemetry,
            ..BootConfig::default()
        });
    if let Some(path) = &cli.catalog {
        bootstrap = bootstrap.catalog(JsonFileCatalog::new(path));
    }
    if let Some(dir) = &cli.legacy_dir {
        bootstrap = bootstrap.legacy_identity(FileLegacyIdentity::new(dir));
    }
    Ok(pollster::block_on(bootstrap.run())?)
}

fn print_write(report: &WriteReport) {
    if report.changed.is_empty() {
        println!("no change");
    } else {
        println!("changed: {}", report.changed.join(", "));
    }
    for e in &report.persistence_errors {
        println!("not durable: {e}");
    }
}
