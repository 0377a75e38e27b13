//! Shape Registry CLI
//!
//! Evolves the registry from batch files and inspects stored snapshots.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use shape_registry::{
    diff, Batch, ChangeAction, ChangeRecord, Evolution, EvolutionCoordinator, FileVersionStore,
    SchemaSnapshot, SchemaVersion, ShapesConfig, VersionStore,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "shape-registry")]
#[command(about = "Track how the shape of ingested documents evolves")]
struct Cli {
    /// Config file (defaults to shapes.toml and friends)
    #[arg(short, long)]
    config: Option<String>,

    /// Path to the registry (overrides config)
    #[arg(short, long)]
    registry: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(flatten)]
    Registry(RegistryCommand),

    /// Inspect or write configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Commands that open the registry
#[derive(Subcommand)]
enum RegistryCommand {
    /// Evolve the schema from a JSON batch (object or array of objects)
    Evolve {
        /// Batch file ("-" for stdin)
        file: PathBuf,
    },

    /// Show the latest snapshot
    Latest {
        /// Print only the field map as JSON
        #[arg(long)]
        fields: bool,
    },

    /// List every stored version
    History,

    /// Show one snapshot as JSON
    Show {
        version: String,
    },

    /// Diff the field maps of two stored versions
    Diff {
        from: String,
        to: String,
    },

    /// Verify the checksum of every stored snapshot
    Verify,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Write the effective configuration to a file
    Init {
        #[arg(default_value = "shapes.toml")]
        path: String,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("❌ Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = ShapesConfig::load_from(cli.config.as_deref())
        .context("failed to load configuration")?;
    if let Some(path) = cli.registry {
        config.registry.path = path;
    }

    match cli.command {
        Commands::Registry(command) => execute(&config, command).await,
        Commands::Config { action } => configure(&config, action),
    }
}

async fn execute(config: &ShapesConfig, command: RegistryCommand) -> anyhow::Result<()> {
    let store = Arc::new(
        FileVersionStore::open(config.registry_path(), config.registry.store_options())
            .context("failed to open registry")?,
    );
    let coordinator = EvolutionCoordinator::with_config(store, config.evolution.clone());

    match command {
        RegistryCommand::Evolve { file } => {
            let text = if file.as_os_str() == "-" {
                std::io::read_to_string(std::io::stdin())?
            } else {
                std::fs::read_to_string(&file)
                    .with_context(|| format!("failed to read {}", file.display()))?
            };
            let batch = Batch::from_json_str(&text)?;
            println!("🔍 Evolving schema from {} record(s)", batch.len());

            match coordinator.evolve(&batch).await? {
                Evolution::Created(snapshot) => {
                    println!("✅ No existing schema found. Created {}", snapshot.version);
                    print_changes(&snapshot.changes);
                }
                Evolution::Evolved(snapshot) => {
                    println!("✅ Schema changes detected. Saved {}", snapshot.version);
                    print_changes(&snapshot.changes);
                }
                Evolution::Unchanged(snapshot) => {
                    println!(
                        "✅ Schema is identical to {}. No evolution required.",
                        snapshot.version
                    );
                }
            }
            Ok(())
        }

        RegistryCommand::Latest { fields } => {
            let Some(latest) = coordinator.latest().await? else {
                bail!("No schema found. Ingest data first.");
            };
            if fields {
                println!("{}", serde_json::to_string_pretty(&latest.fields)?);
            } else {
                print_snapshot(&latest);
            }
            Ok(())
        }

        RegistryCommand::History => {
            let history = coordinator.store().history().await?;
            if history.is_empty() {
                println!("No versions registered");
            }
            for snapshot in &history {
                println!(
                    "{:>6}  {}  {} field(s), {} change(s)",
                    snapshot.version.to_string(),
                    snapshot.created_at.to_rfc3339(),
                    snapshot.fields.len(),
                    snapshot.changes.len()
                );
            }
            Ok(())
        }

        RegistryCommand::Show { version } => {
            let snapshot = fetch(coordinator.store().as_ref(), &version).await?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
            Ok(())
        }

        RegistryCommand::Diff { from, to } => {
            let store = coordinator.store().as_ref();
            let old = fetch(store, &from).await?;
            let new = fetch(store, &to).await?;
            println!("🔍 Comparing {} -> {}", old.version, new.version);
            let changes = diff(&old.fields, &new.fields);
            if changes.is_empty() {
                println!("✅ No field changes");
            } else {
                print_changes(&changes);
            }
            Ok(())
        }

        RegistryCommand::Verify => {
            println!("🔍 Verifying all snapshots...");
            // Reads verify checksums; a corrupt snapshot surfaces as an error here
            let history = coordinator.store().history().await?;
            let mut previous = None;
            for snapshot in &history {
                let expected = SchemaVersion::after(previous);
                if snapshot.version != expected {
                    bail!("gap in history: expected {}, found {}", expected, snapshot.version);
                }
                println!("  ✅ {} - valid", snapshot.version);
                previous = Some(snapshot.version);
            }
            println!("✅ {} snapshot(s) verified", history.len());
            Ok(())
        }
    }
}

fn configure(config: &ShapesConfig, action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            println!("{}", toml::to_string_pretty(config)?);
        }
        ConfigAction::Init { path } => {
            config.save(&path).with_context(|| format!("failed to write {path}"))?;
            println!("✅ Configuration written to {}", path);
        }
    }
    Ok(())
}

async fn fetch(store: &FileVersionStore, version: &str) -> anyhow::Result<SchemaSnapshot> {
    let version = if version == "latest" {
        store.latest().await?.map(|s| s.version)
    } else {
        Some(version.parse::<SchemaVersion>()?)
    };
    let Some(version) = version else {
        bail!("No versions registered");
    };
    store
        .get(version)
        .await?
        .with_context(|| format!("version {version} not found"))
}

fn print_snapshot(snapshot: &SchemaSnapshot) {
    println!("{} (created {})", snapshot.version, snapshot.created_at.to_rfc3339());
    for (name, tag) in &snapshot.fields {
        println!("  {name}: {tag}");
    }
}

fn print_changes(changes: &[ChangeRecord]) {
    for change in changes {
        let detail = match (change.action, change.old_type, change.new_type) {
            (ChangeAction::Modify, Some(old), Some(new)) => format!("{old} -> {new}"),
            (_, _, Some(new)) => new.to_string(),
            (_, Some(old), _) => old.to_string(),
            _ => String::new(),
        };
        let symbol = match change.action {
            ChangeAction::Create | ChangeAction::Add => "+",
            ChangeAction::Remove => "-",
            ChangeAction::Modify => "~",
        };
        println!("  {symbol} {} {detail}", change.field);
    }
}
