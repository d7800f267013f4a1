//! treeport - content subtree export/import
//!
//! `extract` writes one file per requested node of a subtree;
//! `install` applies node files to the store.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use treeport::config::Settings;
use treeport::{BulkTransfer, Formatter, JsonFormatter, SqlNodeExtractor, SqliteNodeInstaller};
use treeport_common::config::{self, TomlConfig, CONFIG_ENV_VAR, DATABASE_ENV_VAR};
use treeport_common::events::EventBus;
use uuid::Uuid;

/// Command-line arguments for treeport
#[derive(Parser, Debug)]
#[command(name = "treeport")]
#[command(about = "Bulk export and import of content subtrees")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = CONFIG_ENV_VAR)]
    config: Option<PathBuf>,

    /// SQLite content database
    #[arg(short, long, env = DATABASE_ENV_VAR)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serialize requested nodes of a subtree, one file per node
    Extract {
        /// Root of the subtree
        #[arg(long)]
        root: Uuid,

        /// Nodes to serialize
        #[arg(long, num_args = 1..)]
        ids: Vec<Uuid>,

        /// File with one node id per line
        #[arg(long)]
        ids_file: Option<PathBuf>,

        /// Output directory
        #[arg(short, long)]
        out: PathBuf,
    },

    /// Install node files into the store
    Install {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = config::locate_config(args.config.as_deref());
    let toml = match &config_path {
        Some(path) => config::load_toml_config(path).context("Failed to load configuration")?,
        None => TomlConfig::default(),
    };

    // Initialize tracing
    let default_filter = format!("treeport={0},treeport_common={0}", toml.logging.level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("treeport {}", env!("CARGO_PKG_VERSION"));
    match &config_path {
        Some(path) => info!("Configuration: {}", path.display()),
        None => warn!("No configuration file found, using built-in defaults"),
    }

    let settings =
        Settings::from_toml(&toml, args.database.as_deref()).context("Failed to load template metadata")?;

    info!("Database: {}", settings.database_path.display());

    let pool = treeport_common::db::init_database(&settings.database_path)
        .await
        .context("Failed to open content database")?;

    let events = EventBus::new(100);
    let formatter = Arc::new(JsonFormatter::new(settings.filter.clone()));
    let extractor = Arc::new(SqlNodeExtractor::new(
        pool.clone(),
        settings.database_name.clone(),
        Arc::new(settings.templates.clone()),
        settings.filter.clone(),
    ));
    let installer = Arc::new(
        SqliteNodeInstaller::new(pool.clone(), tokio::runtime::Handle::current())
            .with_filter(settings.filter.clone())
            .with_events(events.clone()),
    );
    let transfer = BulkTransfer::new(extractor, installer, formatter.clone()).with_events(events);

    match args.command {
        Command::Extract {
            root,
            mut ids,
            ids_file,
            out,
        } => {
            if let Some(path) = ids_file {
                ids.extend(read_ids_file(&path)?);
            }
            ids.sort();
            ids.dedup();

            std::fs::create_dir_all(&out)
                .with_context(|| format!("Failed to create output directory {}", out.display()))?;

            let serialized = transfer.serialize_subtree(root, &ids).await?;
            for node in &serialized {
                let path = out.join(format!("{}.{}", node.id, formatter.file_extension()));
                let mut writer = BufWriter::new(
                    File::create(&path).with_context(|| format!("Failed to create {}", path.display()))?,
                );
                writer.write_all(node.text.as_bytes())?;
                writer.flush()?;
            }

            println!("extracted {}/{}", serialized.len(), ids.len());
        }

        Command::Install { files } => {
            let mut nodes = Vec::with_capacity(files.len());
            for path in &files {
                match read_node_file(formatter.as_ref(), path) {
                    Ok(node) => nodes.push(node),
                    Err(e) => warn!(file = %path.display(), error = %e, "Skipping unreadable node file"),
                }
            }

            let installed = transfer.install_batch(nodes).await?;
            println!("installed {}/{}", installed, files.len());
        }
    }

    pool.close().await;
    Ok(())
}

/// Node ids, one per line; blank lines and `#` comments are ignored
fn read_ids_file(path: &Path) -> Result<Vec<Uuid>> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;

    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| {
            treeport_common::uuid_utils::parse(line)
                .with_context(|| format!("Invalid id '{}' in {}", line, path.display()))
        })
        .collect()
}

fn read_node_file(formatter: &dyn Formatter, path: &Path) -> Result<treeport::Node> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let node = formatter.read_node(&mut BufReader::new(file))?;
    Ok(node)
}
