use clap::{Parser, Subcommand};
use colored::Colorize;
use eyre::{Context as _, Result, eyre};
use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use workspace_core::host::UserAlert;
use workspace_core::{ResultKind, Workspace, WorkspaceConfig, jsonl};

#[derive(Parser)]
#[command(name = "workspace-core")]
#[command(about = "Inspect and edit a workspace's shared storage, search index and file store")]
#[command(version)]
struct Cli {
    /// YAML config file (defaults apply when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the data directory from the config
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the JSON stored under a key
    Get { key: String },

    /// Store a JSON value under a key
    Set {
        key: String,
        /// JSON text; anything that does not parse is stored as a string
        value: String,
    },

    /// Delete a key
    Remove { key: String },

    /// List stored keys
    Keys,

    /// Search tasks, notes and todos
    Search { query: String },

    /// Store a file (and optional preview) in the file store
    FilePut {
        id: String,
        path: PathBuf,
        #[arg(long)]
        preview: Option<PathBuf>,
    },

    /// Write a stored file to disk
    FileGet {
        id: String,
        #[arg(short, long)]
        out: PathBuf,
    },

    /// Delete a stored file
    FileRm { id: String },

    /// List stored file ids
    FileList,

    /// Delete every stored file
    FileClear,

    /// Back up the key-value store as JSONL
    Export { path: PathBuf },

    /// Restore a JSONL backup into the key-value store
    Import { path: PathBuf },
}

/// Quota warnings printed to the terminal
struct ConsoleAlert;

impl UserAlert for ConsoleAlert {
    fn alert(&self, message: &str) {
        eprintln!("{} {}", "warning:".yellow().bold(), message);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Setup tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = WorkspaceConfig::load_or_default(cli.config.as_deref())?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }

    let workspace = Workspace::new(config).with_alert(Arc::new(ConsoleAlert));
    let page = workspace
        .open_context("cli")
        .context("Failed to open workspace storage")?;

    match cli.command {
        Commands::Get { key } => {
            let value: Value = page.storage().get(&key, Value::Null);
            if value.is_null() {
                println!("{}", format!("{} is not set", key).dimmed());
            } else {
                println!("{}", serde_json::to_string_pretty(&value)?);
            }
        }
        Commands::Set { key, value } => {
            // Events only reach subscribers in this process, and the CLI has none
            let value = serde_json::from_str(&value).unwrap_or(Value::String(value));
            page.storage().set(&key, &value, None);
            println!("Saved {}", key.green());
        }
        Commands::Remove { key } => {
            page.storage().remove(&key);
            println!("Removed {}", key.green());
        }
        Commands::Keys => {
            for key in page.storage().keys() {
                println!("{}", key);
            }
        }
        Commands::Search { query } => {
            let results = page.search().execute(&query);
            if results.is_empty() {
                println!("{}", "No matches".dimmed());
            }
            for result in results {
                let kind = match result.kind {
                    ResultKind::Task => result.kind.to_string().blue(),
                    ResultKind::Note => result.kind.to_string().magenta(),
                    ResultKind::Todo => result.kind.to_string().cyan(),
                };
                println!(
                    "[{}] {} {} {}",
                    kind,
                    result.title.bold(),
                    result.subtitle.dimmed(),
                    format!("{}#{}", result.link, result.id).underline()
                );
            }
        }
        Commands::FilePut { id, path, preview } => {
            let file_blob = fs::read(&path).with_context(|| format!("Failed to read {:?}", path))?;
            let preview_blob = match preview {
                Some(p) => Some(fs::read(&p).with_context(|| format!("Failed to read {:?}", p))?),
                None => None,
            };
            if !page.files().save_file(&id, file_blob, preview_blob).await {
                return Err(eyre!("Failed to save file {}", id));
            }
            println!("Saved file {}", id.green());
        }
        Commands::FileGet { id, out } => {
            let record = page
                .files()
                .get_file(&id)
                .await
                .ok_or_else(|| eyre!("No file stored under {}", id))?;
            fs::write(&out, &record.file_blob).with_context(|| format!("Failed to write {:?}", out))?;
            println!("Wrote {} bytes to {:?}", record.file_blob.len(), out);
        }
        Commands::FileRm { id } => {
            if !page.files().delete_file(&id).await {
                return Err(eyre!("Failed to delete file {}", id));
            }
            println!("Deleted file {}", id.green());
        }
        Commands::FileList => {
            for id in page.files().file_ids().await {
                println!("{}", id);
            }
        }
        Commands::FileClear => {
            page.files().clear_all().await;
            println!("Cleared all files");
        }
        Commands::Export { path } => {
            let count = jsonl::export_jsonl(page.storage().area().as_ref(), &path)?;
            println!("Exported {} keys to {:?}", count, path);
        }
        Commands::Import { path } => {
            let count = jsonl::import_jsonl(page.storage().area().as_ref(), &path)?;
            println!("Imported {} keys from {:?}", count, path);
        }
    }

    Ok(())
}
