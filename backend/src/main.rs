//! Pageboard command line.
//!
//! Runs one collection view against the local SQLite backend, applies a
//! single change and waits for the mutation queue to drain.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use clap::{Parser, Subcommand};
use tracing::{error, info};

use pageboard_backend::assets::kind_of;
use pageboard_backend::{AppConfig, SqliteBackend};
use pageboard_sync::{
    CollectionKey, CollectionView, ItemDraft, ItemId, ItemPayload, PendingAsset, Services, TaskFailure,
};
use rolling_logger::LoggerConfig;

/// Pageboard command line arguments.
#[derive(Parser, Debug)]
#[command(name = "pageboard")]
#[command(about = "Manage pages and posts in a local pageboard database")]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print a collection in display order
    List { collection: CollectionKey },
    /// Append an item
    Add {
        collection: CollectionKey,
        title: String,
        #[arg(short, long)]
        description: Option<String>,
        /// File to upload as the item's asset
        #[arg(short, long, value_name = "FILE")]
        asset: Option<PathBuf>,
    },
    /// Change an item's title or description
    Edit {
        collection: CollectionKey,
        id: String,
        #[arg(short, long)]
        title: Option<String>,
        #[arg(short, long)]
        description: Option<String>,
        #[arg(long)]
        hidden: bool,
    },
    /// Delete an item
    Remove { collection: CollectionKey, id: String },
    /// Move an item to a zero-based position
    Move {
        collection: CollectionKey,
        id: String,
        position: usize,
    },
    /// Renumber positions densely and correct the item count
    Maintain { collection: CollectionKey },
}

impl Command {
    fn collection(&self) -> &CollectionKey {
        match self {
            Command::List { collection }
            | Command::Add { collection, .. }
            | Command::Edit { collection, .. }
            | Command::Remove { collection, .. }
            | Command::Move { collection, .. }
            | Command::Maintain { collection } => collection,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = AppConfig::load(args.config.as_deref())?;

    let logger = rolling_logger::init_logger(
        LoggerConfig::new(&config.backend.log_dir, &config.backend.app_name)
            .with_default_level(if args.verbose { "debug" } else { "info" }),
    )?;
    info!(log = %logger.log_path().display(), "pageboard starting");

    let backend = Arc::new(SqliteBackend::open(&config.backend).await?);
    let key = args.command.collection().clone();

    if let Command::Maintain { .. } = &args.command {
        let outcome = backend.maintain(&key).await?;
        println!("{}: {} items (counter was {})", key, outcome.actual, outcome.previous);
        return Ok(());
    }

    let failures: Arc<Mutex<Vec<TaskFailure>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&failures);
    let view = CollectionView::with_failure_notice(
        key.clone(),
        Services::from_backend(backend),
        config.sync,
        Arc::new(move |failure: &TaskFailure| {
            error!(task = %failure.task, error = %failure.error, "change reverted");
            if let Ok(mut failures) = sink.lock() {
                failures.push(failure.clone());
            }
        }),
    );
    view.load().await?;

    match args.command {
        Command::List { .. } | Command::Maintain { .. } => {}
        Command::Add {
            title,
            description,
            asset,
            ..
        } => {
            let mut payload = ItemPayload::titled(title);
            payload.description = description;
            let mut draft = ItemDraft::new(payload);
            if let Some(path) = asset {
                draft = draft.with_asset(read_asset(&path).await?);
            }
            view.create(draft);
        }
        Command::Edit {
            id,
            title,
            description,
            hidden,
            ..
        } => {
            let id = ItemId::from(id);
            let current = view
                .store()
                .get(&id)
                .ok_or_else(|| format!("no item {} in {}", id, key))?;
            let mut payload = current.payload;
            if let Some(title) = title {
                payload.title = title;
            }
            if description.is_some() {
                payload.description = description;
            }
            payload.visible = !hidden;
            view.edit(&id, ItemDraft::new(payload));
        }
        Command::Remove { id, .. } => {
            let id = ItemId::from(id);
            if !view.delete(&id) {
                return Err(format!("no item {} in {}", id, key).into());
            }
        }
        Command::Move { id, position, .. } => {
            let id = ItemId::from(id);
            if !view.reorder(&id, position) {
                return Err(format!("no item {} in {}", id, key).into());
            }
        }
    }

    view.wait_idle().await;
    view.load().await?;
    for item in view.items() {
        let marker = if item.payload.visible { ' ' } else { '-' };
        println!("{:>4} {} {}  {}", item.order_index, marker, item.id, item.payload.title);
    }

    let failures = failures.lock().map(|f| f.len()).unwrap_or(0);
    if failures > 0 {
        for line in rolling_logger::recent_lines().iter().filter(|line| line.contains("ERROR")) {
            eprintln!("{}", line);
        }
        return Err(format!("{} change(s) failed, see {}", failures, logger.log_path().display()).into());
    }
    Ok(())
}

async fn read_asset(path: &std::path::Path) -> Result<PendingAsset, Box<dyn std::error::Error>> {
    let bytes = tokio::fs::read(path).await?;
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| format!("unusable file name: {}", path.display()))?
        .to_string();
    Ok(PendingAsset {
        file_name,
        kind: kind_of(path),
        bytes,
        client_placeholder: None,
    })
}
