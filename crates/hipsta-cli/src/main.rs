use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use hipsta_config::{LibraryConfig, SqliteStoreConfig, StoreConfig};
use hipsta_core::SortKey;
use hipsta_sync::Library;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "hipsta", version, about = "Bookmarks kept on this device and in the cloud")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Save a bookmark
    Add {
        /// URL to save
        url: String,
        /// Tag to apply (repeatable)
        #[arg(short, long = "tag")]
        tags: Vec<String>,
    },
    /// List bookmarks
    Ls {
        /// Field to order by
        #[arg(short, long, value_enum, default_value_t = Sort::Modified)]
        sort: Sort,
        /// Oldest / lowest first
        #[arg(long)]
        asc: bool,
        /// Include archived bookmarks
        #[arg(short, long)]
        all: bool,
        /// Only bookmarks whose url or title contains this text
        #[arg(long)]
        search: Option<String>,
        /// Only bookmarks carrying this tag
        #[arg(long)]
        tag: Option<String>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Show one bookmark from both stores
    Show {
        /// Local id of the bookmark
        id: String,
    },
    /// Archive bookmarks
    Archive {
        /// Local ids
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Move bookmarks out of the archive
    Unarchive {
        /// Local ids
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Delete a bookmark from both stores
    Rm {
        /// Local id of the bookmark
        id: String,
    },
    /// List, create or delete tags
    Tags {
        /// Create this tag
        #[arg(long, conflicts_with = "delete")]
        create: Option<String>,
        /// Delete this tag and strip it from every bookmark
        #[arg(long)]
        delete: Option<String>,
    },
    /// Apply a tag to bookmarks
    Tag {
        /// Tag name (created on first use)
        name: String,
        /// Local ids
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Remove a tag from bookmarks
    Untag {
        /// Tag name
        name: String,
        /// Local ids
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Show whether a tag is on, off or mixed over bookmarks
    TagState {
        /// Tag name
        name: String,
        /// Local ids
        ids: Vec<String>,
    },
    /// Reconcile the local and remote stores
    Sync,
    /// Show library status
    Status,
    /// Show the effective configuration
    Config,
    /// Check the configuration for errors
    Validate,
}

#[derive(Clone, Copy, ValueEnum)]
enum Sort {
    Created,
    Modified,
    Url,
    Title,
}

impl From<Sort> for SortKey {
    fn from(sort: Sort) -> Self {
        match sort {
            Sort::Created => SortKey::CreationDate,
            Sort::Modified => SortKey::ModificationDate,
            Sort::Url => SortKey::UrlString,
            Sort::Title => SortKey::PageTitle,
        }
    }
}

fn find_config() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("HIPSTA_CONFIG") {
        let p = PathBuf::from(path);
        if p.exists() {
            return Some(p);
        }
    }

    let local = PathBuf::from("hipsta.yaml");
    if local.exists() {
        return Some(local);
    }

    if let Some(home) = dirs_next::home_dir() {
        let global = home.join(".config").join("hipsta").join("config.yaml");
        if global.exists() {
            return Some(global);
        }
    }

    None
}

/// Both stores as SQLite files under the user's data directory.
fn default_config() -> LibraryConfig {
    let dir = dirs_next::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("hipsta");
    let sqlite = |file: &str| {
        StoreConfig::Sqlite(SqliteStoreConfig {
            path: dir.join(file).to_string_lossy().into_owned(),
            latency: None,
        })
    };
    LibraryConfig {
        local: Some(sqlite("library.db")),
        remote: Some(sqlite("cloud.db")),
        ..Default::default()
    }
}

fn init_tracing(config: &LibraryConfig) {
    let filter = EnvFilter::try_from_env("HIPSTA_LOG")
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.to_lowercase()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config_path = cli.config.or_else(find_config);
    let config = match &config_path {
        Some(path) => LibraryConfig::from_file(path)?,
        None => default_config(),
    };
    init_tracing(&config);
    tracing::debug!(config = ?config_path, "configuration loaded");

    // These two never open the stores.
    match cli.command {
        Commands::Config => return commands::config::run(&config),
        Commands::Validate => return commands::validate::run(&config, config_path.as_deref()),
        _ => {}
    }

    let library = Library::from_config(config).await?;

    match cli.command {
        Commands::Add { url, tags } => {
            commands::add::run(&library, &url, &tags).await?;
        }
        Commands::Ls {
            sort,
            asc,
            all,
            search,
            tag,
            json,
        } => {
            let options = commands::ls::Options {
                sort: sort.into(),
                ascending: asc,
                include_archived: all,
                search,
                tag,
                json,
            };
            commands::ls::run(&library, options).await?;
        }
        Commands::Show { id } => {
            commands::show::run(&library, &id).await?;
        }
        Commands::Archive { ids } => {
            commands::archive::run(&library, &ids, true).await?;
        }
        Commands::Unarchive { ids } => {
            commands::archive::run(&library, &ids, false).await?;
        }
        Commands::Rm { id } => {
            commands::rm::run(&library, &id).await?;
        }
        Commands::Tags { create, delete } => {
            commands::tags::run(&library, create, delete).await?;
        }
        Commands::Tag { name, ids } => {
            commands::tag::apply(&library, &name, &ids).await?;
        }
        Commands::Untag { name, ids } => {
            commands::tag::remove(&library, &name, &ids).await?;
        }
        Commands::TagState { name, ids } => {
            commands::tag::state(&library, &name, &ids).await?;
        }
        Commands::Sync => {
            commands::sync::run(&library).await?;
        }
        Commands::Status => {
            commands::status::run(&library).await?;
        }
        Commands::Config | Commands::Validate => {}
    }

    Ok(())
}
