//! CLI command definitions and dispatch.
//!
//! Each group of subcommands lives in its own submodule:
//! - `library`: listing, deletion, reconciliation and config
//! - `import`: queue-backed imports and enrichment
//! - `download`: album downloads

mod download;
mod import;
mod library;

use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use sqlx::SqlitePool;
use tokio::runtime::Runtime;

use crate::config::{self, Config};
use crate::db;
use crate::sources::Sources;

pub use download::cmd_download;
pub use import::{cmd_enrich, cmd_import_local, cmd_import_release, cmd_import_scrobble};
pub use library::{cmd_albums, cmd_delete, cmd_gc, cmd_genres, cmd_init_config};

/// Music Steward CLI
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Catalog database (overrides the config file)
    #[arg(long, global = true, env = "MUSIC_STEWARD_DB")]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// List albums in the catalog
    Albums,
    /// Run library reconciliation now
    Gc,
    /// Import every uncatalogued album under a directory
    ImportLocal {
        /// Directory to scan
        path: PathBuf,
    },
    /// Import a MusicBrainz release
    ImportRelease {
        /// MusicBrainz release id
        mbid: String,
    },
    /// Import an album from Last.fm
    ImportScrobble {
        artist: String,
        album: String,
    },
    /// Backfill missing metadata of a catalog album
    Enrich {
        album_id: i64,
    },
    /// Download the streamable tracks of an album
    Download {
        album_id: i64,
        /// Override the concurrent download ceiling
        #[arg(short = 'j', long)]
        jobs: Option<usize>,
    },
    /// Mark an album for deletion (purged by the next gc)
    Delete {
        album_id: i64,
    },
    /// Add new MusicBrainz genres to the tag vocabulary
    Genres,
    /// Write the effective configuration to the config file
    InitConfig,
}

/// Everything a command needs: config, catalog and backends.
pub struct Context {
    pub config: Config,
    pub pool: SqlitePool,
    pub sources: Sources,
}

impl Context {
    async fn open(config: Config, db_override: Option<&PathBuf>) -> anyhow::Result<Self> {
        let path = db_override
            .cloned()
            .unwrap_or_else(|| config.library.database.clone());
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let pool = db::init_db(&db::db_url(Some(&path)))
            .await
            .with_context(|| format!("Failed to open catalog {}", path.display()))?;
        let sources = Sources::from_config(&config).context("Failed to build backends")?;

        Ok(Self {
            config,
            pool,
            sources,
        })
    }
}

/// Run the specified CLI command.
pub fn run_command(cli: &Cli) -> anyhow::Result<()> {
    let config = config::load();

    if let Commands::InitConfig = cli.command {
        return cmd_init_config(&config);
    }

    let rt = Runtime::new()?;
    let ctx = rt.block_on(Context::open(config, cli.db.as_ref()))?;

    match &cli.command {
        Commands::Albums => cmd_albums(&rt, &ctx),
        Commands::Gc => cmd_gc(&rt, &ctx),
        Commands::ImportLocal { path } => cmd_import_local(&rt, &ctx, path),
        Commands::ImportRelease { mbid } => cmd_import_release(&rt, &ctx, mbid),
        Commands::ImportScrobble { artist, album } => cmd_import_scrobble(&rt, &ctx, artist, album),
        Commands::Enrich { album_id } => cmd_enrich(&rt, &ctx, *album_id),
        Commands::Download { album_id, jobs } => cmd_download(&rt, &ctx, *album_id, *jobs),
        Commands::Delete { album_id } => cmd_delete(&rt, &ctx, *album_id),
        Commands::Genres => cmd_genres(&rt, &ctx),
        Commands::InitConfig => cmd_init_config(&ctx.config),
    }
}
