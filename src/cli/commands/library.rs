//! Catalog listing, deletion, reconciliation and config commands.

use tokio::runtime::Runtime;
use tokio::sync::mpsc;

use super::Context;
use super::import::{print_batch, wait_for_batch};
use crate::config::{self, Config};
use crate::db;
use crate::import::ImportQueue;
use crate::reconcile::LibraryGc;

/// List albums in the catalog
pub fn cmd_albums(rt: &Runtime, ctx: &Context) -> anyhow::Result<()> {
    rt.block_on(async {
        let albums = db::list_album_summaries(&ctx.pool).await?;
        if albums.is_empty() {
            println!("The catalog is empty.");
            return Ok(());
        }

        for summary in &albums {
            let album = &summary.album;
            let mut flags = Vec::new();
            if album.is_local {
                flags.push("local");
            }
            if album.playlist.is_some() {
                flags.push("streamable");
            }
            if album.is_hidden {
                flags.push("hidden");
            }
            println!(
                "{:>6}  {} - {} ({} tracks){}",
                album.id.unwrap_or_default(),
                summary.artist,
                album.title,
                summary.track_count,
                if flags.is_empty() {
                    String::new()
                } else {
                    format!(" [{}]", flags.join(", "))
                }
            );
        }
        println!("\n{} albums", albums.len());
        Ok(())
    })
}

/// Mark an album for deletion
pub fn cmd_delete(rt: &Runtime, ctx: &Context, album_id: i64) -> anyhow::Result<()> {
    rt.block_on(async {
        if db::soft_delete_album(&ctx.pool, album_id).await? {
            println!("Album {} marked for deletion; files are removed on the next gc.", album_id);
        } else {
            anyhow::bail!("album {} not found", album_id);
        }
        Ok(())
    })
}

/// Run reconciliation and wait for any auto-imports it queued
pub fn cmd_gc(rt: &Runtime, ctx: &Context) -> anyhow::Result<()> {
    rt.block_on(async {
        let queue = ImportQueue::new(ctx.pool.clone(), ctx.sources.clone(), &ctx.config.matching);
        let (tx, batches) = mpsc::unbounded_channel();
        queue.on_batch_finished(move |batch| {
            let _ = tx.send(batch.clone());
        });

        let gc = LibraryGc::from_config(
            ctx.pool.clone(),
            ctx.sources.clone(),
            &queue,
            &ctx.config.library,
        );
        let report = gc.run().await;
        println!("{}", report);

        if report.imports_queued > 0 {
            println!("\nImporting {} local albums...", report.imports_queued);
            if let Some(batch) = wait_for_batch(&queue, batches).await {
                print_batch(&batch);
            }
        }
        queue.shutdown().await;
        Ok(())
    })
}

/// Sync the genre vocabulary only
pub fn cmd_genres(rt: &Runtime, ctx: &Context) -> anyhow::Result<()> {
    rt.block_on(async {
        let gc = LibraryGc::new(ctx.pool.clone(), ctx.sources.clone());
        let added = gc.sync_genres().await?;
        let total = db::list_tags(&ctx.pool).await?.len();
        println!("{} new genres, {} tags known.", added, total);
        Ok(())
    })
}

/// Write the effective config to the config file
pub fn cmd_init_config(config: &Config) -> anyhow::Result<()> {
    config::save(config)?;
    if let Some(path) = config::config_path() {
        println!("Configuration written to {}", path.display());
    }
    Ok(())
}
