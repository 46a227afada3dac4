//! Queue-backed import commands and enrichment.

use std::collections::HashSet;
use std::io::Write;
use std::path::Path;

use futures::StreamExt;
use tokio::runtime::Runtime;
use tokio::sync::mpsc;

use super::Context;
use crate::db;
use crate::import::{ImportBatch, ImportQueue, ImportRequest, ImportSource};
use crate::matching::Enricher;

/// Import every uncatalogued album under `path`
pub fn cmd_import_local(rt: &Runtime, ctx: &Context, path: &Path) -> anyhow::Result<()> {
    rt.block_on(async {
        let local = ctx.sources.local()?;
        let known: HashSet<String> = db::list_local_uris(&ctx.pool).await?.into_iter().collect();

        println!("Scanning {}...", path.display());
        let requests: Vec<ImportRequest> = local
            .scan(path.to_path_buf(), known)
            .map(|album| ImportRequest::new(ImportSource::Local(album)))
            .collect()
            .await;

        if requests.is_empty() {
            println!("No new albums found.");
            return Ok(());
        }
        run_imports(ctx, requests).await
    })
}

/// Import a MusicBrainz release
pub fn cmd_import_release(rt: &Runtime, ctx: &Context, release_id: &str) -> anyhow::Result<()> {
    rt.block_on(run_imports(
        ctx,
        vec![ImportRequest::new(ImportSource::Release {
            release_id: release_id.to_string(),
        })],
    ))
}

/// Import an album from the scrobble backend
pub fn cmd_import_scrobble(
    rt: &Runtime,
    ctx: &Context,
    artist: &str,
    album: &str,
) -> anyhow::Result<()> {
    rt.block_on(run_imports(
        ctx,
        vec![ImportRequest::new(ImportSource::Scrobble {
            artist: artist.to_string(),
            title: album.to_string(),
        })],
    ))
}

/// Backfill one album from the metadata backends
pub fn cmd_enrich(rt: &Runtime, ctx: &Context, album_id: i64) -> anyhow::Result<()> {
    rt.block_on(async {
        let enricher = Enricher::new(ctx.pool.clone(), ctx.sources.clone(), &ctx.config.matching);
        if enricher.enrich_album(album_id).await? {
            println!("Album {} enriched.", album_id);
        } else {
            println!("Nothing new found for album {}.", album_id);
        }
        Ok(())
    })
}

/// Enqueue `requests`, show progress and print the batch result.
async fn run_imports(ctx: &Context, requests: Vec<ImportRequest>) -> anyhow::Result<()> {
    let queue = ImportQueue::new(ctx.pool.clone(), ctx.sources.clone(), &ctx.config.matching);
    let (tx, batches) = mpsc::unbounded_channel();
    queue.on_batch_finished(move |batch| {
        let _ = tx.send(batch.clone());
    });

    for request in requests {
        queue.enqueue(request);
    }

    let batch = wait_for_batch(&queue, batches).await;
    queue.shutdown().await;

    match batch {
        Some(batch) if batch.failures().count() == batch.len() => {
            print_batch(&batch);
            anyhow::bail!("every import failed")
        }
        Some(batch) => {
            print_batch(&batch);
            Ok(())
        }
        None => anyhow::bail!("import queue stopped before finishing"),
    }
}

/// Print queue progress until the next batch is delivered.
pub(super) async fn wait_for_batch(
    queue: &ImportQueue,
    mut batches: mpsc::UnboundedReceiver<ImportBatch>,
) -> Option<ImportBatch> {
    let mut progress = queue.subscribe_progress();
    loop {
        tokio::select! {
            batch = batches.recv() => {
                println!();
                return batch;
            }
            changed = progress.changed() => {
                if changed.is_err() {
                    return batches.recv().await;
                }
                let current = progress.borrow_and_update().clone();
                if current.active {
                    print!("\r[{:>3.0}%] {:<60}", current.fraction * 100.0, current.label);
                    let _ = std::io::stdout().flush();
                }
            }
        }
    }
}

pub(super) fn print_batch(batch: &ImportBatch) {
    for job in batch.successes() {
        println!(
            "  ok    {} -> album {}",
            job.request.source.label(),
            job.album_id.unwrap_or_default()
        );
    }
    for job in batch.failures() {
        println!(
            "  fail  {}: {}",
            job.request.source.label(),
            job.error.as_deref().unwrap_or("unknown error")
        );
    }
    println!(
        "{} imported, {} failed",
        batch.successes().count(),
        batch.failures().count()
    );
}
