//! Album download command.

use tokio::runtime::Runtime;
use tokio::sync::oneshot;

use super::Context;
use crate::download::DownloadScheduler;

/// Download every streamable track of an album
pub fn cmd_download(
    rt: &Runtime,
    ctx: &Context,
    album_id: i64,
    jobs: Option<usize>,
) -> anyhow::Result<()> {
    rt.block_on(async {
        let fetcher = ctx.sources.fetcher()?.clone();
        let scheduler = DownloadScheduler::new(
            ctx.pool.clone(),
            fetcher,
            ctx.config.library.download_dir.clone(),
            jobs.unwrap_or(ctx.config.downloads.max_concurrent),
        );

        let (tx, mut done) = oneshot::channel();
        let tasks = scheduler
            .download_album(
                album_id,
                move |any_failed| {
                    let _ = tx.send(any_failed);
                },
                |track, error| eprintln!("  failed  {}: {}", track.title, error),
            )
            .await?;

        if tasks.is_empty() {
            println!("Nothing to download for album {}.", album_id);
            return Ok(());
        }
        println!(
            "Downloading {} tracks ({} at a time)...",
            tasks.len(),
            scheduler.max_concurrent()
        );

        let mut stats = scheduler.subscribe_stats();
        let any_failed = loop {
            tokio::select! {
                result = &mut done => break result?,
                changed = stats.changed() => {
                    if changed.is_err() {
                        break (&mut done).await?;
                    }
                    let current = *stats.borrow_and_update();
                    println!(
                        "  {} done, {} running, {} queued",
                        current.succeeded + current.failed,
                        current.running,
                        current.created
                    );
                }
            }
        };

        let stats = scheduler.stats();
        println!("{} downloaded, {} failed", stats.succeeded, stats.failed);
        if any_failed {
            anyhow::bail!("some tracks of album {} failed to download", album_id);
        }
        Ok(())
    })
}
