//! The import queue service.
//!
//! One worker task owns processing. It always picks the first job that is
//! not finished, so finishing job N is what starts job N+1; there is never
//! more than one job in `Processing`. When no unfinished job remains the
//! queue is drained and the whole batch goes to the registered callbacks
//! exactly once.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use sqlx::SqlitePool;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};

use super::ImportError;
use super::job::{ImportBatch, ImportJob, ImportProgress, ImportRequest, JobStatus};
use super::pipeline::ImportPipeline;
use crate::config::MatchingConfig;
use crate::matching::Enricher;
use crate::sources::Sources;

type BatchCallback = Arc<dyn Fn(&ImportBatch) + Send + Sync>;

/// What the worker does next, decided under the jobs lock.
enum Step {
    Process {
        id: u64,
        request: ImportRequest,
        label: String,
    },
    Drained(Vec<ImportJob>),
    Idle,
}

struct Inner {
    jobs: Mutex<Vec<ImportJob>>,
    next_id: AtomicU64,
    wake: Notify,
    progress: watch::Sender<ImportProgress>,
    callbacks: Mutex<Vec<BatchCallback>>,
    shutdown: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to the import queue. Clones share the same queue; the worker
/// stops when the last handle is dropped or on [`ImportQueue::shutdown`].
#[derive(Clone)]
pub struct ImportQueue {
    inner: Arc<Inner>,
    _stop_on_drop: Arc<DropGuard>,
}

impl ImportQueue {
    /// Build the pipeline and enricher from backends and start the worker.
    pub fn new(pool: SqlitePool, sources: Sources, matching: &MatchingConfig) -> Self {
        let enricher = Enricher::new(pool.clone(), sources.clone(), matching);
        Self::start(ImportPipeline::new(pool, sources, matching), Some(enricher))
    }

    /// Start the worker. Successful imports are handed to `enricher` as
    /// detached tasks when one is given.
    pub fn start(pipeline: ImportPipeline, enricher: Option<Enricher>) -> Self {
        let shutdown = CancellationToken::new();
        let (progress, _) = watch::channel(ImportProgress::default());

        let inner = Arc::new(Inner {
            jobs: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            wake: Notify::new(),
            progress,
            callbacks: Mutex::new(Vec::new()),
            shutdown: shutdown.clone(),
            worker: Mutex::new(None),
        });

        let handle = tokio::spawn(run(inner.clone(), pipeline, enricher));
        *inner.worker.lock() = Some(handle);

        Self {
            inner,
            _stop_on_drop: Arc::new(shutdown.drop_guard()),
        }
    }

    /// Append a job to the queue. Returns the job's id.
    pub fn enqueue(&self, request: ImportRequest) -> u64 {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(target: "import", id, source = %request.source.label(), "Job queued");
        self.inner.jobs.lock().push(ImportJob::new(id, request));
        self.inner.wake.notify_one();
        id
    }

    /// Snapshot of the jobs in the current batch.
    pub fn jobs(&self) -> Vec<ImportJob> {
        self.inner.jobs.lock().clone()
    }

    pub fn progress(&self) -> ImportProgress {
        self.inner.progress.borrow().clone()
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<ImportProgress> {
        self.inner.progress.subscribe()
    }

    /// Register a callback receiving every drained batch.
    pub fn on_batch_finished(&self, callback: impl Fn(&ImportBatch) + Send + Sync + 'static) {
        self.inner.callbacks.lock().push(Arc::new(callback));
    }

    /// Stop the worker after the job in progress and wait for it to exit.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        let handle = self.inner.worker.lock().take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            tracing::warn!(target: "import", error = %e, "Import worker ended abnormally");
        }
    }
}

impl Inner {
    fn next_step(&self) -> Step {
        let mut jobs = self.jobs.lock();
        if let Some(job) = jobs.iter_mut().find(|j| !j.is_finished()) {
            job.status = JobStatus::Processing;
            return Step::Process {
                id: job.id,
                request: job.request.clone(),
                label: job.request.source.label(),
            };
        }
        if jobs.is_empty() {
            Step::Idle
        } else {
            Step::Drained(std::mem::take(&mut *jobs))
        }
    }

    /// Publish `(finished + current) / total` for the job being processed.
    fn report(&self, label: &str, current: f32) {
        let (finished, total) = {
            let jobs = self.jobs.lock();
            (jobs.iter().filter(|j| j.is_finished()).count(), jobs.len())
        };
        let fraction = if total == 0 {
            1.0
        } else {
            ((finished as f32 + current.clamp(0.0, 1.0)) / total as f32).min(1.0)
        };
        self.progress.send_replace(ImportProgress {
            label: label.to_string(),
            fraction,
            active: true,
        });
    }

    /// Record a job's outcome. Returns the album id on success.
    fn finish(&self, id: u64, outcome: Result<i64, ImportError>) -> Option<i64> {
        let mut jobs = self.jobs.lock();
        let job = jobs.iter_mut().find(|j| j.id == id)?;
        job.status = JobStatus::Finished;
        match outcome {
            Ok(album_id) => {
                job.album_id = Some(album_id);
                Some(album_id)
            }
            Err(e) => {
                tracing::warn!(target: "import", id, source = %job.request.source.label(), error = %e, "Import failed");
                job.error = Some(e.to_string());
                None
            }
        }
    }

    fn deliver(&self, jobs: Vec<ImportJob>) {
        let batch = ImportBatch { jobs };
        tracing::info!(
            target: "import",
            total = batch.len(),
            failed = batch.failures().count(),
            "Import batch finished"
        );
        self.progress.send_replace(ImportProgress {
            label: String::new(),
            fraction: 1.0,
            active: false,
        });

        let callbacks = self.callbacks.lock().clone();
        for callback in callbacks {
            callback(&batch);
        }
    }
}

async fn run(inner: Arc<Inner>, pipeline: ImportPipeline, enricher: Option<Enricher>) {
    tracing::info!(target: "import", "Import queue started");

    while !inner.shutdown.is_cancelled() {
        match inner.next_step() {
            Step::Process { id, request, label } => {
                let report = |fraction: f32| inner.report(&label, fraction);
                report(0.0);
                let outcome = pipeline.run(&request, &report).await;
                if let Some(album_id) = inner.finish(id, outcome)
                    && let Some(enricher) = &enricher
                {
                    spawn_enrichment(enricher.clone(), album_id);
                }
            }
            Step::Drained(jobs) => inner.deliver(jobs),
            Step::Idle => {
                tokio::select! {
                    _ = inner.wake.notified() => {}
                    _ = inner.shutdown.cancelled() => break,
                }
            }
        }
    }

    tracing::info!(target: "import", "Import queue stopped");
}

/// Enrich a freshly imported album without holding up the queue.
fn spawn_enrichment(enricher: Enricher, album_id: i64) {
    tokio::spawn(async move {
        match enricher.enrich_album(album_id).await {
            Ok(changed) => {
                tracing::debug!(target: "enrich", album_id, changed, "Background enrichment done");
            }
            Err(e) => {
                tracing::warn!(target: "enrich", album_id, error = %e, "Background enrichment failed");
            }
        }
    });
}
