//! The download scheduler service.
//!
//! All task state lives behind one lock. Every change goes through
//! [`Inner::update`], which applies the change, starts the first `Created`
//! tasks while fewer than `max_concurrent` are running, and publishes the
//! new counts before releasing the lock. Spawning and user callbacks happen
//! after the lock is released.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use sqlx::SqlitePool;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::DownloadError;
use super::layout;
use super::task::{DownloadTask, SchedulerStats, TaskId, TaskState};
use crate::db;
use crate::model::{Album, StreamSource, Track};
use crate::sources::MediaFetcher;

type FinishFn = Box<dyn FnOnce(bool) + Send>;
type TrackErrorFn = Arc<dyn Fn(&Track, &DownloadError) + Send + Sync>;

struct Entry {
    task: DownloadTask,
    track: Track,
    stream: StreamSource,
    stem: PathBuf,
    cancel: CancellationToken,
    /// Album downloads waiting on this task
    groups: Vec<u64>,
}

/// Aggregate of one album download.
struct AlbumGroup {
    remaining: usize,
    any_failed: bool,
    on_finish: Option<FinishFn>,
    on_track_error: TrackErrorFn,
}

/// A task that was just moved to `Running`.
struct Start {
    id: TaskId,
    track_id: i64,
    stream: StreamSource,
    stem: PathBuf,
    cancel: CancellationToken,
}

/// Work collected under the lock and carried out after releasing it.
#[derive(Default)]
struct Effects {
    started: Vec<Start>,
    track_errors: Vec<(Vec<TrackErrorFn>, Track, DownloadError)>,
    finished: Vec<(FinishFn, bool)>,
}

#[derive(Default)]
struct SchedulerState {
    entries: Vec<Entry>,
    groups: HashMap<u64, AlbumGroup>,
    next_task: TaskId,
    next_group: u64,
}

impl SchedulerState {
    fn has_active(&self, track_id: i64) -> Option<TaskId> {
        self.entries
            .iter()
            .find(|e| e.task.track_id == track_id && !e.task.state.is_terminal())
            .map(|e| e.task.id)
    }

    fn push(
        &mut self,
        track: Track,
        stream: StreamSource,
        stem: PathBuf,
        album_id: Option<i64>,
        groups: Vec<u64>,
    ) -> TaskId {
        self.next_task += 1;
        let id = self.next_task;
        let target_dir = stem.parent().map(Path::to_path_buf).unwrap_or_default();
        self.entries.push(Entry {
            task: DownloadTask {
                id,
                track_id: track.id.unwrap_or_default(),
                album_id,
                target_dir,
                state: TaskState::Created,
                error: None,
                path: None,
            },
            track,
            stream,
            stem,
            cancel: CancellationToken::new(),
            groups,
        });
        id
    }

    /// Make `group` wait on the active task of `track_id`, if there is one.
    fn join_active(&mut self, track_id: i64, group: u64) -> Option<TaskId> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.task.track_id == track_id && !e.task.state.is_terminal())?;
        if !entry.groups.contains(&group) {
            entry.groups.push(group);
        }
        Some(entry.task.id)
    }

    fn add_group(&mut self, remaining: usize, on_finish: FinishFn, on_track_error: TrackErrorFn) -> u64 {
        self.next_group += 1;
        self.groups.insert(
            self.next_group,
            AlbumGroup {
                remaining,
                any_failed: false,
                on_finish: Some(on_finish),
                on_track_error,
            },
        );
        self.next_group
    }

    /// Start `Created` tasks in queue order while slots are free.
    fn fill_slots(&mut self, max_concurrent: usize, effects: &mut Effects) {
        let mut running = self
            .entries
            .iter()
            .filter(|e| e.task.state == TaskState::Running)
            .count();

        while running < max_concurrent {
            let Some(entry) = self
                .entries
                .iter_mut()
                .find(|e| e.task.state == TaskState::Created)
            else {
                break;
            };
            entry.task.state = TaskState::Running;
            effects.started.push(Start {
                id: entry.task.id,
                track_id: entry.task.track_id,
                stream: entry.stream.clone(),
                stem: entry.stem.clone(),
                cancel: entry.cancel.clone(),
            });
            running += 1;
        }
    }

    /// Move a task to its terminal state and account for it in its album.
    fn settle(&mut self, id: TaskId, outcome: Result<PathBuf, DownloadError>, effects: &mut Effects) {
        let Some(entry) = self.entries.iter_mut().find(|e| e.task.id == id) else {
            return;
        };
        if entry.task.state.is_terminal() {
            return;
        }

        let error = match outcome {
            Ok(path) => {
                entry.task.state = TaskState::Succeeded;
                entry.task.path = Some(path);
                None
            }
            Err(DownloadError::Cancelled) => {
                entry.task.state = TaskState::Cancelled;
                None
            }
            Err(e) => {
                entry.task.state = TaskState::Failed;
                entry.task.error = Some(e.to_string());
                Some(e)
            }
        };

        let mut callbacks = Vec::new();
        for group_id in &entry.groups {
            let Some(group) = self.groups.get_mut(group_id) else {
                continue;
            };
            if error.is_some() {
                group.any_failed = true;
                callbacks.push(group.on_track_error.clone());
            }
            group.remaining = group.remaining.saturating_sub(1);
            if group.remaining == 0
                && let Some(group) = self.groups.remove(group_id)
                && let Some(on_finish) = group.on_finish
            {
                effects.finished.push((on_finish, group.any_failed));
            }
        }
        if let Some(e) = error
            && !callbacks.is_empty()
        {
            effects.track_errors.push((callbacks, entry.track.clone(), e));
        }
    }

    fn cancel_album(&mut self, album_id: i64, effects: &mut Effects) -> usize {
        let mut queued = Vec::new();
        let mut cancelled = 0;

        for entry in &self.entries {
            if entry.task.album_id != Some(album_id) {
                continue;
            }
            match entry.task.state {
                TaskState::Created => queued.push(entry.task.id),
                // Settled by its own worker once it observes the token
                TaskState::Running => entry.cancel.cancel(),
                _ => continue,
            }
            cancelled += 1;
        }

        for id in queued {
            self.settle(id, Err(DownloadError::Cancelled), effects);
        }
        cancelled
    }
}

struct Inner {
    pool: SqlitePool,
    fetcher: Arc<dyn MediaFetcher>,
    root: PathBuf,
    max_concurrent: usize,
    state: Mutex<SchedulerState>,
    stats: watch::Sender<SchedulerStats>,
}

impl Inner {
    /// Apply a change, re-run the start rule, then act on the effects.
    fn update<R>(self: &Arc<Self>, change: impl FnOnce(&mut SchedulerState, &mut Effects) -> R) -> R {
        let mut effects = Effects::default();
        let result = {
            let mut state = self.state.lock();
            let result = change(&mut state, &mut effects);
            state.fill_slots(self.max_concurrent, &mut effects);
            self.stats
                .send_replace(SchedulerStats::from_tasks(state.entries.iter().map(|e| &e.task)));
            result
        };

        for start in effects.started {
            tokio::spawn(self.clone().run_task(start));
        }
        for (callbacks, track, error) in effects.track_errors {
            for callback in callbacks {
                callback(&track, &error);
            }
        }
        for (on_finish, any_failed) in effects.finished {
            on_finish(any_failed);
        }
        result
    }

    async fn run_task(self: Arc<Self>, start: Start) {
        tracing::debug!(target: "download", task = start.id, track_id = start.track_id, "Download started");

        let outcome = tokio::select! {
            biased;
            _ = start.cancel.cancelled() => Err(DownloadError::Cancelled),
            result = self.fetch(&start) => result,
        };

        match &outcome {
            Ok(path) => {
                tracing::info!(target: "download", track_id = start.track_id, path = %path.display(), "Track downloaded");
            }
            Err(DownloadError::Cancelled) => {
                tracing::debug!(target: "download", task = start.id, "Download cancelled");
            }
            Err(e) => {
                tracing::warn!(target: "download", track_id = start.track_id, error = %e, "Track download failed");
            }
        }

        let id = start.id;
        self.update(|state, effects| state.settle(id, outcome, effects));
    }

    async fn fetch(&self, start: &Start) -> Result<PathBuf, DownloadError> {
        if let Some(dir) = start.stem.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        let path = self.fetcher.download_audio(&start.stream, &start.stem).await?;
        db::mark_track_downloaded(&self.pool, start.track_id, &path.to_string_lossy()).await?;
        Ok(path)
    }

    /// Save album artwork outside the download ceiling.
    fn save_artwork(self: &Arc<Self>, album: &Album, dir: &Path) {
        let (Some(album_id), Some(url)) = (album.id, album.artwork_uri.clone()) else {
            return;
        };
        let cover = layout::cover_path(dir);
        if cover.exists() {
            return;
        }

        let inner = self.clone();
        tokio::spawn(async move {
            let saved: Result<(), DownloadError> = async {
                let bytes = inner.fetcher.fetch_image(&url).await?;
                tokio::fs::write(&cover, bytes).await?;
                db::set_album_local_artwork(&inner.pool, album_id, &cover.to_string_lossy()).await?;
                Ok(())
            }
            .await;

            if let Err(e) = saved {
                tracing::warn!(target: "download", album_id, error = %e, "Artwork save failed");
            }
        });
    }
}

/// Handle to the download scheduler. Clones share the same task list.
#[derive(Clone)]
pub struct DownloadScheduler {
    inner: Arc<Inner>,
}

impl DownloadScheduler {
    /// `max_concurrent` is clamped to at least one.
    pub fn new(
        pool: SqlitePool,
        fetcher: Arc<dyn MediaFetcher>,
        root: PathBuf,
        max_concurrent: usize,
    ) -> Self {
        let (stats, _) = watch::channel(SchedulerStats::default());
        Self {
            inner: Arc::new(Inner {
                pool,
                fetcher,
                root,
                max_concurrent: max_concurrent.max(1),
                state: Mutex::new(SchedulerState::default()),
                stats,
            }),
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.inner.max_concurrent
    }

    /// Snapshot of every task in queue order, terminal ones included.
    pub fn tasks(&self) -> Vec<DownloadTask> {
        self.inner
            .state
            .lock()
            .entries
            .iter()
            .map(|e| e.task.clone())
            .collect()
    }

    pub fn stats(&self) -> SchedulerStats {
        *self.inner.stats.borrow()
    }

    pub fn subscribe_stats(&self) -> watch::Receiver<SchedulerStats> {
        self.inner.stats.subscribe()
    }

    /// Queue one track. A track that already has an active task gets that
    /// task's id back.
    pub async fn download_track(&self, track_id: i64) -> Result<TaskId, DownloadError> {
        let track = db::get_track(&self.inner.pool, track_id)
            .await?
            .ok_or_else(|| DownloadError::NotFound(format!("track {}", track_id)))?;
        let stream = match &track.stream {
            Some(stream) if track.is_downloadable() => stream.clone(),
            _ => return Err(DownloadError::NotDownloadable(track_id)),
        };

        let dir = match track.album_id {
            Some(album_id) => match db::load_combo(&self.inner.pool, album_id).await? {
                Some(combo) => {
                    layout::album_dir(&self.inner.root, &combo.artist_string(), &combo.album.title)
                }
                None => self.inner.root.clone(),
            },
            None => self.inner.root.clone(),
        };
        let stem = layout::track_stem(&dir, track.disc_number, track.album_position, &track.title);
        let album_id = track.album_id;

        Ok(self.inner.update(|state, _| {
            state
                .has_active(track_id)
                .unwrap_or_else(|| state.push(track, stream, stem, album_id, Vec::new()))
        }))
    }

    /// Queue every not yet downloaded track of an album.
    ///
    /// A track that already has an active task joins the album through that
    /// task instead of getting a second one. `on_finish` fires exactly once,
    /// after every returned task is terminal, with whether any track failed.
    /// With nothing to download it fires immediately with `false`.
    /// `on_track_error` is called per failed track; siblings keep running.
    pub async fn download_album(
        &self,
        album_id: i64,
        on_finish: impl FnOnce(bool) + Send + 'static,
        on_track_error: impl Fn(&Track, &DownloadError) + Send + Sync + 'static,
    ) -> Result<Vec<TaskId>, DownloadError> {
        let combo = db::load_combo(&self.inner.pool, album_id)
            .await?
            .ok_or_else(|| DownloadError::NotFound(format!("album {}", album_id)))?;

        let dir = layout::album_dir(&self.inner.root, &combo.artist_string(), &combo.album.title);
        tokio::fs::create_dir_all(&dir).await?;
        self.inner.save_artwork(&combo.album, &dir);

        let wanted: Vec<(Track, StreamSource)> = combo
            .tracks
            .into_iter()
            .map(|entry| entry.track)
            .filter(|t| t.id.is_some() && t.is_downloadable())
            .filter_map(|t| t.stream.clone().map(|stream| (t, stream)))
            .collect();

        let on_finish: FinishFn = Box::new(on_finish);
        let on_track_error: TrackErrorFn = Arc::new(on_track_error);

        let ids = self.inner.update(|state, effects| {
            if wanted.is_empty() {
                effects.finished.push((on_finish, false));
                return Vec::new();
            }

            let group = state.add_group(wanted.len(), on_finish, on_track_error);
            wanted
                .into_iter()
                .map(|(track, stream)| {
                    if let Some(id) = state.join_active(track.id.unwrap_or_default(), group) {
                        return id;
                    }
                    let stem =
                        layout::track_stem(&dir, track.disc_number, track.album_position, &track.title);
                    state.push(track, stream, stem, Some(album_id), vec![group])
                })
                .collect()
        });

        tracing::info!(target: "download", album_id, tasks = ids.len(), "Album download queued");
        Ok(ids)
    }

    /// Cancel an album's `Created` and `Running` tasks. Finished files stay
    /// on disk. Returns how many tasks were cancelled.
    pub fn cancel_album(&self, album_id: i64) -> usize {
        let cancelled = self
            .inner
            .update(|state, effects| state.cancel_album(album_id, effects));
        tracing::info!(target: "download", album_id, cancelled, "Album download cancelled");
        cancelled
    }

    /// Drop terminal tasks from the list. Returns how many were removed.
    pub fn clear_finished(&self) -> usize {
        self.inner.update(|state, _| {
            let before = state.entries.len();
            state.entries.retain(|e| !e.task.state.is_terminal());
            before - state.entries.len()
        })
    }
}
