//! Debounced single-folder watch pipeline.
//!
//! A thin wrapper around `notify`: raw create/delete/rename notifications are
//! pushed onto a channel from notify's callback threads, and a single
//! consumer task owns the event buffers and the debounce timer. On each quiet
//! period it swaps the buffers out and reduces them into one consolidated
//! [`ChangeSet`] — a rename whose old path was created inside the same window
//! collapses into a plain "new file" so downstream never sees the
//! intermediate name.
//!
//! Bulk writers (uploads, orphan sync) hold a [`PauseGuard`] for the duration
//! of their writes so the watcher never reacts to the pipeline's own side
//! effects.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cairn_model::ChangeSet;
use notify::event::{CreateKind, EventKind, ModifyKind, RenameMode};
use notify::{Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::CoreConfig;
use crate::error::{MediaError, Result};

/// Raw notification as buffered between debounce flushes.
#[derive(Debug, Clone, PartialEq)]
pub enum RawEvent {
    Created(PathBuf),
    Deleted(PathBuf),
    Renamed { from: PathBuf, to: PathBuf },
}

/// Shared pause state handed to bulk writers.
///
/// Cloneable; the watcher drops raw notifications while any guard is alive,
/// so pauses nest across overlapping pipelines.
#[derive(Debug, Clone, Default)]
pub struct PauseHandle {
    depth: Arc<AtomicUsize>,
}

impl PauseHandle {
    /// Acquire a scoped pause. Released on drop, including error unwinds.
    pub fn pause(&self) -> PauseGuard {
        self.depth.fetch_add(1, Ordering::SeqCst);
        PauseGuard {
            depth: Arc::clone(&self.depth),
        }
    }

    fn is_paused(&self) -> bool {
        self.depth.load(Ordering::SeqCst) > 0
    }
}

/// RAII token for a single pause acquisition.
#[derive(Debug)]
pub struct PauseGuard {
    depth: Arc<AtomicUsize>,
}

impl Drop for PauseGuard {
    fn drop(&mut self) {
        self.depth.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Watches one directory, non-recursive, and emits debounced change-sets.
pub struct FolderWatcher {
    debounce_window: Duration,
    changes_tx: mpsc::Sender<ChangeSet>,
    pause: PauseHandle,
    active: Option<ActiveWatch>,
}

struct ActiveWatch {
    // Dropping the watcher unregisters the notify handlers.
    _watcher: RecommendedWatcher,
    flush_task: JoinHandle<()>,
}

impl std::fmt::Debug for FolderWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FolderWatcher")
            .field("debounce_window", &self.debounce_window)
            .field("watching", &self.active.is_some())
            .finish()
    }
}

impl FolderWatcher {
    /// Consolidated change-sets are delivered on `changes_tx`.
    pub fn new(config: &CoreConfig, changes_tx: mpsc::Sender<ChangeSet>) -> Self {
        Self {
            debounce_window: Duration::from_millis(config.debounce_window_ms.max(1)),
            changes_tx,
            pause: PauseHandle::default(),
            active: None,
        }
    }

    /// Handle for bulk writers to pause this watcher around their writes.
    pub fn pause_handle(&self) -> PauseHandle {
        self.pause.clone()
    }

    /// Begin watching `folder`. Any previous watch is stopped first. Watching
    /// a non-existent directory is a logged no-op.
    pub fn start_watching(&mut self, folder: &Path) -> Result<()> {
        self.stop_watching();

        if !folder.is_dir() {
            warn!(
                "cannot watch folder '{}' because it does not exist",
                folder.display()
            );
            return Ok(());
        }

        let (raw_tx, raw_rx) = mpsc::channel::<RawEvent>(1024);

        let mut watcher = RecommendedWatcher::new(
            move |res: std::result::Result<Event, notify::Error>| match res {
                Ok(event) => {
                    for raw in convert_event(event) {
                        if let Err(err) = raw_tx.blocking_send(raw) {
                            warn!("watch channel send failed: {}", err);
                        }
                    }
                }
                Err(err) => warn!("filesystem watch error: {}", err),
            },
            NotifyConfig::default(),
        )
        .map_err(|err| MediaError::Internal(format!("failed to create watcher: {err}")))?;

        watcher
            .watch(folder, RecursiveMode::NonRecursive)
            .map_err(|err| {
                MediaError::Internal(format!("failed to watch {}: {}", folder.display(), err))
            })?;

        let flush_task = spawn_debounce_loop(
            raw_rx,
            self.changes_tx.clone(),
            self.pause.clone(),
            self.debounce_window,
        );

        self.active = Some(ActiveWatch {
            _watcher: watcher,
            flush_task,
        });

        info!("started watching '{}'", folder.display());
        Ok(())
    }

    /// Idempotent. Aborts the debounce task so no late flush fires after the
    /// watch is gone.
    pub fn stop_watching(&mut self) {
        if let Some(active) = self.active.take() {
            active.flush_task.abort();
            info!("stopped watching folder");
        }
    }
}

impl Drop for FolderWatcher {
    fn drop(&mut self) {
        self.stop_watching();
    }
}

/// Single consumer owning all buffer state and the debounce timer. Buffered
/// events survive across iterations; an event arriving mid-flush simply waits
/// in the channel for the next window.
fn spawn_debounce_loop(
    mut raw_rx: mpsc::Receiver<RawEvent>,
    changes_tx: mpsc::Sender<ChangeSet>,
    pause: PauseHandle,
    window: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut created: Vec<PathBuf> = Vec::new();
        let mut renamed: Vec<(PathBuf, PathBuf)> = Vec::new();
        let mut deleted: Vec<PathBuf> = Vec::new();

        loop {
            let buffers_empty = created.is_empty() && renamed.is_empty() && deleted.is_empty();
            let msg = if buffers_empty {
                raw_rx.recv().await
            } else {
                match timeout(window, raw_rx.recv()).await {
                    Ok(msg) => msg,
                    Err(_) => {
                        flush(
                            &changes_tx,
                            std::mem::take(&mut created),
                            std::mem::take(&mut renamed),
                            std::mem::take(&mut deleted),
                        )
                        .await;
                        continue;
                    }
                }
            };

            let Some(raw) = msg else {
                // Channel closed: the watcher is gone, emit what is pending.
                flush(&changes_tx, created, renamed, deleted).await;
                break;
            };

            if pause.is_paused() {
                debug!("watcher paused, dropping {:?}", raw);
                continue;
            }

            match raw {
                RawEvent::Created(path) => created.push(path),
                RawEvent::Deleted(path) => deleted.push(path),
                RawEvent::Renamed { from, to } => renamed.push((from, to)),
            }
        }
    })
}

async fn flush(
    changes_tx: &mpsc::Sender<ChangeSet>,
    created: Vec<PathBuf>,
    renamed: Vec<(PathBuf, PathBuf)>,
    deleted: Vec<PathBuf>,
) {
    let changes = reduce(created, renamed, deleted);
    if changes.is_empty() {
        debug!("no effective file system changes to report");
        return;
    }

    info!(
        "emitting file system changes: {} new, {} renamed, {} deleted",
        changes.new_files.len(),
        changes.renamed.len(),
        changes.deleted.len()
    );
    if changes_tx.send(changes).await.is_err() {
        warn!("change-set receiver dropped, discarding batch");
    }
}

/// Collapse one drained window of raw events into a consolidated change-set.
///
/// A rename whose old path is present in the created set is a quick
/// create-then-rename pair: it surfaces as a single new file at the new path
/// and the intermediate created entry is discarded.
pub(crate) fn reduce(
    created: Vec<PathBuf>,
    renamed: Vec<(PathBuf, PathBuf)>,
    deleted: Vec<PathBuf>,
) -> ChangeSet {
    let mut created = created;
    let mut changes = ChangeSet::default();

    for (from, to) in renamed {
        if let Some(pos) = created.iter().position(|path| *path == from) {
            created.remove(pos);
            changes.new_files.push(to);
        } else {
            changes.renamed.insert(from, to);
        }
    }

    changes.new_files.append(&mut created);
    changes.deleted = deleted;
    changes
}

/// Map a notify event onto the raw create/delete/rename vocabulary. Rename
/// halves that the backend could not pair degrade to delete and create,
/// which the reducer still consolidates correctly.
fn convert_event(event: Event) -> Vec<RawEvent> {
    match event.kind {
        EventKind::Create(CreateKind::Folder) => Vec::new(),
        EventKind::Create(_) => event.paths.into_iter().map(RawEvent::Created).collect(),
        EventKind::Remove(_) => event.paths.into_iter().map(RawEvent::Deleted).collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut paths = event.paths.into_iter();
            match (paths.next(), paths.next()) {
                (Some(from), Some(to)) => vec![RawEvent::Renamed { from, to }],
                (Some(only), None) => vec![RawEvent::Created(only)],
                _ => Vec::new(),
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            event.paths.into_iter().map(RawEvent::Deleted).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            event.paths.into_iter().map(RawEvent::Created).collect()
        }
        EventKind::Modify(ModifyKind::Name(_)) => event
            .paths
            .into_iter()
            .map(|path| {
                if path.exists() {
                    RawEvent::Created(path)
                } else {
                    RawEvent::Deleted(path)
                }
            })
            .collect(),
        _ => Vec::new(),
    }
}
