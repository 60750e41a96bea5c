//! Per-key coordination of rename transactions and series resolution.
//!
//! Two independent key spaces share one mutex-guarded state:
//! - rename transactions in flight, keyed by target path and by the
//!   (series, chapter) pair the ledger records them under
//! - series titles with a metadata search in flight, or already resolved
//!
//! Each in-flight key owns a `watch` channel. Waiters hold a receiver and
//! are woken when the owning guard drops its sender, on success and error
//! paths alike.

use shared::ResolvedMetadata;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::debug;

/// What a rename transaction holds exclusively
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum RenameKey {
    Target(PathBuf),
    Chapter { series_title: String, chapter_number: String },
}

#[derive(Debug, Default)]
struct CoordinatorState {
    pending_rename: HashMap<RenameKey, watch::Receiver<()>>,
    pending_series: HashMap<String, watch::Receiver<()>>,
    resolved_series: HashMap<String, Arc<ResolvedMetadata>>,
}

/// Process-wide dedup coordinator, cheap to clone
#[derive(Debug, Clone, Default)]
pub struct DedupCoordinator {
    state: Arc<Mutex<CoordinatorState>>,
}

/// Exclusive hold on a target path for one rename transaction
///
/// The key is released when the guard drops.
#[derive(Debug)]
pub struct RenameGuard {
    coordinator: DedupCoordinator,
    key: RenameKey,
    waited: bool,
    _release: watch::Sender<()>,
}

/// Result of asking to resolve a series
#[derive(Debug)]
pub enum SeriesTicket {
    /// Metadata is already known; no search needed
    Resolved(Arc<ResolvedMetadata>),
    /// The caller must resolve the series and report through the guard
    Responsible(SeriesGuard),
}

/// Exclusive responsibility for resolving one series
///
/// Dropping the guard without `mark_resolved` hands responsibility to the
/// next waiter.
#[derive(Debug)]
pub struct SeriesGuard {
    coordinator: DedupCoordinator,
    key: String,
    released: bool,
    _release: watch::Sender<()>,
}

impl DedupCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, CoordinatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark series as resolved without searching, e.g. from the ledger at startup
    pub fn seed_resolved<I>(&self, resolved: I) -> usize
    where
        I: IntoIterator<Item = (String, Arc<ResolvedMetadata>)>,
    {
        let mut state = self.lock();
        let before = state.resolved_series.len();
        state.resolved_series.extend(resolved);
        state.resolved_series.len() - before
    }

    /// Whether a series has resolved metadata
    pub fn is_resolved(&self, series_title: &str) -> bool {
        self.lock().resolved_series.contains_key(series_title)
    }

    /// Wait for exclusive use of a target path
    ///
    /// When another transaction holds the path, this returns only after it
    /// finishes; callers must then re-read any persisted state for the path.
    pub async fn acquire_rename(&self, target: &Path) -> RenameGuard {
        self.acquire_rename_key(RenameKey::Target(target.to_path_buf()))
            .await
    }

    /// Wait for exclusive use of a (series, chapter) ledger record
    ///
    /// Two files can name the same chapter under different targets; this
    /// serializes them on the record they would both write.
    pub async fn acquire_chapter(&self, series_title: &str, chapter_number: &str) -> RenameGuard {
        self.acquire_rename_key(RenameKey::Chapter {
            series_title: series_title.to_string(),
            chapter_number: chapter_number.to_string(),
        })
        .await
    }

    async fn acquire_rename_key(&self, key: RenameKey) -> RenameGuard {
        let mut waited = false;
        loop {
            let mut release = {
                let mut state = self.lock();
                match state.pending_rename.get(&key) {
                    Some(release) => release.clone(),
                    None => {
                        let (tx, rx) = watch::channel(());
                        state.pending_rename.insert(key.clone(), rx);
                        return RenameGuard {
                            coordinator: self.clone(),
                            key,
                            waited,
                            _release: tx,
                        };
                    }
                }
            };

            debug!(key = ?key, "Rename in flight, waiting");
            waited = true;
            // Errors once the holder drops its sender
            let _ = release.changed().await;
        }
    }

    /// Resolve-or-wait for a series
    ///
    /// Returns immediately with the metadata when the series is resolved.
    /// Otherwise either waits for the in-flight search or, if none, makes
    /// the caller responsible for it.
    pub async fn acquire_series(&self, series_title: &str) -> SeriesTicket {
        loop {
            let mut release = {
                let mut state = self.lock();
                if let Some(metadata) = state.resolved_series.get(series_title) {
                    return SeriesTicket::Resolved(Arc::clone(metadata));
                }
                match state.pending_series.get(series_title) {
                    Some(release) => release.clone(),
                    None => {
                        let (tx, rx) = watch::channel(());
                        state.pending_series.insert(series_title.to_string(), rx);
                        return SeriesTicket::Responsible(SeriesGuard {
                            coordinator: self.clone(),
                            key: series_title.to_string(),
                            released: false,
                            _release: tx,
                        });
                    }
                }
            };

            debug!(series_title = series_title, "Series search in flight, waiting");
            let _ = release.changed().await;
        }
    }
}

impl RenameGuard {
    /// Whether another transaction held the path before this one
    pub fn waited(&self) -> bool {
        self.waited
    }
}

impl Drop for RenameGuard {
    fn drop(&mut self) {
        self.coordinator.lock().pending_rename.remove(&self.key);
    }
}

impl SeriesGuard {
    pub fn series_title(&self) -> &str {
        &self.key
    }

    /// Move the series from pending to resolved and wake waiters
    pub fn mark_resolved(mut self, metadata: Arc<ResolvedMetadata>) {
        let mut state = self.coordinator.lock();
        state.resolved_series.insert(self.key.clone(), metadata);
        state.pending_series.remove(&self.key);
        self.released = true;
    }
}

impl Drop for SeriesGuard {
    fn drop(&mut self) {
        if !self.released {
            self.coordinator.lock().pending_series.remove(&self.key);
        }
    }
}
