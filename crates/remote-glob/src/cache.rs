//! Per-expansion result cache and request coalescer.
//!
//! Every `list` and `probe` an expansion makes goes through one
//! [`TraversalState`]. Each (operation, path) key owns a single
//! [`OnceCell`]: the first caller runs the remote call inside it, concurrent
//! callers for the same key wait on that same initialization, and everyone
//! after reads the stored outcome. Failures are stored too, so all waiters
//! see the same error instead of retrying.
//!
//! The state lives exactly as long as one expansion. Nothing here is global.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OnceCell;

use crate::{FsError, Probe, RemoteFs};

/// Which remote capability a cache entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    List,
    Probe,
}

type Slot<T> = Arc<OnceCell<Result<T, FsError>>>;

/// Cache, coalescer and globstar visited-set for one expansion.
#[derive(Debug, Default)]
pub struct TraversalState {
    lists: Mutex<HashMap<String, Slot<Vec<String>>>>,
    probes: Mutex<HashMap<String, Slot<Probe>>>,
    visited: Mutex<HashSet<(usize, String)>>,
    list_calls: AtomicUsize,
    probe_calls: AtomicUsize,
}

impl TraversalState {
    pub fn new() -> Self {
        Self::default()
    }

    /// List `path` at most once per expansion.
    ///
    /// A path already probed as a file (or as absent) lists as empty without
    /// touching the remote.
    pub async fn list<F: RemoteFs + ?Sized>(&self, fs: &F, path: &str) -> Result<Vec<String>, FsError> {
        if let Some(Ok(Probe::File | Probe::Absent)) = self.settled_probe(path) {
            tracing::trace!(path, "list answered from probe cache");
            return Ok(Vec::new());
        }

        let slot = slot(&self.lists, path);
        slot.get_or_init(|| async move {
            self.list_calls.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(path, "list");
            fs.list(path).await
        })
        .await
        .clone()
    }

    /// Probe `path` at most once per expansion.
    pub async fn probe<F: RemoteFs + ?Sized>(&self, fs: &F, path: &str) -> Result<Probe, FsError> {
        let slot = slot(&self.probes, path);
        slot.get_or_init(|| async move {
            self.probe_calls.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(path, "probe");
            fs.probe(path).await
        })
        .await
        .clone()
    }

    /// A probe result, if one has already settled for `path`.
    pub fn settled_probe(&self, path: &str) -> Option<Result<Probe, FsError>> {
        let probes = self.probes.lock().unwrap_or_else(PoisonError::into_inner);
        probes.get(path).and_then(|slot| slot.get().cloned())
    }

    /// Record that the globstar at `segment` has descended into `path`.
    ///
    /// Returns false if it already had.
    pub fn mark_visited(&self, segment: usize, path: &str) -> bool {
        let mut visited = self.visited.lock().unwrap_or_else(PoisonError::into_inner);
        visited.insert((segment, path.to_string()))
    }

    /// Remote calls actually issued for one kind of operation.
    pub fn calls(&self, kind: OpKind) -> usize {
        match kind {
            OpKind::List => self.list_calls.load(Ordering::Relaxed),
            OpKind::Probe => self.probe_calls.load(Ordering::Relaxed),
        }
    }

    /// Remote calls actually issued, all kinds.
    pub fn transport_calls(&self) -> usize {
        self.calls(OpKind::List) + self.calls(OpKind::Probe)
    }
}

fn slot<T>(map: &Mutex<HashMap<String, Slot<T>>>, path: &str) -> Slot<T> {
    let mut map = map.lock().unwrap_or_else(PoisonError::into_inner);
    map.entry(path.to_string()).or_default().clone()
}
