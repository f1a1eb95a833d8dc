//! Canvas persistence gateway.
//!
//! # Responsibility
//! - Save/load one `CanvasSnapshot` per project across the remote store, the
//!   local durable fallback and an in-memory cache.
//! - Convert every storage failure into a typed `SaveOutcome`.
//!
//! # Invariants
//! - The cache always holds the most recently *requested* snapshot for a
//!   project, regardless of which write completes last.
//! - A write persists the latest staged snapshot at write time; a revision
//!   that was already persisted is not written twice.
//! - Cache reads and writes are deep copies.
//! - Remote failures never propagate; they degrade to local storage.

use crate::model::canvas::CanvasSnapshot;
use crate::repo::canvas_repo::{CanvasRepository, RepoError, RepoResult};
use crate::repo::local_store::{canvas_key, LocalStore};
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

/// Result of one save attempt. Never an `Err`: failures are values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Written to the remote store.
    Remote,
    /// No remote configured (signed-out mode); written locally.
    LocalOnly,
    /// Remote failed; the snapshot was written locally instead.
    LocalFallback { reason: String },
    /// Neither store accepted the snapshot. The cache still holds it.
    Failed { message: String },
}

impl SaveOutcome {
    /// Whether the snapshot reached some durable store.
    pub fn is_durable(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }

    fn status_label(&self) -> &'static str {
        match self {
            Self::Remote => "ok",
            Self::LocalOnly => "ok",
            Self::LocalFallback { .. } => "fallback",
            Self::Failed { .. } => "error",
        }
    }
}

/// Where a loaded snapshot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    Cache,
    Remote,
    Local,
    Empty,
}

struct CacheEntry {
    snapshot: CanvasSnapshot,
    requested_revision: u64,
}

#[derive(Default)]
struct WriteRecord {
    persisted_revision: u64,
    last_outcome: Option<SaveOutcome>,
}

#[derive(Default)]
struct GatewayState {
    next_revision: u64,
    cache: HashMap<String, CacheEntry>,
    writes: HashMap<String, WriteRecord>,
}

/// Remote-first, local-fallback canvas persistence with a per-project cache.
pub struct PersistenceGateway {
    remote: Option<Arc<dyn CanvasRepository>>,
    local: Arc<dyn LocalStore>,
    owner_id: Option<String>,
    state: Mutex<GatewayState>,
    write_lock: Mutex<()>,
}

impl PersistenceGateway {
    /// Creates a gateway. `remote = None` selects local-only mode.
    pub fn new(remote: Option<Arc<dyn CanvasRepository>>, local: Arc<dyn LocalStore>) -> Self {
        Self {
            remote,
            local,
            owner_id: None,
            state: Mutex::new(GatewayState::default()),
            write_lock: Mutex::new(()),
        }
    }

    /// Sets the owner recorded on newly inserted remote rows.
    pub fn with_owner(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = Some(owner_id.into());
        self
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    /// Stages and persists `snapshot` for `project_id`.
    pub fn save(&self, project_id: &str, snapshot: &CanvasSnapshot) -> SaveOutcome {
        self.stage(project_id, snapshot);
        self.persist_latest(project_id)
    }

    /// Records `snapshot` as the latest requested state and updates the cache.
    ///
    /// Returns the revision assigned to this request.
    pub fn stage(&self, project_id: &str, snapshot: &CanvasSnapshot) -> u64 {
        let mut state = self.lock_state();
        state.next_revision += 1;
        let revision = state.next_revision;
        state.cache.insert(
            project_id.to_string(),
            CacheEntry {
                snapshot: snapshot.clone(),
                requested_revision: revision,
            },
        );
        debug!(
            "event=canvas_stage module=persistence project_id={} revision={} items={}",
            project_id,
            revision,
            snapshot.len()
        );
        revision
    }

    /// Writes the latest staged snapshot for `project_id`.
    ///
    /// Writes are serialized; when the latest revision is already durable the
    /// previous outcome is returned without touching storage.
    pub fn persist_latest(&self, project_id: &str) -> SaveOutcome {
        let _write_guard = self
            .write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let (revision, snapshot) = {
            let state = self.lock_state();
            let Some(entry) = state.cache.get(project_id) else {
                return SaveOutcome::Failed {
                    message: format!("nothing staged for project {project_id}"),
                };
            };
            if let Some(record) = state.writes.get(project_id) {
                if record.persisted_revision >= entry.requested_revision {
                    if let Some(outcome) = &record.last_outcome {
                        debug!(
                            "event=canvas_save module=persistence status=coalesced project_id={} revision={}",
                            project_id, entry.requested_revision
                        );
                        return outcome.clone();
                    }
                }
            }
            (entry.requested_revision, entry.snapshot.clone())
        };

        let started_at = Instant::now();
        let outcome = self.write_through(project_id, &snapshot);
        let log_line = format!(
            "event=canvas_save module=persistence status={} project_id={} revision={} items={} duration_ms={}",
            outcome.status_label(),
            project_id,
            revision,
            snapshot.len(),
            started_at.elapsed().as_millis()
        );
        match &outcome {
            SaveOutcome::Remote | SaveOutcome::LocalOnly => info!("{log_line}"),
            SaveOutcome::LocalFallback { .. } => warn!("{log_line}"),
            SaveOutcome::Failed { .. } => error!("{log_line}"),
        }

        let mut state = self.lock_state();
        let record = state.writes.entry(project_id.to_string()).or_default();
        if outcome.is_durable() && revision > record.persisted_revision {
            record.persisted_revision = revision;
        }
        record.last_outcome = Some(outcome.clone());
        outcome
    }

    /// Loads a project's canvas: cache, then remote, then local, then empty.
    pub fn load(&self, project_id: &str) -> CanvasSnapshot {
        self.load_traced(project_id).0
    }

    /// Same as [`Self::load`], also reporting which tier answered.
    pub fn load_traced(&self, project_id: &str) -> (CanvasSnapshot, LoadSource) {
        if let Some(entry) = self.lock_state().cache.get(project_id) {
            debug!("event=canvas_load module=persistence source=cache project_id={project_id}");
            return (entry.snapshot.clone(), LoadSource::Cache);
        }

        let (snapshot, source) = match self.read_remote(project_id) {
            Some(snapshot) => (snapshot, LoadSource::Remote),
            None => match self.read_local(project_id) {
                Some(snapshot) => (snapshot, LoadSource::Local),
                None => (CanvasSnapshot::default(), LoadSource::Empty),
            },
        };

        info!(
            "event=canvas_load module=persistence source={:?} project_id={} items={}",
            source,
            project_id,
            snapshot.len()
        );

        if source != LoadSource::Empty {
            let mut state = self.lock_state();
            state
                .cache
                .entry(project_id.to_string())
                .or_insert_with(|| CacheEntry {
                    snapshot: snapshot.clone(),
                    requested_revision: 0,
                });
        }
        (snapshot, source)
    }

    /// Returns a deep copy of the cached snapshot, if any.
    pub fn cached(&self, project_id: &str) -> Option<CanvasSnapshot> {
        self.lock_state()
            .cache
            .get(project_id)
            .map(|entry| entry.snapshot.clone())
    }

    /// Drops every cached snapshot, e.g. after the signed-in user changes.
    pub fn clear_cache(&self) {
        self.lock_state().cache.clear();
    }

    fn write_through(&self, project_id: &str, snapshot: &CanvasSnapshot) -> SaveOutcome {
        let Some(remote) = &self.remote else {
            return match self.write_local(project_id, snapshot) {
                Ok(()) => SaveOutcome::LocalOnly,
                Err(err) => SaveOutcome::Failed {
                    message: format!("local store: {err}"),
                },
            };
        };

        let owner_id = self.owner_id.as_deref();
        let remote_err = match upsert_remote(remote.as_ref(), project_id, owner_id, snapshot) {
            Ok(()) => return SaveOutcome::Remote,
            Err(err) => err,
        };

        warn!(
            "event=canvas_save module=persistence status=remote_error project_id={} error={}",
            project_id, remote_err
        );
        match self.write_local(project_id, snapshot) {
            Ok(()) => SaveOutcome::LocalFallback {
                reason: remote_err.to_string(),
            },
            Err(local_err) => SaveOutcome::Failed {
                message: format!("remote store: {remote_err}; local store: {local_err}"),
            },
        }
    }

    fn write_local(&self, project_id: &str, snapshot: &CanvasSnapshot) -> RepoResult<()> {
        let blob = snapshot.to_json()?;
        self.local.put(&canvas_key(project_id), &blob)
    }

    fn read_remote(&self, project_id: &str) -> Option<CanvasSnapshot> {
        let remote = self.remote.as_ref()?;
        match remote.find_canvas(project_id) {
            Ok(row) => row.map(|row| row.snapshot),
            Err(err) => {
                warn!(
                    "event=canvas_load module=persistence status=remote_error project_id={} error={}",
                    project_id, err
                );
                None
            }
        }
    }

    fn read_local(&self, project_id: &str) -> Option<CanvasSnapshot> {
        let raw = match self.local.get(&canvas_key(project_id)) {
            Ok(raw) => raw?,
            Err(err) => {
                warn!(
                    "event=canvas_load module=persistence status=local_error project_id={} error={}",
                    project_id, err
                );
                return None;
            }
        };
        match CanvasSnapshot::from_json(&raw) {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                warn!(
                    "event=canvas_load module=persistence status=local_invalid project_id={} error={}",
                    project_id, err
                );
                None
            }
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, GatewayState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Check-then-insert-or-update, retrying as update on an insert conflict.
fn upsert_remote(
    remote: &dyn CanvasRepository,
    project_id: &str,
    owner_id: Option<&str>,
    snapshot: &CanvasSnapshot,
) -> RepoResult<()> {
    if remote.find_canvas(project_id)?.is_some() {
        return remote.update_canvas(project_id, snapshot);
    }
    match remote.insert_canvas(project_id, owner_id, snapshot) {
        Err(RepoError::Conflict(_)) => remote.update_canvas(project_id, snapshot),
        other => other,
    }
}
