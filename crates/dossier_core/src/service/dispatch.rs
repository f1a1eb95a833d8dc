//! Background save dispatcher.
//!
//! # Responsibility
//! - Run canvas writes off the caller's thread so edits never wait on I/O.
//! - Coalesce bursts of saves per project into one write of the latest state.
//! - Provide a bounded `flush` used before navigating away from a project.
//!
//! # Invariants
//! - Staging (cache update) happens synchronously in `submit`/`flush`; only
//!   the storage write is deferred.
//! - Each job carries the project id captured at submit time.
//! - When the worker cannot be started or has stopped, writes run inline.

use crate::model::canvas::CanvasSnapshot;
use crate::service::persistence::{PersistenceGateway, SaveOutcome};
use log::{error, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

/// Transient save indicator shown by the shell.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SaveStatus {
    #[default]
    Idle,
    Saving,
    Success(String),
    Error(String),
}

/// Failure of a bounded flush.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushError {
    /// The write did not complete within the allowed time.
    Timeout(Duration),
    /// The write completed but reached no durable store.
    Failed(String),
    /// The worker thread is gone and the acknowledgement was lost.
    WorkerStopped,
}

impl Display for FlushError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout(limit) => {
                write!(f, "canvas save did not finish within {} ms", limit.as_millis())
            }
            Self::Failed(message) => write!(f, "canvas save failed: {message}"),
            Self::WorkerStopped => write!(f, "canvas save worker stopped"),
        }
    }
}

impl Error for FlushError {}

enum SaveJob {
    Save {
        project_id: String,
    },
    Flush {
        project_id: String,
        ack: Sender<SaveOutcome>,
    },
}

/// Fire-and-forget canvas saves with a bounded flush.
pub struct SaveDispatcher {
    gateway: Arc<PersistenceGateway>,
    sender: Option<Sender<SaveJob>>,
    status: Arc<Mutex<SaveStatus>>,
}

impl SaveDispatcher {
    /// Starts the worker thread. Falls back to inline writes if it cannot
    /// be spawned.
    pub fn start(gateway: Arc<PersistenceGateway>) -> Self {
        let status = Arc::new(Mutex::new(SaveStatus::Idle));
        let (sender, receiver) = mpsc::channel();
        let worker_gateway = Arc::clone(&gateway);
        let worker_status = Arc::clone(&status);
        let spawned = thread::Builder::new()
            .name("dossier-save".to_string())
            .spawn(move || run_worker(worker_gateway, receiver, worker_status));

        let sender = match spawned {
            Ok(_) => Some(sender),
            Err(err) => {
                error!("event=save_worker_start module=dispatch status=error error={err}");
                None
            }
        };

        Self {
            gateway,
            sender,
            status,
        }
    }

    /// Dispatcher that writes on the caller's thread.
    pub fn inline(gateway: Arc<PersistenceGateway>) -> Self {
        Self {
            gateway,
            sender: None,
            status: Arc::new(Mutex::new(SaveStatus::Idle)),
        }
    }

    pub fn gateway(&self) -> &Arc<PersistenceGateway> {
        &self.gateway
    }

    /// Stages `snapshot` and schedules a write without waiting for it.
    pub fn submit(&self, project_id: &str, snapshot: &CanvasSnapshot) {
        self.gateway.stage(project_id, snapshot);
        set_status(&self.status, SaveStatus::Saving);

        let job = SaveJob::Save {
            project_id: project_id.to_string(),
        };
        if self.send(job).is_err() {
            let outcome = self.gateway.persist_latest(project_id);
            set_status(&self.status, status_for(&outcome));
        }
    }

    /// Stages `snapshot` and waits up to `timeout` for it to become durable.
    pub fn flush(
        &self,
        project_id: &str,
        snapshot: &CanvasSnapshot,
        timeout: Duration,
    ) -> Result<SaveOutcome, FlushError> {
        self.gateway.stage(project_id, snapshot);
        set_status(&self.status, SaveStatus::Saving);

        let (ack, ack_rx) = mpsc::channel();
        let job = SaveJob::Flush {
            project_id: project_id.to_string(),
            ack,
        };
        let outcome = match self.send(job) {
            Ok(()) => match ack_rx.recv_timeout(timeout) {
                Ok(outcome) => outcome,
                Err(RecvTimeoutError::Timeout) => {
                    warn!(
                        "event=canvas_flush module=dispatch status=timeout project_id={} timeout_ms={}",
                        project_id,
                        timeout.as_millis()
                    );
                    set_status(
                        &self.status,
                        SaveStatus::Error("canvas save timed out".to_string()),
                    );
                    return Err(FlushError::Timeout(timeout));
                }
                Err(RecvTimeoutError::Disconnected) => return Err(FlushError::WorkerStopped),
            },
            Err(_) => {
                let outcome = self.gateway.persist_latest(project_id);
                set_status(&self.status, status_for(&outcome));
                outcome
            }
        };

        match outcome {
            SaveOutcome::Failed { message } => Err(FlushError::Failed(message)),
            durable => Ok(durable),
        }
    }

    pub fn status(&self) -> SaveStatus {
        self.status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Clears the indicator once the shell has shown it.
    pub fn acknowledge_status(&self) {
        set_status(&self.status, SaveStatus::Idle);
    }

    fn send(&self, job: SaveJob) -> Result<(), mpsc::SendError<SaveJob>> {
        match &self.sender {
            Some(sender) => sender.send(job),
            None => Err(mpsc::SendError(job)),
        }
    }
}

fn run_worker(
    gateway: Arc<PersistenceGateway>,
    receiver: Receiver<SaveJob>,
    status: Arc<Mutex<SaveStatus>>,
) {
    while let Ok(first) = receiver.recv() {
        let mut projects: Vec<String> = Vec::new();
        let mut acks: Vec<(String, Sender<SaveOutcome>)> = Vec::new();

        for job in std::iter::once(first).chain(receiver.try_iter()) {
            let project_id = match job {
                SaveJob::Save { project_id } => project_id,
                SaveJob::Flush { project_id, ack } => {
                    acks.push((project_id.clone(), ack));
                    project_id
                }
            };
            if !projects.contains(&project_id) {
                projects.push(project_id);
            }
        }

        for project_id in projects {
            let outcome = gateway.persist_latest(&project_id);
            set_status(&status, status_for(&outcome));
            for (_, ack) in acks.iter().filter(|(id, _)| *id == project_id) {
                // Receiver may have timed out already.
                let _ = ack.send(outcome.clone());
            }
        }
    }
}

fn status_for(outcome: &SaveOutcome) -> SaveStatus {
    match outcome {
        SaveOutcome::Remote | SaveOutcome::LocalOnly => {
            SaveStatus::Success("canvas saved".to_string())
        }
        SaveOutcome::LocalFallback { .. } => {
            SaveStatus::Error("save failed, kept a local copy".to_string())
        }
        SaveOutcome::Failed { message } => SaveStatus::Error(message.clone()),
    }
}

fn set_status(status: &Mutex<SaveStatus>, next: SaveStatus) {
    *status.lock().unwrap_or_else(PoisonError::into_inner) = next;
}
