//! Per-file and per-group transfer progress.
//!
//! All state lives in [`TrackerState`], owned by a single task. Upload
//! callbacks and queries reach it through [`ProgressTracker`], a cheap
//! cloneable handle that sends [`Command`]s over an unbounded channel.
//! Because the channel is FIFO, a query sent after an upload returned
//! observes every progress event that upload produced.

use crate::{
    errors::{FileHubError, FileHubResult},
    store::ProgressSink,
};
use std::collections::{HashMap, hash_map::Entry};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};
use uuid::Uuid;

#[derive(Debug)]
struct GroupState {
    members: Vec<Uuid>,
    percents: HashMap<Uuid, u8>,
}

impl GroupState {
    fn aggregate(&self) -> u8 {
        if self.members.is_empty() {
            return 100;
        }
        let sum: u64 = self
            .members
            .iter()
            .map(|id| u64::from(self.percents.get(id).copied().unwrap_or(0)))
            .sum();
        (sum / self.members.len() as u64) as u8
    }
}

/// In-flight groups keyed by their `{owner}/{group}` prefix.
///
/// A prefix is present exactly while its group upload is running.
#[derive(Debug, Default)]
pub struct TrackerState {
    groups: HashMap<String, GroupState>,
}

impl TrackerState {
    /// Register an upload of `file_ids` under `prefix`; every file starts at 0.
    pub fn begin(&mut self, prefix: &str, file_ids: &[Uuid]) -> FileHubResult<()> {
        match self.groups.entry(prefix.to_string()) {
            Entry::Occupied(_) => Err(FileHubError::GroupUploadInProgress(prefix.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(GroupState {
                    members: file_ids.to_vec(),
                    percents: file_ids.iter().map(|id| (*id, 0)).collect(),
                });
                Ok(())
            }
        }
    }

    /// Apply one progress event. Returns the group aggregate, or `None` when
    /// the group is not (or no longer) tracked.
    ///
    /// Percentages never go backwards. When the aggregate reaches 100 the
    /// group and all of its file entries are dropped.
    pub fn record(&mut self, prefix: &str, file_id: Uuid, percent: u8) -> Option<u8> {
        let group = self.groups.get_mut(prefix)?;
        let slot = group.percents.get_mut(&file_id)?;
        *slot = (*slot).max(percent.min(100));

        let aggregate = group.aggregate();
        if aggregate == 100 {
            self.groups.remove(prefix);
            debug!(prefix, "group transfer complete");
        }
        Some(aggregate)
    }

    /// Forget a group regardless of its progress.
    pub fn release(&mut self, prefix: &str) -> bool {
        self.groups.remove(prefix).is_some()
    }

    pub fn file_progress(&self, prefix: &str, file_id: Uuid) -> FileHubResult<u8> {
        let group = self
            .groups
            .get(prefix)
            .ok_or(FileHubError::GroupAlreadyTransferred)?;
        match group.percents.get(&file_id) {
            Some(&percent) if percent < 100 => Ok(percent),
            _ => Err(FileHubError::FileAlreadyTransferred),
        }
    }

    pub fn group_progress(&self, prefix: &str) -> FileHubResult<u8> {
        self.groups
            .get(prefix)
            .map(GroupState::aggregate)
            .ok_or(FileHubError::GroupAlreadyTransferred)
    }
}

#[derive(Debug)]
enum Command {
    Begin {
        prefix: String,
        file_ids: Vec<Uuid>,
        reply: oneshot::Sender<FileHubResult<()>>,
    },
    Progress {
        prefix: String,
        file_id: Uuid,
        percent: u8,
    },
    Release {
        prefix: String,
    },
    FileProgress {
        prefix: String,
        file_id: Uuid,
        reply: oneshot::Sender<FileHubResult<u8>>,
    },
    GroupProgress {
        prefix: String,
        reply: oneshot::Sender<FileHubResult<u8>>,
    },
}

/// Handle to the progress actor.
#[derive(Clone, Debug)]
pub struct ProgressTracker {
    tx: mpsc::UnboundedSender<Command>,
}

impl ProgressTracker {
    /// Start the actor on the current runtime.
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(rx));
        Self { tx }
    }

    /// False once the actor task is gone.
    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }

    pub async fn begin(&self, prefix: &str, file_ids: Vec<Uuid>) -> FileHubResult<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Begin {
            prefix: prefix.to_string(),
            file_ids,
            reply,
        })?;
        rx.await.map_err(|_| FileHubError::TrackerUnavailable)?
    }

    pub fn release(&self, prefix: &str) {
        let _ = self.send(Command::Release {
            prefix: prefix.to_string(),
        });
    }

    pub async fn file_progress(&self, prefix: &str, file_id: Uuid) -> FileHubResult<u8> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::FileProgress {
            prefix: prefix.to_string(),
            file_id,
            reply,
        })?;
        rx.await.map_err(|_| FileHubError::TrackerUnavailable)?
    }

    pub async fn group_progress(&self, prefix: &str) -> FileHubResult<u8> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::GroupProgress {
            prefix: prefix.to_string(),
            reply,
        })?;
        rx.await.map_err(|_| FileHubError::TrackerUnavailable)?
    }

    /// Sink that forwards a single file's progress into this tracker.
    pub fn reporter(&self, prefix: &str, file_id: Uuid) -> ProgressReporter {
        ProgressReporter {
            tracker: self.clone(),
            prefix: prefix.to_string(),
            file_id,
        }
    }

    fn send(&self, command: Command) -> FileHubResult<()> {
        self.tx
            .send(command)
            .map_err(|_| FileHubError::TrackerUnavailable)
    }
}

async fn run(mut rx: mpsc::UnboundedReceiver<Command>) {
    let mut state = TrackerState::default();
    while let Some(command) = rx.recv().await {
        match command {
            Command::Begin {
                prefix,
                file_ids,
                reply,
            } => {
                let _ = reply.send(state.begin(&prefix, &file_ids));
            }
            Command::Progress {
                prefix,
                file_id,
                percent,
            } => {
                if let Some(aggregate) = state.record(&prefix, file_id, percent) {
                    trace!(%prefix, %file_id, percent, aggregate, "progress");
                }
            }
            Command::Release { prefix } => {
                if state.release(&prefix) {
                    debug!(%prefix, "released unfinished group");
                }
            }
            Command::FileProgress {
                prefix,
                file_id,
                reply,
            } => {
                let _ = reply.send(state.file_progress(&prefix, file_id));
            }
            Command::GroupProgress { prefix, reply } => {
                let _ = reply.send(state.group_progress(&prefix));
            }
        }
    }
    debug!("progress tracker stopped");
}

/// [`ProgressSink`] bound to one file of one group.
#[derive(Clone, Debug)]
pub struct ProgressReporter {
    tracker: ProgressTracker,
    prefix: String,
    file_id: Uuid,
}

impl ProgressSink for ProgressReporter {
    fn report(&self, percent: u8) {
        let _ = self.tracker.send(Command::Progress {
            prefix: self.prefix.clone(),
            file_id: self.file_id,
            percent,
        });
    }
}
