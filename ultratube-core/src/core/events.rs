use chrono::{DateTime, Local};
use serde::Serialize;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum JobStatus {
    /// Held back by the schedule gate.
    Pending,
    /// Released by the gate, waiting for a worker slot.
    Queued,
    Running,
    Finished,
    Errored { message: String },
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Finished | JobStatus::Errored { .. })
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Queued,
    Downloading,
    Finished,
    Errored,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProgressRecord {
    pub status: ProgressStatus,
    pub percentage: f64,
    pub speed: String,
    pub eta: String,
    pub title: String,
    pub filename: Option<String>,
}

impl ProgressRecord {
    pub fn new(status: ProgressStatus) -> Self {
        Self {
            status,
            percentage: 0.0,
            speed: "0B/s".to_string(),
            eta: "00:00".to_string(),
            title: "Unknown".to_string(),
            filename: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobInfo {
    pub id: u64,
    pub url: String,
    pub title: String,
    pub status: JobStatus,
    pub percent: f64,
    pub speed: String,
    pub eta: String,
    pub file_path: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionCheck {
    pub url: String,
    pub title: Option<String>,
    pub checked_at: DateTime<Local>,
    /// Always `None`: duplicates are filtered by the download archive, so
    /// the number of genuinely new entries is not known here.
    pub new_items: Option<u32>,
}

#[derive(Debug, Clone)]
pub enum AppEvent {
    QueueState(Vec<JobInfo>),
    Progress { job_id: u64, record: ProgressRecord },
    SubscriptionChecked(SubscriptionCheck),
}

pub trait EventEmitter: Send + Sync + 'static {
    fn emit_queue_state(&self, items: &[JobInfo]);
    fn emit_progress(&self, job_id: u64, record: &ProgressRecord);
    fn emit_subscription_checked(&self, _check: &SubscriptionCheck) {}
}

/// Forwards every event into an unbounded channel drained by the task that
/// owns the UI (or console). Sends never block and failures are ignored.
#[derive(Clone)]
pub struct ChannelEmitter {
    tx: mpsc::UnboundedSender<AppEvent>,
}

impl ChannelEmitter {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<AppEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventEmitter for ChannelEmitter {
    fn emit_queue_state(&self, items: &[JobInfo]) {
        let _ = self.tx.send(AppEvent::QueueState(items.to_vec()));
    }

    fn emit_progress(&self, job_id: u64, record: &ProgressRecord) {
        let _ = self.tx.send(AppEvent::Progress {
            job_id,
            record: record.clone(),
        });
    }

    fn emit_subscription_checked(&self, check: &SubscriptionCheck) {
        let _ = self.tx.send(AppEvent::SubscriptionChecked(check.clone()));
    }
}

#[derive(Clone, Copy, Default)]
pub struct NoopEmitter;

impl EventEmitter for NoopEmitter {
    fn emit_queue_state(&self, _items: &[JobInfo]) {}
    fn emit_progress(&self, _job_id: u64, _record: &ProgressRecord) {}
}
