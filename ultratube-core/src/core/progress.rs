use std::sync::Arc;

use super::events::{EventEmitter, ProgressRecord, ProgressStatus};

/// One progress callback as reported by the extraction tool, before
/// normalization. Every field is the tool's own display string.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawProgress {
    pub status: String,
    pub percent: Option<String>,
    pub speed: Option<String>,
    pub eta: Option<String>,
    pub title: Option<String>,
    pub filename: Option<String>,
}

/// Turns raw callbacks into [`ProgressRecord`]s for a single job and hands
/// them to the registered observer, if any.
#[derive(Clone)]
pub struct ProgressRelay {
    job_id: u64,
    emitter: Option<Arc<dyn EventEmitter>>,
}

impl ProgressRelay {
    pub fn new(job_id: u64, emitter: Arc<dyn EventEmitter>) -> Self {
        Self {
            job_id,
            emitter: Some(emitter),
        }
    }

    pub fn detached(job_id: u64) -> Self {
        Self {
            job_id,
            emitter: None,
        }
    }

    pub fn job_id(&self) -> u64 {
        self.job_id
    }

    pub fn relay(&self, raw: &RawProgress) -> ProgressRecord {
        let record = normalize(raw);
        self.forward(&record);
        record
    }

    pub fn queued(&self, title: &str) -> ProgressRecord {
        let mut record = ProgressRecord::new(ProgressStatus::Queued);
        record.title = title.to_string();
        self.forward(&record);
        record
    }

    /// Final record once the job is done and the output has its final name.
    pub fn finished(&self, title: &str, filename: Option<String>) -> ProgressRecord {
        let mut record = ProgressRecord::new(ProgressStatus::Finished);
        record.title = title.to_string();
        record.percentage = 100.0;
        record.filename = filename;
        self.forward(&record);
        record
    }

    pub fn errored(&self, title: &str) -> ProgressRecord {
        let mut record = ProgressRecord::new(ProgressStatus::Errored);
        record.title = title.to_string();
        self.forward(&record);
        record
    }

    fn forward(&self, record: &ProgressRecord) {
        if let Some(emitter) = &self.emitter {
            emitter.emit_progress(self.job_id, record);
        }
    }
}

pub fn normalize(raw: &RawProgress) -> ProgressRecord {
    let status = match raw.status.trim() {
        "finished" => ProgressStatus::Finished,
        "error" | "errored" => ProgressStatus::Errored,
        _ => ProgressStatus::Downloading,
    };

    let mut record = ProgressRecord::new(status);

    if let Some(title) = non_empty(raw.title.as_deref()) {
        record.title = title.to_string();
    }

    match status {
        ProgressStatus::Downloading => {
            record.percentage = raw
                .percent
                .as_deref()
                .map(parse_percent)
                .unwrap_or(0.0);
            record.speed = non_empty(raw.speed.as_deref())
                .unwrap_or("N/A")
                .to_string();
            record.eta = non_empty(raw.eta.as_deref()).unwrap_or("N/A").to_string();
        }
        ProgressStatus::Finished => {
            record.percentage = 100.0;
            record.filename = non_empty(raw.filename.as_deref()).map(|s| s.to_string());
        }
        _ => {}
    }

    record
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty() && *v != "NA")
}

fn parse_percent(value: &str) -> f64 {
    value
        .replace('%', "")
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|p| p.is_finite())
        .map(|p| p.clamp(0.0, 100.0))
        .unwrap_or(0.0)
}
