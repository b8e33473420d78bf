use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use ultratube_core::backend::MediaBackend;
use ultratube_core::core::events::{EventEmitter, JobInfo, JobStatus, ProgressRecord, ProgressStatus};
use ultratube_core::core::progress::ProgressRelay;
use ultratube_core::core::schedule::{Clock, ScheduleWindow, SystemClock};
use ultratube_core::models::job::DownloadJob;
use ultratube_core::models::settings::{AppConfig, MAX_CONCURRENT, MIN_CONCURRENT};

pub const DEFAULT_GATE_INTERVAL: Duration = Duration::from_secs(10);
const DEFAULT_STAGGER_MS: u64 = 150;

pub struct QueueItem {
    pub id: u64,
    pub job: DownloadJob,
    pub title: String,
    pub status: JobStatus,
    pub cancel_token: CancellationToken,
    pub percent: f64,
    pub speed: String,
    pub eta: String,
    pub file_path: Option<String>,
}

impl QueueItem {
    pub fn to_info(&self) -> JobInfo {
        JobInfo {
            id: self.id,
            url: self.job.url.clone(),
            title: self.title.clone(),
            status: self.status.clone(),
            percent: self.percent,
            speed: self.speed.clone(),
            eta: self.eta.clone(),
            file_path: self.file_path.clone(),
        }
    }
}

pub struct DownloadQueue {
    pub items: Vec<QueueItem>,
    pub max_concurrent: u32,
    pub stagger_delay_ms: u64,
    pub schedule: ScheduleWindow,
    next_id: u64,
}

impl DownloadQueue {
    pub fn new(max_concurrent: u32, schedule: ScheduleWindow) -> Self {
        Self {
            items: Vec::new(),
            max_concurrent: max_concurrent.clamp(MIN_CONCURRENT, MAX_CONCURRENT),
            stagger_delay_ms: DEFAULT_STAGGER_MS,
            schedule,
            next_id: 1,
        }
    }

    /// Jobs submitted while the gate is closed wait as `Pending`.
    pub fn enqueue(&mut self, job: DownloadJob, gate_open: bool) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        let title = job.url.clone();
        self.items.push(QueueItem {
            id,
            job,
            title,
            status: if gate_open {
                JobStatus::Queued
            } else {
                JobStatus::Pending
            },
            cancel_token: CancellationToken::new(),
            percent: 0.0,
            speed: String::new(),
            eta: String::new(),
            file_path: None,
        });
        id
    }

    pub fn get(&self, id: u64) -> Option<&QueueItem> {
        self.items.iter().find(|i| i.id == id)
    }

    pub fn running_count(&self) -> u32 {
        self.items
            .iter()
            .filter(|i| i.status == JobStatus::Running)
            .count() as u32
    }

    pub fn next_queued_ids(&self) -> Vec<u64> {
        let slots = self.max_concurrent.saturating_sub(self.running_count()) as usize;
        self.items
            .iter()
            .filter(|i| i.status == JobStatus::Queued)
            .take(slots)
            .map(|i| i.id)
            .collect()
    }

    pub fn mark_running(&mut self, id: u64) {
        if let Some(item) = self.items.iter_mut().find(|i| i.id == id) {
            item.status = JobStatus::Running;
        }
    }

    pub fn mark_finished(&mut self, id: u64, file_path: Option<String>) {
        if let Some(item) = self.items.iter_mut().find(|i| i.id == id) {
            item.status = JobStatus::Finished;
            item.percent = 100.0;
            item.file_path = file_path;
            item.speed.clear();
            item.eta.clear();
        }
    }

    pub fn mark_errored(&mut self, id: u64, message: String) {
        if let Some(item) = self.items.iter_mut().find(|i| i.id == id) {
            item.status = JobStatus::Errored { message };
            item.speed.clear();
            item.eta.clear();
        }
    }

    pub fn update_progress(&mut self, id: u64, record: &ProgressRecord) {
        if let Some(item) = self.items.iter_mut().find(|i| i.id == id) {
            if item.status != JobStatus::Running {
                return;
            }
            if record.title != "Unknown" {
                item.title = record.title.clone();
            }
            if record.status == ProgressStatus::Downloading {
                item.percent = record.percentage;
                item.speed = record.speed.clone();
                item.eta = record.eta.clone();
            }
        }
    }

    /// Gate opened: every held job becomes eligible at once.
    pub fn release_pending(&mut self) -> usize {
        let mut released = 0;
        for item in self.items.iter_mut().filter(|i| i.status == JobStatus::Pending) {
            item.status = JobStatus::Queued;
            released += 1;
        }
        released
    }

    /// Gate closed: jobs not yet admitted go back to waiting.
    pub fn hold_queued(&mut self) -> usize {
        let mut held = 0;
        for item in self.items.iter_mut().filter(|i| i.status == JobStatus::Queued) {
            item.status = JobStatus::Pending;
            held += 1;
        }
        held
    }

    pub fn remove(&mut self, id: u64) -> bool {
        if let Some(pos) = self.items.iter().position(|i| i.id == id) {
            let item = self.items.remove(pos);
            item.cancel_token.cancel();
            return true;
        }
        false
    }

    pub fn clear_finished(&mut self) {
        self.items.retain(|i| !i.status.is_terminal());
    }

    pub fn get_state(&self) -> Vec<JobInfo> {
        self.items.iter().map(|i| i.to_info()).collect()
    }

    pub fn has_url(&self, url: &str) -> bool {
        self.items
            .iter()
            .any(|i| i.job.url == url && !i.status.is_terminal())
    }

    pub fn is_idle(&self) -> bool {
        self.items.iter().all(|i| i.status.is_terminal())
    }
}

/// Everything a worker task needs, cheap to clone into spawned tasks.
#[derive(Clone)]
pub struct QueueContext {
    pub queue: Arc<Mutex<DownloadQueue>>,
    pub backend: Arc<dyn MediaBackend>,
    pub emitter: Arc<dyn EventEmitter>,
    pub clock: Arc<dyn Clock>,
}

impl QueueContext {
    pub fn new(
        backend: Arc<dyn MediaBackend>,
        emitter: Arc<dyn EventEmitter>,
        max_concurrent: u32,
        schedule: ScheduleWindow,
    ) -> Self {
        Self::with_clock(backend, emitter, max_concurrent, schedule, Arc::new(SystemClock))
    }

    pub fn with_clock(
        backend: Arc<dyn MediaBackend>,
        emitter: Arc<dyn EventEmitter>,
        max_concurrent: u32,
        schedule: ScheduleWindow,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            queue: Arc::new(Mutex::new(DownloadQueue::new(max_concurrent, schedule))),
            backend,
            emitter,
            clock,
        }
    }

    fn gate_open(&self, queue: &DownloadQueue) -> bool {
        queue.schedule.is_within_schedule(self.clock.now())
    }
}

fn emit_queue_state(ctx: &QueueContext, queue: &DownloadQueue) {
    ctx.emitter.emit_queue_state(&queue.get_state());
}

pub async fn submit(ctx: &QueueContext, job: DownloadJob) -> u64 {
    let url = job.url.clone();
    let id = {
        let mut q = ctx.queue.lock().await;
        let open = ctx.gate_open(&q);
        let id = q.enqueue(job, open);
        if !open {
            tracing::info!("Outside schedule window, holding job {} ({})", id, url);
        }
        emit_queue_state(ctx, &q);
        id
    };
    ProgressRelay::new(id, ctx.emitter.clone()).queued(&url);
    try_start_next(ctx.clone()).await;
    id
}

pub async fn remove(ctx: &QueueContext, id: u64) -> bool {
    let removed = {
        let mut q = ctx.queue.lock().await;
        let removed = q.remove(id);
        if removed {
            emit_queue_state(ctx, &q);
        }
        removed
    };
    if removed {
        try_start_next(ctx.clone()).await;
    }
    removed
}

pub async fn clear_finished(ctx: &QueueContext) {
    let mut q = ctx.queue.lock().await;
    q.clear_finished();
    emit_queue_state(ctx, &q);
}

pub async fn snapshot(ctx: &QueueContext) -> Vec<JobInfo> {
    ctx.queue.lock().await.get_state()
}

pub async fn set_max_concurrent(ctx: &QueueContext, max_concurrent: u32) {
    {
        let mut q = ctx.queue.lock().await;
        q.max_concurrent = max_concurrent.clamp(MIN_CONCURRENT, MAX_CONCURRENT);
    }
    try_start_next(ctx.clone()).await;
}

pub async fn set_schedule(ctx: &QueueContext, schedule: ScheduleWindow) {
    ctx.queue.lock().await.schedule = schedule;
    tick_gate(ctx).await;
}

/// Applies the runtime-tunable settings of a reloaded config. An invalid
/// schedule leaves both the limit and the window unchanged.
pub async fn apply_config(ctx: &QueueContext, config: &AppConfig) -> anyhow::Result<()> {
    let schedule = config.schedule()?;
    set_max_concurrent(ctx, config.concurrency_limit()).await;
    set_schedule(ctx, schedule).await;
    tracing::info!(
        "Queue settings applied: max_concurrent={}, schedule enabled={}",
        config.concurrency_limit(),
        schedule.enabled
    );
    Ok(())
}

/// Re-evaluates the schedule gate and dispatches whatever it admits.
pub async fn tick_gate(ctx: &QueueContext) {
    {
        let mut q = ctx.queue.lock().await;
        let changed = if ctx.gate_open(&q) {
            let released = q.release_pending();
            if released > 0 {
                tracing::info!("Schedule window open, releasing {} job(s)", released);
            }
            released
        } else {
            let held = q.hold_queued();
            if held > 0 {
                tracing::info!("Schedule window closed, holding {} job(s)", held);
            }
            held
        };
        if changed > 0 {
            emit_queue_state(ctx, &q);
        }
    }
    try_start_next(ctx.clone()).await;
}

pub fn spawn_gate_timer(
    ctx: QueueContext,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => tick_gate(&ctx).await,
            }
        }
        tracing::debug!("Schedule gate timer stopped");
    })
}

/// Admits queued jobs up to the concurrency limit. Nothing is admitted
/// while the schedule gate is closed.
pub async fn try_start_next(ctx: QueueContext) {
    let (next_ids, stagger) = {
        let mut q = ctx.queue.lock().await;
        if !ctx.gate_open(&q) {
            return;
        }
        let ids = q.next_queued_ids();
        for id in &ids {
            q.mark_running(*id);
        }
        if !ids.is_empty() {
            emit_queue_state(&ctx, &q);
        }
        (ids, q.stagger_delay_ms)
    };

    for (i, id) in next_ids.into_iter().enumerate() {
        if i > 0 && stagger > 0 {
            tokio::time::sleep(Duration::from_millis(stagger)).await;
        }
        tokio::spawn(run_job(ctx.clone(), id));
    }
}

fn run_job(ctx: QueueContext, id: u64) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    Box::pin(async move {
        run_job_inner(ctx, id).await;
    })
}

/// Relays progress to the outer observer and mirrors it into the queue.
struct ProgressTap {
    outer: Arc<dyn EventEmitter>,
    tx: mpsc::UnboundedSender<ProgressRecord>,
}

impl EventEmitter for ProgressTap {
    fn emit_queue_state(&self, items: &[JobInfo]) {
        self.outer.emit_queue_state(items);
    }

    fn emit_progress(&self, job_id: u64, record: &ProgressRecord) {
        self.outer.emit_progress(job_id, record);
        let _ = self.tx.send(record.clone());
    }
}

async fn run_job_inner(ctx: QueueContext, id: u64) {
    let (job, cancel_token) = {
        let q = ctx.queue.lock().await;
        match q.get(id) {
            Some(item) => (item.job.clone(), item.cancel_token.clone()),
            None => return,
        }
    };

    let (tx, mut rx) = mpsc::unbounded_channel::<ProgressRecord>();
    let relay = ProgressRelay::new(
        id,
        Arc::new(ProgressTap {
            outer: ctx.emitter.clone(),
            tx,
        }),
    );

    let queue_progress = ctx.queue.clone();
    let progress_forwarder = tokio::spawn(async move {
        while let Some(record) = rx.recv().await {
            queue_progress.lock().await.update_progress(id, &record);
        }
    });

    let result = tokio::select! {
        r = ctx.backend.download(&job, &relay) => r,
        _ = cancel_token.cancelled() => Err(anyhow!("Download cancelled")),
    };

    drop(relay);
    let _ = progress_forwarder.await;

    {
        let mut q = ctx.queue.lock().await;
        let Some(title) = q.get(id).map(|item| item.title.clone()) else {
            tracing::info!("Job {} was removed while running ({})", id, job.url);
            drop(q);
            try_start_next(ctx).await;
            return;
        };

        let relay = ProgressRelay::new(id, ctx.emitter.clone());
        match result {
            Ok(outcome) => {
                let file_path = outcome
                    .file_path
                    .map(|p| p.to_string_lossy().to_string());
                q.mark_finished(id, file_path.clone());
                relay.finished(&title, file_path);
            }
            Err(e) => {
                let message = e.to_string();
                tracing::error!(
                    "{} download failed for {}: {}",
                    ctx.backend.name(),
                    job.url,
                    message
                );
                q.mark_errored(id, message);
                relay.errored(&title);
            }
        }
        emit_queue_state(&ctx, &q);
    }

    try_start_next(ctx).await;
}
