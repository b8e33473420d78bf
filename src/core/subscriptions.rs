use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use chrono::Local;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use ultratube_core::core::events::SubscriptionCheck;
use ultratube_core::fs_paths::AppPaths;
use ultratube_core::models::settings::{AppConfig, Subscription};

use crate::core::metadata::MetadataFetcher;
use crate::core::queue::{self, QueueContext};
use crate::core::ytdlp;

pub const GATE_RETRY_INTERVAL: Duration = Duration::from_secs(60);
const MIN_POLL_INTERVAL_SECS: u64 = 60;
const LAST_CHECK_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Periodically re-checks every enabled subscription and feeds one job per
/// subscription into the shared queue. Config is read through a watch
/// channel; only the owning task writes it.
pub struct SubscriptionPoller {
    ctx: QueueContext,
    fetcher: Arc<MetadataFetcher>,
    config: watch::Receiver<AppConfig>,
    paths: Arc<dyn AppPaths>,
    retry_interval: Duration,
}

impl SubscriptionPoller {
    pub fn new(
        ctx: QueueContext,
        fetcher: Arc<MetadataFetcher>,
        config: watch::Receiver<AppConfig>,
        paths: Arc<dyn AppPaths>,
    ) -> Self {
        Self {
            ctx,
            fetcher,
            config,
            paths,
            retry_interval: GATE_RETRY_INTERVAL,
        }
    }

    pub fn with_retry_interval(mut self, retry_interval: Duration) -> Self {
        self.retry_interval = retry_interval;
        self
    }

    async fn gate_open(&self) -> bool {
        let q = self.ctx.queue.lock().await;
        q.schedule.is_within_schedule(self.ctx.clock.now())
    }

    fn poll_interval(&self) -> Duration {
        let secs = self.config.borrow().subscription_interval_secs;
        Duration::from_secs(secs.max(MIN_POLL_INTERVAL_SECS))
    }

    /// One pass over the enabled subscriptions. A failed fetch skips that
    /// subscription for this cycle; the others still run.
    pub async fn check_once(&self) -> Vec<SubscriptionCheck> {
        let config = self.config.borrow().clone();
        let network = config.network(self.paths.as_ref());
        let mut checks = Vec::new();

        // Drop terminal items left by earlier cycles.
        queue::clear_finished(&self.ctx).await;

        for sub in config.subscriptions.iter().filter(|s| s.enabled) {
            tracing::info!("Checking subscription: {}", sub.url);

            let title = match self.fetcher.fetch_fresh(&sub.url, &network).await {
                Ok(info) => ytdlp::title_of(&info),
                Err(e) => {
                    tracing::warn!("Subscription check failed for {}: {}", sub.url, e);
                    continue;
                }
            };

            let already_queued = self.ctx.queue.lock().await.has_url(&sub.url);
            if already_queued {
                tracing::debug!("Subscription {} still has a job in flight", sub.url);
            } else {
                let job = config.job_for(&sub.url, None, self.paths.as_ref());
                queue::submit(&self.ctx, job).await;
            }

            let check = SubscriptionCheck {
                url: sub.url.clone(),
                title,
                checked_at: Local::now(),
                new_items: None,
            };
            self.ctx.emitter.emit_subscription_checked(&check);
            checks.push(check);
        }

        checks
    }

    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!("Subscription poller started");
        loop {
            let wait = if self.gate_open().await {
                self.check_once().await;
                self.poll_interval()
            } else {
                tracing::debug!("Outside schedule window, postponing subscription check");
                self.retry_interval
            };

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }
        }
        tracing::info!("Subscription poller stopped");
    }
}

/// Validates the URL, looks up a display title and appends the
/// subscription. The title falls back to the URL when the lookup fails.
pub async fn add_subscription(
    config: &mut AppConfig,
    fetcher: &MetadataFetcher,
    paths: &dyn AppPaths,
    url: &str,
) -> anyhow::Result<Subscription> {
    let url = url.trim();
    let parsed = url::Url::parse(url).map_err(|e| anyhow!("invalid URL {}: {}", url, e))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(anyhow!("invalid URL: {}", url));
    }
    if config.subscriptions.iter().any(|s| s.url == url) {
        return Err(anyhow!("already subscribed to {}", url));
    }

    let network = config.network(paths);
    let title = match fetcher.fetch(url, &network).await {
        Ok(info) => ytdlp::title_of(&info).unwrap_or_else(|| url.to_string()),
        Err(e) => {
            tracing::warn!("Could not fetch title for {}: {}", url, e);
            url.to_string()
        }
    };

    let mut sub = Subscription::new(url, title);
    sub.last_check = Some(timestamp());
    config.subscriptions.push(sub.clone());
    Ok(sub)
}

pub fn remove_subscription(config: &mut AppConfig, url: &str) -> bool {
    let before = config.subscriptions.len();
    config.subscriptions.retain(|s| s.url != url.trim());
    config.subscriptions.len() != before
}

/// Records a completed check on the matching subscription.
pub fn record_check(config: &mut AppConfig, check: &SubscriptionCheck) -> bool {
    match config.subscriptions.iter_mut().find(|s| s.url == check.url) {
        Some(sub) => {
            sub.last_check = Some(check.checked_at.format(LAST_CHECK_FORMAT).to_string());
            true
        }
        None => false,
    }
}

fn timestamp() -> String {
    Local::now().format(LAST_CHECK_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remove_by_url() {
        let mut cfg = AppConfig::default();
        cfg.subscriptions
            .push(Subscription::new("https://fake.example/a", "A"));
        cfg.subscriptions
            .push(Subscription::new("https://fake.example/b", "B"));

        assert!(remove_subscription(&mut cfg, "https://fake.example/a"));
        assert!(!remove_subscription(&mut cfg, "https://fake.example/a"));
        assert_eq!(cfg.subscriptions.len(), 1);
        assert_eq!(cfg.subscriptions[0].title, "B");
    }

    #[test]
    fn record_check_sets_timestamp() {
        let mut cfg = AppConfig::default();
        cfg.subscriptions
            .push(Subscription::new("https://fake.example/a", "A"));
        let check = SubscriptionCheck {
            url: "https://fake.example/a".into(),
            title: None,
            checked_at: Local::now(),
            new_items: None,
        };

        assert!(record_check(&mut cfg, &check));
        let stamp = cfg.subscriptions[0].last_check.clone().unwrap();
        assert_eq!(stamp.len(), "2024-01-01 00:00".len());

        let other = SubscriptionCheck {
            url: "https://fake.example/zzz".into(),
            ..check
        };
        assert!(!record_check(&mut cfg, &other));
    }
}
