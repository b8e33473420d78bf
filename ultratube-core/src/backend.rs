use async_trait::async_trait;

use crate::core::progress::ProgressRelay;
use crate::models::job::{DownloadJob, DownloadOutcome, NetworkOptions};

/// The wrapped extraction/download tool. Everything behind this seam
/// (format negotiation, retries, muxing) is opaque to the orchestrator.
#[async_trait]
pub trait MediaBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Metadata for a URL. Playlists and channels are listed flat.
    async fn fetch_metadata(
        &self,
        url: &str,
        network: &NetworkOptions,
    ) -> anyhow::Result<serde_json::Value>;

    /// Runs one job to completion. Dropping the future must stop the
    /// underlying work.
    async fn download(
        &self,
        job: &DownloadJob,
        relay: &ProgressRelay,
    ) -> anyhow::Result<DownloadOutcome>;
}
