use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::core::format_selector::select_format;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum CookieSource {
    #[default]
    None,
    File(PathBuf),
    Browser(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkOptions {
    pub proxy: Option<String>,
    pub cookies: CookieSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadTuning {
    pub socket_timeout_secs: u32,
    pub retries: u32,
    pub fragment_retries: u32,
    pub allow_unplayable: bool,
    pub video_codec: Option<String>,
    pub ffmpeg_location: Option<PathBuf>,
    /// Widevine device file for the Mp4Decrypt post-processor plugin.
    pub cdm_path: Option<PathBuf>,
}

impl Default for DownloadTuning {
    fn default() -> Self {
        Self {
            socket_timeout_secs: 30,
            retries: 15,
            fragment_retries: 15,
            allow_unplayable: false,
            video_codec: None,
            ffmpeg_location: None,
            cdm_path: None,
        }
    }
}

/// A single download request. Built from a config snapshot when it is
/// submitted, so running workers never observe later settings changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadJob {
    pub url: String,
    pub format_id: Option<String>,
    pub destination_dir: PathBuf,
    pub subtitle_language: Option<String>,
    pub write_thumbnail: bool,
    pub network: NetworkOptions,
    pub archive_file: Option<PathBuf>,
    pub tuning: DownloadTuning,
}

impl DownloadJob {
    pub fn new(url: impl Into<String>, destination_dir: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            format_id: None,
            destination_dir: destination_dir.into(),
            subtitle_language: None,
            write_thumbnail: false,
            network: NetworkOptions::default(),
            archive_file: None,
            tuning: DownloadTuning::default(),
        }
    }

    pub fn with_format(mut self, format_id: Option<String>) -> Self {
        self.format_id = format_id;
        self
    }

    pub fn format_expression(&self) -> String {
        select_format(self.format_id.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DownloadOutcome {
    pub file_path: Option<PathBuf>,
}
