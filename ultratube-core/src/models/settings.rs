use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::core::schedule::ScheduleWindow;
use crate::fs_paths::AppPaths;
use crate::models::job::{CookieSource, DownloadJob, DownloadTuning, NetworkOptions};

pub const MIN_CONCURRENT: u32 = 1;
pub const MAX_CONCURRENT: u32 = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub url: String,
    /// Empty when the stored entry had none; see `AppConfig::fill_missing_titles`.
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub last_check: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Subscription {
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            last_check: None,
            enabled: true,
        }
    }
}

/// Flat user preferences, persisted as a single JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub download_folder: PathBuf,
    pub max_concurrent: u32,
    pub dark_mode: bool,
    pub preferred_quality: String,
    pub video_codec: String,
    pub audio_codec: String,
    pub proxy: Option<String>,
    pub socket_timeout: u32,
    pub cookies_file: Option<PathBuf>,
    pub browser_cookies: String,
    pub use_internal_browser: bool,
    pub archive_file: String,
    pub auto_update_ytdlp: bool,
    pub ffmpeg_path: Option<PathBuf>,
    pub allow_unplayable: bool,
    pub cdm_path: Option<PathBuf>,
    pub smart_mode: bool,
    pub last_format: String,
    pub last_quality: String,
    pub scheduler_enabled: bool,
    pub scheduler_start: String,
    pub scheduler_end: String,
    pub subscriptions: Vec<Subscription>,
    pub subscription_interval_secs: u64,
    pub update_check_url: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            download_folder: PathBuf::from("downloads"),
            max_concurrent: 3,
            dark_mode: true,
            preferred_quality: "best".into(),
            video_codec: "auto".into(),
            audio_codec: "m4a".into(),
            proxy: None,
            socket_timeout: 30,
            cookies_file: None,
            browser_cookies: "None".into(),
            use_internal_browser: false,
            archive_file: "archive.txt".into(),
            auto_update_ytdlp: true,
            ffmpeg_path: None,
            allow_unplayable: false,
            cdm_path: None,
            smart_mode: false,
            last_format: "MP4 Video".into(),
            last_quality: "Best Available".into(),
            scheduler_enabled: false,
            scheduler_start: "02:00".into(),
            scheduler_end: "06:00".into(),
            subscriptions: Vec::new(),
            subscription_interval_secs: 3600,
            update_check_url: None,
        }
    }
}

impl AppConfig {
    /// Subscriptions stored without a title show their URL instead.
    pub fn fill_missing_titles(&mut self) {
        for sub in self.subscriptions.iter_mut().filter(|s| s.title.trim().is_empty()) {
            sub.title = sub.url.clone();
        }
    }

    pub fn concurrency_limit(&self) -> u32 {
        self.max_concurrent.clamp(MIN_CONCURRENT, MAX_CONCURRENT)
    }

    pub fn schedule(&self) -> anyhow::Result<ScheduleWindow> {
        ScheduleWindow::from_hhmm(
            self.scheduler_enabled,
            &self.scheduler_start,
            &self.scheduler_end,
        )
    }

    /// Cookie source in priority order: in-app browser store (when it
    /// exists), explicit cookies file, then a named browser profile.
    pub fn cookie_source(&self, paths: &dyn AppPaths) -> CookieSource {
        if self.use_internal_browser {
            let store = paths.browser_cookie_file();
            if store.exists() {
                return CookieSource::File(store);
            }
        }
        if let Some(file) = self.cookies_file.as_ref().filter(|p| !p.as_os_str().is_empty()) {
            return CookieSource::File(file.clone());
        }
        let browser = self.browser_cookies.trim();
        if !browser.is_empty() && !browser.eq_ignore_ascii_case("none") {
            return CookieSource::Browser(browser.to_lowercase());
        }
        CookieSource::None
    }

    pub fn network(&self, paths: &dyn AppPaths) -> NetworkOptions {
        NetworkOptions {
            proxy: self.proxy.clone().filter(|p| !p.trim().is_empty()),
            cookies: self.cookie_source(paths),
        }
    }

    /// Relative archive paths live in the data dir so every download folder
    /// shares one "already downloaded" record.
    pub fn archive_path(&self, paths: &dyn AppPaths) -> Option<PathBuf> {
        let archive = self.archive_file.trim();
        if archive.is_empty() {
            return None;
        }
        let path = Path::new(archive);
        if path.is_absolute() {
            Some(path.to_path_buf())
        } else {
            Some(paths.data_dir().join(path))
        }
    }

    /// Snapshot of the settings a worker needs for one download.
    pub fn job_for(&self, url: &str, quality: Option<&str>, paths: &dyn AppPaths) -> DownloadJob {
        let token = quality
            .map(str::to_string)
            .unwrap_or_else(|| self.preferred_quality.clone());
        let format_id = if token.trim().is_empty() || token.trim().eq_ignore_ascii_case("best") {
            None
        } else {
            Some(token)
        };

        let codec = self.video_codec.trim();
        let video_codec = if codec.is_empty() || codec.eq_ignore_ascii_case("auto") {
            None
        } else {
            Some(codec.to_lowercase())
        };

        DownloadJob {
            url: url.to_string(),
            format_id,
            destination_dir: self.download_folder.clone(),
            subtitle_language: None,
            write_thumbnail: false,
            network: self.network(paths),
            archive_file: self.archive_path(paths),
            tuning: DownloadTuning {
                socket_timeout_secs: self.socket_timeout,
                allow_unplayable: self.allow_unplayable,
                video_codec,
                ffmpeg_location: self.ffmpeg_path.clone(),
                cdm_path: self.cdm_path.clone(),
                ..DownloadTuning::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs_paths::RootedPaths;

    #[test]
    fn defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.download_folder, PathBuf::from("downloads"));
        assert!(cfg.dark_mode);
        assert_eq!(cfg.max_concurrent, 3);
        assert!(!cfg.scheduler_enabled);
    }

    #[test]
    fn missing_keys_take_defaults() {
        let cfg: AppConfig =
            serde_json::from_str(r#"{"download_folder": "vids", "unknown_key": 1}"#).unwrap();
        assert_eq!(cfg.download_folder, PathBuf::from("vids"));
        assert_eq!(cfg.max_concurrent, 3);
        assert_eq!(cfg.archive_file, "archive.txt");
    }

    #[test]
    fn subscription_defaults_enabled() {
        let sub: Subscription =
            serde_json::from_str(r#"{"url": "https://x.example/c", "title": "C"}"#).unwrap();
        assert!(sub.enabled);
        assert_eq!(sub.last_check, None);
    }

    #[test]
    fn untitled_subscription_uses_url() {
        let mut cfg: AppConfig = serde_json::from_str(
            r#"{"subscriptions": [{"url": "https://x.example/c"}, {"url": "https://x.example/d", "title": " "}]}"#,
        )
        .unwrap();
        assert_eq!(cfg.subscriptions[0].title, "");
        cfg.fill_missing_titles();
        assert_eq!(cfg.subscriptions[0].title, "https://x.example/c");
        assert_eq!(cfg.subscriptions[1].title, "https://x.example/d");
    }

    #[test]
    fn concurrency_is_clamped() {
        let mut cfg = AppConfig::default();
        cfg.max_concurrent = 0;
        assert_eq!(cfg.concurrency_limit(), 1);
        cfg.max_concurrent = 99;
        assert_eq!(cfg.concurrency_limit(), 10);
    }

    #[test]
    fn cookie_priority() {
        let dir = std::env::temp_dir().join("ultratube-cookie-priority-test");
        let paths = RootedPaths::new(&dir);
        let mut cfg = AppConfig::default();
        assert_eq!(cfg.cookie_source(&paths), CookieSource::None);

        cfg.browser_cookies = "Firefox".into();
        assert_eq!(
            cfg.cookie_source(&paths),
            CookieSource::Browser("firefox".into())
        );

        cfg.cookies_file = Some(PathBuf::from("/tmp/cookies.txt"));
        assert_eq!(
            cfg.cookie_source(&paths),
            CookieSource::File(PathBuf::from("/tmp/cookies.txt"))
        );

        // The in-app store is only used when it actually exists.
        cfg.use_internal_browser = true;
        assert_eq!(
            cfg.cookie_source(&paths),
            CookieSource::File(PathBuf::from("/tmp/cookies.txt"))
        );
    }

    #[test]
    fn job_snapshot_maps_best_to_default_selector() {
        let paths = RootedPaths::new("/data/ut");
        let mut cfg = AppConfig::default();
        cfg.proxy = Some("http://127.0.0.1:8080".into());
        cfg.video_codec = "AV1".into();

        let job = cfg.job_for("https://fake.example/video", None, &paths);
        assert_eq!(job.format_id, None);
        assert_eq!(job.format_expression(), "bestvideo+bestaudio/best");
        assert_eq!(job.network.proxy.as_deref(), Some("http://127.0.0.1:8080"));
        assert_eq!(job.archive_file, Some(PathBuf::from("/data/ut/archive.txt")));
        assert_eq!(job.tuning.video_codec.as_deref(), Some("av1"));

        let job = cfg.job_for("https://fake.example/video", Some("720p"), &paths);
        assert_eq!(job.format_expression(), "bestvideo[height<=720]+bestaudio/best");
    }

    #[test]
    fn schedule_from_config() {
        let mut cfg = AppConfig::default();
        cfg.scheduler_enabled = true;
        cfg.scheduler_start = "23:00".into();
        cfg.scheduler_end = "05:00".into();
        let window = cfg.schedule().unwrap();
        assert!(window.enabled);
        assert!(window.start > window.end);

        cfg.scheduler_end = "late".into();
        assert!(cfg.schedule().is_err());
    }
}
