use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::LazyLock;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use regex::Regex;
use tokio::io::{AsyncBufReadExt, BufReader};
use ultratube_core::backend::MediaBackend;
use ultratube_core::core::progress::{ProgressRelay, RawProgress};
use ultratube_core::models::job::{CookieSource, DownloadJob, DownloadOutcome, NetworkOptions};

use crate::core::dependencies;

const PROGRESS_PREFIX: &str = "[ultratube]";
const FILE_PREFIX: &str = "[ultratube-file]";
const METADATA_SOCKET_TIMEOUT: u32 = 30;
const METADATA_RETRIES: u32 = 10;
const STDERR_TAIL_LINES: usize = 20;

static ANSI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;]*[A-Za-z]").unwrap());

pub struct YtDlpBackend {
    ytdlp: PathBuf,
}

impl YtDlpBackend {
    pub fn new(ytdlp: impl Into<PathBuf>) -> Self {
        Self {
            ytdlp: ytdlp.into(),
        }
    }

    /// Finds yt-dlp on PATH or in the managed bin dir, installing it there
    /// if it is missing.
    pub async fn discover() -> anyhow::Result<Self> {
        let path = dependencies::ensure_ytdlp()
            .await
            .context("yt-dlp unavailable")?;
        Ok(Self::new(path))
    }

    pub fn path(&self) -> &Path {
        &self.ytdlp
    }
}

#[async_trait]
impl MediaBackend for YtDlpBackend {
    fn name(&self) -> &str {
        "yt-dlp"
    }

    async fn fetch_metadata(
        &self,
        url: &str,
        network: &NetworkOptions,
    ) -> anyhow::Result<serde_json::Value> {
        let output = crate::core::process::command(&self.ytdlp)
            .args(metadata_args(url, network))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| anyhow!("Failed to run yt-dlp: {}", e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("yt-dlp failed for {}: {}", url, stderr.trim()));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| anyhow!("yt-dlp returned invalid JSON: {}", e))
    }

    async fn download(
        &self,
        job: &DownloadJob,
        relay: &ProgressRelay,
    ) -> anyhow::Result<DownloadOutcome> {
        tokio::fs::create_dir_all(&job.destination_dir)
            .await
            .with_context(|| format!("cannot create {}", job.destination_dir.display()))?;

        tracing::info!("Starting download #{}: {}", relay.job_id(), job.url);

        let mut child = crate::core::process::command(&self.ytdlp)
            .args(download_args(job))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| anyhow!("Failed to start yt-dlp: {}", e))?;

        let stdout = child.stdout.take().ok_or_else(|| anyhow!("No stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| anyhow!("No stderr"))?;

        let stderr_reader = tokio::spawn(async move {
            let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            tail
        });

        let mut file_path = None;
        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines.next_line().await? {
            match parse_output_line(&line) {
                Some(OutputLine::Progress(raw)) => {
                    relay.relay(&raw);
                }
                Some(OutputLine::File(path)) => file_path = Some(path),
                None => {}
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| anyhow!("yt-dlp process failed: {}", e))?;
        let tail = stderr_reader.await.unwrap_or_default();

        if !status.success() {
            let reason = tail
                .iter()
                .rev()
                .find(|l| l.contains("ERROR"))
                .or_else(|| tail.back())
                .map(|l| strip_ansi(l))
                .unwrap_or_default();
            return Err(anyhow!("yt-dlp exited with {}: {}", status, reason.trim()));
        }

        tracing::info!("Finished download: {}", job.url);
        Ok(DownloadOutcome { file_path })
    }
}

fn push_network_args(args: &mut Vec<String>, network: &NetworkOptions) {
    match &network.cookies {
        CookieSource::None => {}
        CookieSource::File(path) => {
            args.push("--cookies".into());
            args.push(path.to_string_lossy().to_string());
        }
        CookieSource::Browser(name) => {
            args.push("--cookies-from-browser".into());
            args.push(name.clone());
        }
    }
    if let Some(proxy) = &network.proxy {
        args.push("--proxy".into());
        args.push(proxy.clone());
    }
}

pub fn metadata_args(url: &str, network: &NetworkOptions) -> Vec<String> {
    let mut args = vec![
        "-J".to_string(),
        "--flat-playlist".to_string(),
        "--no-warnings".to_string(),
        "--socket-timeout".to_string(),
        METADATA_SOCKET_TIMEOUT.to_string(),
        "--retries".to_string(),
        METADATA_RETRIES.to_string(),
    ];
    push_network_args(&mut args, network);
    args.push(url.to_string());
    args
}

pub fn progress_template() -> String {
    format!(
        "download:{}%(progress.status)s|%(progress._percent_str)s|%(progress._speed_str)s|%(progress._eta_str)s|%(progress.filename)s|%(info.title)s",
        PROGRESS_PREFIX
    )
}

pub fn download_args(job: &DownloadJob) -> Vec<String> {
    let output_template = job
        .destination_dir
        .join("%(title)s.%(ext)s")
        .to_string_lossy()
        .to_string();

    let mut args = vec![
        "-f".to_string(),
        job.format_expression(),
        "-o".to_string(),
        output_template,
        "--merge-output-format".to_string(),
        "mp4".to_string(),
        "--no-warnings".to_string(),
        "--socket-timeout".to_string(),
        job.tuning.socket_timeout_secs.to_string(),
        "--retries".to_string(),
        job.tuning.retries.to_string(),
        "--fragment-retries".to_string(),
        job.tuning.fragment_retries.to_string(),
        "--xattrs".to_string(),
        "--postprocessor-args".to_string(),
        "ffmpeg:-map_metadata 0 -movflags +faststart".to_string(),
    ];

    if let Some(archive) = &job.archive_file {
        args.push("--download-archive".into());
        args.push(archive.to_string_lossy().to_string());
    }

    if let Some(codec) = &job.tuning.video_codec {
        args.push("-S".into());
        args.push(format!("vcodec:{}", codec));
    }

    if let Some(lang) = &job.subtitle_language {
        args.push("--write-subs".into());
        args.push("--sub-langs".into());
        args.push(if lang.trim().is_empty() {
            "all".to_string()
        } else {
            lang.clone()
        });
        args.push("--convert-subs".into());
        args.push("srt".into());
    }

    if job.write_thumbnail {
        args.push("--write-thumbnail".into());
        args.push("--convert-thumbnails".into());
        args.push("jpg".into());
    }

    if job.tuning.allow_unplayable {
        args.push("--allow-unplayable-formats".into());
    }

    if let Some(ffmpeg) = &job.tuning.ffmpeg_location {
        args.push("--ffmpeg-location".into());
        args.push(ffmpeg.to_string_lossy().to_string());
    }

    // Needs the yt-dlp-mp4decrypt plugin installed alongside yt-dlp.
    if let Some(cdm) = &job.tuning.cdm_path {
        args.push("--use-postprocessor".into());
        args.push(format!(
            "Mp4Decrypt:when=before_dl;devicepath={}",
            cdm.to_string_lossy()
        ));
    }

    push_network_args(&mut args, &job.network);

    args.extend([
        "--newline".to_string(),
        "--progress".to_string(),
        "--progress-template".to_string(),
        progress_template(),
        "--no-simulate".to_string(),
        "--print".to_string(),
        format!("after_move:{}%(filepath)s", FILE_PREFIX),
        job.url.clone(),
    ]);

    args
}

#[derive(Debug, PartialEq)]
pub enum OutputLine {
    Progress(RawProgress),
    File(PathBuf),
}

fn strip_ansi(line: &str) -> String {
    ANSI_RE.replace_all(line, "").to_string()
}

pub fn parse_output_line(line: &str) -> Option<OutputLine> {
    let line = strip_ansi(line);
    let line = line.trim();

    if let Some(path) = line.strip_prefix(FILE_PREFIX) {
        let path = path.trim();
        if path.is_empty() || path == "NA" {
            return None;
        }
        return Some(OutputLine::File(PathBuf::from(path)));
    }

    let rest = line.strip_prefix(PROGRESS_PREFIX)?;
    let mut fields = rest.splitn(6, '|');
    let status = fields.next()?.trim().to_string();
    let field = |v: Option<&str>| v.map(|s| s.trim().to_string());
    let percent = field(fields.next());
    let speed = field(fields.next());
    let eta = field(fields.next());
    let filename = field(fields.next());
    let title = field(fields.next());

    Some(OutputLine::Progress(RawProgress {
        status,
        percent,
        speed,
        eta,
        title,
        filename,
    }))
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormatInfo {
    pub format_id: String,
    pub ext: String,
    pub resolution: String,
    pub fps: Option<f64>,
    pub filesize: Option<u64>,
    pub vcodec: String,
    pub acodec: String,
}

/// Formats that carry at least one stream, in yt-dlp's order.
pub fn parse_formats(json: &serde_json::Value) -> Vec<FormatInfo> {
    let formats = match json.get("formats").and_then(|v| v.as_array()) {
        Some(f) => f,
        None => return Vec::new(),
    };

    let mut result = Vec::new();
    for f in formats {
        let format_id = match f.get("format_id").and_then(|v| v.as_str()) {
            Some(id) => id.to_string(),
            None => continue,
        };
        let vcodec = f.get("vcodec").and_then(|v| v.as_str()).unwrap_or("none").to_string();
        let acodec = f.get("acodec").and_then(|v| v.as_str()).unwrap_or("none").to_string();
        if vcodec == "none" && acodec == "none" {
            continue;
        }

        let width = f.get("width").and_then(|v| v.as_u64());
        let height = f.get("height").and_then(|v| v.as_u64());
        let resolution = match f.get("resolution").and_then(|v| v.as_str()) {
            Some(r) => r.to_string(),
            None => match (width, height) {
                (Some(w), Some(h)) => format!("{}x{}", w, h),
                _ => "audio only".to_string(),
            },
        };

        result.push(FormatInfo {
            format_id,
            ext: f.get("ext").and_then(|v| v.as_str()).unwrap_or("").to_string(),
            resolution,
            fps: f.get("fps").and_then(|v| v.as_f64()),
            filesize: f
                .get("filesize")
                .and_then(|v| v.as_u64())
                .or_else(|| f.get("filesize_approx").and_then(|v| v.as_u64())),
            vcodec,
            acodec,
        });
    }

    result
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistEntry {
    pub url: String,
    pub title: String,
}

pub fn is_playlist(json: &serde_json::Value) -> bool {
    json.get("entries").is_some()
}

pub fn playlist_entries(json: &serde_json::Value) -> Vec<PlaylistEntry> {
    json.get("entries")
        .and_then(|v| v.as_array())
        .map(|entries| {
            entries
                .iter()
                .filter_map(|e| {
                    let url = e.get("url").and_then(|v| v.as_str())?;
                    let title = e
                        .get("title")
                        .and_then(|v| v.as_str())
                        .unwrap_or("unknown");
                    Some(PlaylistEntry {
                        url: url.to_string(),
                        title: title.to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

pub fn title_of(json: &serde_json::Value) -> Option<String> {
    json.get("title")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn arg_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .map(|s| s.as_str())
    }

    #[test]
    fn download_args_basic_job() {
        let job = DownloadJob::new("https://fake.example/video", "/tmp/dl")
            .with_format(Some("720p".into()));
        let args = download_args(&job);

        assert_eq!(arg_after(&args, "-f"), Some("bestvideo[height<=720]+bestaudio/best"));
        assert_eq!(arg_after(&args, "-o"), Some("/tmp/dl/%(title)s.%(ext)s"));
        assert_eq!(arg_after(&args, "--merge-output-format"), Some("mp4"));
        assert_eq!(arg_after(&args, "--retries"), Some("15"));
        assert_eq!(arg_after(&args, "--socket-timeout"), Some("30"));
        assert_eq!(args.last().map(|s| s.as_str()), Some("https://fake.example/video"));
        assert!(!args.contains(&"--write-subs".to_string()));
        assert!(!args.contains(&"--cookies".to_string()));
        assert!(!args.contains(&"--download-archive".to_string()));
    }

    #[test]
    fn download_args_extras() {
        let mut job = DownloadJob::new("https://fake.example/video", "/tmp/dl");
        job.subtitle_language = Some("en".into());
        job.write_thumbnail = true;
        job.archive_file = Some(PathBuf::from("/data/archive.txt"));
        job.network = NetworkOptions {
            proxy: Some("socks5://127.0.0.1:1080".into()),
            cookies: CookieSource::Browser("firefox".into()),
        };
        job.tuning.video_codec = Some("av1".into());
        job.tuning.cdm_path = Some(PathBuf::from("/keys/device.wvd"));

        let args = download_args(&job);
        assert_eq!(arg_after(&args, "--sub-langs"), Some("en"));
        assert_eq!(arg_after(&args, "--convert-subs"), Some("srt"));
        assert_eq!(arg_after(&args, "--convert-thumbnails"), Some("jpg"));
        assert_eq!(arg_after(&args, "--download-archive"), Some("/data/archive.txt"));
        assert_eq!(arg_after(&args, "--cookies-from-browser"), Some("firefox"));
        assert_eq!(arg_after(&args, "--proxy"), Some("socks5://127.0.0.1:1080"));
        assert_eq!(arg_after(&args, "-S"), Some("vcodec:av1"));
        assert_eq!(
            arg_after(&args, "--use-postprocessor"),
            Some("Mp4Decrypt:when=before_dl;devicepath=/keys/device.wvd")
        );
    }

    #[test]
    fn metadata_args_apply_cookie_file() {
        let network = NetworkOptions {
            proxy: None,
            cookies: CookieSource::File(PathBuf::from("/tmp/cookies.txt")),
        };
        let args = metadata_args("https://fake.example/list", &network);
        assert_eq!(args[0], "-J");
        assert!(args.contains(&"--flat-playlist".to_string()));
        assert_eq!(arg_after(&args, "--cookies"), Some("/tmp/cookies.txt"));
        assert_eq!(arg_after(&args, "--retries"), Some("10"));
        assert!(!args.contains(&"--proxy".to_string()));
    }

    #[test]
    fn parses_progress_line() {
        let line = "[ultratube]downloading| 42.0%|  1.50MiB/s|00:12|/tmp/dl/A.f137.mp4|A | B";
        match parse_output_line(line) {
            Some(OutputLine::Progress(raw)) => {
                assert_eq!(raw.status, "downloading");
                assert_eq!(raw.percent.as_deref(), Some("42.0%"));
                assert_eq!(raw.speed.as_deref(), Some("1.50MiB/s"));
                assert_eq!(raw.eta.as_deref(), Some("00:12"));
                assert_eq!(raw.filename.as_deref(), Some("/tmp/dl/A.f137.mp4"));
                assert_eq!(raw.title.as_deref(), Some("A | B"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn strips_ansi_colours() {
        let line = "[ultratube]downloading|\x1b[0;94m 12.5%\x1b[0m|\x1b[0;32m2.00MiB/s\x1b[0m|00:03|f.mp4|T";
        match parse_output_line(line) {
            Some(OutputLine::Progress(raw)) => {
                assert_eq!(raw.percent.as_deref(), Some("12.5%"));
                assert_eq!(raw.speed.as_deref(), Some("2.00MiB/s"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn parses_final_path_and_ignores_noise() {
        assert_eq!(
            parse_output_line("[ultratube-file]/tmp/dl/Video.mp4"),
            Some(OutputLine::File(PathBuf::from("/tmp/dl/Video.mp4")))
        );
        assert_eq!(parse_output_line("[youtube] abc: Downloading webpage"), None);
        assert_eq!(parse_output_line(""), None);
    }

    #[test]
    fn parse_formats_skips_storyboards() {
        let json = json!({
            "formats": [
                {"format_id": "sb0", "ext": "mhtml", "vcodec": "none", "acodec": "none"},
                {"format_id": "140", "ext": "m4a", "vcodec": "none", "acodec": "mp4a.40.2", "filesize": 3_000_000},
                {"format_id": "137", "ext": "mp4", "vcodec": "avc1.640028", "acodec": "none",
                 "width": 1920, "height": 1080, "fps": 30.0, "filesize_approx": 50_000_000}
            ]
        });
        let formats = parse_formats(&json);
        assert_eq!(formats.len(), 2);
        assert_eq!(formats[0].format_id, "140");
        assert_eq!(formats[0].resolution, "audio only");
        assert_eq!(formats[1].resolution, "1920x1080");
        assert_eq!(formats[1].filesize, Some(50_000_000));
    }

    #[test]
    fn playlist_helpers() {
        let json = json!({
            "title": "Channel",
            "entries": [
                {"url": "https://fake.example/1", "title": "One"},
                {"title": "No url"},
                {"url": "https://fake.example/2"}
            ]
        });
        assert!(is_playlist(&json));
        let entries = playlist_entries(&json);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].title, "unknown");
        assert_eq!(title_of(&json).as_deref(), Some("Channel"));
        assert!(!is_playlist(&json!({"title": "single"})));
    }
}
