use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use anyhow::anyhow;
use futures::StreamExt;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use ultratube_core::fs_paths::{AppPaths, DesktopPaths};

pub const YTDLP: &str = "yt-dlp";
pub const FFMPEG: &str = "ffmpeg";

#[derive(Debug, Clone, Serialize)]
pub struct ToolStatus {
    pub name: String,
    pub path: Option<PathBuf>,
    pub version: Option<String>,
}

fn bin_name(tool: &str) -> String {
    if cfg!(target_os = "windows") {
        format!("{}.exe", tool)
    } else {
        tool.to_string()
    }
}

fn version_flag_for(tool: &str) -> &'static str {
    match tool {
        "ffmpeg" | "ffprobe" => "-version",
        _ => "--version",
    }
}

pub async fn find_tool(tool: &str) -> Option<PathBuf> {
    let name = bin_name(tool);

    if let Ok(status) = crate::core::process::command(&name)
        .arg(version_flag_for(tool))
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
    {
        if status.success() {
            return Some(PathBuf::from(&name));
        }
    }

    let managed = DesktopPaths.bin_dir().join(&name);
    if managed.exists() {
        return Some(managed);
    }

    tracing::debug!("{} not found on PATH or in {}", tool, DesktopPaths.bin_dir().display());
    None
}

pub async fn check_version(tool: &str) -> ToolStatus {
    let path = find_tool(tool).await;
    let version = match &path {
        Some(p) => read_version(tool, p).await,
        None => None,
    };
    ToolStatus {
        name: tool.to_string(),
        path,
        version,
    }
}

async fn read_version(tool: &str, path: &Path) -> Option<String> {
    let output = crate::core::process::command(path)
        .arg(version_flag_for(tool))
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .ok()?;

    if !output.status.success() {
        return None;
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_version_line(tool, stdout.lines().next().unwrap_or(""))
}

/// `ffmpeg version 6.1 Copyright...` carries the version in the third field;
/// yt-dlp prints the bare version.
fn parse_version_line(tool: &str, first_line: &str) -> Option<String> {
    let version = if tool == FFMPEG || tool == "ffprobe" {
        first_line.split_whitespace().nth(2).map(|s| s.to_string())
    } else {
        Some(first_line.trim().to_string())
    };
    version.filter(|v| !v.is_empty())
}

pub async fn ensure_ytdlp() -> anyhow::Result<PathBuf> {
    if let Some(path) = find_tool(YTDLP).await {
        return Ok(path);
    }
    download_ytdlp_binary().await
}

fn ytdlp_download_url() -> &'static str {
    if cfg!(target_os = "windows") {
        "https://github.com/yt-dlp/yt-dlp/releases/latest/download/yt-dlp.exe"
    } else if cfg!(target_os = "macos") {
        "https://github.com/yt-dlp/yt-dlp/releases/latest/download/yt-dlp_macos"
    } else {
        "https://github.com/yt-dlp/yt-dlp/releases/latest/download/yt-dlp"
    }
}

async fn download_ytdlp_binary() -> anyhow::Result<PathBuf> {
    let bin_dir = DesktopPaths.bin_dir();
    tokio::fs::create_dir_all(&bin_dir).await?;
    let target = bin_dir.join(bin_name(YTDLP));
    let temp_path = bin_dir.join(".yt-dlp_download.tmp");

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(120))
        .build()?;

    tracing::info!("Downloading yt-dlp from {}", ytdlp_download_url());
    let response = client.get(ytdlp_download_url()).send().await?;
    if !response.status().is_success() {
        return Err(anyhow!("Failed to download yt-dlp: HTTP {}", response.status()));
    }

    {
        let mut file = tokio::fs::File::create(&temp_path).await?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| anyhow!("Stream error: {}", e))?;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
    }
    tokio::fs::rename(&temp_path, &target).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o755);
        tokio::fs::set_permissions(&target, perms).await?;
    }

    tracing::info!("yt-dlp installed to {}", target.display());
    Ok(target)
}

/// Runs yt-dlp's own updater. Failures are logged, never fatal.
pub async fn self_update_ytdlp(ytdlp: &Path) {
    match crate::core::process::command(ytdlp)
        .arg("-U")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
    {
        Ok(output) if output.status.success() => {
            let stdout = String::from_utf8_lossy(&output.stdout);
            tracing::info!("yt-dlp update: {}", stdout.lines().last().unwrap_or("").trim());
        }
        Ok(output) => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::warn!("yt-dlp update failed: {}", stderr.trim());
        }
        Err(e) => tracing::warn!("yt-dlp update could not start: {}", e),
    }
}
