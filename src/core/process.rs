use std::path::PathBuf;

use ultratube_core::fs_paths::{AppPaths, DesktopPaths};

fn managed_bin_dir() -> PathBuf {
    DesktopPaths.bin_dir()
}

fn enhanced_path() -> String {
    let sep = if cfg!(windows) { ";" } else { ":" };
    let current = std::env::var("PATH").unwrap_or_default();
    format!("{}{}{}", managed_bin_dir().display(), sep, current)
}

/// Command with the managed bin dir on PATH so yt-dlp finds the ffmpeg we
/// installed next to it.
pub fn command<S: AsRef<std::ffi::OsStr>>(program: S) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new(program);
    #[cfg(target_os = "windows")]
    cmd.creation_flags(0x08000000);
    cmd.env("PATH", enhanced_path());
    cmd.env_remove("PYTHONHOME");
    cmd.env_remove("PYTHONPATH");
    cmd.env("PYTHONIOENCODING", "utf-8");
    cmd.env("PYTHONUTF8", "1");
    cmd
}
