use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use ultratube_core::fs_paths::{AppPaths, DesktopPaths};

pub mod cli;
pub mod core;
pub mod storage;

const LOG_FILE: &str = "ultratube.log";
const MAX_LOG_BYTES: u64 = 1024 * 1024;
const KEPT_LOGS: u32 = 3;
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

fn rotated_name(n: u32) -> String {
    format!("{}.{}", LOG_FILE, n)
}

/// Shifts `ultratube.log` to `.1`, `.1` to `.2` and so on, dropping the
/// oldest once `KEPT_LOGS` files exist.
fn rotate_logs(dir: &Path) {
    for n in (1..KEPT_LOGS).rev() {
        let _ = std::fs::rename(dir.join(rotated_name(n)), dir.join(rotated_name(n + 1)));
    }
    let _ = std::fs::rename(dir.join(LOG_FILE), dir.join(rotated_name(1)));
}

fn open_log_file(dir: &Path) -> std::io::Result<File> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(LOG_FILE);
    let oversized = std::fs::metadata(&path)
        .map(|m| m.len() >= MAX_LOG_BYTES)
        .unwrap_or(false);
    if oversized {
        rotate_logs(dir);
    }
    OpenOptions::new().create(true).append(true).open(path)
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };

    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);
    let file_layer = match open_log_file(&DesktopPaths.data_dir().join("logs")) {
        Ok(file) => Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file))),
        Err(e) => {
            eprintln!("Log file unavailable: {}", e);
            None
        }
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .with(level)
        .init();
}

/// Any panic, on any thread, is logged and ends the process.
fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        tracing::error!("Unhandled panic: {}", info);
        default_hook(info);
        std::process::exit(1);
    }));
}

/// Drives `fut`, then shuts the runtime down so tasks still alive are
/// dropped and any yt-dlp children they own are killed.
fn run_to_completion<F>(runtime: tokio::runtime::Runtime, fut: F) -> F::Output
where
    F: std::future::Future,
{
    let output = runtime.block_on(fut);
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    output
}

pub fn run() {
    let cli = cli::Cli::parse();
    init_tracing(cli.verbose);
    install_panic_hook();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to start async runtime: {}", e);
            std::process::exit(1);
        }
    };

    let code = match run_to_completion(runtime, cli::execute(cli)) {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!("{:#}", e);
            1
        }
    };
    std::process::exit(code);
}
