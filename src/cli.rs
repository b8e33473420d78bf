use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use clap::{ArgAction, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use ultratube_core::core::events::{AppEvent, ChannelEmitter, JobInfo, JobStatus, ProgressStatus};
use ultratube_core::core::formatting::{format_bytes, is_valid_url};
use ultratube_core::core::schedule::ScheduleWindow;
use ultratube_core::fs_paths::{AppPaths, DesktopPaths};
use ultratube_core::models::job::DownloadJob;
use ultratube_core::models::settings::AppConfig;

use crate::core::dependencies::{self, FFMPEG, YTDLP};
use crate::core::metadata::{MetadataCache, MetadataFetcher};
use crate::core::queue::{self, QueueContext, DEFAULT_GATE_INTERVAL};
use crate::core::subscriptions::{self, SubscriptionPoller};
use crate::core::update_check;
use crate::core::ytdlp::{self, YtDlpBackend};
use crate::core::http_client;
use crate::storage::config::ConfigManager;

#[derive(Parser)]
#[command(name = "ultratube", version)]
#[command(about = "Queue, schedule and subscription front-end for yt-dlp", long_about = None)]
pub struct Cli {
    /// Video, playlist or channel URL to download interactively
    pub url: Option<String>,

    /// Config file to use instead of the one in the data directory
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the queue with the schedule gate and the subscription poller
    Watch,
    /// Manage channel and playlist subscriptions
    Subscribe {
        #[command(subcommand)]
        action: SubscribeAction,
    },
    /// Show or change settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Check the release manifest for a newer version
    CheckUpdate,
    /// Report external tool versions
    Doctor,
}

#[derive(Subcommand)]
pub enum SubscribeAction {
    Add { url: String },
    Remove { url: String },
    List,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    Show,
    /// Value is parsed as JSON, falling back to a plain string
    Set { key: String, value: String },
}

impl Cli {
    /// A URL selects interactive mode and cannot be combined with a subcommand.
    pub fn validate(&self) -> anyhow::Result<()> {
        if let (Some(url), Some(_)) = (&self.url, &self.command) {
            return Err(anyhow!("unexpected argument '{}' before subcommand", url));
        }
        Ok(())
    }
}

pub async fn execute(cli: Cli) -> anyhow::Result<()> {
    cli.validate()?;
    let paths: Arc<dyn AppPaths> = Arc::new(DesktopPaths);
    let config_path = cli.config.clone().unwrap_or_else(|| paths.config_file());
    let mut manager = ConfigManager::load(&config_path);
    tracing::debug!("Using config {}", config_path.display());

    match cli.command {
        Some(Commands::Watch) => watch_mode(manager, paths).await,
        Some(Commands::Subscribe { action }) => subscribe(&mut manager, paths, action).await,
        Some(Commands::Config { action }) => config_command(&mut manager, action),
        Some(Commands::CheckUpdate) => check_update(manager.config()).await,
        Some(Commands::Doctor) => doctor(&manager, paths.as_ref()).await,
        None => match cli.url {
            Some(url) => download_interactive(&url, manager.config(), paths).await,
            None => Err(anyhow!("Usage: ultratube <URL>  (see --help for subcommands)")),
        },
    }
}

struct Prompter {
    lines: Lines<BufReader<Stdin>>,
}

impl Prompter {
    fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }

    async fn ask(&mut self, prompt: &str) -> anyhow::Result<String> {
        print!("{}", prompt);
        std::io::stdout().flush()?;
        let line = self.lines.next_line().await?.unwrap_or_default();
        Ok(line.trim().to_string())
    }
}

async fn download_interactive(
    url: &str,
    base: &AppConfig,
    paths: Arc<dyn AppPaths>,
) -> anyhow::Result<()> {
    if !is_valid_url(url) {
        return Err(anyhow!("Invalid URL: {}", url));
    }

    let mut cfg = base.clone();
    let mut prompt = Prompter::new();

    println!("\nNetwork & Auth Options (Optional):");
    let proxy = prompt
        .ask("Proxy URL (e.g. http://127.0.0.1:8080 or Enter to skip): ")
        .await?;
    if !proxy.is_empty() {
        cfg.proxy = Some(proxy);
    }
    match prompt
        .ask("1: cookies.txt, 2: Get from Browser, Enter: Skip: ")
        .await?
        .as_str()
    {
        "1" => {
            let file = prompt.ask("Enter path to cookies.txt: ").await?;
            cfg.use_internal_browser = false;
            cfg.cookies_file = Some(PathBuf::from(file));
        }
        "2" => {
            let browser = prompt.ask("Browser (e.g., chrome, firefox, edge): ").await?;
            cfg.use_internal_browser = false;
            cfg.cookies_file = None;
            cfg.browser_cookies = browser.to_lowercase();
        }
        _ => {}
    }

    let backend = Arc::new(YtDlpBackend::discover().await?);
    let fetcher = MetadataFetcher::new(backend.clone(), MetadataCache::default());
    let info = fetcher
        .fetch(url, &cfg.network(paths.as_ref()))
        .await
        .context("Could not fetch video info")?;

    println!("\nExtra Options:");
    let subs = prompt
        .ask("Subtitles (lang code/all/Enter to skip): ")
        .await?;
    let thumbnail = prompt.ask("Thumbnail? (y/n): ").await?.eq_ignore_ascii_case("y");

    let title = ytdlp::title_of(&info).unwrap_or_else(|| url.to_string());
    let (urls, format_id) = if ytdlp::is_playlist(&info) {
        let mut entries = ytdlp::playlist_entries(&info);
        println!("\nPlaylist/Channel: {}", title);
        let limit = prompt
            .ask(&format!("Total {} videos. Limit? (Enter for ALL): ", entries.len()))
            .await?;
        if let Ok(n) = limit.parse::<usize>() {
            entries.truncate(n);
        }
        (entries.into_iter().map(|e| e.url).collect::<Vec<_>>(), None)
    } else {
        println!("\nSingle Video: {}", title);
        let formats = ytdlp::parse_formats(&info);
        println!(
            "{:<10} {:<6} {:<12} {:<6} {:<10} CODEC",
            "ID", "EXT", "RES", "FPS", "FILESIZE"
        );
        println!("{}", "-".repeat(60));
        for f in &formats {
            println!(
                "{:<10} {:<6} {:<12} {:<6} {:<10} V:{} A:{}",
                f.format_id,
                f.ext,
                f.resolution,
                f.fps.map(|v| v.to_string()).unwrap_or_default(),
                format_bytes(f.filesize),
                truncate(&f.vcodec, 5),
                truncate(&f.acodec, 5),
            );
        }
        let choice = prompt.ask("\nEnter Format ID (Enter for best): ").await?;
        let format_id = formats
            .iter()
            .any(|f| f.format_id == choice)
            .then_some(choice);
        (vec![url.to_string()], format_id)
    };

    if urls.is_empty() {
        println!("Nothing to download.");
        return Ok(());
    }

    let subtitle_language = (!subs.is_empty()).then_some(subs);
    let jobs: Vec<DownloadJob> = urls
        .iter()
        .map(|u| {
            let mut job = cfg
                .job_for(u, Some("best"), paths.as_ref())
                .with_format(format_id.clone());
            job.subtitle_language = subtitle_language.clone();
            job.write_thumbnail = thumbnail;
            job
        })
        .collect();

    if let Some(notice) = schedule_bypass_notice(&cfg) {
        tracing::info!("{}", notice);
    }
    let (emitter, rx) = ChannelEmitter::new();
    let ctx = QueueContext::new(
        backend,
        Arc::new(emitter),
        cfg.concurrency_limit(),
        ScheduleWindow::disabled(),
    );
    let expected = jobs.len();
    for job in jobs {
        queue::submit(&ctx, job).await;
    }

    let report = drain_until_idle(rx, expected).await;
    println!(
        "\nDone: {} finished, {} failed.",
        report.finished, report.failed
    );
    Ok(())
}

/// Interactive downloads start at once even with the scheduler enabled.
fn schedule_bypass_notice(cfg: &AppConfig) -> Option<String> {
    cfg.scheduler_enabled.then(|| {
        format!(
            "Schedule window {}-{} applies to watch mode only; downloading now",
            cfg.scheduler_start, cfg.scheduler_end
        )
    })
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[derive(Default)]
struct DrainReport {
    finished: usize,
    failed: usize,
}

/// Prints events until all `expected` jobs have reached a terminal state.
async fn drain_until_idle(
    mut rx: mpsc::UnboundedReceiver<AppEvent>,
    expected: usize,
) -> DrainReport {
    let mut console = ConsoleReporter::default();
    while let Some(event) = rx.recv().await {
        console.handle(&event);
        if let AppEvent::QueueState(items) = &event {
            if items.len() >= expected && items.iter().all(|i| i.status.is_terminal()) {
                break;
            }
        }
    }
    console.report
}

#[derive(Default)]
struct ConsoleReporter {
    reported: HashSet<u64>,
    report: DrainReport,
}

impl ConsoleReporter {
    fn handle(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Progress { record, .. } if record.status == ProgressStatus::Downloading => {
                print!(
                    "\r{:.40}  {:>5.1}%  {:>12}  ETA {:<8}",
                    record.title, record.percentage, record.speed, record.eta
                );
                let _ = std::io::stdout().flush();
            }
            AppEvent::Progress { .. } => {}
            AppEvent::QueueState(items) => {
                for item in items {
                    self.report_terminal(item);
                }
            }
            AppEvent::SubscriptionChecked(check) => {
                println!(
                    "Checked subscription {} at {}",
                    check.title.as_deref().unwrap_or(&check.url),
                    check.checked_at.format("%Y-%m-%d %H:%M")
                );
            }
        }
    }

    fn report_terminal(&mut self, item: &JobInfo) {
        if !item.status.is_terminal() || !self.reported.insert(item.id) {
            return;
        }
        match &item.status {
            JobStatus::Finished => {
                self.report.finished += 1;
                let name = item
                    .file_path
                    .as_deref()
                    .and_then(|p| Path::new(p).file_name())
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| item.title.clone());
                println!("\nFinished: {}", name);
            }
            JobStatus::Errored { message } => {
                self.report.failed += 1;
                println!("\nError: {} ({})", item.title, message);
            }
            _ => {}
        }
    }
}

enum WatchSignal {
    Stop,
    Reload,
}

/// Ctrl+C and SIGTERM stop watch mode, SIGHUP reloads the config file.
struct WatchSignals {
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
    #[cfg(unix)]
    hangup: tokio::signal::unix::Signal,
}

impl WatchSignals {
    #[cfg(unix)]
    fn install() -> anyhow::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};
        Ok(Self {
            terminate: signal(SignalKind::terminate())
                .context("failed to install SIGTERM handler")?,
            hangup: signal(SignalKind::hangup()).context("failed to install SIGHUP handler")?,
        })
    }

    #[cfg(not(unix))]
    fn install() -> anyhow::Result<Self> {
        Ok(Self {})
    }

    #[cfg(unix)]
    async fn next(&mut self) -> WatchSignal {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => WatchSignal::Stop,
            _ = self.terminate.recv() => WatchSignal::Stop,
            _ = self.hangup.recv() => WatchSignal::Reload,
        }
    }

    #[cfg(not(unix))]
    async fn next(&mut self) -> WatchSignal {
        let _ = tokio::signal::ctrl_c().await;
        WatchSignal::Stop
    }
}

/// Re-reads the config file and pushes its queue settings and subscriptions
/// into the running services. An invalid file keeps the current settings.
async fn reload_config(
    manager: &mut ConfigManager,
    ctx: &QueueContext,
    config_tx: &watch::Sender<AppConfig>,
) -> anyhow::Result<()> {
    let reloaded = ConfigManager::load(manager.path());
    queue::apply_config(ctx, reloaded.config())
        .await
        .context("invalid scheduler window")?;
    *manager = reloaded;
    config_tx.send_replace(manager.config().clone());
    tracing::info!("Reloaded {}", manager.path().display());
    Ok(())
}

async fn watch_mode(mut manager: ConfigManager, paths: Arc<dyn AppPaths>) -> anyhow::Result<()> {
    let cfg = manager.config().clone();
    let schedule = cfg.schedule().context("invalid scheduler window")?;
    let backend = Arc::new(YtDlpBackend::discover().await?);
    if cfg.auto_update_ytdlp {
        dependencies::self_update_ytdlp(backend.path()).await;
    }
    if cfg.subscriptions.iter().all(|s| !s.enabled) {
        tracing::warn!("No enabled subscriptions; use `ultratube subscribe add <URL>`");
    }

    let mut signals = WatchSignals::install()?;
    let (emitter, mut rx) = ChannelEmitter::new();
    let ctx = QueueContext::new(backend.clone(), Arc::new(emitter), cfg.concurrency_limit(), schedule);
    let fetcher = Arc::new(MetadataFetcher::new(backend, MetadataCache::default()));
    let (config_tx, config_rx) = watch::channel(cfg);
    let shutdown = CancellationToken::new();

    let gate = queue::spawn_gate_timer(ctx.clone(), DEFAULT_GATE_INTERVAL, shutdown.clone());
    let poller = tokio::spawn(
        SubscriptionPoller::new(ctx.clone(), fetcher, config_rx, paths).run(shutdown.clone()),
    );

    tracing::info!("Watching subscriptions, press Ctrl+C to stop");
    let mut console = ConsoleReporter::default();
    loop {
        tokio::select! {
            signal = signals.next() => match signal {
                WatchSignal::Stop => break,
                WatchSignal::Reload => {
                    if let Err(e) = reload_config(&mut manager, &ctx, &config_tx).await {
                        tracing::warn!("Config reload failed: {:#}", e);
                    }
                }
            },
            event = rx.recv() => {
                let Some(event) = event else { break };
                if let AppEvent::SubscriptionChecked(check) = &event {
                    if subscriptions::record_check(manager.config_mut(), check) {
                        if let Err(e) = manager.save() {
                            tracing::warn!("Could not save config: {:#}", e);
                        }
                        config_tx.send_replace(manager.config().clone());
                    }
                }
                console.handle(&event);
            }
        }
    }

    tracing::info!("Shutting down");
    shutdown.cancel();
    // Waiting jobs go first so removing a running one admits nothing new.
    let mut unfinished: Vec<JobInfo> = queue::snapshot(&ctx)
        .await
        .into_iter()
        .filter(|j| !j.status.is_terminal())
        .collect();
    unfinished.sort_by_key(|j| j.status == JobStatus::Running);
    for job in unfinished {
        queue::remove(&ctx, job.id).await;
    }
    let _ = gate.await;
    let _ = poller.await;
    Ok(())
}

async fn subscribe(
    manager: &mut ConfigManager,
    paths: Arc<dyn AppPaths>,
    action: SubscribeAction,
) -> anyhow::Result<()> {
    match action {
        SubscribeAction::Add { url } => {
            let backend = Arc::new(YtDlpBackend::discover().await?);
            let fetcher = MetadataFetcher::new(backend, MetadataCache::default());
            let sub =
                subscriptions::add_subscription(manager.config_mut(), &fetcher, paths.as_ref(), &url)
                    .await?;
            manager.save()?;
            println!("Subscribed to {} ({})", sub.title, sub.url);
        }
        SubscribeAction::Remove { url } => {
            if !subscriptions::remove_subscription(manager.config_mut(), &url) {
                return Err(anyhow!("not subscribed to {}", url));
            }
            manager.save()?;
            println!("Removed {}", url);
        }
        SubscribeAction::List => {
            let subs = &manager.config().subscriptions;
            if subs.is_empty() {
                println!("No subscriptions.");
            }
            for sub in subs {
                println!(
                    "{} {}  {}  (last check: {})",
                    if sub.enabled { "*" } else { " " },
                    sub.title,
                    sub.url,
                    sub.last_check.as_deref().unwrap_or("Never")
                );
            }
        }
    }
    Ok(())
}

fn config_command(manager: &mut ConfigManager, action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            println!("{}", serde_json::to_string_pretty(manager.config())?);
        }
        ConfigAction::Set { key, value } => {
            manager.set_key(&key, &value)?;
            manager.config().schedule().context("invalid scheduler window")?;
            manager.save()?;
            println!("{} updated", key);
        }
    }
    Ok(())
}

async fn check_update(cfg: &AppConfig) -> anyhow::Result<()> {
    let Some(manifest_url) = cfg.update_check_url.as_deref().filter(|u| !u.is_empty()) else {
        println!("No update_check_url configured.");
        return Ok(());
    };
    let client = http_client::build_client(cfg.proxy.as_deref(), Duration::from_secs(15))?;
    match update_check::check_for_update(&client, manifest_url, env!("CARGO_PKG_VERSION")).await? {
        Some(info) => println!("Update available: {} ({})", info.version, info.url),
        None => println!("ultratube {} is up to date.", env!("CARGO_PKG_VERSION")),
    }
    Ok(())
}

async fn doctor(manager: &ConfigManager, paths: &dyn AppPaths) -> anyhow::Result<()> {
    println!("config:   {}", manager.path().display());
    println!("data dir: {}", paths.data_dir().display());
    for tool in [YTDLP, FFMPEG] {
        let status = dependencies::check_version(tool).await;
        match (&status.path, &status.version) {
            (Some(path), Some(version)) => {
                println!("{:<8}  {}  ({})", status.name, version, path.display())
            }
            (Some(path), None) => {
                println!("{:<8}  unknown version  ({})", status.name, path.display())
            }
            _ => println!("{:<8}  not found", status.name),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use ultratube_core::core::events::ProgressRecord;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_url_and_subcommands() {
        let cli = Cli::try_parse_from(["ultratube", "https://fake.example/v"]).unwrap();
        assert_eq!(cli.url.as_deref(), Some("https://fake.example/v"));
        assert!(cli.command.is_none());

        let cli = Cli::try_parse_from(["ultratube", "-vv", "subscribe", "add", "https://fake.example/c"])
            .unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(matches!(
            cli.command,
            Some(Commands::Subscribe {
                action: SubscribeAction::Add { .. }
            })
        ));

        let cli = Cli::try_parse_from(["ultratube", "config", "set", "max_concurrent", "4"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Config {
                action: ConfigAction::Set { .. }
            })
        ));

        let cli = Cli::try_parse_from([
            "ultratube", "--config", "/tmp/c.json", "config", "set", "proxy", "x",
        ])
        .unwrap();
        assert_eq!(cli.config.as_deref(), Some(Path::new("/tmp/c.json")));
        assert!(cli.url.is_none());
        assert!(matches!(
            cli.command,
            Some(Commands::Config {
                action: ConfigAction::Set { ref key, ref value }
            }) if key == "proxy" && value == "x"
        ));

        let cli = Cli::try_parse_from(["ultratube", "-v", "subscribe", "list"]).unwrap();
        assert_eq!(cli.verbose, 1);
        assert!(matches!(
            cli.command,
            Some(Commands::Subscribe {
                action: SubscribeAction::List
            })
        ));

        let cli = Cli::try_parse_from(["ultratube", "-v", "config", "show"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Config {
                action: ConfigAction::Show
            })
        ));

        let cli = Cli::try_parse_from(["ultratube", "watch", "-v"]).unwrap();
        assert_eq!(cli.verbose, 1);
        assert!(matches!(cli.command, Some(Commands::Watch)));
        assert!(cli.validate().is_ok());
    }

    #[test]
    fn url_with_subcommand_is_rejected() {
        let cli = Cli::try_parse_from(["ultratube", "https://fake.example/v", "doctor"]).unwrap();
        assert!(cli.validate().is_err());

        let cli = Cli::try_parse_from(["ultratube", "-v", "https://fake.example/v"]).unwrap();
        assert!(cli.validate().is_ok());
    }

    #[test]
    fn interactive_mode_reports_bypassed_window() {
        let mut cfg = AppConfig::default();
        assert!(schedule_bypass_notice(&cfg).is_none());

        cfg.scheduler_enabled = true;
        cfg.scheduler_start = "01:00".into();
        cfg.scheduler_end = "06:00".into();
        let notice = schedule_bypass_notice(&cfg).unwrap();
        assert!(notice.contains("01:00-06:00"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn hangup_requests_reload() {
        let mut signals = WatchSignals::install().unwrap();
        let status = tokio::process::Command::new("kill")
            .arg("-HUP")
            .arg(std::process::id().to_string())
            .status()
            .await
            .unwrap();
        assert!(status.success());

        let signal = tokio::time::timeout(Duration::from_secs(5), signals.next())
            .await
            .unwrap();
        assert!(matches!(signal, WatchSignal::Reload));
    }

    struct IdleBackend;

    #[async_trait::async_trait]
    impl ultratube_core::backend::MediaBackend for IdleBackend {
        fn name(&self) -> &str {
            "idle"
        }

        async fn fetch_metadata(
            &self,
            url: &str,
            _network: &ultratube_core::models::job::NetworkOptions,
        ) -> anyhow::Result<serde_json::Value> {
            Err(anyhow!("no metadata for {}", url))
        }

        async fn download(
            &self,
            job: &DownloadJob,
            _relay: &ultratube_core::core::progress::ProgressRelay,
        ) -> anyhow::Result<ultratube_core::models::job::DownloadOutcome> {
            Err(anyhow!("no download for {}", job.url))
        }
    }

    fn idle_context() -> QueueContext {
        QueueContext::new(
            Arc::new(IdleBackend),
            Arc::new(ultratube_core::core::events::NoopEmitter),
            2,
            ScheduleWindow::disabled(),
        )
    }

    #[tokio::test]
    async fn reload_applies_edited_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut manager = ConfigManager::load(&path);
        manager.save().unwrap();

        let ctx = idle_context();
        let (config_tx, config_rx) = watch::channel(manager.config().clone());

        std::fs::write(
            &path,
            r#"{"max_concurrent": 6, "scheduler_enabled": true,
                "scheduler_start": "01:00", "scheduler_end": "02:00",
                "subscriptions": [{"url": "https://fake.example/c"}]}"#,
        )
        .unwrap();
        reload_config(&mut manager, &ctx, &config_tx).await.unwrap();

        let q = ctx.queue.lock().await;
        assert_eq!(q.max_concurrent, 6);
        assert!(q.schedule.enabled);
        drop(q);
        assert_eq!(manager.config().max_concurrent, 6);
        let seen = config_rx.borrow().clone();
        assert_eq!(seen.subscriptions.len(), 1);
        assert_eq!(seen.subscriptions[0].title, "https://fake.example/c");
    }

    #[tokio::test]
    async fn reload_with_bad_window_keeps_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut manager = ConfigManager::load(&path);
        manager.save().unwrap();

        let ctx = idle_context();
        let (config_tx, config_rx) = watch::channel(manager.config().clone());

        std::fs::write(
            &path,
            r#"{"max_concurrent": 6, "scheduler_enabled": true, "scheduler_start": "25:99"}"#,
        )
        .unwrap();
        assert!(reload_config(&mut manager, &ctx, &config_tx).await.is_err());

        assert_eq!(ctx.queue.lock().await.max_concurrent, 2);
        assert_eq!(manager.config().max_concurrent, 3);
        assert_eq!(config_rx.borrow().max_concurrent, 3);
    }

    #[tokio::test]
    async fn drain_stops_when_all_terminal() {
        let (tx, rx) = mpsc::unbounded_channel();
        let job = |id, status| JobInfo {
            id,
            url: format!("https://fake.example/{}", id),
            title: format!("Video {}", id),
            status,
            percent: 0.0,
            speed: String::new(),
            eta: String::new(),
            file_path: None,
        };
        tx.send(AppEvent::Progress {
            job_id: 1,
            record: ProgressRecord::new(ProgressStatus::Downloading),
        })
        .unwrap();
        tx.send(AppEvent::QueueState(vec![job(1, JobStatus::Running)]))
            .unwrap();
        tx.send(AppEvent::QueueState(vec![
            job(1, JobStatus::Finished),
            job(
                2,
                JobStatus::Errored {
                    message: "boom".into(),
                },
            ),
        ]))
        .unwrap();

        let report = drain_until_idle(rx, 2).await;
        assert_eq!(report.finished, 1);
        assert_eq!(report.failed, 1);
    }
}
