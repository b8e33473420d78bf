use std::time::Duration;

const USER_AGENT: &str = concat!("ultratube/", env!("CARGO_PKG_VERSION"));

/// Routes every request through the configured proxy, if any. Accepts the
/// same `scheme://[user:pass@]host:port` form that is passed to yt-dlp.
pub fn apply_proxy(
    builder: reqwest::ClientBuilder,
    proxy: Option<&str>,
) -> anyhow::Result<reqwest::ClientBuilder> {
    match proxy.map(str::trim).filter(|p| !p.is_empty()) {
        Some(url) => Ok(builder.proxy(reqwest::Proxy::all(url)?)),
        None => Ok(builder),
    }
}

pub fn build_client(proxy: Option<&str>, timeout: Duration) -> anyhow::Result<reqwest::Client> {
    let builder = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(10))
        .timeout(timeout);
    Ok(apply_proxy(builder, proxy)?.build()?)
}
