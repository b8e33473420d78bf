use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UpdateInfo {
    pub version: String,
    pub url: String,
}

/// Fetches the release manifest and returns it when it names a newer
/// version than `current`.
pub async fn check_for_update(
    client: &reqwest::Client,
    manifest_url: &str,
    current: &str,
) -> anyhow::Result<Option<UpdateInfo>> {
    let response = client.get(manifest_url).send().await?;
    if !response.status().is_success() {
        anyhow::bail!("Update check failed: HTTP {}", response.status());
    }
    let info: UpdateInfo = response.json().await?;
    tracing::debug!("Latest release {} (running {})", info.version, current);

    if is_newer(&info.version, current) {
        Ok(Some(info))
    } else {
        Ok(None)
    }
}

/// Numeric comparison of dotted versions. A leading `v` is ignored and
/// missing components count as zero, so `1.2` == `1.2.0`.
pub fn is_newer(remote: &str, current: &str) -> bool {
    parse_version(remote) > parse_version(current)
}

fn parse_version(version: &str) -> Vec<u64> {
    let mut parts: Vec<u64> = version
        .trim()
        .trim_start_matches(['v', 'V'])
        .split('.')
        .map(|p| {
            let digits: String = p.chars().take_while(|c| c.is_ascii_digit()).collect();
            digits.parse().unwrap_or(0)
        })
        .collect();
    while parts.last() == Some(&0) {
        parts.pop();
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compares_numerically() {
        assert!(is_newer("0.10.0", "0.9.9"));
        assert!(is_newer("1.0", "0.99"));
        assert!(!is_newer("0.4.0", "0.4.0"));
        assert!(!is_newer("0.3.9", "0.4.0"));
    }

    #[test]
    fn tolerates_prefixes_and_padding() {
        assert!(!is_newer("v1.2", "1.2.0"));
        assert!(is_newer("v1.2.1", "1.2"));
        assert!(is_newer("2.0.0-beta", "1.9"));
    }

    #[test]
    fn manifest_shape() {
        let info: UpdateInfo = serde_json::from_str(
            r#"{"version": "1.0.0", "url": "https://fake.example/release"}"#,
        )
        .unwrap();
        assert_eq!(info.version, "1.0.0");
    }
}
