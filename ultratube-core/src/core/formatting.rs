use regex::Regex;
use std::sync::LazyLock;

static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?i)^(?:http|ftp)s?://",
        r"(?:(?:[A-Z0-9](?:[A-Z0-9-]{0,61}[A-Z0-9])?\.)+(?:[A-Z]{2,6}\.?|[A-Z0-9-]{2,}\.?)",
        r"|localhost",
        r"|\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3})",
        r"(?::\d+)?",
        r"(?:/?|[/?]\S+)$",
    ))
    .unwrap()
});

const UNITS: [&str; 5] = ["", "K", "M", "G", "T"];

pub fn format_bytes(size: Option<u64>) -> String {
    let size = match size {
        Some(s) if s > 0 => s,
        _ => return "N/A".to_string(),
    };

    let mut value = size as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.2}{}B", value, UNITS[unit])
}

pub fn is_valid_url(url: &str) -> bool {
    !url.is_empty() && URL_RE.is_match(url)
}
