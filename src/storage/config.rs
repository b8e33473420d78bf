use std::path::{Path, PathBuf};

use anyhow::Context;
use ultratube_core::models::settings::AppConfig;

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".bak");
    path.with_file_name(name)
}

fn backup_corrupt(path: &Path) {
    let backup = backup_path(path);
    match std::fs::copy(path, &backup) {
        Ok(_) => tracing::warn!("Unreadable config kept as {}", backup.display()),
        Err(e) => tracing::warn!("Could not back up {}: {}", path.display(), e),
    }
}

/// Owns the on-disk JSON config and the in-memory copy of it.
pub struct ConfigManager {
    path: PathBuf,
    config: AppConfig,
}

impl ConfigManager {
    /// Missing file gives defaults. A corrupt file is copied to `<name>.bak`
    /// and replaced by defaults on the next save.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let config = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<AppConfig>(&content) {
                Ok(mut config) => {
                    config.fill_missing_titles();
                    config
                }
                Err(e) => {
                    tracing::warn!("Error loading config {}: {}", path.display(), e);
                    backup_corrupt(&path);
                    AppConfig::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => AppConfig::default(),
            Err(e) => {
                tracing::warn!("Could not read config {}: {}", path.display(), e);
                AppConfig::default()
            }
        };
        Self { path, config }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut AppConfig {
        &mut self.config
    }

    pub fn save(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(&self.config)?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("writing {}", self.path.display()))?;
        Ok(())
    }

    /// Merges a partial JSON object over the current config. The result must
    /// still deserialize, otherwise nothing changes.
    pub fn update(&mut self, patch: &serde_json::Value) -> anyhow::Result<()> {
        if !patch.is_object() {
            anyhow::bail!("config patch must be a JSON object");
        }
        let mut current = serde_json::to_value(&self.config)?;
        merge_json(&mut current, patch);
        self.config = serde_json::from_value(current).context("invalid config value")?;
        Ok(())
    }

    /// `value` is parsed as JSON first and falls back to a plain string, so
    /// `max_concurrent 4` and `proxy http://host:8080` both work.
    pub fn set_key(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        let parsed = serde_json::from_str::<serde_json::Value>(value)
            .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
        let known = serde_json::to_value(&self.config)?;
        if known.get(key).is_none() {
            anyhow::bail!("unknown config key: {}", key);
        }
        let mut patch = serde_json::Map::new();
        patch.insert(key.to_string(), parsed);
        self.update(&serde_json::Value::Object(patch))
    }
}

fn merge_json(base: &mut serde_json::Value, patch: &serde_json::Value) {
    if let (Some(base_obj), Some(patch_obj)) = (base.as_object_mut(), patch.as_object()) {
        for (key, value) in patch_obj {
            match base_obj.get_mut(key) {
                Some(existing) if existing.is_object() && value.is_object() => {
                    merge_json(existing, value)
                }
                _ => {
                    base_obj.insert(key.clone(), value.clone());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ultratube_core::models::settings::Subscription;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::load(dir.path().join("config.json"));
        let cfg = manager.config();
        assert_eq!(cfg.max_concurrent, 3);
        assert!(cfg.dark_mode);
        assert_eq!(cfg.download_folder, PathBuf::from("downloads"));
    }

    #[test]
    fn save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut manager = ConfigManager::load(&path);
        manager.config_mut().max_concurrent = 5;
        manager
            .config_mut()
            .subscriptions
            .push(Subscription::new("https://fake.example/c", "Chan"));
        manager.save().unwrap();

        let reloaded = ConfigManager::load(&path);
        assert_eq!(reloaded.config().max_concurrent, 5);
        assert_eq!(reloaded.config().subscriptions.len(), 1);
        assert_eq!(reloaded.config().subscriptions[0].title, "Chan");
    }

    #[test]
    fn corrupt_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        let manager = ConfigManager::load(&path);
        assert_eq!(manager.config(), &AppConfig::default());
        assert_eq!(
            std::fs::read_to_string(dir.path().join("config.json.bak")).unwrap(),
            "{ not json"
        );
    }

    #[test]
    fn untitled_subscription_keeps_rest_of_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                "max_concurrent": 7,
                "subscriptions": [
                    {"url": "https://fake.example/a", "title": "A"},
                    {"url": "https://fake.example/b"}
                ]
            }"#,
        )
        .unwrap();

        let manager = ConfigManager::load(&path);
        let cfg = manager.config();
        assert_eq!(cfg.max_concurrent, 7);
        assert_eq!(cfg.subscriptions.len(), 2);
        assert_eq!(cfg.subscriptions[0].title, "A");
        assert_eq!(cfg.subscriptions[1].title, "https://fake.example/b");
        assert!(cfg.subscriptions[1].enabled);
        assert!(!dir.path().join("config.json.bak").exists());
    }

    #[test]
    fn update_merges_partial() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = ConfigManager::load(dir.path().join("config.json"));
        manager
            .update(&serde_json::json!({"dark_mode": false, "proxy": "socks5://127.0.0.1:9050"}))
            .unwrap();
        assert!(!manager.config().dark_mode);
        assert_eq!(
            manager.config().proxy.as_deref(),
            Some("socks5://127.0.0.1:9050")
        );
        assert_eq!(manager.config().max_concurrent, 3);
    }

    #[test]
    fn invalid_update_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = ConfigManager::load(dir.path().join("config.json"));
        assert!(manager
            .update(&serde_json::json!({"max_concurrent": "many"}))
            .is_err());
        assert_eq!(manager.config().max_concurrent, 3);
    }

    #[test]
    fn set_key_parses_json_or_string() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = ConfigManager::load(dir.path().join("config.json"));
        manager.set_key("max_concurrent", "4").unwrap();
        manager.set_key("scheduler_start", "01:30").unwrap();
        assert_eq!(manager.config().max_concurrent, 4);
        assert_eq!(manager.config().scheduler_start, "01:30");
        assert!(manager.set_key("no_such_key", "1").is_err());
    }
}
