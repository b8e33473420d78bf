use std::path::PathBuf;

const APP_DIR: &str = "ultratube";
const DATA_DIR_ENV: &str = "ULTRATUBE_DATA_DIR";

pub trait AppPaths: Send + Sync {
    fn data_dir(&self) -> PathBuf;
    fn bin_dir(&self) -> PathBuf;

    fn config_file(&self) -> PathBuf {
        self.data_dir().join("config.json")
    }

    /// Cookie store written by the in-app browser profile.
    fn browser_cookie_file(&self) -> PathBuf {
        self.data_dir().join("browser_data").join("Cookies")
    }
}

pub struct DesktopPaths;

impl AppPaths for DesktopPaths {
    fn data_dir(&self) -> PathBuf {
        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            return PathBuf::from(dir);
        }
        dirs::data_dir()
            .map(|d| d.join(APP_DIR))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    fn bin_dir(&self) -> PathBuf {
        self.data_dir().join("bin")
    }
}

/// Paths rooted at a fixed directory, used for portable installs and tests.
pub struct RootedPaths {
    root: PathBuf,
}

impl RootedPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl AppPaths for RootedPaths {
    fn data_dir(&self) -> PathBuf {
        self.root.clone()
    }

    fn bin_dir(&self) -> PathBuf {
        self.root.join("bin")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rooted_paths_layout() {
        let paths = RootedPaths::new("/tmp/ut");
        assert_eq!(paths.config_file(), PathBuf::from("/tmp/ut/config.json"));
        assert_eq!(
            paths.browser_cookie_file(),
            PathBuf::from("/tmp/ut/browser_data/Cookies")
        );
        assert_eq!(paths.bin_dir(), PathBuf::from("/tmp/ut/bin"));
    }
}
