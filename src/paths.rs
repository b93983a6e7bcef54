//! Resolves the on-disk locations the service needs: config file, model asset directory, and
//! default gallery/persistence paths when none are set explicitly in config. Collapses what used
//! to be three overlapping dev/system/user path strategies into the single layout the deployed
//! controller actually runs under, with a `--dev` override for local iteration off-device.

use directories::ProjectDirs;
use std::path::PathBuf;

const QUALIFIER: &str = "";
const ORGANIZATION: &str = "doorlock";
const APPLICATION: &str = "doorlock";

pub struct Paths {
    dev_root: Option<PathBuf>,
}

impl Paths {
    /// `dev_root` set means "run entirely out of this directory" (used by integration tests and
    /// local iteration); `None` means use the system/XDG locations a deployed unit runs under.
    pub fn new(dev_root: Option<PathBuf>) -> Self {
        Self { dev_root }
    }

    pub fn system() -> Self {
        Self::new(None)
    }

    pub fn dev(base_dir: impl Into<PathBuf>) -> Self {
        Self::new(Some(base_dir.into()))
    }

    pub fn config_file(&self) -> PathBuf {
        match &self.dev_root {
            Some(base) => base.join("doorlock.toml"),
            None => PathBuf::from("/etc/doorlock/doorlock.toml"),
        }
    }

    pub fn models_dir(&self) -> PathBuf {
        match &self.dev_root {
            Some(base) => base.join("models"),
            None => PathBuf::from("/usr/share/doorlock/models"),
        }
    }

    pub fn gallery_path(&self) -> PathBuf {
        match &self.dev_root {
            Some(base) => base.join("gallery.json"),
            None => self.var_dir().join("gallery.json"),
        }
    }

    pub fn db_path(&self) -> PathBuf {
        match &self.dev_root {
            Some(base) => base.join("doorlock.db"),
            None => self.var_dir().join("doorlock.db"),
        }
    }

    fn var_dir(&self) -> PathBuf {
        ProjectDirs::from(QUALIFIER, ORGANIZATION, APPLICATION)
            .map(|d| d.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("/var/lib/doorlock"))
    }

    pub fn is_dev(&self) -> bool {
        self.dev_root.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dev_paths_stay_under_dev_root() {
        let paths = Paths::dev("/tmp/doorlock_dev_test");
        assert!(paths.gallery_path().starts_with("/tmp/doorlock_dev_test"));
        assert!(paths.db_path().starts_with("/tmp/doorlock_dev_test"));
        assert!(paths.is_dev());
    }

    #[test]
    fn system_paths_are_absolute() {
        let paths = Paths::system();
        assert!(paths.config_file().is_absolute());
        assert!(paths.models_dir().is_absolute());
        assert!(!paths.is_dev());
    }
}
