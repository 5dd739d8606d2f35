//! Global context for compendium operations.
//!
//! Provides centralized access to the project root, merged configuration,
//! and the offline switch.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::core::manifest::{ManifestError, MANIFEST_NAME};
use crate::util::config::{global_config_dir, load_config, project_config_path, Config};

/// Global context containing configuration and paths.
#[derive(Debug, Clone)]
pub struct GlobalContext {
    /// Current working directory
    cwd: PathBuf,

    /// Home directory for global compendium data (~/.compendium/)
    home: Option<PathBuf>,

    /// Merged configuration
    config: Config,

    /// Never touch the network
    offline: bool,
}

impl GlobalContext {
    /// Create a context rooted at the process working directory.
    pub fn new() -> Result<Self> {
        let cwd = std::env::current_dir().context("failed to get current directory")?;
        Self::with_cwd(cwd)
    }

    /// Create a context with a specific working directory.
    ///
    /// Configuration is loaded for the project containing `cwd`, falling
    /// back to `cwd` itself when no DESCRIPTION is found above it.
    pub fn with_cwd(cwd: PathBuf) -> Result<Self> {
        let home = global_config_dir();
        let root = find_project_root(&cwd).unwrap_or_else(|_| cwd.clone());
        let global_path = home.as_ref().map(|h| h.join("config.toml"));
        let config = load_config(global_path.as_deref(), &project_config_path(&root));
        config.validate().context("invalid compendium configuration")?;

        let offline = config.registry.offline;
        Ok(GlobalContext {
            cwd,
            home,
            config,
            offline,
        })
    }

    /// Force offline mode.
    pub fn set_offline(&mut self, offline: bool) {
        self.offline = self.offline || offline;
    }

    /// Get the current working directory.
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Get the global home directory (~/.compendium/), if a home exists.
    pub fn home(&self) -> Option<&Path> {
        self.home.as_deref()
    }

    /// Get the merged configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Check if offline mode is enabled.
    pub fn is_offline(&self) -> bool {
        self.offline
    }

    /// Find the project root (directory containing DESCRIPTION) at or above cwd.
    pub fn find_project_root(&self) -> Result<PathBuf, ManifestError> {
        find_project_root(&self.cwd)
    }
}

/// Search upward from `start` for a directory containing DESCRIPTION.
pub fn find_project_root(start: &Path) -> Result<PathBuf, ManifestError> {
    let mut current = start.to_path_buf();
    loop {
        if current.join(MANIFEST_NAME).is_file() {
            return Ok(current);
        }
        if !current.pop() {
            return Err(ManifestError::NotFound {
                dir: start.to_path_buf(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_find_project_root_from_subdir() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join(MANIFEST_NAME), "Package: demo\n").unwrap();
        let sub = tmp.path().join("R").join("nested");
        std::fs::create_dir_all(&sub).unwrap();

        assert_eq!(find_project_root(&sub).unwrap(), tmp.path());
    }

    #[test]
    fn test_find_project_root_missing() {
        let tmp = TempDir::new().unwrap();
        let result = find_project_root(tmp.path());
        assert!(matches!(result, Err(ManifestError::NotFound { .. })));
    }

    #[test]
    fn test_context_reads_project_config() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join(MANIFEST_NAME), "Package: demo\n").unwrap();
        let cfg = project_config_path(tmp.path());
        std::fs::create_dir_all(cfg.parent().unwrap()).unwrap();
        std::fs::write(&cfg, "[registry]\noffline = true\n").unwrap();

        let ctx = GlobalContext::with_cwd(tmp.path().to_path_buf()).unwrap();
        assert!(ctx.is_offline());
        assert_eq!(ctx.find_project_root().unwrap(), tmp.path());
    }

    #[test]
    fn test_offline_flag_is_sticky() {
        let tmp = TempDir::new().unwrap();
        let mut ctx = GlobalContext::with_cwd(tmp.path().to_path_buf()).unwrap();
        ctx.set_offline(true);
        ctx.set_offline(false);
        assert!(ctx.is_offline());
    }
}
