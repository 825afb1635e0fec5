//! Global context for Quay operations.
//!
//! Provides centralized access to configuration, paths, and environment.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use directories::{BaseDirs, ProjectDirs};

use crate::util::config::{load_config, project_config_path, Config};

/// Environment variable overriding the Quay home directory.
pub const QUAY_HOME_ENV: &str = "QUAY_HOME";

/// Project directories for Quay
static PROJECT_DIRS: LazyLock<Option<ProjectDirs>> =
    LazyLock::new(|| ProjectDirs::from("dev", "quay", "quay"));

/// Global context containing configuration and paths.
#[derive(Debug, Clone)]
pub struct GlobalContext {
    /// Current working directory
    cwd: PathBuf,

    /// Home directory for global Quay data (~/.quay/)
    home: PathBuf,

    /// Shared package cache
    cache_dir: PathBuf,

    /// Whether to use verbose output
    verbose: bool,

    /// Whether to use colors in output
    color: bool,
}

impl GlobalContext {
    /// Create a new GlobalContext from the environment.
    ///
    /// `QUAY_HOME` relocates both the home and the cache directory.
    pub fn new() -> Result<Self> {
        let cwd = std::env::current_dir().context("failed to get current directory")?;

        if let Some(home) = std::env::var_os(QUAY_HOME_ENV).filter(|h| !h.is_empty()) {
            return Ok(Self::with_home(cwd, PathBuf::from(home)));
        }

        let home = BaseDirs::new()
            .map(|dirs| dirs.home_dir().join(".quay"))
            .unwrap_or_else(|| PathBuf::from(".quay"));

        let cache_dir = match PROJECT_DIRS.as_ref() {
            Some(dirs) => dirs.cache_dir().to_path_buf(),
            None => home.join("cache"),
        };

        Ok(GlobalContext {
            cwd,
            home,
            cache_dir,
            verbose: false,
            color: true,
        })
    }

    /// Create a GlobalContext rooted at an explicit home directory.
    pub fn with_home(cwd: PathBuf, home: PathBuf) -> Self {
        GlobalContext {
            cache_dir: home.join("cache"),
            cwd,
            home,
            verbose: false,
            color: true,
        }
    }

    /// Set verbose mode.
    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    /// Set color output.
    pub fn set_color(&mut self, color: bool) {
        self.color = color;
    }

    /// Get the current working directory.
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Get the shared package cache directory.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Get the global configuration file path.
    pub fn config_path(&self) -> PathBuf {
        self.home.join("config.toml")
    }

    /// Get the project configuration file path.
    pub fn project_config_path(&self) -> PathBuf {
        project_config_path(&self.cwd)
    }

    /// Load the merged global and project configuration.
    pub fn load_config(&self) -> Config {
        load_config(&self.config_path(), &self.project_config_path())
    }

    /// Check if verbose mode is enabled.
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Check if color output is enabled.
    pub fn color(&self) -> bool {
        self.color
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_context_paths() {
        let ctx = GlobalContext::new().unwrap();
        assert!(ctx.cwd().is_absolute());
        assert!(ctx.config_path().ends_with("config.toml"));
    }

    #[test]
    fn test_explicit_home() {
        let tmp = TempDir::new().unwrap();
        let ctx = GlobalContext::with_home(tmp.path().join("project"), tmp.path().join("home"));

        assert_eq!(ctx.cache_dir(), tmp.path().join("home/cache"));
        assert_eq!(ctx.config_path(), tmp.path().join("home/config.toml"));
        assert_eq!(
            ctx.project_config_path(),
            tmp.path().join("project/.quay/config.toml")
        );
    }

    #[test]
    fn test_load_config_merges_project() {
        let tmp = TempDir::new().unwrap();
        let home = tmp.path().join("home");
        let project = tmp.path().join("project");
        std::fs::create_dir_all(&home).unwrap();
        std::fs::create_dir_all(project.join(".quay")).unwrap();
        std::fs::write(home.join("config.toml"), "[net]\njobs = 2\n").unwrap();
        std::fs::write(project.join(".quay/config.toml"), "[net]\noffline = true\n").unwrap();

        let config = GlobalContext::with_home(project, home).load_config();
        assert_eq!(config.jobs(), 2);
        assert!(config.net.offline);
    }
}
