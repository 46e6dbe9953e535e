use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Event the stats hook is registered under in settings.json.
pub const HOOK_EVENT: &str = "PostToolUse";
/// Matcher used for the registration (every tool).
pub const HOOK_MATCHER: &str = "*";

/// Installed name of the PostToolUse handler.
pub const HOOK_HANDLER_NAME: &str = "log-token-stats";
/// Installed name of the viewer (and of the shell alias).
pub const VIEWER_NAME: &str = "claude-stats";

/// Comment line written above the alias so uninstall can find the block.
pub const ALIAS_MARKER: &str = "# Claude Code token stats";

/// Shell startup files, in order of preference. The first one that exists is patched.
pub const PROFILE_CANDIDATES: [&str; 2] = [".zshrc", ".bashrc"];

/// Every per-user path the installer, hook and viewer touch.
///
/// Built once from the home directory at the CLI boundary and passed down
/// by reference, so nothing below `main` reads the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    home: PathBuf,
    base: PathBuf,
}

impl Layout {
    pub fn from_home(home: impl Into<PathBuf>) -> Self {
        let home = home.into();
        let base = home.join(".claude");
        Self { home, base }
    }

    /// Resolve the layout for the invoking user (`$HOME` on unix).
    pub fn discover() -> Result<Self> {
        let home = dirs::home_dir().context("Cannot find home directory")?;
        Ok(Self::from_home(home))
    }

    #[cfg(test)]
    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn base_dir(&self) -> &Path {
        &self.base
    }

    pub fn hooks_dir(&self) -> PathBuf {
        self.base.join("hooks")
    }

    pub fn stats_dir(&self) -> PathBuf {
        self.base.join("stats")
    }

    pub fn settings_path(&self) -> PathBuf {
        self.base.join("settings.json")
    }

    pub fn hook_handler_path(&self) -> PathBuf {
        self.hooks_dir().join(HOOK_HANDLER_NAME)
    }

    pub fn viewer_path(&self) -> PathBuf {
        self.hooks_dir().join(VIEWER_NAME)
    }

    pub fn pricing_path(&self) -> PathBuf {
        self.stats_dir().join("pricing.json")
    }

    pub fn timeseries_path(&self) -> PathBuf {
        self.stats_dir().join("timeseries.json")
    }

    pub fn debug_log_path(&self) -> PathBuf {
        self.stats_dir().join("debug.log")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.stats_dir().join(".stats.lock")
    }

    /// Daily stats file for a `YYYY-MM-DD` date.
    pub fn daily_path(&self, date: &str) -> PathBuf {
        self.stats_dir().join(format!("{}.json", date))
    }

    pub fn profile_candidates(&self) -> Vec<PathBuf> {
        PROFILE_CANDIDATES
            .iter()
            .map(|name| self.home.join(name))
            .collect()
    }

    /// First profile candidate that exists. Falls back to the preferred
    /// candidate so callers still get a path; patching an absent file is a no-op.
    pub fn shell_profile(&self) -> PathBuf {
        let candidates = self.profile_candidates();
        candidates
            .iter()
            .find(|p| p.exists())
            .cloned()
            .unwrap_or_else(|| candidates[0].clone())
    }

    /// Command string stored in settings.json. Quoted when the path has whitespace,
    /// since Claude Code hands it to a shell.
    pub fn hook_command(&self) -> String {
        let path = self.hook_handler_path().to_string_lossy().to_string();
        if path.chars().any(char::is_whitespace) {
            format!("\"{}\"", path)
        } else {
            path
        }
    }

    pub fn alias_line(&self) -> String {
        format!(
            "alias {}=\"{}\"",
            VIEWER_NAME,
            self.viewer_path().to_string_lossy()
        )
    }
}
