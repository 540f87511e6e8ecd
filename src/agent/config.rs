use std::{path::Path, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::tracker::classifier::WorkTimeConfig;

fn default_poll_interval_secs() -> u64 {
    300
}

fn default_user_id() -> String {
    "local".into()
}

/// Agent configuration document. Every field defaults so the agent starts with
/// partial documents and with no document at all. Without watch roots a scan
/// pass is simply a no-op.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub watch_roots: Vec<PathBuf>,
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_user_id")]
    pub user_id: String,
    #[serde(default)]
    pub work_time: WorkTimeConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            watch_roots: vec![],
            exclude_patterns: vec![],
            poll_interval_secs: default_poll_interval_secs(),
            user_id: default_user_id(),
            work_time: WorkTimeConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Configuration absence is not an error, only unreadable documents are
    /// worth a warning.
    pub fn load(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(v) => v,
            Err(_) => {
                info!("No configuration at {path:?}, using defaults");
                return Self::default();
            }
        };
        match serde_json::from_str(&content) {
            Ok(v) => v,
            Err(e) => {
                warn!("Configuration {path:?} is unreadable, using defaults: {e}");
                Self::default()
            }
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use tempfile::tempdir;

    use super::AgentConfig;

    #[test]
    fn test_missing_config_uses_defaults() {
        let config = AgentConfig::load(std::path::Path::new("/definitely/not/here.json"));
        assert_eq!(config, AgentConfig::default());
        assert!(config.watch_roots.is_empty());
    }

    #[test]
    fn test_partial_config_fills_defaults() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("config.json");
        std::fs::write(&path, br#"{"watch_roots":["/work"],"user_id":"dev"}"#)?;

        let config = AgentConfig::load(&path);
        assert_eq!(config.watch_roots, vec![std::path::PathBuf::from("/work")]);
        assert_eq!(config.user_id, "dev");
        assert_eq!(config.poll_interval_secs, 300);
        Ok(())
    }

    #[test]
    fn test_corrupt_config_uses_defaults() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("config.json");
        std::fs::write(&path, b"{{{{")?;

        assert_eq!(AgentConfig::load(&path), AgentConfig::default());
        Ok(())
    }

    #[test]
    fn test_poll_interval_has_a_floor() {
        let config = AgentConfig {
            poll_interval_secs: 0,
            ..AgentConfig::default()
        };
        assert_eq!(config.poll_interval().as_secs(), 1);
    }
}
