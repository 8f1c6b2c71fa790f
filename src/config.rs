use crate::detect::{DEFAULT_LABEL_ATTRIBUTE, DEFAULT_TOOLTIP_ATTRIBUTE};
use crate::error::BadgeResult;
use crate::monitor::MonitorConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const APP_ID: &str = "com.arivest.messenger-desktop";
pub const APP_NAME: &str = "Messenger";

const SETTINGS_FILE: &str = "badge_settings.json";

/// An extra label phrasing, e.g. for a locale the built-in table lacks.
/// `pattern` must contain a `(?P<count>...)` group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternConfig {
    pub locale: String,
    pub pattern: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub app_name: String,
    pub debounce_ms: u64,
    pub retry_interval_ms: u64,
    /// Detection passes tried before an empty page counts as "no unread".
    pub max_attempts: u32,
    pub label_attribute: String,
    pub tooltip_attribute: String,
    pub extra_patterns: Vec<PatternConfig>,
    /// Post a desktop notification when the unread count goes up.
    pub notify_on_increase: bool,
    #[serde(skip)]
    path: PathBuf,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        DetectorConfig {
            app_name: APP_NAME.to_string(),
            debounce_ms: 500,
            retry_interval_ms: 1000,
            max_attempts: 10,
            label_attribute: DEFAULT_LABEL_ATTRIBUTE.to_string(),
            tooltip_attribute: DEFAULT_TOOLTIP_ATTRIBUTE.to_string(),
            extra_patterns: Vec::new(),
            notify_on_increase: true,
            path: PathBuf::new(),
        }
    }
}

impl DetectorConfig {
    pub fn load(data_dir: &Path) -> BadgeResult<Self> {
        let path = data_dir.join(SETTINGS_FILE);
        if path.exists() {
            let data = std::fs::read_to_string(&path)?;
            let mut config: DetectorConfig = serde_json::from_str(&data)?;
            config.path = path;
            if config.max_attempts == 0 {
                config.max_attempts = 1;
            }
            Ok(config)
        } else {
            Ok(DetectorConfig {
                path,
                ..Default::default()
            })
        }
    }

    pub fn save(&self) -> BadgeResult<()> {
        let data = serde_json::to_string_pretty(self)?;
        std::fs::write(&self.path, data)?;
        Ok(())
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            debounce: Duration::from_millis(self.debounce_ms),
            retry_interval: Duration::from_millis(self.retry_interval_ms),
            max_attempts: self.max_attempts.max(1),
        }
    }
}

/// Per-user data directory for the desktop shell, e.g.
/// `~/.local/share/com.arivest.messenger-desktop` on Linux.
pub fn default_data_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join(APP_ID))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = DetectorConfig::load(dir.path()).unwrap();
        assert_eq!(config.app_name, "Messenger");
        assert_eq!(config.debounce_ms, 500);
        assert_eq!(config.retry_interval_ms, 1000);
        assert_eq!(config.max_attempts, 10);
        assert_eq!(config.label_attribute, "aria-label");
        assert_eq!(config.tooltip_attribute, "title");
        assert!(config.notify_on_increase);
    }

    #[test]
    fn data_dir_is_keyed_by_app_id() {
        if let Some(dir) = default_data_dir() {
            assert!(dir.ends_with(APP_ID));
            assert_eq!(dir.parent(), dirs::data_dir().as_deref());
        }
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = DetectorConfig::load(dir.path()).unwrap();
        config.debounce_ms = 250;
        config.extra_patterns.push(PatternConfig {
            locale: "es".into(),
            pattern: r"(?P<count>[0-9]+) sin leer".into(),
        });
        config.save().unwrap();

        let loaded = DetectorConfig::load(dir.path()).unwrap();
        assert_eq!(loaded.debounce_ms, 250);
        assert_eq!(loaded.extra_patterns, config.extra_patterns);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(SETTINGS_FILE),
            r#"{ "app_name": "Messenger Beta", "max_attempts": 0 }"#,
        )
        .unwrap();

        let config = DetectorConfig::load(dir.path()).unwrap();
        assert_eq!(config.app_name, "Messenger Beta");
        assert_eq!(config.max_attempts, 1);
        assert_eq!(config.debounce_ms, 500);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(SETTINGS_FILE), "{ not json").unwrap();
        assert!(DetectorConfig::load(dir.path()).is_err());
    }

    #[test]
    fn monitor_config_durations() {
        let config = DetectorConfig::default();
        let monitor = config.monitor_config();
        assert_eq!(monitor.debounce, Duration::from_millis(500));
        assert_eq!(monitor.retry_interval, Duration::from_secs(1));
        assert_eq!(monitor.max_attempts, 10);
    }
}
