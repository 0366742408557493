//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::schedule::{ClockTime, ClosingWindow};

/// Default program prefix every card number must start with.
pub const DEFAULT_CARD_PREFIX: &str = "504948";

/// Intake configuration.
#[derive(Debug, Clone)]
pub struct IntakeConfig {
    /// Path of the libSQL database file.
    pub db_path: PathBuf,
    /// Sender ids allowed into the admin menu.
    pub admin_senders: Vec<String>,
    /// Fixed program prefix for card numbers.
    pub card_prefix: String,
    /// How long after a submission "undo" still works.
    pub undo_window: Duration,
    /// Daily closing window, unless an admin override is stored.
    pub closing_window: ClosingWindow,
    /// Directory for rotated log files. Stderr only when unset.
    pub log_dir: Option<PathBuf>,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/intake.db"),
            admin_senders: Vec::new(),
            card_prefix: DEFAULT_CARD_PREFIX.to_string(),
            undo_window: Duration::from_secs(30 * 60), // 30 minutes
            closing_window: ClosingWindow::default(),
            log_dir: None,
        }
    }
}

impl IntakeConfig {
    /// Build config from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let db_path = std::env::var("INTAKE_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);

        let admin_senders: Vec<String> = std::env::var("INTAKE_ADMINS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let card_prefix = match std::env::var("INTAKE_CARD_PREFIX") {
            Ok(p) if p.len() == 6 && p.chars().all(|c| c.is_ascii_digit()) => p,
            Ok(p) => {
                return Err(ConfigError::InvalidValue {
                    key: "INTAKE_CARD_PREFIX".to_string(),
                    message: format!("expected 6 digits, got {p:?}"),
                });
            }
            Err(_) => defaults.card_prefix,
        };

        let undo_window = std::env::var("INTAKE_UNDO_MINUTES")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(|m| Duration::from_secs(m * 60))
            .unwrap_or(defaults.undo_window);

        let start = clock_from_env("INTAKE_CLOSE_START")?;
        let end = clock_from_env("INTAKE_CLOSE_END")?;
        let closing_window = ClosingWindow::daily(
            start.unwrap_or(defaults.closing_window.start),
            end.unwrap_or(defaults.closing_window.end),
        );

        let log_dir = std::env::var("INTAKE_LOG_DIR").ok().map(PathBuf::from);

        Ok(Self {
            db_path,
            admin_senders,
            card_prefix,
            undo_window,
            closing_window,
            log_dir,
        })
    }

    pub fn is_admin(&self, sender: &str) -> bool {
        self.admin_senders.iter().any(|a| a == sender)
    }
}

fn clock_from_env(key: &str) -> Result<Option<ClockTime>, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => ClockTime::parse(&raw)
            .map(Some)
            .ok_or_else(|| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("expected HH.MM, got {raw:?}"),
            }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = IntakeConfig::default();
        assert_eq!(config.card_prefix, "504948");
        assert_eq!(config.undo_window, Duration::from_secs(1800));
        assert_eq!(config.closing_window.start, ClockTime::new(4, 1).unwrap());
        assert_eq!(config.closing_window.end, ClockTime::new(6, 0).unwrap());
        assert!(config.log_dir.is_none());
    }

    #[test]
    fn admin_lookup() {
        let config = IntakeConfig {
            admin_senders: vec!["6281200000000".to_string()],
            ..IntakeConfig::default()
        };
        assert!(config.is_admin("6281200000000"));
        assert!(!config.is_admin("6281299999999"));
    }
}
