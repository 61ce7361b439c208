//! Application configuration. Storage backend, paths, session defaults.

use serde::Deserialize;
use std::path::PathBuf;

/// Default capacity of the ticket event broadcast channel.
pub const DEFAULT_NOTIFY_CAPACITY: usize = 256;

/// Storage backend for tickets and articles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Sqlite,
    Json,
}

#[derive(Debug, Deserialize, Default)]
pub struct AppConfig {
    /// Base directory for the database, JSON snapshot and attachments. Read from ARTICLE_INTAKE_DATA_DIR.
    #[serde(default)]
    pub data_dir: Option<String>,

    /// `sqlite` (default) or `json`. Read from ARTICLE_INTAKE_BACKEND.
    #[serde(default)]
    pub backend: Option<Backend>,

    /// User to act as in the terminal dialog. Read from ARTICLE_INTAKE_ACTOR_ID.
    #[serde(default)]
    pub actor_id: Option<i64>,

    /// Ticket to open in the terminal dialog. Read from ARTICLE_INTAKE_TICKET_ID.
    #[serde(default)]
    pub ticket_id: Option<i64>,

    /// Buffered ticket events before slow subscribers lag. Read from ARTICLE_INTAKE_NOTIFY_CAPACITY.
    #[serde(default)]
    pub notify_capacity: Option<usize>,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenv::dotenv().ok();
        let mut c = config::Config::builder();
        c = c.add_source(config::Environment::with_prefix("ARTICLE_INTAKE").try_parsing(true));
        if let Ok(path) = std::env::var("ARTICLE_INTAKE_CONFIG") {
            c = c.add_source(config::File::with_name(&path));
        }
        c.build()?.try_deserialize()
    }

    /// Returns the data directory. Defaults to `./data`.
    pub fn data_dir_or_default(&self) -> PathBuf {
        PathBuf::from(self.data_dir.as_deref().unwrap_or("./data"))
    }

    /// Returns the storage backend. Defaults to SQLite.
    pub fn backend_or_default(&self) -> Backend {
        self.backend.unwrap_or_default()
    }

    /// Returns the broadcast capacity. Defaults to DEFAULT_NOTIFY_CAPACITY; zero is treated as unset.
    pub fn notify_capacity_or_default(&self) -> usize {
        self.notify_capacity
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_NOTIFY_CAPACITY)
    }

    pub fn attachments_dir(&self) -> PathBuf {
        self.data_dir_or_default().join("attachments")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.data_dir_or_default(), PathBuf::from("./data"));
        assert_eq!(cfg.backend_or_default(), Backend::Sqlite);
        assert_eq!(cfg.notify_capacity_or_default(), DEFAULT_NOTIFY_CAPACITY);
        assert_eq!(cfg.attachments_dir(), PathBuf::from("./data/attachments"));
    }

    #[test]
    fn test_zero_capacity_falls_back() {
        let cfg = AppConfig {
            notify_capacity: Some(0),
            ..AppConfig::default()
        };
        assert_eq!(cfg.notify_capacity_or_default(), DEFAULT_NOTIFY_CAPACITY);
    }

    #[test]
    fn test_deserialize_from_map() {
        let cfg: AppConfig = config::Config::builder()
            .set_override("backend", "json")
            .unwrap()
            .set_override("ticket_id", 5)
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(cfg.backend_or_default(), Backend::Json);
        assert_eq!(cfg.ticket_id, Some(5));
    }
}
