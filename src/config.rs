use std::path::PathBuf;

use crate::adaptive::config::TrainingMode;

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub profile_db_path: Option<PathBuf>,
    pub training_mode: TrainingMode,
}

impl Config {
    /// Reads `.env` (if present) and then the process environment.
    pub fn load() -> Self {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    pub fn from_env() -> Self {
        let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let profile_db_path = std::env::var("PROFILE_DB_PATH")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(PathBuf::from);

        let training_mode = std::env::var("TRAINING_MODE")
            .ok()
            .map(|value| TrainingMode::parse(&value))
            .unwrap_or_default();

        Self {
            log_level,
            profile_db_path,
            training_mode,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            profile_db_path: None,
            training_mode: TrainingMode::default(),
        }
    }
}
