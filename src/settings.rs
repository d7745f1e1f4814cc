use std::path::{Path, PathBuf};

pub const ENV_BASE_DIR: &str = "PREDICTION_ENGINE_BASE_DIR";
pub const ENV_LOG_DIR: &str = "PREDICTION_LOG_DIR";

const CONFIG_FILENAME: &str = "model_config.yaml";
const MODELS_DIR: &str = "models";
const REGISTRY_FILENAME: &str = "model_registry.json";
const LOG_DIR: &str = "logs";

/// Filesystem layout the engine reads from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub base_dir: PathBuf,
    pub config_path: PathBuf,
    pub registry_path: PathBuf,
    pub log_dir: PathBuf,
}

impl Settings {
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        Self {
            config_path: base_dir.join(CONFIG_FILENAME),
            registry_path: base_dir.join(MODELS_DIR).join(REGISTRY_FILENAME),
            log_dir: base_dir.join(LOG_DIR),
            base_dir,
        }
    }

    /// Base directory from `PREDICTION_ENGINE_BASE_DIR`, else the working directory.
    /// The log directory honours `PREDICTION_LOG_DIR` when set.
    pub fn from_env() -> Self {
        let base = non_empty_env(ENV_BASE_DIR)
            .map(PathBuf::from)
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));
        let mut settings = Self::with_base_dir(base);
        if let Some(dir) = non_empty_env(ENV_LOG_DIR) {
            settings.log_dir = PathBuf::from(dir);
        }
        settings
    }

    pub fn models_dir(&self) -> PathBuf {
        self.base_dir.join(MODELS_DIR)
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    let value = std::env::var(key).ok()?;
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_derives_from_base_dir() {
        let s = Settings::with_base_dir("/srv/engine");
        assert_eq!(s.config_path, PathBuf::from("/srv/engine/model_config.yaml"));
        assert_eq!(
            s.registry_path,
            PathBuf::from("/srv/engine/models/model_registry.json")
        );
        assert_eq!(s.log_dir, PathBuf::from("/srv/engine/logs"));
        assert_eq!(s.models_dir(), PathBuf::from("/srv/engine/models"));
    }
}
