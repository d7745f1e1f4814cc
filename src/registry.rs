use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::error::{EngineError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "String")]
pub enum ModelStatus {
    Active,
    Inactive,
    Other(String),
}

impl From<String> for ModelStatus {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "active" => ModelStatus::Active,
            "inactive" => ModelStatus::Inactive,
            _ => ModelStatus::Other(raw),
        }
    }
}

impl From<ModelStatus> for String {
    fn from(status: ModelStatus) -> Self {
        match status {
            ModelStatus::Active => "active".to_string(),
            ModelStatus::Inactive => "inactive".to_string(),
            ModelStatus::Other(raw) => raw,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistryEntry {
    pub name: String,
    pub version: String,
    pub status: ModelStatus,
    pub path: String,
    /// Lowercase hex SHA-256 of the artifact file, verified on load when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

impl RegistryEntry {
    /// Reads a registry row without failing on odd field types.
    ///
    /// Non-string `name`/`version` are stringified and missing ones become
    /// `unknown`. A null or non-string `path` is left blank so that
    /// [`resolve_artifact_path`] can reject it if this entry is chosen.
    fn from_row(row: &serde_json::Map<String, Value>) -> Self {
        let label = |key: &str| match row.get(key) {
            None | Some(Value::Null) => "unknown".to_string(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        };
        let text = |key: &str| row.get(key).and_then(Value::as_str).map(str::to_string);
        Self {
            name: label("name"),
            version: label("version"),
            status: text("status")
                .map(ModelStatus::from)
                .unwrap_or(ModelStatus::Other(String::new())),
            path: text("path").unwrap_or_default(),
            sha256: text("sha256"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Registry {
    pub models: Vec<RegistryEntry>,
}

impl Registry {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| {
            EngineError::Registry(format!("Required file not found: {} ({e})", path.display()))
        })?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(raw).map_err(|e| {
            EngineError::Registry(format!("model registry contains invalid JSON: {e}"))
        })?;
        let Some(obj) = value.as_object() else {
            return Err(EngineError::Registry(
                "model registry must contain a dictionary".to_string(),
            ));
        };
        let Some(models) = obj.get("models").and_then(|m| m.as_array()) else {
            return Err(EngineError::Registry(
                "model registry is missing the 'models' list".to_string(),
            ));
        };

        // Non-object rows are skipped rather than failing the whole registry.
        let models = models
            .iter()
            .filter_map(Value::as_object)
            .map(RegistryEntry::from_row)
            .collect();
        Ok(Self { models })
    }

    /// First entry with `status == "active"`.
    pub fn active_entry(&self) -> Result<&RegistryEntry> {
        let mut active = self
            .models
            .iter()
            .filter(|m| m.status == ModelStatus::Active);
        let Some(first) = active.next() else {
            return Err(EngineError::Registry(
                "No active model found in model registry".to_string(),
            ));
        };
        let extra = active.count();
        if extra > 0 {
            warn!(
                model = %first.name,
                version = %first.version,
                extra_active = extra,
                "registry lists more than one active model; using the first"
            );
        }
        Ok(first)
    }
}

/// Joins relative entry paths onto `base_dir`.
pub fn resolve_artifact_path(entry: &RegistryEntry, base_dir: &Path) -> Result<PathBuf> {
    let raw = entry.path.trim();
    if raw.is_empty() {
        return Err(EngineError::Registry(
            "Active model entry is missing a valid 'path'".to_string(),
        ));
    }
    let candidate = PathBuf::from(raw);
    if candidate.is_absolute() {
        Ok(candidate)
    } else {
        Ok(base_dir.join(candidate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const RAW: &str = r#"{
        "models": [
            {"name": "poisson", "version": "v0.9.0", "status": "archived", "path": "models/old.json"},
            {"name": "baseline", "version": "v1.0.0", "status": "active", "path": "models/baseline.json"},
            {"name": "shadow", "version": "v1.1.0", "status": "active", "path": "/abs/shadow.json"}
        ]
    }"#;

    #[test]
    fn picks_first_active_entry() {
        let reg = Registry::parse(RAW).unwrap();
        let entry = reg.active_entry().unwrap();
        assert_eq!(entry.name, "baseline");
        assert_eq!(reg.models[0].status, ModelStatus::Other("archived".into()));
    }

    #[test]
    fn resolves_relative_and_absolute_paths() {
        let reg = Registry::parse(RAW).unwrap();
        let base = Path::new("/srv/engine");
        assert_eq!(
            resolve_artifact_path(&reg.models[1], base).unwrap(),
            PathBuf::from("/srv/engine/models/baseline.json")
        );
        assert_eq!(
            resolve_artifact_path(&reg.models[2], base).unwrap(),
            PathBuf::from("/abs/shadow.json")
        );
    }

    #[test]
    fn registry_failures_are_registry_errors() {
        for raw in [
            "not json",
            "[1, 2]",
            r#"{"entries": []}"#,
            r#"{"models": [{"name": "a", "status": "inactive", "path": "a.json"}]}"#,
        ] {
            let err = Registry::parse(raw)
                .and_then(|r| r.active_entry().map(|_| ()))
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Registry, "{raw}");
        }
    }

    #[test]
    fn blank_path_is_rejected() {
        let reg = Registry::parse(r#"{"models": [{"status": "active", "path": "  "}]}"#).unwrap();
        let entry = reg.active_entry().unwrap();
        assert_eq!(entry.name, "unknown");
        assert!(resolve_artifact_path(entry, Path::new("/x")).is_err());
    }

    #[test]
    fn odd_sibling_fields_do_not_block_the_active_entry() {
        let reg = Registry::parse(
            r#"{"models": [
                {"name": "old", "version": 1, "status": "inactive", "path": "models/old.json"},
                {"name": "ghost", "status": "inactive", "path": null},
                "not-a-row",
                {"name": "baseline", "version": 2.5, "status": "active", "path": "models/b.json"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(reg.models.len(), 3);
        assert_eq!(reg.models[0].version, "1");

        let entry = reg.active_entry().unwrap();
        assert_eq!(entry.name, "baseline");
        assert_eq!(entry.version, "2.5");
        assert_eq!(
            resolve_artifact_path(entry, Path::new("/srv")).unwrap(),
            PathBuf::from("/srv/models/b.json")
        );
    }

    #[test]
    fn null_path_on_active_entry_is_rejected() {
        let reg = Registry::parse(
            r#"{"models": [{"name": 7, "status": "active", "path": null}]}"#,
        )
        .unwrap();
        let entry = reg.active_entry().unwrap();
        assert_eq!(entry.name, "7");
        assert_eq!(entry.version, "unknown");
        let err = resolve_artifact_path(entry, Path::new("/x")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Registry);
        assert!(err.to_string().contains("missing a valid 'path'"));
    }

    #[test]
    fn missing_file_is_registry_error() {
        let err = Registry::load(Path::new("/definitely/not/here.json")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Registry);
    }
}
