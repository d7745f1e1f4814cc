use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::artifact::{ArtifactLoader, ScorelineModel, file_sha256};
use crate::error::{EngineError, Result};
use crate::registry::{Registry, resolve_artifact_path};
use crate::settings::Settings;

static GLOBAL_CACHE: Lazy<Arc<ModelCache>> = Lazy::new(|| Arc::new(ModelCache::new()));

/// Process-wide cache for callers that want singleton behaviour.
pub fn global_cache() -> Arc<ModelCache> {
    Arc::clone(&GLOBAL_CACHE)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub name: String,
    pub version: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

pub struct LoadedModel {
    pub artifact: Arc<dyn ScorelineModel>,
    pub metadata: ModelMetadata,
}

impl fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedModel")
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

/// Where the active artifact is looked up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrySource {
    pub registry_path: PathBuf,
    pub base_dir: PathBuf,
}

impl RegistrySource {
    pub fn new(registry_path: impl Into<PathBuf>, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            registry_path: registry_path.into(),
            base_dir: base_dir.into(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.registry_path.clone(), settings.base_dir.clone())
    }
}

/// Single-slot cache for the active model.
#[derive(Debug, Default)]
pub struct ModelCache {
    slot: Mutex<Option<Arc<LoadedModel>>>,
}

impl ModelCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached model, resolving and loading it under the lock on first use.
    pub fn get_or_load(
        &self,
        source: &RegistrySource,
        loader: &dyn ArtifactLoader,
    ) -> Result<Arc<LoadedModel>> {
        let mut slot = self.lock();
        if let Some(model) = slot.as_ref() {
            debug!(model = %model.metadata.name, "model cache hit");
            return Ok(Arc::clone(model));
        }
        let loaded = Arc::new(resolve_and_load(source, loader)?);
        *slot = Some(Arc::clone(&loaded));
        Ok(loaded)
    }

    pub fn is_loaded(&self) -> bool {
        self.lock().is_some()
    }

    pub fn metadata(&self) -> Option<ModelMetadata> {
        self.lock().as_ref().map(|m| m.metadata.clone())
    }

    /// Drops the cached model so the next call re-reads the registry.
    pub fn reset(&self) {
        let mut slot = self.lock();
        if let Some(old) = slot.take() {
            info!(model = %old.metadata.name, version = %old.metadata.version, "model cache reset");
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Arc<LoadedModel>>> {
        // The slot holds no partial state, so a poisoned lock is still usable.
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn resolve_and_load(source: &RegistrySource, loader: &dyn ArtifactLoader) -> Result<LoadedModel> {
    let registry = Registry::load(&source.registry_path)?;
    let entry = registry.active_entry()?;
    let path = resolve_artifact_path(entry, &source.base_dir)?;
    if !path.exists() {
        return Err(EngineError::ArtifactNotFound { path });
    }

    let digest = verify_digest(&path, entry.sha256.as_deref())?;

    info!(
        model = %entry.name,
        version = %entry.version,
        path = %path.display(),
        "loading model"
    );
    let artifact = loader.load(&path)?;
    Ok(LoadedModel {
        artifact,
        metadata: ModelMetadata {
            name: entry.name.clone(),
            version: entry.version.clone(),
            path: path.display().to_string(),
            sha256: digest,
        },
    })
}

fn verify_digest(path: &Path, expected: Option<&str>) -> Result<Option<String>> {
    let Some(expected) = expected.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    let actual = file_sha256(path)?;
    if !actual.eq_ignore_ascii_case(expected) {
        return Err(EngineError::Registry(format!(
            "artifact digest mismatch for {}: registry says {expected}, file is {actual}",
            path.display()
        )));
    }
    Ok(Some(actual))
}
