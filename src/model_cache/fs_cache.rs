//! Filesystem-backed model cache: downloads with `reqwest`, verifies
//! `sha256` digests, and stores files under a platform data directory.
//! Grounded in the teacher's `ModelManager::download_model` /
//! `verify_model_integrity` pair, generalized to an arbitrary registry of
//! `ModelInfo` entries instead of a single hardcoded Whisper tier table.

use super::types::{ModelCache, ModelCacheError, ModelFile, ModelInfo, ProgressCallback};
use async_trait::async_trait;
use futures_util::StreamExt;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

pub struct FsModelCache {
    models_dir: PathBuf,
    registry: HashMap<String, ModelInfo>,
    http: reqwest::Client,
}

impl FsModelCache {
    pub fn new(models_dir: PathBuf, registry: Vec<ModelInfo>) -> Result<Self, ModelCacheError> {
        std::fs::create_dir_all(&models_dir).map_err(|e| ModelCacheError::Io {
            reason: e.to_string(),
            context: Default::default(),
        })?;
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(3600))
            .build()
            .map_err(|e| ModelCacheError::Io {
                reason: e.to_string(),
                context: Default::default(),
            })?;
        Ok(Self {
            models_dir,
            registry: registry.into_iter().map(|m| (m.id.clone(), m)).collect(),
            http,
        })
    }

    /// Uses the platform data directory (`dirs::data_dir()/babelrelay/models`).
    pub fn with_default_dir(registry: Vec<ModelInfo>) -> Result<Self, ModelCacheError> {
        let base = dirs::data_dir().ok_or_else(|| ModelCacheError::Io {
            reason: "no platform data directory available".to_string(),
            context: Default::default(),
        })?;
        Self::new(base.join("babelrelay").join("models"), registry)
    }

    fn file_path(&self, file: &ModelFile) -> PathBuf {
        self.models_dir.join(&file.path)
    }

    async fn file_is_verified(&self, file: &ModelFile) -> bool {
        let path = self.file_path(file);
        if !path.exists() {
            return false;
        }
        match &file.sha256 {
            Some(expected) => matches!(sha256_of(&path).await, Ok(actual) if &actual == expected),
            None => true,
        }
    }

    async fn download_file(
        &self,
        id: &str,
        file: &ModelFile,
        progress: &Option<ProgressCallback>,
    ) -> Result<(), ModelCacheError> {
        let url = &file.path;
        let final_path = self.file_path(file);
        let temp_path = final_path.with_extension("tmp");

        info!(model = id, url, "downloading model file");
        let response = self.http.get(url).send().await.map_err(|e| ModelCacheError::DownloadFailed {
            id: id.to_string(),
            reason: e.to_string(),
            context: Default::default(),
        })?;
        if !response.status().is_success() {
            return Err(ModelCacheError::DownloadFailed {
                id: id.to_string(),
                reason: format!("HTTP {}", response.status()),
                context: Default::default(),
            });
        }

        let total_size = response.content_length().unwrap_or(file.size_bytes.unwrap_or(0));
        if let Some(parent) = temp_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err(id))?;
        }
        let mut out = tokio::fs::File::create(&temp_path).await.map_err(io_err(id))?;

        let mut downloaded = 0u64;
        let mut hasher = Sha256::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| ModelCacheError::DownloadFailed {
                id: id.to_string(),
                reason: e.to_string(),
                context: Default::default(),
            })?;
            out.write_all(&chunk).await.map_err(io_err(id))?;
            hasher.update(&chunk);
            downloaded += chunk.len() as u64;
            if let Some(cb) = progress {
                cb(downloaded, total_size);
            }
        }
        out.sync_all().await.map_err(io_err(id))?;
        drop(out);

        if let Some(expected) = &file.sha256 {
            let actual = format!("{:x}", hasher.finalize());
            if &actual != expected {
                let _ = tokio::fs::remove_file(&temp_path).await;
                return Err(ModelCacheError::IntegrityMismatch {
                    id: id.to_string(),
                    expected: expected.clone(),
                    actual,
                    context: Default::default(),
                });
            }
        }

        tokio::fs::rename(&temp_path, &final_path).await.map_err(io_err(id))?;
        debug!(model = id, bytes = downloaded, "model file downloaded and verified");
        Ok(())
    }
}

fn io_err(id: &str) -> impl Fn(std::io::Error) -> ModelCacheError + '_ {
    move |e| ModelCacheError::Io {
        reason: format!("{id}: {e}"),
        context: Default::default(),
    }
}

async fn sha256_of(path: &Path) -> std::io::Result<String> {
    let bytes = tokio::fs::read(path).await?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

#[async_trait]
impl ModelCache for FsModelCache {
    async fn is_model_cached(&self, id: &str) -> bool {
        let Some(info) = self.registry.get(id) else {
            return false;
        };
        if info.files.is_empty() {
            return false;
        }
        for file in &info.files {
            if !self.file_is_verified(file).await {
                return false;
            }
        }
        true
    }

    async fn get_model_path(&self, id: &str) -> Option<PathBuf> {
        if !self.is_model_cached(id).await {
            return None;
        }
        self.registry
            .get(id)
            .and_then(|info| info.files.first())
            .map(|file| self.file_path(file))
    }

    async fn ensure_model(
        &self,
        id: &str,
        progress: Option<ProgressCallback>,
    ) -> Result<PathBuf, ModelCacheError> {
        let info = self.registry.get(id).ok_or_else(|| ModelCacheError::UnknownModel {
            id: id.to_string(),
            context: Default::default(),
        })?;
        if info.external {
            return Err(ModelCacheError::ExternalModel {
                id: id.to_string(),
                context: Default::default(),
            });
        }
        if self.is_model_cached(id).await {
            return self
                .get_model_path(id)
                .await
                .ok_or_else(|| ModelCacheError::Io {
                    reason: "model reported cached but path is missing".to_string(),
                    context: Default::default(),
                });
        }

        for file in &info.files {
            if !self.file_is_verified(file).await {
                self.download_file(id, file, &progress).await?;
            }
        }

        self.get_model_path(id).await.ok_or_else(|| ModelCacheError::Io {
            reason: "download completed but verification failed".to_string(),
            context: Default::default(),
        })
    }

    async fn delete_model(&self, id: &str) -> Result<(), ModelCacheError> {
        let info = self.registry.get(id).ok_or_else(|| ModelCacheError::UnknownModel {
            id: id.to_string(),
            context: Default::default(),
        })?;
        for file in &info.files {
            let path = self.file_path(file);
            if path.exists() {
                tokio::fs::remove_file(&path).await.map_err(io_err(id))?;
            }
        }
        Ok(())
    }

    fn list_models(&self) -> Vec<ModelInfo> {
        self.registry.values().cloned().collect()
    }

    async fn list_cached_models(&self) -> Vec<ModelInfo> {
        let mut cached = Vec::new();
        for info in self.registry.values() {
            if self.is_model_cached(&info.id).await {
                cached.push(info.clone());
            }
        }
        cached
    }

    fn get_model_info(&self, id: &str) -> Option<ModelInfo> {
        self.registry.get(id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model_cache::types::ModelKind;

    fn registry() -> Vec<ModelInfo> {
        vec![ModelInfo {
            id: "local-test".to_string(),
            name: "local test model".to_string(),
            kind: ModelKind::Vad,
            source: "test".to_string(),
            files: vec![ModelFile {
                path: "local-test.bin".to_string(),
                sha256: None,
                size_bytes: None,
            }],
            size_bytes: None,
            external: false,
        }]
    }

    #[tokio::test]
    async fn uncached_model_reports_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FsModelCache::new(dir.path().to_path_buf(), registry()).unwrap();
        assert!(!cache.is_model_cached("local-test").await);
        assert!(cache.get_model_path("local-test").await.is_none());
    }

    #[tokio::test]
    async fn unknown_model_id_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FsModelCache::new(dir.path().to_path_buf(), registry()).unwrap();
        let result = cache.ensure_model("does-not-exist", None).await;
        assert!(matches!(result, Err(ModelCacheError::UnknownModel { .. })));
    }

    #[tokio::test]
    async fn external_model_rejects_ensure() {
        let dir = tempfile::tempdir().unwrap();
        let mut entries = registry();
        entries[0].external = true;
        let cache = FsModelCache::new(dir.path().to_path_buf(), entries).unwrap();
        let result = cache.ensure_model("local-test", None).await;
        assert!(matches!(result, Err(ModelCacheError::ExternalModel { .. })));
    }

    #[tokio::test]
    async fn cached_file_without_checksum_is_trusted() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("local-test.bin"), b"hello")
            .await
            .unwrap();
        let cache = FsModelCache::new(dir.path().to_path_buf(), registry()).unwrap();
        assert!(cache.is_model_cached("local-test").await);
        assert!(cache.get_model_path("local-test").await.is_some());
    }

    #[tokio::test]
    async fn checksum_mismatch_is_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("local-test.bin"), b"hello")
            .await
            .unwrap();
        let mut entries = registry();
        entries[0].files[0].sha256 = Some("deadbeef".to_string());
        let cache = FsModelCache::new(dir.path().to_path_buf(), entries).unwrap();
        assert!(!cache.is_model_cached("local-test").await);
    }
}
