//! Model artifact fetching from a Hugging Face compatible hub.
//!
//! Artifacts land under `{model_dir}/{owner}--{name}/{remote_path}`. A download
//! streams into a `.part` file that is only renamed into place once complete,
//! so a crashed fetch never leaves a half-written model behind. The BLAKE3
//! digest of each finished download is recorded next to it in a `.blake3`
//! file, which [`ModelFetcher::verify`] later checks the artifact against.

use std::path::{Path, PathBuf};

use blake3::Hasher;
use serde::Serialize;

use crate::config::Config;
use crate::error::PipelineError;

use super::ModelKind;

/// A single remote file a model needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Artifact {
    /// Hub repository, `owner/name`
    pub repo: &'static str,
    /// Path of the file inside the repository
    pub remote_path: &'static str,
}

/// Outcome of checking a local artifact against its recorded digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum ArtifactCheck {
    /// Not downloaded yet
    Missing,
    /// Present, but no digest was recorded (placed by hand)
    Unrecorded,
    /// Content matches the digest recorded at download time
    Verified,
    /// Content changed since download; the file was removed
    Corrupt { expected: String, actual: String },
}

/// Resolves artifacts to local paths, downloading missing ones.
pub struct ModelFetcher {
    model_dir: PathBuf,
    endpoint: String,
    offline: bool,
    client: reqwest::Client,
}

impl ModelFetcher {
    pub fn new(config: &Config) -> Self {
        Self {
            model_dir: config.model_dir(),
            endpoint: config.hub.endpoint.trim_end_matches('/').to_string(),
            offline: config.hub.offline,
            client: reqwest::Client::new(),
        }
    }

    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }

    /// Where an artifact lives on disk, whether or not it exists yet.
    pub fn local_path(&self, artifact: &Artifact) -> PathBuf {
        self.model_dir
            .join(artifact.repo.replace('/', "--"))
            .join(artifact.remote_path)
    }

    pub fn is_present(&self, artifact: &Artifact) -> bool {
        self.local_path(artifact).exists()
    }

    fn url(&self, artifact: &Artifact) -> String {
        format!(
            "{}/{}/resolve/main/{}",
            self.endpoint, artifact.repo, artifact.remote_path
        )
    }

    /// Return the local path of an artifact, fetching it first if needed.
    pub async fn ensure(
        &self,
        model: ModelKind,
        artifact: &Artifact,
    ) -> Result<PathBuf, PipelineError> {
        let dest = self.local_path(artifact);
        if dest.exists() {
            return Ok(dest);
        }

        if self.offline {
            return Err(PipelineError::model_load(
                model,
                format!(
                    "{} is not present at {:?} and hub access is offline",
                    artifact.remote_path, dest
                ),
            ));
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                PipelineError::model_load(model, format!("Failed to create {:?}: {e}", parent))
            })?;
        }

        let url = self.url(artifact);
        tracing::info!("Downloading {} from {}", artifact.remote_path, artifact.repo);
        download_file(&self.client, &url, &dest)
            .await
            .map_err(|e| PipelineError::model_load(model, e))?;

        Ok(dest)
    }

    /// Re-hash a local artifact and compare it with its recorded digest.
    ///
    /// A corrupt artifact is deleted along with its digest, so the next
    /// [`ensure`](Self::ensure) fetches it again.
    pub async fn verify(
        &self,
        model: ModelKind,
        artifact: &Artifact,
    ) -> Result<ArtifactCheck, PipelineError> {
        let path = self.local_path(artifact);
        if !path.exists() {
            return Ok(ArtifactCheck::Missing);
        }

        let digest = digest_path(&path);
        let expected = match tokio::fs::read_to_string(&digest).await {
            Ok(text) => text.trim().to_string(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ArtifactCheck::Unrecorded)
            }
            Err(e) => {
                return Err(PipelineError::model_load(
                    model,
                    format!("Failed to read {:?}: {e}", digest),
                ))
            }
        };

        let actual = hash_blocking(&path)
            .await
            .map_err(|e| PipelineError::model_load(model, e))?;
        if actual == expected {
            tracing::debug!("Checksum verified for {}: {}…", artifact.remote_path, &actual[..16]);
            return Ok(ArtifactCheck::Verified);
        }

        tracing::warn!(
            "Checksum mismatch for {}: expected {expected}, got {actual}. Removing it.",
            path.display()
        );
        let _ = tokio::fs::remove_file(&path).await;
        let _ = tokio::fs::remove_file(&digest).await;
        Ok(ArtifactCheck::Corrupt { expected, actual })
    }
}

/// Stream `url` to `dest` through a sibling `.part` file.
async fn download_file(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
) -> Result<(), String> {
    use futures_util::StreamExt;
    use tokio::io::AsyncWriteExt;

    let response = client
        .get(url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| format!("Download of {url} failed: {e}"))?;

    let total_size = response.content_length();
    if let Some(size) = total_size {
        tracing::info!("  Size: {:.1} MB", size as f64 / (1024.0 * 1024.0));
    }

    let part = partial_path(dest);
    let mut file = tokio::fs::File::create(&part)
        .await
        .map_err(|e| format!("Failed to create {:?}: {e}", part))?;
    let mut stream = response.bytes_stream();
    let mut downloaded: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                let _ = tokio::fs::remove_file(&part).await;
                return Err(format!("Download of {url} interrupted: {e}"));
            }
        };
        if let Err(e) = file.write_all(&chunk).await {
            let _ = tokio::fs::remove_file(&part).await;
            return Err(format!("Failed to write {:?}: {e}", part));
        }
        downloaded += chunk.len() as u64;

        if let Some(total) = total_size {
            if downloaded % (50 * 1024 * 1024) < chunk.len() as u64 {
                tracing::info!(
                    "  Progress: {:.0}%",
                    downloaded as f64 / total as f64 * 100.0
                );
            }
        }
    }

    file.flush()
        .await
        .map_err(|e| format!("Failed to flush {:?}: {e}", part))?;
    drop(file);

    let digest = hash_blocking(&part).await?;

    tokio::fs::rename(&part, dest)
        .await
        .map_err(|e| format!("Failed to move {:?} into place: {e}", part))?;
    record_digest(dest, &digest).await
}

fn partial_path(dest: &Path) -> PathBuf {
    sibling_with_suffix(dest, ".part")
}

fn digest_path(artifact: &Path) -> PathBuf {
    sibling_with_suffix(artifact, ".blake3")
}

fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(suffix);
    path.with_file_name(name)
}

async fn record_digest(artifact: &Path, digest: &str) -> Result<(), String> {
    let path = digest_path(artifact);
    tokio::fs::write(&path, format!("{digest}\n"))
        .await
        .map_err(|e| format!("Failed to write {:?}: {e}", path))
}

/// Streaming BLAKE3 hex digest of a file.
fn content_hash(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Hasher::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(hasher.finalize().to_hex().to_string())
}

/// [`content_hash`] on the blocking pool; model files run to hundreds of MB.
async fn hash_blocking(path: &Path) -> Result<String, String> {
    let owned = path.to_path_buf();
    tokio::task::spawn_blocking(move || content_hash(&owned))
        .await
        .map_err(|e| format!("Checksum task failed: {e}"))?
        .map_err(|e| format!("Checksum computation failed for {}: {e}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARTIFACT: Artifact = Artifact {
        repo: "owner/model",
        remote_path: "onnx/model.onnx",
    };

    fn offline_fetcher(dir: &Path) -> ModelFetcher {
        let mut config = Config::default();
        config.general.model_dir = dir.to_path_buf();
        config.hub.offline = true;
        config.hub.endpoint = "https://hub.example/".to_string();
        ModelFetcher::new(&config)
    }

    #[test]
    fn test_local_path_layout() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = offline_fetcher(dir.path());
        assert_eq!(
            fetcher.local_path(&ARTIFACT),
            dir.path().join("owner--model").join("onnx/model.onnx")
        );
    }

    #[test]
    fn test_url_strips_trailing_slash() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = offline_fetcher(dir.path());
        assert_eq!(
            fetcher.url(&ARTIFACT),
            "https://hub.example/owner/model/resolve/main/onnx/model.onnx"
        );
    }

    #[tokio::test]
    async fn test_present_artifact_needs_no_network() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = offline_fetcher(dir.path());
        let path = fetcher.local_path(&ARTIFACT);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"onnx").unwrap();

        let resolved = fetcher.ensure(ModelKind::TextEmbedder, &ARTIFACT).await.unwrap();
        assert_eq!(resolved, path);
    }

    #[tokio::test]
    async fn test_offline_missing_artifact_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = offline_fetcher(dir.path());

        let err = fetcher
            .ensure(ModelKind::ImageTagger, &ARTIFACT)
            .await
            .unwrap_err();
        assert!(err.is_retryable_load());
        assert!(err.to_string().contains("offline"));
    }

    fn place(fetcher: &ModelFetcher, bytes: &[u8]) -> PathBuf {
        let path = fetcher.local_path(&ARTIFACT);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[tokio::test]
    async fn test_verify_recorded_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = offline_fetcher(dir.path());
        let model = ModelKind::TextEmbedder;

        assert_eq!(
            fetcher.verify(model, &ARTIFACT).await.unwrap(),
            ArtifactCheck::Missing
        );

        let path = place(&fetcher, b"hello tagsmith");
        assert_eq!(
            fetcher.verify(model, &ARTIFACT).await.unwrap(),
            ArtifactCheck::Unrecorded
        );

        let digest = hash_blocking(&path).await.unwrap();
        assert_eq!(digest, blake3::hash(b"hello tagsmith").to_hex().to_string());
        record_digest(&path, &digest).await.unwrap();
        assert_eq!(
            fetcher.verify(model, &ARTIFACT).await.unwrap(),
            ArtifactCheck::Verified
        );
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_verify_removes_corrupt_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = offline_fetcher(dir.path());
        let path = place(&fetcher, b"hello tagsmith");
        let recorded = blake3::hash(b"hello tagsmith").to_hex().to_string();
        record_digest(&path, &recorded).await.unwrap();

        std::fs::write(&path, b"truncated").unwrap();
        let check = fetcher.verify(ModelKind::ImageTagger, &ARTIFACT).await.unwrap();
        assert_eq!(
            check,
            ArtifactCheck::Corrupt {
                expected: recorded,
                actual: blake3::hash(b"truncated").to_hex().to_string(),
            }
        );
        assert!(!path.exists(), "corrupt file should be removed");
        assert!(!digest_path(&path).exists());
        assert!(!fetcher.is_present(&ARTIFACT));
    }

    #[test]
    fn test_partial_path() {
        assert_eq!(
            partial_path(Path::new("/m/onnx/model.onnx")),
            PathBuf::from("/m/onnx/model.onnx.part")
        );
        assert_eq!(
            digest_path(Path::new("/m/tokenizer.json")),
            PathBuf::from("/m/tokenizer.json.blake3")
        );
    }
}
