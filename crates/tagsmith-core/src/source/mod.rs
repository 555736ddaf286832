//! Where images come from.
//!
//! The pipelines only ever see an opaque object identifier. [`ImageSource`]
//! turns it into a decoded image or a retrieval error; [`FsImageSource`]
//! resolves identifiers as relative paths under a root directory.

pub mod decode;

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use image::DynamicImage;

use crate::config::LimitsConfig;
use crate::error::PipelineError;

pub use decode::{DecodedImage, ImageDecoder};

/// Supplies decoded images by identifier.
#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn fetch(&self, object: &str) -> Result<DynamicImage, PipelineError>;
}

/// Images stored as files under a root directory.
pub struct FsImageSource {
    root: PathBuf,
    decoder: ImageDecoder,
}

impl FsImageSource {
    pub fn new(root: impl Into<PathBuf>, limits: LimitsConfig) -> Self {
        Self {
            root: root.into(),
            decoder: ImageDecoder::new(limits),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map an identifier to a path that cannot leave the root.
    pub fn resolve_path(&self, object: &str) -> Result<PathBuf, PipelineError> {
        let relative = Path::new(object);
        if object.trim().is_empty() {
            return Err(PipelineError::InvalidInput {
                message: "Object identifier is empty".to_string(),
            });
        }

        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(retrieval(object, "identifier escapes the image root"));
        }

        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ImageSource for FsImageSource {
    async fn fetch(&self, object: &str) -> Result<DynamicImage, PipelineError> {
        let path = self.resolve_path(object)?;

        let metadata = tokio::fs::metadata(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                retrieval(object, "not found")
            } else {
                retrieval(object, format!("cannot read metadata: {e}"))
            }
        })?;
        if !metadata.is_file() {
            return Err(retrieval(object, "not a regular file"));
        }

        let limits = self.decoder.limits();
        let max_bytes = limits.max_file_size_mb * 1024 * 1024;
        if metadata.len() > max_bytes {
            return Err(PipelineError::FileTooLarge {
                object: object.to_string(),
                size_mb: metadata.len() / (1024 * 1024),
                max_mb: limits.max_file_size_mb,
            });
        }

        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| retrieval(object, format!("read failed: {e}")))?;

        let decoded = self.decoder.decode_from_bytes(bytes, object).await?;
        tracing::debug!(
            "Fetched {} ({}x{} {:?})",
            object,
            decoded.width,
            decoded.height,
            decoded.format
        );
        Ok(decoded.image)
    }
}

fn retrieval(object: &str, message: impl Into<String>) -> PipelineError {
    PipelineError::Retrieval {
        object: object.to_string(),
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn source_with_image() -> (tempfile::TempDir, FsImageSource) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("album")).unwrap();
        RgbImage::from_pixel(5, 3, Rgb([200, 10, 10]))
            .save(dir.path().join("album/red.png"))
            .unwrap();
        let source = FsImageSource::new(dir.path(), LimitsConfig::default());
        (dir, source)
    }

    #[tokio::test]
    async fn test_fetch_decodes_image() {
        let (_dir, source) = source_with_image();
        let image = source.fetch("album/red.png").await.unwrap();
        assert_eq!((image.width(), image.height()), (5, 3));
    }

    #[tokio::test]
    async fn test_missing_object_is_retrieval_error() {
        let (_dir, source) = source_with_image();
        let err = source.fetch("album/blue.png").await.unwrap_err();
        assert!(matches!(err, PipelineError::Retrieval { .. }));
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn test_directory_is_not_an_image() {
        let (_dir, source) = source_with_image();
        let err = source.fetch("album").await.unwrap_err();
        assert!(matches!(err, PipelineError::Retrieval { .. }));
    }

    #[test]
    fn test_traversal_rejected() {
        let (_dir, source) = source_with_image();
        for object in ["../secret.png", "album/../../x.png", "/etc/passwd"] {
            let err = source.resolve_path(object).unwrap_err();
            assert!(matches!(err, PipelineError::Retrieval { .. }), "{object}");
        }
        assert!(matches!(
            source.resolve_path(" ").unwrap_err(),
            PipelineError::InvalidInput { .. }
        ));
        assert!(source.resolve_path("./album/red.png").is_ok());
    }

    #[tokio::test]
    async fn test_file_size_limit() {
        let (dir, _) = source_with_image();
        std::fs::write(dir.path().join("big.png"), vec![0u8; 2 * 1024 * 1024]).unwrap();
        let limits = LimitsConfig {
            max_file_size_mb: 1,
            ..LimitsConfig::default()
        };
        let source = FsImageSource::new(dir.path(), limits);
        let err = source.fetch("big.png").await.unwrap_err();
        assert!(matches!(err, PipelineError::FileTooLarge { .. }));
    }
}
