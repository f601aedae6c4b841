//! Filesystem storage for rendered documents.

use std::path::{Component, Path, PathBuf};

use bytes::Bytes;
use sha2::{Digest, Sha256};
use thiserror::Error;
use time::OffsetDateTime;
use tokio::{fs, io::AsyncWriteExt};

use crate::domain::types::DocumentKind;

/// Attempts made before giving up on a free file name within one millisecond.
const MAX_NAME_ATTEMPTS: u32 = 16;

/// Errors that can occur while interacting with the artifact store.
#[derive(Debug, Error)]
pub enum ArtifactStoreError {
    #[error("invalid stored path")]
    InvalidPath,
    #[error("invalid artifact extension `{0}`")]
    InvalidExtension(String),
    #[error("artifact is empty")]
    EmptyPayload,
    #[error("no free artifact name for `{0}`")]
    NameExhausted(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Metadata describing a persisted artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifact {
    /// Path relative to the store root, using `/` separators.
    pub stored_path: String,
    /// Lowercase hex SHA-256 of the stored bytes.
    pub checksum: String,
    pub size_bytes: u64,
}

/// Filesystem-backed artifact store.
#[derive(Debug)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Initialise storage rooted at the provided directory, creating it if necessary.
    pub fn new(root: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Persist rendered bytes as `YYYY/MM/{kind}_{millis}.{extension}`.
    pub async fn store(
        &self,
        kind: DocumentKind,
        extension: &str,
        data: Bytes,
    ) -> Result<StoredArtifact, ArtifactStoreError> {
        if data.is_empty() {
            return Err(ArtifactStoreError::EmptyPayload);
        }
        let extension = sanitize_extension(extension)?;

        let now = OffsetDateTime::now_utc();
        let directory = format!("{}/{:02}", now.year(), now.month() as u8);
        let millis = now.unix_timestamp_nanos() / 1_000_000;
        fs::create_dir_all(self.root.join(&directory)).await?;

        let (stored_path, mut file) = self
            .create_unique(&directory, kind, millis, &extension)
            .await?;
        let absolute = self.resolve(&stored_path)?;

        if let Err(err) = write_all(&mut file, &data).await {
            drop(file);
            let _ = fs::remove_file(&absolute).await;
            return Err(err.into());
        }

        let checksum = hex::encode(Sha256::digest(&data));

        tracing::debug!(
            target = "boa_render::infra::artifacts",
            stored_path = %stored_path,
            size_bytes = data.len(),
            "artifact stored"
        );

        Ok(StoredArtifact {
            stored_path,
            checksum,
            size_bytes: data.len() as u64,
        })
    }

    pub async fn read(&self, stored_path: &str) -> Result<Bytes, ArtifactStoreError> {
        let absolute = self.resolve(stored_path)?;
        let data = fs::read(absolute).await?;
        Ok(Bytes::from(data))
    }

    /// Remove a stored artifact. Missing files are treated as success.
    pub async fn delete(&self, stored_path: &str) -> Result<(), ArtifactStoreError> {
        let absolute = self.resolve(stored_path)?;
        match fs::remove_file(&absolute).await {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(ArtifactStoreError::Io(err)),
        }
    }

    fn resolve(&self, stored_path: &str) -> Result<PathBuf, ArtifactStoreError> {
        let relative = Path::new(stored_path);
        if stored_path.is_empty()
            || relative.is_absolute()
            || relative.components().any(|component| {
                matches!(
                    component,
                    Component::ParentDir | Component::Prefix(_) | Component::RootDir
                )
            })
        {
            return Err(ArtifactStoreError::InvalidPath);
        }

        Ok(self.root.join(relative))
    }

    async fn create_unique(
        &self,
        directory: &str,
        kind: DocumentKind,
        millis: i128,
        extension: &str,
    ) -> Result<(String, fs::File), ArtifactStoreError> {
        let base = format!("{}_{millis}", kind.as_str());
        for attempt in 0..MAX_NAME_ATTEMPTS {
            let name = if attempt == 0 {
                format!("{base}.{extension}")
            } else {
                format!("{base}-{attempt}.{extension}")
            };
            let stored_path = format!("{directory}/{name}");
            let absolute = self.resolve(&stored_path)?;
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&absolute)
                .await
            {
                Ok(file) => return Ok((stored_path, file)),
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(err) => return Err(err.into()),
            }
        }
        Err(ArtifactStoreError::NameExhausted(base))
    }
}

async fn write_all(file: &mut fs::File, data: &[u8]) -> Result<(), std::io::Error> {
    file.write_all(data).await?;
    file.flush().await
}

fn sanitize_extension(extension: &str) -> Result<String, ArtifactStoreError> {
    let trimmed = extension.trim().trim_start_matches('.').to_ascii_lowercase();
    if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ArtifactStoreError::InvalidExtension(extension.to_string()));
    }
    Ok(trimmed)
}
