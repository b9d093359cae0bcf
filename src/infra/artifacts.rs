//! Filesystem storage for published image artifacts.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use thiserror::Error;
use tokio::{fs, task};

use crate::domain::{artifact::ImageArtifact, fingerprint::Fingerprint};

#[derive(Debug, Error)]
pub enum ArtifactStorageError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("failed to replace `{path}`: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("artifact write task failed: {0}")]
    Join(String),
}

/// Flat directory of `<fingerprint>.png` files.
#[derive(Debug, Clone)]
pub struct ArtifactStorage {
    root: PathBuf,
    base_url: String,
}

impl ArtifactStorage {
    /// Initialise storage rooted at the provided directory, creating it if necessary.
    pub fn new(root: PathBuf, base_url: impl Into<String>) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            base_url: base_url.into(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.root.join(fingerprint.file_name())
    }

    /// Write `png` under the fingerprint's name, replacing any previous artifact.
    ///
    /// Bytes land in a temp file in the same directory first and are renamed
    /// into place, so readers never observe a partial file. Concurrent writers
    /// of the same fingerprint resolve to whichever rename happens last.
    pub async fn publish(
        &self,
        fingerprint: &Fingerprint,
        png: Vec<u8>,
    ) -> Result<ImageArtifact, ArtifactStorageError> {
        let root = self.root.clone();
        let target = self.path_for(fingerprint);
        let prefix = format!(".{}.", fingerprint.as_str());

        let written = target.clone();
        task::spawn_blocking(move || write_atomically(&root, &prefix, &written, &png))
            .await
            .map_err(|err| ArtifactStorageError::Join(err.to_string()))??;

        Ok(ImageArtifact::new(
            fingerprint.clone(),
            target,
            &self.base_url,
        ))
    }

    /// Read a published artifact; `None` when it does not exist.
    pub async fn read(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Option<Bytes>, ArtifactStorageError> {
        match fs::read(self.path_for(fingerprint)).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(ArtifactStorageError::Io(err)),
        }
    }
}

fn write_atomically(
    root: &Path,
    prefix: &str,
    target: &Path,
    data: &[u8],
) -> Result<(), ArtifactStorageError> {
    std::fs::create_dir_all(root)?;
    let mut temp = tempfile::Builder::new()
        .prefix(prefix)
        .suffix(".tmp")
        .tempfile_in(root)?;
    temp.write_all(data)?;
    temp.as_file().sync_all()?;
    temp.persist(target)
        .map_err(|err| ArtifactStorageError::Persist {
            path: target.to_path_buf(),
            source: err.error,
        })?;
    Ok(())
}
