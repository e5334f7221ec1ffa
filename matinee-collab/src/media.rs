use std::io;
use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

use crate::util::random_string;

/// Stores uploaded media resources and hands out durable urls.
///
/// Deletion is best effort cleanup, triggered when a video reference
/// is replaced or an abandoned room is destroyed. A failed delete
/// never blocks the operation that triggered it.
#[async_trait]
pub trait MediaStore: Send + Sync + 'static {
    /// Stores a resource and returns its durable url
    async fn store(&self, bytes: Vec<u8>) -> Result<String, MediaStoreError>;

    /// Deletes a stored resource. Deleting an already absent resource
    /// is not an error
    async fn delete(&self, url: &str) -> Result<(), MediaStoreError>;

    /// Returns true if the url points into this store
    fn owns(&self, url: &str) -> bool;
}

#[derive(Debug, Error)]
pub enum MediaStoreError {
    #[error("{url} is not managed by this store")]
    NotOwned { url: String },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// The url namespace handed out for locally stored files
const URL_SCHEME: &str = "matinee://";

/// Keeps media resources as flat files with random names under a base
/// directory
pub struct LocalMediaStore {
    base_dir: PathBuf,
}

impl LocalMediaStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.base_dir.join(name)
    }

    /// Extracts the stored file name, refusing anything that could
    /// escape the base directory
    fn name_from_url(url: &str) -> Option<&str> {
        url.strip_prefix(URL_SCHEME)
            .filter(|name| !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric()))
    }
}

#[async_trait]
impl MediaStore for LocalMediaStore {
    async fn store(&self, bytes: Vec<u8>) -> Result<String, MediaStoreError> {
        tokio::fs::create_dir_all(&self.base_dir).await?;

        let name = random_string(24);
        tokio::fs::write(self.path_for(&name), bytes).await?;

        Ok(format!("{}{}", URL_SCHEME, name))
    }

    async fn delete(&self, url: &str) -> Result<(), MediaStoreError> {
        let name = Self::name_from_url(url).ok_or_else(|| MediaStoreError::NotOwned {
            url: url.to_string(),
        })?;

        match tokio::fs::remove_file(self.path_for(name)).await {
            Ok(()) => Ok(()),
            // Already gone is the outcome we wanted
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn owns(&self, url: &str) -> bool {
        Self::name_from_url(url).is_some()
    }
}
