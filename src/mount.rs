//! # Tier Mounts
//!
//! Attaches the three storage tiers (raw, structured, curated) to path
//! prefixes for the duration of a run and detaches them at the end. A tier
//! root is either a local directory or an `s3://bucket[/prefix]` location.

use crate::input::TierLocations;
use crate::storage::{Storage, StorageBackend, StorageError, StorageFactory, StorageResult};
use log::{debug, info};
use std::fmt;
use thiserror::Error;

/// Errors raised while attaching a tier
#[derive(Error, Debug)]
pub enum MountError {
    #[error("{tier} container not found: {root}")]
    ContainerNotFound { tier: Tier, root: String },

    #[error("failed to attach {tier} tier at {root}: {source}")]
    Storage {
        tier: Tier,
        root: String,
        #[source]
        source: StorageError,
    },
}

/// The three storage tiers of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Raw,
    Structured,
    Curated,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Raw => write!(f, "raw"),
            Tier::Structured => write!(f, "structured"),
            Tier::Curated => write!(f, "curated"),
        }
    }
}

/// A storage tier attached under a root path
#[derive(Debug)]
pub struct Mount {
    tier: Tier,
    root: String,
    storage: Storage,
}

impl Mount {
    /// Attaches `root` as `tier`.
    ///
    /// Local output tiers are created when missing; the raw tier and every
    /// S3 bucket must already exist.
    pub async fn attach(tier: Tier, root: &str) -> Result<Self, MountError> {
        let storage_error = |source: StorageError| MountError::Storage {
            tier,
            root: root.to_string(),
            source,
        };

        let storage = StorageFactory::from_path(root).await.map_err(storage_error)?;

        if let Storage::Local(_) = storage
            && tier != Tier::Raw
        {
            tokio::fs::create_dir_all(root)
                .await
                .map_err(|e| storage_error(StorageError::Io(e)))?;
        }

        if !storage.container_exists(root).await.map_err(storage_error)? {
            return Err(MountError::ContainerNotFound {
                tier,
                root: root.to_string(),
            });
        }

        info!("Attached {} tier at {}", tier, root);
        Ok(Mount {
            tier,
            root: root.trim_end_matches('/').to_string(),
            storage,
        })
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Full path of `key` under this mount
    pub fn path(&self, key: &str) -> String {
        let key = key.trim_start_matches('/');
        if key.is_empty() {
            self.root.clone()
        } else {
            format!("{}/{}", self.root, key)
        }
    }

    pub async fn read(&self, key: &str) -> StorageResult<Vec<u8>> {
        let path = self.path(key);
        debug!("Reading {} from {} tier", path, self.tier);
        self.storage.read(&path).await
    }

    pub async fn write(&self, key: &str, data: &[u8]) -> StorageResult<()> {
        let path = self.path(key);
        debug!("Writing {} bytes to {} ({} tier)", data.len(), path, self.tier);
        self.storage.write(&path, data).await
    }

    pub async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.storage.exists(&self.path(key)).await
    }

    /// Lists files under `dir` (relative to the mount root)
    pub async fn list(&self, dir: &str) -> StorageResult<Vec<String>> {
        let mut prefix = self.path(dir);
        if StorageFactory::is_s3_path(&prefix) && !prefix.ends_with('/') {
            prefix.push('/');
        }
        self.storage.list(&prefix).await
    }

    /// Releases the mount
    pub fn detach(self) {
        info!("Detached {} tier at {}", self.tier, self.root);
    }
}

/// All three tiers attached for one run
#[derive(Debug)]
pub struct TierMounts {
    pub raw: Mount,
    pub structured: Mount,
    pub curated: Mount,
}

impl TierMounts {
    /// Attaches raw, structured and curated tiers in that order
    pub async fn attach(locations: &TierLocations) -> Result<Self, MountError> {
        let raw = Mount::attach(Tier::Raw, &locations.raw).await?;
        let structured = Mount::attach(Tier::Structured, &locations.structured).await?;
        let curated = Mount::attach(Tier::Curated, &locations.curated).await?;

        Ok(TierMounts {
            raw,
            structured,
            curated,
        })
    }

    pub fn detach(self) {
        self.raw.detach();
        self.structured.detach();
        self.curated.detach();
    }
}
