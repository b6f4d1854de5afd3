//! Blob store access.
//!
//! Backends implement the narrow [`BlobStore`] contract; [`Storage`] adds
//! the key prefix, object policy (ACL, encryption) and the content-hash
//! check that keeps unchanged objects from being rewritten.

use crate::config::{Settings, StorageConfig, Visibility};
use apt_repository::hash::md5_hex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

pub mod local;
pub mod memory;
#[cfg(feature = "s3")]
pub mod s3;

pub use local::LocalStore;
pub use memory::MemoryStore;
#[cfg(feature = "s3")]
pub use s3::S3Store;

/// User metadata key holding the hex MD5 of the object body.
pub const MD5_METADATA_KEY: &str = "md5";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    #[error("{operation} of {key} failed: {message}")]
    Backend {
        operation: &'static str,
        key: String,
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// What a backend knows about a stored object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectMeta {
    pub etag: Option<String>,
    pub metadata: HashMap<String, String>,
    pub content_type: Option<String>,
}

impl ObjectMeta {
    /// Whether the object's etag or recorded MD5 equals `md5`.
    pub fn matches_md5(&self, md5: &str) -> bool {
        self.etag.as_deref().map(|e| e.trim_matches('"')) == Some(md5)
            || self.metadata.get(MD5_METADATA_KEY).map(String::as_str) == Some(md5)
    }
}

/// Attributes an object is written with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutOptions {
    pub content_type: String,
    pub cache_control: Option<String>,
    /// Canned ACL name, e.g. `public-read`.
    pub acl: String,
    /// Request AES256 server-side encryption.
    pub server_side_encryption: bool,
    pub metadata: BTreeMap<String, String>,
}

/// The operations the repository protocol needs from an object store.
pub trait BlobStore {
    /// Metadata of the object at `key`, or `None` if there is none.
    fn head(&self, key: &str) -> Result<Option<ObjectMeta>>;

    /// Body of the object at `key`, or `None` if there is none.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    fn put(&self, key: &str, data: &[u8], options: &PutOptions) -> Result<()>;

    /// Delete the object at `key`; deleting a missing object succeeds.
    fn delete(&self, key: &str) -> Result<()>;
}

/// What to do when an object with different content already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Conflict {
    #[default]
    Overwrite,
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    Uploaded,
    /// The stored object already had this content; nothing was written.
    Unchanged,
}

/// Repository-relative access to a blob store.
#[derive(Clone)]
pub struct Storage {
    backend: Arc<dyn BlobStore>,
    prefix: Option<String>,
    visibility: Visibility,
    encryption: bool,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("prefix", &self.prefix)
            .field("visibility", &self.visibility)
            .field("encryption", &self.encryption)
            .finish()
    }
}

impl Storage {
    pub fn new(
        backend: Arc<dyn BlobStore>,
        prefix: Option<String>,
        visibility: Visibility,
        encryption: bool,
    ) -> Self {
        let prefix = prefix
            .map(|p| p.trim_end_matches('/').to_string())
            .filter(|p| !p.is_empty());
        Self {
            backend,
            prefix,
            visibility,
            encryption,
        }
    }

    /// Connect to the backend named by `settings`.
    pub fn from_settings(settings: &Settings) -> crate::Result<Self> {
        let backend: Arc<dyn BlobStore> = match &settings.storage {
            StorageConfig::Local { root } => Arc::new(LocalStore::new(root)?),
            #[cfg(feature = "s3")]
            StorageConfig::S3 {
                bucket,
                region,
                endpoint,
                credentials,
                force_path_style,
            } => Arc::new(S3Store::connect(
                bucket,
                region.as_deref(),
                endpoint.as_deref(),
                credentials.as_ref(),
                *force_path_style,
            )?),
            #[cfg(not(feature = "s3"))]
            StorageConfig::S3 { .. } => {
                return Err(crate::Error::Config(
                    "this build has no S3 support; use --local-root".to_string(),
                ))
            }
        };
        Ok(Self::new(
            backend,
            settings.prefix.clone(),
            settings.visibility,
            settings.encryption,
        ))
    }

    /// Physical key of a repository path.
    pub fn key(&self, path: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}/{}", prefix, path),
            None => path.to_string(),
        }
    }

    pub fn exists(&self, path: &str) -> crate::Result<bool> {
        Ok(self.backend.head(&self.key(path))?.is_some())
    }

    pub fn read(&self, path: &str) -> crate::Result<Option<Vec<u8>>> {
        Ok(self.backend.get(&self.key(path))?)
    }

    /// Write `data` to `path` unless an object with the same MD5 is
    /// already there.
    pub fn store(
        &self,
        path: &str,
        data: &[u8],
        content_type: &str,
        cache_control: Option<&str>,
        conflict: Conflict,
    ) -> crate::Result<StoreOutcome> {
        let key = self.key(path);
        let md5 = md5_hex(data);

        if let Some(existing) = self.backend.head(&key)? {
            if existing.matches_md5(&md5) {
                debug!("{} is unchanged, not uploading", path);
                return Ok(StoreOutcome::Unchanged);
            }
            if conflict == Conflict::Fail {
                return Err(crate::Error::AlreadyExists(path.to_string()));
            }
        }

        let mut metadata = BTreeMap::new();
        metadata.insert(MD5_METADATA_KEY.to_string(), md5);
        let options = PutOptions {
            content_type: content_type.to_string(),
            cache_control: cache_control.map(str::to_string),
            acl: self.visibility.canned_acl().to_string(),
            server_side_encryption: self.encryption,
            metadata,
        };
        debug!("Uploading {} ({} bytes)", path, data.len());
        self.backend.put(&key, data, &options)?;
        Ok(StoreOutcome::Uploaded)
    }

    /// Delete `path`; a missing object is not an error.
    pub fn remove(&self, path: &str) -> crate::Result<()> {
        debug!("Removing {}", path);
        Ok(self.backend.delete(&self.key(path))?)
    }
}
