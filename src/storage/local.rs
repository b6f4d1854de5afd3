use crate::storage::{BlobStore, Error, ObjectMeta, PutOptions, Result};
use apt_repository::hash::md5_hex;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Component, Path, PathBuf};

/// A blob store backed by a directory tree, one file per key.
///
/// Only the body is kept; the etag reported for an object is the MD5 of
/// its content.
#[derive(Debug)]
pub struct LocalStore {
    path: PathBuf,
}

impl LocalStore {
    pub fn new(path: &Path) -> Result<Self> {
        if !path.is_dir() {
            fs::create_dir_all(path)?;
        }
        Ok(Self {
            path: path.canonicalize()?,
        })
    }

    fn object_path(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        if key.is_empty()
            || !relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)))
        {
            return Err(Error::InvalidKey(key.to_string()));
        }
        Ok(self.path.join(relative))
    }

    fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(self.object_path(key)?) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl BlobStore for LocalStore {
    fn head(&self, key: &str) -> Result<Option<ObjectMeta>> {
        Ok(self.read(key)?.map(|data| ObjectMeta {
            etag: Some(md5_hex(&data)),
            ..Default::default()
        }))
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.read(key)
    }

    fn put(&self, key: &str, data: &[u8], _options: &PutOptions) -> Result<()> {
        let path = self.object_path(key)?;
        let parent = path
            .parent()
            .ok_or_else(|| Error::InvalidKey(key.to_string()))?;
        fs::create_dir_all(parent)?;

        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        tmp.write_all(data)?;
        tmp.persist(&path).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.object_path(key)?) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn options() -> PutOptions {
        PutOptions {
            content_type: "text/plain".to_string(),
            cache_control: None,
            acl: "public-read".to_string(),
            server_side_encryption: false,
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn test_put_get_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path()).unwrap();

        assert_eq!(store.get("dists/stable/Release").unwrap(), None);
        store
            .put("dists/stable/Release", b"Codename: stable\n", &options())
            .unwrap();
        assert!(dir.path().join("dists/stable/Release").is_file());
        assert_eq!(
            store.get("dists/stable/Release").unwrap().as_deref(),
            Some(&b"Codename: stable\n"[..])
        );

        let meta = store.head("dists/stable/Release").unwrap().unwrap();
        assert!(meta.matches_md5(&md5_hex(b"Codename: stable\n")));

        store.delete("dists/stable/Release").unwrap();
        store.delete("dists/stable/Release").unwrap();
        assert_eq!(store.head("dists/stable/Release").unwrap(), None);
    }

    #[test]
    fn test_rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path()).unwrap();
        assert!(matches!(
            store.get("../outside"),
            Err(Error::InvalidKey(_))
        ));
        assert!(matches!(
            store.put("/etc/passwd", b"", &options()),
            Err(Error::InvalidKey(_))
        ));
        assert!(matches!(store.get(""), Err(Error::InvalidKey(_))));
    }
}
