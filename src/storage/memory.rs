use crate::storage::{BlobStore, ObjectMeta, PutOptions, Result};
use apt_repository::hash::md5_hex;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub data: Vec<u8>,
    pub options: PutOptions,
}

/// An in-process blob store that records every write.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, StoredObject>>,
    puts: Mutex<Vec<String>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place an object without recording a write.
    pub fn insert(&self, key: &str, data: &[u8]) {
        let options = PutOptions {
            content_type: "application/octet-stream".to_string(),
            cache_control: None,
            acl: "private".to_string(),
            server_side_encryption: false,
            metadata: BTreeMap::new(),
        };
        lock(&self.objects).insert(
            key.to_string(),
            StoredObject {
                data: data.to_vec(),
                options,
            },
        );
    }

    pub fn object(&self, key: &str) -> Option<StoredObject> {
        lock(&self.objects).get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        lock(&self.objects).keys().cloned().collect()
    }

    /// Keys written through [`BlobStore::put`], in order.
    pub fn puts(&self) -> Vec<String> {
        lock(&self.puts).clone()
    }

    pub fn clear_puts(&self) {
        lock(&self.puts).clear();
    }
}

impl BlobStore for MemoryStore {
    fn head(&self, key: &str) -> Result<Option<ObjectMeta>> {
        Ok(lock(&self.objects).get(key).map(|object| ObjectMeta {
            etag: Some(format!("\"{}\"", md5_hex(&object.data))),
            metadata: object
                .options
                .metadata
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            content_type: Some(object.options.content_type.clone()),
        }))
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(lock(&self.objects).get(key).map(|object| object.data.clone()))
    }

    fn put(&self, key: &str, data: &[u8], options: &PutOptions) -> Result<()> {
        lock(&self.puts).push(key.to_string());
        lock(&self.objects).insert(
            key.to_string(),
            StoredObject {
                data: data.to_vec(),
                options: options.clone(),
            },
        );
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        lock(&self.objects).remove(key);
        Ok(())
    }
}
