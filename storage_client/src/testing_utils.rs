//! In-memory storage backend for tests across the workspace.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::SystemTime;

use blob::Blob;

use crate::error::{Result, StorageError};
use crate::interface::{Loader, Stat, Storage};

/// A `HashMap`-backed [`Storage`] that counts its calls, so tests can assert
/// how often the pipeline touched it.
#[derive(Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, (Vec<u8>, SystemTime)>>,
    gets: AtomicU32,
    puts: AtomicU32,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_count(&self) -> u32 {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn put_count(&self) -> u32 {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.lock().unwrap().keys().cloned().collect()
    }

    pub fn insert(&self, key: &str, data: Vec<u8>) {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), (data, SystemTime::now()));
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().unwrap().contains_key(key)
    }
}

#[async_trait::async_trait]
impl Loader for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Blob> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        let entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some((data, _)) => Ok(Blob::from_bytes(data.clone())),
            None => Err(StorageError::NotFound),
        }
    }
}

#[async_trait::async_trait]
impl Storage for MemoryStorage {
    async fn put(&self, key: &str, blob: &Blob) -> Result<()> {
        let data = blob.read_all().await?;
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), (data, SystemTime::now()));
        Ok(())
    }

    async fn stat(&self, key: &str) -> Result<Stat> {
        let entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some((data, modified)) => Ok(Stat {
                size: data.len() as u64,
                modified: Some(*modified),
            }),
            None => Err(StorageError::NotFound),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match self.entries.lock().unwrap().remove(key) {
            Some(_) => Ok(()),
            None => Err(StorageError::NotFound),
        }
    }
}
