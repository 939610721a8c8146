//! In-memory storage target for tests
//! Available for use in external test crates

use super::{check_name, Storage, StorageError};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

#[derive(Debug, Default)]
struct Failures {
    write: bool,
    read: bool,
    list: bool,
    delete: HashSet<String>,
}

/// Target that keeps artifacts in a map and can be told to fail
#[derive(Debug)]
pub struct MemoryStorage {
    url: String,
    files: Mutex<BTreeMap<String, Vec<u8>>>,
    failures: Mutex<Failures>,
    deleted: Mutex<Vec<String>>,
}

impl MemoryStorage {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            files: Mutex::new(BTreeMap::new()),
            failures: Mutex::new(Failures::default()),
            deleted: Mutex::new(Vec::new()),
        }
    }

    /// Pre-populate artifacts with empty contents
    pub fn with_files<S: AsRef<str>>(self, names: &[S]) -> Self {
        {
            let mut files = self.files.lock().unwrap();
            for name in names {
                files.insert(name.as_ref().to_string(), Vec::new());
            }
        }
        self
    }

    pub fn insert(&self, name: &str, contents: &[u8]) {
        self.files
            .lock()
            .unwrap()
            .insert(name.to_string(), contents.to_vec());
    }

    pub fn fail_writes(&self) {
        self.failures.lock().unwrap().write = true;
    }

    pub fn fail_reads(&self) {
        self.failures.lock().unwrap().read = true;
    }

    pub fn fail_lists(&self) {
        self.failures.lock().unwrap().list = true;
    }

    pub fn fail_delete_of(&self, name: &str) {
        self.failures
            .lock()
            .unwrap()
            .delete
            .insert(name.to_string());
    }

    /// Current artifact names, sorted
    pub fn names(&self) -> Vec<String> {
        self.files.lock().unwrap().keys().cloned().collect()
    }

    pub fn contents(&self, name: &str) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(name).cloned()
    }

    /// Names passed to `delete`, in call order
    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    fn injected(&self, operation: &'static str) -> StorageError {
        StorageError::unreachable(&self.url, operation, "injected failure")
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    fn url(&self) -> &str {
        &self.url
    }

    async fn write(
        &self,
        name: &str,
        source: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<u64, StorageError> {
        check_name(name)?;
        if self.failures.lock().unwrap().write {
            return Err(self.injected("write"));
        }
        let mut buf = Vec::new();
        source
            .read_to_end(&mut buf)
            .await
            .map_err(|e| StorageError::unreachable(&self.url, "write", e))?;
        let size = buf.len() as u64;
        self.files.lock().unwrap().insert(name.to_string(), buf);
        Ok(size)
    }

    async fn read(
        &self,
        name: &str,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64, StorageError> {
        if self.failures.lock().unwrap().read {
            return Err(self.injected("read"));
        }
        let contents = self
            .contents(name)
            .ok_or_else(|| StorageError::NotFound {
                target: self.url.clone(),
                name: name.to_string(),
            })?;
        sink.write_all(&contents)
            .await
            .map_err(|e| StorageError::unreachable(&self.url, "read", e))?;
        sink.flush()
            .await
            .map_err(|e| StorageError::unreachable(&self.url, "read", e))?;
        Ok(contents.len() as u64)
    }

    async fn list(&self) -> Result<Vec<String>, StorageError> {
        if self.failures.lock().unwrap().list {
            return Err(self.injected("list"));
        }
        Ok(self.names())
    }

    async fn delete(&self, name: &str) -> Result<(), StorageError> {
        self.deleted.lock().unwrap().push(name.to_string());
        if self.failures.lock().unwrap().delete.contains(name) {
            return Err(self.injected("delete"));
        }
        self.files.lock().unwrap().remove(name);
        Ok(())
    }
}
