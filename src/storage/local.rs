use super::{check_name, Storage, StorageError};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

/// Artifacts stored as plain files in a local (or locally mounted) directory
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
    url: String,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let url = format!("file://{}", root.display());
        Self { root, url }
    }
}

#[async_trait]
impl Storage for LocalStorage {
    fn url(&self) -> &str {
        &self.url
    }

    async fn write(
        &self,
        name: &str,
        source: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<u64, StorageError> {
        check_name(name)?;
        let fail = |e: std::io::Error| StorageError::unreachable(&self.url, "write", e);

        fs::create_dir_all(&self.root).await.map_err(fail)?;

        // Dot-prefixed so a half-written file never looks like an artifact
        let partial = self.root.join(format!(".{}.partial", name));
        let mut file = fs::File::create(&partial).await.map_err(fail)?;
        let result = async {
            let written = tokio::io::copy(source, &mut file).await?;
            file.flush().await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&partial, self.root.join(name)).await?;
            Ok::<_, std::io::Error>(written)
        }
        .await;

        if result.is_err() {
            let _ = fs::remove_file(&partial).await;
        }
        result.map_err(fail)
    }

    async fn read(
        &self,
        name: &str,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64, StorageError> {
        check_name(name)?;
        let mut file = match fs::File::open(self.root.join(name)).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StorageError::NotFound {
                    target: self.url.clone(),
                    name: name.to_string(),
                })
            }
            Err(e) => return Err(StorageError::unreachable(&self.url, "read", e)),
        };
        let copied = tokio::io::copy(&mut file, sink)
            .await
            .map_err(|e| StorageError::unreachable(&self.url, "read", e))?;
        sink.flush()
            .await
            .map_err(|e| StorageError::unreachable(&self.url, "read", e))?;
        Ok(copied)
    }

    async fn list(&self) -> Result<Vec<String>, StorageError> {
        let fail = |e: std::io::Error| StorageError::unreachable(&self.url, "list", e);

        let mut entries = fs::read_dir(&self.root).await.map_err(fail)?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(fail)? {
            let file_type = entry.file_type().await.map_err(fail)?;
            if !file_type.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }

    async fn delete(&self, name: &str) -> Result<(), StorageError> {
        check_name(name)?;
        match fs::remove_file(self.root.join(name)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::unreachable(&self.url, "delete", e)),
        }
    }
}
