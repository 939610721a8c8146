//! Backup target storage
//!
//! A target is a directory-like location that holds backup artifacts. The
//! backend is chosen once, from the URL scheme, when the target is built:
//!
//! | URL                         | Backend            |
//! |-----------------------------|--------------------|
//! | `/path` or `file:///path`   | [`LocalStorage`]   |
//! | `smb://host/share/path`     | [`SmbStorage`]     |
//! | `s3://bucket/path`          | [`S3Storage`]      |
//!
//! Everything downstream talks to `Arc<dyn Storage>` and never branches on
//! the backend again.

mod credentials;
mod local;
pub mod mock;
mod s3;
mod smb;

pub use credentials::{AwsCredentials, Credentials, SmbCredentials};
pub use local::LocalStorage;
pub use s3::S3Storage;
pub use smb::SmbStorage;

use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use url::Url;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid target url '{url}': {reason}")]
    InvalidTargetUrl { url: String, reason: String },

    #[error("invalid artifact name '{0}'")]
    InvalidName(String),

    #[error("{operation} failed on {target}: {source}")]
    TargetUnreachable {
        target: String,
        operation: &'static str,
        #[source]
        source: BoxError,
    },

    #[error("'{name}' not found on {target}")]
    NotFound { target: String, name: String },
}

impl StorageError {
    pub(crate) fn unreachable(
        target: &str,
        operation: &'static str,
        source: impl Into<BoxError>,
    ) -> Self {
        StorageError::TargetUnreachable {
            target: target.to_string(),
            operation,
            source: source.into(),
        }
    }

    fn invalid_url(url: &str, reason: impl Into<String>) -> Self {
        StorageError::InvalidTargetUrl {
            url: url.to_string(),
            reason: reason.into(),
        }
    }
}

/// Operations every backup target supports
///
/// Implementations are safe for concurrent `list`/`read`; callers serialize
/// `write`/`delete` against the same target.
#[async_trait]
pub trait Storage: Send + Sync + fmt::Debug {
    /// Target URL with any credentials removed, for logs and errors
    fn url(&self) -> &str;

    /// Store everything from `source` as `name`, replacing any existing
    /// artifact. Returns the number of bytes written.
    async fn write(
        &self,
        name: &str,
        source: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<u64, StorageError>;

    /// Copy the artifact `name` into `sink`. Returns the number of bytes read.
    async fn read(
        &self,
        name: &str,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64, StorageError>;

    /// Names directly under the target root, in no particular order
    async fn list(&self) -> Result<Vec<String>, StorageError>;

    /// Remove `name`; removing a missing artifact succeeds
    async fn delete(&self, name: &str) -> Result<(), StorageError>;
}

/// Artifact names are plain file names, never paths
pub(crate) fn check_name(name: &str) -> Result<(), StorageError> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') || name.contains('\\')
    {
        return Err(StorageError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// A parsed target URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetUrl {
    Local(PathBuf),
    Smb {
        host: String,
        port: Option<u16>,
        share: String,
        path: String,
        username: Option<String>,
        password: Option<String>,
    },
    S3 {
        bucket: String,
        prefix: String,
    },
}

impl TargetUrl {
    pub fn parse(raw: &str) -> Result<Self, StorageError> {
        if !raw.contains("://") {
            if !raw.starts_with('/') {
                return Err(StorageError::invalid_url(
                    raw,
                    "local targets must be absolute paths or file:// URLs",
                ));
            }
            return Ok(TargetUrl::Local(PathBuf::from(raw)));
        }

        let url = Url::parse(raw).map_err(|e| StorageError::invalid_url(raw, e.to_string()))?;

        match url.scheme() {
            "file" => {
                let path = url
                    .to_file_path()
                    .map_err(|_| StorageError::invalid_url(raw, "file URL must not name a host"))?;
                Ok(TargetUrl::Local(path))
            }
            "smb" => {
                let host = url
                    .host_str()
                    .filter(|h| !h.is_empty())
                    .ok_or_else(|| StorageError::invalid_url(raw, "SMB URL requires a host"))?
                    .to_string();
                let mut segments = url
                    .path_segments()
                    .map(|s| s.filter(|seg| !seg.is_empty()).collect::<Vec<_>>())
                    .unwrap_or_default();
                if segments.is_empty() {
                    return Err(StorageError::invalid_url(raw, "SMB URL requires a share"));
                }
                let share = segments.remove(0).to_string();
                let username = Some(url.username())
                    .filter(|u| !u.is_empty())
                    .map(str::to_string);
                Ok(TargetUrl::Smb {
                    host,
                    port: url.port(),
                    share,
                    path: segments.join("/"),
                    username,
                    password: url.password().map(str::to_string),
                })
            }
            "s3" => {
                let bucket = url
                    .host_str()
                    .filter(|h| !h.is_empty())
                    .ok_or_else(|| StorageError::invalid_url(raw, "S3 URL requires a bucket"))?
                    .to_string();
                let prefix = url.path().trim_matches('/').to_string();
                Ok(TargetUrl::S3 { bucket, prefix })
            }
            other => Err(StorageError::invalid_url(
                raw,
                format!("unsupported scheme '{}'", other),
            )),
        }
    }
}

/// Build the storage backend for a target URL
pub fn parse_url(raw: &str, credentials: &Credentials) -> Result<Arc<dyn Storage>, StorageError> {
    let storage: Arc<dyn Storage> = match TargetUrl::parse(raw)? {
        TargetUrl::Local(path) => Arc::new(LocalStorage::new(path)),
        TargetUrl::Smb {
            host,
            port,
            share,
            path,
            username,
            password,
        } => {
            let mut smb = credentials.smb.clone();
            if let Some(username) = username {
                smb.username = username;
            }
            if let Some(password) = password {
                smb.password = password;
            }
            Arc::new(SmbStorage::new(host, port, share, path, smb))
        }
        TargetUrl::S3 { bucket, prefix } => {
            Arc::new(S3Storage::new(bucket, prefix, credentials.aws.clone()))
        }
    };
    Ok(storage)
}

/// One target's failure within a multi-target operation
#[derive(Debug)]
pub struct TargetFailure {
    pub target: String,
    pub error: StorageError,
}

/// Every target that failed during one dump or prune run
#[derive(Debug, Default)]
pub struct TargetErrors(pub Vec<TargetFailure>);

impl TargetErrors {
    pub fn push(&mut self, target: &str, error: StorageError) {
        self.0.push(TargetFailure {
            target: target.to_string(),
            error,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Targets that failed, in the order they were recorded
    pub fn targets(&self) -> Vec<&str> {
        self.0.iter().map(|f| f.target.as_str()).collect()
    }
}

impl fmt::Display for TargetErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} target error(s): ", self.0.len())?;
        for (i, failure) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", failure.target, failure.error)?;
        }
        Ok(())
    }
}

impl std::error::Error for TargetErrors {}
