use super::{check_name, SmbCredentials, Storage, StorageError};
use crate::utils::executor::{CommandExecutor, RealExecutor};
use async_trait::async_trait;
use regex::Regex;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

const SMBCLIENT: &str = "smbclient";
const SMB_TIMEOUT: Duration = Duration::from_secs(3600);

/// smbclient status codes that mean "nothing to delete"
const MISSING_FILE_STATUSES: [&str; 2] = ["NT_STATUS_NO_SUCH_FILE", "NT_STATUS_OBJECT_NAME_NOT_FOUND"];

/// Matches one file line of smbclient's `ls` output:
/// `  name      A     1234  Fri Jan  1 00:30:00 2021`
fn ls_line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s{2}(.+?)\s+([ADHNRSV]+)\s+(\d+)\s+\w{3}\s+\w{3}\s+\d{1,2}\s+\d{2}:\d{2}:\d{2}\s+\d{4}\s*$")
            .expect("valid smbclient ls regex")
    })
}

/// Artifacts on an SMB/CIFS share, driven through `smbclient`
pub struct SmbStorage {
    host: String,
    port: Option<u16>,
    share: String,
    path: String,
    credentials: SmbCredentials,
    url: String,
    executor: Arc<dyn CommandExecutor>,
}

impl SmbStorage {
    pub fn new(
        host: String,
        port: Option<u16>,
        share: String,
        path: String,
        credentials: SmbCredentials,
    ) -> Self {
        Self::with_executor(host, port, share, path, credentials, Arc::new(RealExecutor))
    }

    pub fn with_executor(
        host: String,
        port: Option<u16>,
        share: String,
        path: String,
        credentials: SmbCredentials,
        executor: Arc<dyn CommandExecutor>,
    ) -> Self {
        let url = match (port, path.is_empty()) {
            (Some(port), true) => format!("smb://{}:{}/{}", host, port, share),
            (Some(port), false) => format!("smb://{}:{}/{}/{}", host, port, share, path),
            (None, true) => format!("smb://{}/{}", host, share),
            (None, false) => format!("smb://{}/{}/{}", host, share, path),
        };
        Self {
            host,
            port,
            share,
            path,
            credentials,
            url,
            executor,
        }
    }

    fn base_args(&self) -> Vec<String> {
        let mut args = vec![format!("//{}/{}", self.host, self.share)];
        if let Some(port) = self.port {
            args.push(format!("--port={}", port));
        }
        if self.credentials.username.is_empty() {
            args.push("--no-pass".to_string());
        } else {
            args.push(format!("--user={}", self.credentials.username));
            if !self.credentials.domain.is_empty() {
                args.push(format!("--workgroup={}", self.credentials.domain));
            }
        }
        args
    }

    /// Prefix `command` with a `cd` into the target directory
    fn script(&self, command: &str) -> String {
        if self.path.is_empty() {
            command.to_string()
        } else {
            format!("cd \"{}\"; {}", self.path, command)
        }
    }

    async fn smbclient(&self, operation: &'static str, command: &str) -> Result<String, StorageError> {
        let mut args = self.base_args();
        args.push("-c".to_string());
        args.push(self.script(command));
        let args: Vec<&str> = args.iter().map(String::as_str).collect();

        let mut env = Vec::new();
        if !self.credentials.password.is_empty() {
            env.push(("PASSWD", self.credentials.password.as_str()));
        }

        self.executor
            .run_command_stdout(SMBCLIENT, &args, &env, Some(SMB_TIMEOUT))
            .await
            .map_err(|e| StorageError::unreachable(&self.url, operation, e))
    }
}

impl fmt::Debug for SmbStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmbStorage")
            .field("url", &self.url)
            .field("credentials", &self.credentials)
            .finish()
    }
}

/// File names from smbclient `ls` output, skipping directories
fn parse_listing(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| ls_line_regex().captures(line))
        .filter(|caps| !caps[2].contains('D'))
        .map(|caps| caps[1].to_string())
        .collect()
}

fn is_missing_file(error: &StorageError) -> bool {
    let message = match error {
        StorageError::TargetUnreachable { source, .. } => source.to_string(),
        _ => return false,
    };
    MISSING_FILE_STATUSES.iter().any(|s| message.contains(s))
}

#[async_trait]
impl Storage for SmbStorage {
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

        let staging = TempDir::new().map_err(fail)?;
        let local = staging.path().join(name);
        let mut file = tokio::fs::File::create(&local).await.map_err(fail)?;
        let written = tokio::io::copy(source, &mut file).await.map_err(fail)?;
        file.flush().await.map_err(fail)?;
        drop(file);

        self.smbclient("write", &format!("put \"{}\" \"{}\"", local.display(), name))
            .await?;
        Ok(written)
    }

    async fn read(
        &self,
        name: &str,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64, StorageError> {
        check_name(name)?;
        let fail = |e: std::io::Error| StorageError::unreachable(&self.url, "read", e);

        let staging = TempDir::new().map_err(fail)?;
        let local = staging.path().join(name);
        if let Err(e) = self
            .smbclient("read", &format!("get \"{}\" \"{}\"", name, local.display()))
            .await
        {
            if is_missing_file(&e) {
                return Err(StorageError::NotFound {
                    target: self.url.clone(),
                    name: name.to_string(),
                });
            }
            return Err(e);
        }

        copy_file_into(&local, sink).await.map_err(fail)
    }

    async fn list(&self) -> Result<Vec<String>, StorageError> {
        let output = self.smbclient("list", "ls").await?;
        Ok(parse_listing(&output))
    }

    async fn delete(&self, name: &str) -> Result<(), StorageError> {
        check_name(name)?;
        match self.smbclient("delete", &format!("del \"{}\"", name)).await {
            Ok(_) => Ok(()),
            Err(e) if is_missing_file(&e) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

async fn copy_file_into(
    path: &Path,
    sink: &mut (dyn AsyncWrite + Send + Unpin),
) -> std::io::Result<u64> {
    let mut file = tokio::fs::File::open(path).await?;
    let copied = tokio::io::copy(&mut file, sink).await?;
    sink.flush().await?;
    Ok(copied)
}
