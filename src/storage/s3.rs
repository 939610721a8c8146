use super::{check_name, AwsCredentials, Storage, StorageError};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials as StaticCredentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use std::fmt;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// Artifacts smaller than one part go up in a single PutObject, larger ones
/// as a multipart upload holding one part in memory at a time
const PART_SIZE: u64 = 64 * 1024 * 1024;

/// Read up to `limit` bytes; a short part means the source is exhausted
async fn read_part(
    source: &mut (dyn AsyncRead + Send + Unpin),
    limit: u64,
) -> io::Result<Vec<u8>> {
    let mut part = Vec::new();
    (&mut *source).take(limit).read_to_end(&mut part).await?;
    Ok(part)
}

/// Artifacts stored as objects under a bucket prefix
pub struct S3Storage {
    bucket: String,
    prefix: String,
    credentials: AwsCredentials,
    url: String,
    client: OnceCell<Client>,
}

impl S3Storage {
    pub fn new(bucket: String, prefix: String, credentials: AwsCredentials) -> Self {
        let url = if prefix.is_empty() {
            format!("s3://{}", bucket)
        } else {
            format!("s3://{}/{}", bucket, prefix)
        };
        Self {
            bucket,
            prefix,
            credentials,
            url,
            client: OnceCell::new(),
        }
    }

    fn key(&self, name: &str) -> String {
        if self.prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", self.prefix, name)
        }
    }

    fn list_prefix(&self) -> Option<String> {
        if self.prefix.is_empty() {
            None
        } else {
            Some(format!("{}/", self.prefix))
        }
    }

    /// The client is built on first use so constructing a target never
    /// touches the network or the AWS profile chain
    async fn client(&self) -> &Client {
        self.client
            .get_or_init(|| async {
                let mut loader = aws_config::defaults(BehaviorVersion::latest());
                if let Some(region) = &self.credentials.region {
                    loader = loader.region(Region::new(region.clone()));
                }
                if let Some(endpoint) = &self.credentials.endpoint_url {
                    loader = loader.endpoint_url(endpoint.clone());
                }
                if let (Some(id), Some(secret)) = (
                    &self.credentials.access_key_id,
                    &self.credentials.secret_access_key,
                ) {
                    loader = loader.credentials_provider(StaticCredentials::new(
                        id.clone(),
                        secret.clone(),
                        None,
                        None,
                        "mariadb-backup",
                    ));
                }
                let sdk_config = loader.load().await;
                let config = aws_sdk_s3::config::Builder::from(&sdk_config)
                    .force_path_style(self.credentials.path_style)
                    .build();
                Client::from_conf(config)
            })
            .await
    }

    async fn upload_multipart(
        &self,
        key: &str,
        first: Vec<u8>,
        source: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<u64, StorageError> {
        let client = self.client().await;
        let created = client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::unreachable(&self.url, "write", e))?;
        let upload_id = created
            .upload_id()
            .ok_or_else(|| {
                StorageError::unreachable(&self.url, "write", "no multipart upload id returned")
            })?
            .to_string();

        match self.upload_parts(client, key, &upload_id, first, source).await {
            Ok(size) => Ok(size),
            Err(err) => {
                if let Err(abort) = client
                    .abort_multipart_upload()
                    .bucket(&self.bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .send()
                    .await
                {
                    warn!("Failed to abort multipart upload of {}: {}", key, abort);
                }
                Err(err)
            }
        }
    }

    async fn upload_parts(
        &self,
        client: &Client,
        key: &str,
        upload_id: &str,
        first: Vec<u8>,
        source: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<u64, StorageError> {
        let mut parts = Vec::new();
        let mut size = 0u64;
        let mut part = first;

        while !part.is_empty() {
            let part_number = parts.len() as i32 + 1;
            size += part.len() as u64;
            debug!(
                "Uploading part {} of s3://{}/{} ({} bytes so far)",
                part_number, self.bucket, key, size
            );
            let output = client
                .upload_part()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(part))
                .send()
                .await
                .map_err(|e| StorageError::unreachable(&self.url, "write", e))?;
            parts.push(
                CompletedPart::builder()
                    .set_e_tag(output.e_tag().map(str::to_string))
                    .part_number(part_number)
                    .build(),
            );

            part = read_part(source, PART_SIZE)
                .await
                .map_err(|e| StorageError::unreachable(&self.url, "write", e))?;
        }

        client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| StorageError::unreachable(&self.url, "write", e))?;
        Ok(size)
    }
}

impl fmt::Debug for S3Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Storage")
            .field("url", &self.url)
            .field("credentials", &self.credentials)
            .finish()
    }
}

#[async_trait]
impl Storage for S3Storage {
    fn url(&self) -> &str {
        &self.url
    }

    async fn write(
        &self,
        name: &str,
        source: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<u64, StorageError> {
        check_name(name)?;
        let key = self.key(name);
        let first = read_part(source, PART_SIZE)
            .await
            .map_err(|e| StorageError::unreachable(&self.url, "write", e))?;

        if (first.len() as u64) < PART_SIZE {
            let size = first.len() as u64;
            debug!("Uploading s3://{}/{} ({} bytes)", self.bucket, key, size);
            self.client()
                .await
                .put_object()
                .bucket(&self.bucket)
                .key(key)
                .body(ByteStream::from(first))
                .send()
                .await
                .map_err(|e| StorageError::unreachable(&self.url, "write", e))?;
            return Ok(size);
        }

        self.upload_multipart(&key, first, source).await
    }

    async fn read(
        &self,
        name: &str,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64, StorageError> {
        check_name(name)?;
        let output = self
            .client()
            .await
            .get_object()
            .bucket(&self.bucket)
            .key(self.key(name))
            .send()
            .await
            .map_err(|e| {
                let missing = e
                    .as_service_error()
                    .map(|se| se.is_no_such_key())
                    .unwrap_or(false);
                if missing {
                    StorageError::NotFound {
                        target: self.url.clone(),
                        name: name.to_string(),
                    }
                } else {
                    StorageError::unreachable(&self.url, "read", e)
                }
            })?;

        let mut body = Box::pin(output.body.into_async_read());
        let copied = tokio::io::copy(&mut body, sink)
            .await
            .map_err(|e| StorageError::unreachable(&self.url, "read", e))?;
        sink.flush()
            .await
            .map_err(|e| StorageError::unreachable(&self.url, "read", e))?;
        Ok(copied)
    }

    async fn list(&self) -> Result<Vec<String>, StorageError> {
        let client = self.client().await;
        let prefix = self.list_prefix();
        let mut names = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let output = client
                .list_objects_v2()
                .bucket(&self.bucket)
                .set_prefix(prefix.clone())
                .delimiter("/")
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| StorageError::unreachable(&self.url, "list", e))?;

            for object in output.contents() {
                let Some(key) = object.key() else { continue };
                let name = match &prefix {
                    Some(p) => key.strip_prefix(p.as_str()).unwrap_or(key),
                    None => key,
                };
                if !name.is_empty() {
                    names.push(name.to_string());
                }
            }

            match output.next_continuation_token() {
                Some(token) if output.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        Ok(names)
    }

    async fn delete(&self, name: &str) -> Result<(), StorageError> {
        check_name(name)?;
        // DeleteObject succeeds for keys that do not exist
        self.client()
            .await
            .delete_object()
            .bucket(&self.bucket)
            .key(self.key(name))
            .send()
            .await
            .map_err(|e| StorageError::unreachable(&self.url, "delete", e))?;
        Ok(())
    }
}
