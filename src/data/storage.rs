//! Object storage I/O
//!
//! Reads and writes files either on the local filesystem or in a Google Cloud
//! Storage bucket, chosen by the `gs://` prefix of the location. Public
//! objects are read anonymously; uploads use a bearer token when configured.

use polars::prelude::DataFrame;
use reqwest::StatusCode;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use super::csv_loader::{frame_to_csv_bytes, read_frame_from_bytes};
use crate::config::StorageConfig;
use crate::error::{Result, StorageError};

const GS_PREFIX: &str = "gs://";

/// Where a file lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectLocation {
    Local(PathBuf),
    Gcs { bucket: String, path: String },
}

impl ObjectLocation {
    /// `gs://bucket/path/to/file` is a bucket object, anything else a local path
    pub fn parse(location: &str) -> Result<Self, StorageError> {
        let Some(rest) = location.strip_prefix(GS_PREFIX) else {
            return Ok(ObjectLocation::Local(PathBuf::from(location)));
        };

        let (bucket, path) = rest
            .split_once('/')
            .ok_or_else(|| StorageError::InvalidLocation(location.to_string()))?;
        let path = path.trim_start_matches('/');
        if bucket.is_empty() || path.is_empty() {
            return Err(StorageError::InvalidLocation(location.to_string()));
        }

        Ok(ObjectLocation::Gcs {
            bucket: bucket.to_string(),
            path: path.to_string(),
        })
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, ObjectLocation::Gcs { .. })
    }
}

impl fmt::Display for ObjectLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectLocation::Local(path) => write!(f, "{}", path.display()),
            ObjectLocation::Gcs { bucket, path } => write!(f, "{}{}/{}", GS_PREFIX, bucket, path),
        }
    }
}

/// Map an HTTP status to a storage error
fn check_status(status: StatusCode, location: &ObjectLocation) -> Result<(), StorageError> {
    if status.is_success() {
        return Ok(());
    }
    let location = location.to_string();
    Err(match status {
        StatusCode::NOT_FOUND => StorageError::NotFound(location),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StorageError::AccessDenied {
            status: status.as_u16(),
            location,
        },
        _ => StorageError::UnexpectedStatus {
            status: status.as_u16(),
            location,
        },
    })
}

async fn ensure_parent_dir(path: &Path) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    Ok(())
}

/// Local / bucket file access
pub struct ObjectStore {
    client: reqwest::Client,
    config: StorageConfig,
}

impl ObjectStore {
    pub fn new(config: StorageConfig) -> Result<Self, StorageError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(&config.user_agent)
            .build()?;

        Ok(Self { client, config })
    }

    /// Public download URL of a bucket object, each path segment percent-encoded
    fn object_url(&self, bucket: &str, path: &str) -> Result<reqwest::Url, StorageError> {
        let invalid = || StorageError::InvalidLocation(self.config.endpoint.clone());
        let mut url = reqwest::Url::parse(&self.config.endpoint).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|_| invalid())?
            .pop_if_empty()
            .push(bucket)
            .extend(path.split('/'));
        Ok(url)
    }

    fn upload_url(&self, bucket: &str) -> String {
        format!("{}/b/{}/o", self.config.upload_endpoint.trim_end_matches('/'), bucket)
    }

    pub async fn read_bytes(&self, location: &ObjectLocation) -> Result<Vec<u8>, StorageError> {
        match location {
            ObjectLocation::Local(path) => {
                info!("Reading file from local directory: {}", path.display());
                tokio::fs::read(path).await.map_err(|e| match e.kind() {
                    std::io::ErrorKind::NotFound => StorageError::NotFound(location.to_string()),
                    _ => StorageError::Io(e),
                })
            }
            ObjectLocation::Gcs { bucket, path } => {
                info!("Reading file from bucket {}: {}", bucket, path);
                let mut request = self.client.get(self.object_url(bucket, path)?);
                if let Some(token) = &self.config.access_token {
                    request = request.bearer_auth(token);
                }
                let response = request.send().await?;
                check_status(response.status(), location)?;
                Ok(response.bytes().await?.to_vec())
            }
        }
    }

    /// Read a text object, which must be UTF-8
    pub async fn read_text(&self, location: &ObjectLocation) -> Result<String, StorageError> {
        let bytes = self.read_bytes(location).await?;
        String::from_utf8(bytes).map_err(|_| StorageError::NotUtf8(location.to_string()))
    }

    pub async fn write_bytes(
        &self,
        location: &ObjectLocation,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError> {
        match location {
            ObjectLocation::Local(path) => {
                info!("Writing file to local directory: {}", path.display());
                ensure_parent_dir(path).await?;
                tokio::fs::write(path, bytes).await?;
            }
            ObjectLocation::Gcs { bucket, path } => {
                info!("Writing file to bucket {}: {}", bucket, path);
                let mut request = self
                    .client
                    .post(self.upload_url(bucket))
                    .query(&[("uploadType", "media"), ("name", path.as_str())])
                    .header(reqwest::header::CONTENT_TYPE, content_type)
                    .body(bytes);
                if let Some(token) = &self.config.access_token {
                    request = request.bearer_auth(token);
                }
                let response = request.send().await?;
                check_status(response.status(), location)?;
            }
        }
        Ok(())
    }

    /// Copy an object to a local file, creating parent directories
    pub async fn download_to(&self, location: &ObjectLocation, dest: &Path) -> Result<usize, StorageError> {
        let bytes = self.read_bytes(location).await?;
        ensure_parent_dir(dest).await?;
        let size = bytes.len();
        tokio::fs::write(dest, bytes).await?;
        info!("Downloaded {} to {} ({} bytes)", location, dest.display(), size);
        Ok(size)
    }

    /// Load a CSV from either backend into a data frame
    pub async fn read_csv(&self, location: &str) -> Result<DataFrame> {
        let location = ObjectLocation::parse(location)?;
        let text = self.read_text(&location).await?;
        read_frame_from_bytes(text.into_bytes())
    }

    /// Write a data frame as CSV to either backend
    pub async fn write_csv(&self, df: &mut DataFrame, location: &str) -> Result<()> {
        let location = ObjectLocation::parse(location)?;
        let bytes = frame_to_csv_bytes(df)?;
        self.write_bytes(&location, bytes, "text/csv").await?;
        Ok(())
    }
}
