// S3 object store client
// Built on rust-s3 without `fail-on-err`: every response status is checked here.

use crate::config::AwsConfig;
use crate::errors::StorageError;
use crate::storage::ObjectStore;
use async_trait::async_trait;
use s3::bucket::Bucket;
use s3::creds::Credentials;
use s3::region::Region;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, instrument};

/// S3 bucket client
#[derive(Clone, Debug)]
pub struct S3ObjectStore {
    bucket: Arc<Bucket>,
    name: String,
}

impl S3ObjectStore {
    /// Client for `bucket_name`. Credentials come from the configured profile
    /// or the standard environment chain; a configured endpoint switches to
    /// path style.
    #[instrument(skip(config), fields(region = %config.region))]
    pub fn new(bucket_name: &str, config: &AwsConfig) -> Result<Self, StorageError> {
        info!(bucket = %bucket_name, "Initializing S3 client");

        let credentials = match &config.profile {
            Some(profile) => Credentials::new(None, None, None, None, Some(profile.as_str())),
            None => Credentials::default(),
        }
        .map_err(|e| {
            error!(error = %e, "Failed to load AWS credentials");
            StorageError::ObjectStore(format!("Failed to load credentials: {}", e))
        })?;

        let (region, path_style) = match &config.endpoint {
            Some(endpoint) => (
                Region::Custom {
                    region: config.region.clone(),
                    endpoint: endpoint.trim_end_matches('/').to_string(),
                },
                true,
            ),
            None => (
                config.region.parse::<Region>().map_err(|e| {
                    StorageError::ObjectStore(format!("Invalid region '{}': {}", config.region, e))
                })?,
                false,
            ),
        };

        Self::from_parts(bucket_name, region, credentials, path_style)
    }

    fn from_parts(
        bucket_name: &str,
        region: Region,
        credentials: Credentials,
        path_style: bool,
    ) -> Result<Self, StorageError> {
        let bucket = Bucket::new(bucket_name, region, credentials).map_err(|e| {
            error!(error = %e, "Failed to create S3 bucket handle");
            StorageError::ObjectStore(format!("Failed to create bucket: {}", e))
        })?;
        let bucket = if path_style {
            bucket.with_path_style()
        } else {
            bucket
        };

        Ok(Self {
            bucket: Arc::new(bucket),
            name: bucket_name.to_string(),
        })
    }
}

fn check_status(status: u16, key: &str, op: &str) -> Result<(), StorageError> {
    match status {
        200..=299 => Ok(()),
        404 => Err(StorageError::NotFound(key.to_string())),
        other => Err(StorageError::ObjectStore(format!(
            "Failed to {} object '{}': status {}",
            op, key, other
        ))),
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    fn bucket_name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self, data), fields(bucket = %self.name, key = %key, size = data.len()))]
    async fn put_object(&self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        let response = self.bucket.put_object(key, data).await.map_err(|e| {
            error!(error = %e, key = %key, "Failed to store object");
            StorageError::ObjectStore(format!("Failed to put object '{}': {}", key, e))
        })?;
        check_status(response.status_code(), key, "put")?;
        debug!(key = %key, "Object stored");
        Ok(())
    }

    #[instrument(skip(self), fields(bucket = %self.name, key = %key))]
    async fn get_object(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let response = self.bucket.get_object(key).await.map_err(|e| {
            error!(error = %e, key = %key, "Failed to retrieve object");
            StorageError::ObjectStore(format!("Failed to get object '{}': {}", key, e))
        })?;
        check_status(response.status_code(), key, "get")?;
        let data = response.bytes().to_vec();
        debug!(key = %key, size = data.len(), "Object retrieved");
        Ok(data)
    }

    /// Streams the file as a multipart upload; tarballs can exceed memory
    /// and the single PUT limit
    #[instrument(skip(self), fields(bucket = %self.name, key = %key, path = %path.display()))]
    async fn upload_file(&self, path: &Path, key: &str) -> Result<(), StorageError> {
        let mut file = tokio::fs::File::open(path).await?;
        let status = self
            .bucket
            .put_object_stream(&mut file, key)
            .await
            .map_err(|e| {
                error!(error = %e, key = %key, "Failed to upload file");
                StorageError::ObjectStore(format!("Failed to upload '{}': {}", key, e))
            })?;
        check_status(status.status_code(), key, "upload")?;
        info!(key = %key, "File uploaded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store(endpoint: &str) -> S3ObjectStore {
        let region = Region::Custom {
            region: "us-east-1".to_string(),
            endpoint: endpoint.to_string(),
        };
        S3ObjectStore::from_parts("proofs", region, Credentials::anonymous().unwrap(), true)
            .unwrap()
    }

    fn tarball(dir: &tempfile::TempDir) -> std::path::PathBuf {
        let file = dir.path().join("src.tar.gz");
        std::fs::write(&file, b"tarball bytes").unwrap();
        file
    }

    #[tokio::test]
    async fn test_upload_file_streams_from_disk() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/proofs/tar/src.tar.gz"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        store(&server.uri())
            .upload_file(&tarball(&dir), "tar/src.tar.gz")
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests[0].body, b"tarball bytes");
    }

    #[tokio::test]
    async fn test_upload_file_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let err = store(&server.uri())
            .upload_file(&tarball(&dir), "tar/src.tar.gz")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::ObjectStore(_)));
    }

    #[tokio::test]
    async fn test_upload_missing_file() {
        let store = store("http://127.0.0.1:9");
        let err = store
            .upload_file(Path::new("/nonexistent/src.tar.gz"), "k")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::FileSystemError(_)));
    }

    #[test]
    fn test_check_status() {
        assert!(check_status(200, "k", "get").is_ok());
        assert!(check_status(204, "k", "put").is_ok());
        assert!(matches!(
            check_status(404, "job/sha.txt", "get"),
            Err(StorageError::NotFound(ref key)) if key == "job/sha.txt"
        ));
        assert!(matches!(
            check_status(403, "k", "get"),
            Err(StorageError::ObjectStore(_))
        ));
    }
}
