use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    config::{http::HttpResponse, Credentials, Region},
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    Client,
};
use tracing::{debug, info, instrument};

use super::config::StorageConfig;
use super::location::ObjectLocation;
use super::ObjectStore;
use crate::error::StorageError;

/// [`ObjectStore`] backed by the AWS S3 SDK
#[derive(Clone)]
pub struct S3Storage {
    client: Client,
}

impl S3Storage {
    pub async fn new(config: StorageConfig) -> Self {
        debug!("Initializing storage with config: {:?}", config);

        let builder = match (&config.access_key, &config.secret_key) {
            (Some(access_key), Some(secret_key)) => {
                let credentials =
                    Credentials::new(access_key, secret_key, None, None, "assetload-storage");
                aws_sdk_s3::Config::builder().credentials_provider(credentials)
            },
            _ => {
                let shared = aws_config::defaults(BehaviorVersion::latest()).load().await;
                aws_sdk_s3::config::Builder::from(&shared)
            },
        };

        let mut builder = builder
            .region(Region::new(config.region.clone()))
            .force_path_style(config.path_style);

        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        info!(
            endpoint = config.endpoint.as_deref().unwrap_or("default"),
            region = %config.region,
            "Storage client initialized"
        );

        Self {
            client: Client::from_conf(builder.build()),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Storage {
    #[instrument(skip(self), fields(location = %location))]
    async fn get(&self, location: &ObjectLocation) -> Result<Vec<u8>, StorageError> {
        debug!("Downloading {}", location);

        let response = self
            .client
            .get_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .send()
            .await
            .map_err(|e| classify(e, "get", location.to_string()))?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Request {
                operation: "get",
                uri: location.to_string(),
                message: format!("failed to read response body: {e}"),
            })?
            .into_bytes()
            .to_vec();

        debug!("Downloaded {} bytes from {}", data.len(), location);

        Ok(data)
    }

    #[instrument(skip(self), fields(source = %source, destination = %destination))]
    async fn copy(
        &self,
        source: &ObjectLocation,
        destination: &ObjectLocation,
    ) -> Result<(), StorageError> {
        debug!("Copying {} to {}", source, destination);

        self.client
            .copy_object()
            .copy_source(source.copy_source())
            .bucket(&destination.bucket)
            .key(&destination.key)
            .send()
            .await
            .map_err(|e| {
                let subject = copy_subject(e.code(), source, destination);
                classify(e, "copy", subject)
            })?;

        info!("Copied {} to {}", source, destination);

        Ok(())
    }

    #[instrument(skip(self), fields(location = %location))]
    async fn delete(&self, location: &ObjectLocation) -> Result<(), StorageError> {
        debug!("Deleting {}", location);

        self.client
            .delete_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .send()
            .await
            .map_err(|e| classify(e, "delete", location.to_string()))?;

        info!("Deleted {}", location);

        Ok(())
    }
}

/// Map an SDK failure onto [`StorageError`] using the HTTP status and the
/// service error code, whichever is available.
fn classify<E>(err: SdkError<E, HttpResponse>, operation: &'static str, uri: String) -> StorageError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let status = err.raw_response().map(|r| r.status().as_u16());
    let code = err.code().map(str::to_string);

    match (status, code.as_deref()) {
        (Some(404), _) | (_, Some("NoSuchKey" | "NotFound" | "NoSuchBucket")) => {
            StorageError::NotFound(uri)
        },
        (Some(403), _) | (_, Some("AccessDenied")) => StorageError::AccessDenied { operation, uri },
        _ => StorageError::Request {
            operation,
            uri,
            message: DisplayErrorContext(&err).to_string(),
        },
    }
}

/// What a failed copy is reported against. A missing key can only be the
/// source; bucket and permission errors may come from either side.
fn copy_subject(code: Option<&str>, source: &ObjectLocation, destination: &ObjectLocation) -> String {
    match code {
        Some("NoSuchKey") => source.to_string(),
        _ => format!("{source} -> {destination}"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_errors_name_the_destination() {
        let source = ObjectLocation::parse("gs://asset-bucket/input/asset.csv").unwrap();
        let destination = ObjectLocation::parse("gs://archive-bucket/processed/asset.csv").unwrap();

        assert_eq!(
            copy_subject(Some("NoSuchKey"), &source, &destination),
            "gs://asset-bucket/input/asset.csv"
        );
        for code in [Some("NoSuchBucket"), Some("AccessDenied"), None] {
            let subject = copy_subject(code, &source, &destination);
            assert!(subject.contains("gs://archive-bucket/processed/asset.csv"), "{code:?}");
            assert!(subject.contains("gs://asset-bucket/input/asset.csv"), "{code:?}");
        }
    }

    #[tokio::test]
    async fn test_client_from_static_credentials() {
        let storage = S3Storage::new(StorageConfig::for_minio("http://localhost:9000")).await;
        let config = storage.client.config();
        assert_eq!(config.region().map(|r| r.as_ref()), Some("us-east-1"));
    }
}
