use async_trait::async_trait;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use aws_sdk_s3::Client;
use secrecy::ExposeSecret;
use tracing::{debug, info, instrument};

use crate::config::ObjectStoreConfig;
use crate::error::StorageError;
use crate::sanitize::redact_endpoint;
use crate::storage::{validate_key, ObjectKey, StorageBackend};

const DEFAULT_REGION: &str = "us-east-1";

/// S3-compatible object storage (AWS S3, MinIO).
#[derive(Clone)]
pub struct ObjectStorage {
    client: Client,
    bucket: String,
    prefix: Option<String>,
    region: String,
}

impl ObjectStorage {
    pub fn from_config(config: &ObjectStoreConfig) -> Result<Self, StorageError> {
        let access_key = config
            .access_key_source()
            .resolve()
            .map_err(|e| StorageError::Configuration(format!("access key: {}", e)))?;
        let secret_key = config
            .secret_key_source()
            .resolve()
            .map_err(|e| StorageError::Configuration(format!("secret key: {}", e)))?;

        let credentials = Credentials::new(
            access_key.expose_secret(),
            secret_key.expose_secret(),
            None,
            None,
            "shelf-config",
        );

        let mut builder = aws_sdk_s3::Config::builder()
            .credentials_provider(credentials)
            .region(Region::new(config.region.clone()))
            .force_path_style(config.path_style);

        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(builder.build());

        info!(
            bucket = %config.bucket,
            endpoint = %config.endpoint.as_deref().map(redact_endpoint).unwrap_or_else(|| "aws".to_string()),
            "object storage client initialized"
        );

        Ok(Self {
            client,
            bucket: config.bucket.clone(),
            prefix: config
                .prefix
                .as_deref()
                .map(|p| p.trim_matches('/').to_string())
                .filter(|p| !p.is_empty()),
            region: config.region.clone(),
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Object name for a key hint: the configured prefix joined with the hint.
    pub fn object_name(&self, key_hint: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}/{}", prefix, key_hint),
            None => key_hint.to_string(),
        }
    }

    /// Creates the bucket if it does not exist yet.
    #[instrument(skip(self), fields(bucket = %self.bucket))]
    pub async fn ensure_bucket(&self) -> Result<(), StorageError> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => return Ok(()),
            Err(e) => {
                let missing = e
                    .as_service_error()
                    .map(|se| se.is_not_found())
                    .unwrap_or(false);
                if !missing {
                    return Err(classify("head_bucket", e));
                }
            }
        }

        let mut request = self.client.create_bucket().bucket(&self.bucket);
        if self.region != DEFAULT_REGION {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }
        request
            .send()
            .await
            .map_err(|e| classify("create_bucket", e))?;

        info!("created missing bucket");
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for ObjectStorage {
    #[instrument(skip(self, data), fields(bytes = data.len()))]
    async fn put(&self, key_hint: &str, data: &[u8]) -> Result<ObjectKey, StorageError> {
        validate_key(key_hint)?;
        let name = self.object_name(key_hint);
        let content_type = mime_guess::from_path(key_hint).first_or_octet_stream();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&name)
            .content_type(content_type.essence_str())
            .body(ByteStream::from(data.to_vec()))
            .send()
            .await
            .map_err(|e| classify("put_object", e))?;

        debug!(key = %name, "stored object");
        Ok(ObjectKey::new(name))
    }

    #[instrument(skip(self))]
    async fn get(&self, key: &ObjectKey) -> Result<Vec<u8>, StorageError> {
        let response = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key.as_str())
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                let missing = e
                    .as_service_error()
                    .map(|se| se.is_no_such_key())
                    .unwrap_or(false);
                if missing {
                    return Err(StorageError::NotFound(key.to_string()));
                }
                return Err(classify("get_object", e));
            }
        };

        let body = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Transient {
                operation: "get_object",
                reason: format!("failed to read response body: {}", e),
            })?;

        Ok(body.into_bytes().to_vec())
    }

    #[instrument(skip(self))]
    async fn delete(&self, key: &ObjectKey) -> Result<(), StorageError> {
        // S3 reports success for keys that do not exist.
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key.as_str())
            .send()
            .await
            .map_err(|e| classify("delete_object", e))?;
        Ok(())
    }
}

/// Timeouts, dispatch failures, unparseable responses, throttling and 5xx are transient.
fn classify<E>(operation: &'static str, err: SdkError<E, HttpResponse>) -> StorageError
where
    E: std::error::Error + 'static,
{
    let transient = match &err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            true
        }
        SdkError::ServiceError(ctx) => {
            let status = ctx.raw().status().as_u16();
            status >= 500 || status == 429 || status == 408
        }
        _ => false,
    };

    let reason = DisplayErrorContext(&err).to_string();
    if transient {
        StorageError::Transient { operation, reason }
    } else {
        StorageError::Backend { operation, reason }
    }
}
