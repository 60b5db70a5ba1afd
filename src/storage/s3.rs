use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use tracing::debug;

use super::{validate_key, ImageStore, StorageError, StoredObject};
use crate::config::S3Settings;

/// S3-compatible store (AWS, MinIO, R2).
pub struct S3ImageStore {
    client: S3Client,
    bucket: String,
    public_base_url: String,
}

impl S3ImageStore {
    pub async fn new(settings: &S3Settings) -> Result<Self, StorageError> {
        if settings.bucket.trim().is_empty() {
            return Err(StorageError::Config("storage.s3.bucket must be set".to_string()));
        }

        let mut builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()))
            .force_path_style(settings.use_path_style);

        if let Some(endpoint) = settings.endpoint.as_deref() {
            builder = builder.endpoint_url(endpoint);
        }

        if let (Some(access_key), Some(secret_key)) = (&settings.access_key_id, &settings.secret_access_key) {
            let credentials = Credentials::new(access_key, secret_key, None, None, "cropdoc-static");
            builder = builder.credentials_provider(credentials);
        } else {
            // Default chain: env vars, profile, instance role
            let sdk_config = aws_config::defaults(BehaviorVersion::latest())
                .region(Region::new(settings.region.clone()))
                .load()
                .await;
            if let Some(provider) = sdk_config.credentials_provider() {
                builder = builder.credentials_provider(provider.clone());
            }
        }

        let client = S3Client::from_conf(builder.build());
        Ok(Self {
            client,
            bucket: settings.bucket.clone(),
            public_base_url: public_base_url(settings),
        })
    }
}

fn public_base_url(settings: &S3Settings) -> String {
    if let Some(base) = settings.public_base_url.as_deref() {
        return base.trim_end_matches('/').to_string();
    }
    match settings.endpoint.as_deref() {
        Some(endpoint) if settings.use_path_style => {
            format!("{}/{}", endpoint.trim_end_matches('/'), settings.bucket)
        }
        Some(endpoint) => {
            let endpoint = endpoint.trim_end_matches('/');
            match endpoint.split_once("://") {
                Some((scheme, host)) => format!("{}://{}.{}", scheme, settings.bucket, host),
                None => format!("https://{}.{}", settings.bucket, endpoint),
            }
        }
        None => format!("https://{}.s3.{}.amazonaws.com", settings.bucket, settings.region),
    }
}

#[async_trait]
impl ImageStore for S3ImageStore {
    fn name(&self) -> &'static str {
        "s3"
    }

    fn url_for(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, key)
    }

    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<StoredObject, StorageError> {
        validate_key(key)?;
        let size = bytes.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::UploadFailed(format!("{}: {}", key, e.into_service_error())))?;
        debug!(key = %key, size, bucket = %self.bucket, "Stored object in S3");
        Ok(StoredObject { key: key.to_string(), url: self.url_for(key) })
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        validate_key(key)?;
        let output = match self.client.get_object().bucket(&self.bucket).key(key).send().await {
            Ok(out) => out,
            Err(e) => {
                let err = e.into_service_error();
                if err.is_no_such_key() {
                    return Err(StorageError::NotFound(key.to_string()));
                }
                return Err(StorageError::DownloadFailed(format!("{}: {}", key, err)));
            }
        };
        let data = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::DownloadFailed(format!("{}: {}", key, e)))?
            .into_bytes()
            .to_vec();
        Ok(data)
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        validate_key(key)?;
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::DeleteFailed(format!("{}: {}", key, e.into_service_error())))?;
        Ok(())
    }
}
