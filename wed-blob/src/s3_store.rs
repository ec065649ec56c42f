use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::{primitives::ByteStream as AwsByteStream, Client};
use bytes::Bytes;

use crate::store::key_from_public_url;
use crate::{BlobError, BlobResult, BlobStore, ObjectHead, PutResult};

/// Connection settings for an S3 (or S3-compatible) bucket
#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    /// S3-compatible endpoint; switches to path-style addressing
    pub endpoint_url: Option<String>,
}

impl S3Config {
    pub fn validate(&self) -> BlobResult<()> {
        for (name, value) in [
            ("AWS_S3_BUCKET_NAME", &self.bucket),
            ("AWS_S3_REGION", &self.region),
            ("AWS_ACCESS_KEY_ID", &self.access_key_id),
            ("AWS_SECRET_ACCESS_KEY", &self.secret_access_key),
        ] {
            if value.trim().is_empty() {
                return Err(BlobError::invalid(format!("{name} is required for S3 storage")));
            }
        }
        Ok(())
    }
}

/// Photo storage backed by the AWS SDK
#[derive(Clone)]
pub struct S3Store {
    client: Client,
    bucket: String,
    region: String,
    endpoint_url: Option<String>,
}

impl S3Store {
    pub async fn connect(config: S3Config) -> BlobResult<Self> {
        config.validate()?;

        let credentials = Credentials::new(
            config.access_key_id.clone(),
            config.secret_access_key.clone(),
            None,
            None,
            "wedshare",
        );

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials);
        if let Some(endpoint) = &config.endpoint_url {
            loader = loader.endpoint_url(endpoint.clone());
        }
        let aws_config = loader.load().await;

        let client = Client::from_conf(
            aws_sdk_s3::config::Builder::from(&aws_config)
                .force_path_style(config.endpoint_url.is_some())
                .build(),
        );

        tracing::info!(bucket = %config.bucket, region = %config.region, "S3 store ready");

        Ok(Self {
            client,
            bucket: config.bucket,
            region: config.region,
            endpoint_url: config.endpoint_url.map(|e| e.trim_end_matches('/').to_string()),
        })
    }

    fn map_sdk_error<E>(err: SdkError<E, HttpResponse>) -> BlobError
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        let transient = match &err {
            SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => true,
            SdkError::ServiceError(ctx) => {
                let status = ctx.raw().status().as_u16();
                status >= 500 || status == 429
            }
            _ => false,
        };
        if transient {
            BlobError::transient(err)
        } else {
            BlobError::backend(err)
        }
    }
}

#[async_trait]
impl BlobStore for S3Store {
    async fn put(&self, key: &str, content_type: &str, bytes: Bytes) -> BlobResult<PutResult> {
        let size_bytes = bytes.len() as u64;
        let out = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(AwsByteStream::from(bytes))
            .send()
            .await
            .map_err(Self::map_sdk_error)?;

        Ok(PutResult {
            key: key.to_string(),
            url: self.public_url(key),
            etag: out.e_tag().map(str::to_string),
            size_bytes,
        })
    }

    async fn head(&self, key: &str) -> BlobResult<ObjectHead> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(out) => Ok(ObjectHead {
                size_bytes: out.content_length().unwrap_or_default().max(0) as u64,
                content_type: out.content_type().map(str::to_string),
                etag: out.e_tag().map(str::to_string),
            }),
            Err(err) => {
                if err.as_service_error().map(|e| e.is_not_found()).unwrap_or(false) {
                    Err(BlobError::not_found(key))
                } else {
                    Err(Self::map_sdk_error(err))
                }
            }
        }
    }

    async fn delete(&self, key: &str) -> BlobResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(Self::map_sdk_error)?;
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        match &self.endpoint_url {
            Some(endpoint) => format!("{}/{}/{}", endpoint, self.bucket, key),
            None => format!("https://{}.s3.{}.amazonaws.com/{}", self.bucket, self.region, key),
        }
    }

    fn key_from_url(&self, url: &str) -> Option<String> {
        let path = key_from_public_url(url)?;
        match &self.endpoint_url {
            Some(_) => path
                .strip_prefix(&format!("{}/", self.bucket))
                .map(str::to_string),
            None => Some(path),
        }
    }
}
