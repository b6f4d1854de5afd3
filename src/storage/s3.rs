//! S3-compatible blob store using the AWS SDK.
//!
//! The SDK is async; every call is driven to completion on a private
//! current-thread runtime so the repository code stays synchronous.

use crate::config::Credentials;
use crate::storage::{BlobStore, Error, ObjectMeta, PutOptions, Result};
use aws_config::BehaviorVersion;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{ObjectCannedAcl, ServerSideEncryption};
use aws_sdk_s3::Client;
use tokio::runtime::Runtime;
use tracing::instrument;

pub struct S3Store {
    runtime: Runtime,
    client: Client,
    bucket: String,
}

impl std::fmt::Debug for S3Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Store")
            .field("bucket", &self.bucket)
            .finish_non_exhaustive()
    }
}

fn is_not_found<E>(err: &SdkError<E>) -> bool {
    matches!(err, SdkError::ServiceError(service_err) if service_err.raw().status().as_u16() == 404)
}

fn backend_error<E>(operation: &'static str, key: &str, err: SdkError<E>) -> Error
where
    E: std::error::Error + 'static,
{
    Error::Backend {
        operation,
        key: key.to_string(),
        message: DisplayErrorContext(&err).to_string(),
    }
}

/// Bare `host:port` endpoints are taken to be plain HTTP.
fn normalize_endpoint(endpoint: &str) -> String {
    let lower = endpoint.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!("http://{}", endpoint)
    }
}

impl S3Store {
    /// Build a client for `bucket`.
    ///
    /// Without explicit credentials the default AWS provider chain
    /// (environment, profile, instance metadata) is used.
    pub fn connect(
        bucket: &str,
        region: Option<&str>,
        endpoint: Option<&str>,
        credentials: Option<&Credentials>,
        force_path_style: bool,
    ) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(aws_config::Region::new(region.to_string()));
        }
        if let Some(credentials) = credentials {
            loader = loader.credentials_provider(aws_sdk_s3::config::Credentials::new(
                credentials.access_key_id.clone(),
                credentials.secret_access_key.clone(),
                None,
                None,
                "deb-s3-config",
            ));
        }
        if let Some(endpoint) = endpoint {
            loader = loader.endpoint_url(normalize_endpoint(endpoint));
        }
        let sdk_config = runtime.block_on(loader.load());

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(force_path_style)
            .build();

        Ok(Self {
            runtime,
            client: Client::from_conf(s3_config),
            bucket: bucket.to_string(),
        })
    }
}

impl BlobStore for S3Store {
    #[instrument(skip(self), fields(backend = "s3"))]
    fn head(&self, key: &str) -> Result<Option<ObjectMeta>> {
        let result = self.runtime.block_on(
            self.client
                .head_object()
                .bucket(&self.bucket)
                .key(key)
                .send(),
        );
        match result {
            Ok(output) => Ok(Some(ObjectMeta {
                etag: output.e_tag().map(str::to_string),
                metadata: output.metadata().cloned().unwrap_or_default(),
                content_type: output.content_type().map(str::to_string),
            })),
            Err(err) if is_not_found(&err) => Ok(None),
            Err(err) => Err(backend_error("HEAD", key, err)),
        }
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.runtime.block_on(async {
            let output = match self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(key)
                .send()
                .await
            {
                Ok(output) => output,
                Err(err) if is_not_found(&err) => return Ok(None),
                Err(err) => return Err(backend_error("GET", key, err)),
            };

            match output.body.collect().await {
                Ok(bytes) => Ok(Some(bytes.into_bytes().to_vec())),
                Err(e) => Err(Error::Backend {
                    operation: "GET",
                    key: key.to_string(),
                    message: e.to_string(),
                }),
            }
        })
    }

    #[instrument(skip(self, data, options), fields(backend = "s3", size = data.len()))]
    fn put(&self, key: &str, data: &[u8], options: &PutOptions) -> Result<()> {
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data.to_vec()))
            .content_type(&options.content_type)
            .acl(ObjectCannedAcl::from(options.acl.as_str()))
            .set_cache_control(options.cache_control.clone());
        for (name, value) in &options.metadata {
            request = request.metadata(name, value);
        }
        if options.server_side_encryption {
            request = request.server_side_encryption(ServerSideEncryption::Aes256);
        }

        self.runtime
            .block_on(request.send())
            .map_err(|e| backend_error("PUT", key, e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    fn delete(&self, key: &str) -> Result<()> {
        match self.runtime.block_on(
            self.client
                .delete_object()
                .bucket(&self.bucket)
                .key(key)
                .send(),
        ) {
            Ok(_) => Ok(()),
            Err(err) if is_not_found(&err) => Ok(()),
            Err(err) => Err(backend_error("DELETE", key, err)),
        }
    }
}
