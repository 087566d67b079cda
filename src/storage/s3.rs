//! S3 backend.

use object_store::aws::AmazonS3Builder;
use object_store::path::Path;
use object_store::{ObjectStore, RetryConfig};
use snafu::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{S3ConfigSnafu, StorageError};

use super::{BackendConfig, StorageProvider, key_from};

/// S3 storage configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Config {
    pub endpoint: Option<String>,
    pub region: Option<String>,
    pub bucket: String,
    pub key: Option<Path>,
}

impl S3Config {
    pub(super) fn from_captures(caps: &regex::Captures<'_>) -> Self {
        let bucket = caps
            .name("bucket")
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();

        let region = std::env::var("AWS_DEFAULT_REGION")
            .ok()
            .or_else(|| caps.name("region").map(|m| m.as_str().to_string()));

        let endpoint = std::env::var("AWS_ENDPOINT").ok().or_else(|| {
            caps.name("endpoint").map(|host| {
                let protocol = caps.name("protocol").map_or("https", |p| p.as_str());
                let port = caps
                    .name("port")
                    .and_then(|p| p.as_str().parse::<u16>().ok())
                    .unwrap_or(443);
                format!("{protocol}://{}:{port}", host.as_str())
            })
        });

        Self {
            endpoint,
            region,
            bucket,
            key: key_from(caps),
        }
    }

    fn canonical_url(&self) -> String {
        let base = match (&self.region, &self.endpoint) {
            (_, Some(endpoint)) => format!("s3::{endpoint}/{}", self.bucket),
            (Some(region), _) => format!("https://s3.{region}.amazonaws.com/{}", self.bucket),
            _ => format!("https://s3.amazonaws.com/{}", self.bucket),
        };
        match &self.key {
            Some(key) => format!("{base}/{key}"),
            None => base,
        }
    }
}

impl StorageProvider {
    pub(super) async fn construct_s3(
        config: S3Config,
        options: HashMap<String, String>,
    ) -> Result<Self, StorageError> {
        let mut builder = AmazonS3Builder::from_env()
            .with_bucket_name(&config.bucket)
            .with_retry(RetryConfig::default());

        for (key, value) in &options {
            builder = builder.with_config(key.parse().context(S3ConfigSnafu)?, value.clone());
        }

        if let Some(region) = &config.region {
            builder = builder.with_region(region);
        }

        if let Some(endpoint) = &config.endpoint {
            builder = builder
                .with_endpoint(endpoint)
                .with_virtual_hosted_style_request(false)
                .with_allow_http(true);
        }

        let canonical_url = config.canonical_url();
        let object_store: Arc<dyn ObjectStore> =
            Arc::new(builder.build().context(S3ConfigSnafu)?);

        Ok(Self {
            config: BackendConfig::S3(config),
            object_store,
            canonical_url,
        })
    }
}
