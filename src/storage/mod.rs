//! Storage abstraction over `object_store`.
//!
//! One [`StorageProvider`] serves each configured location: the source
//! export, the table snapshot and the dead-letter directory. Supported URLs:
//!
//! - local paths and `file://` URLs
//! - `s3://bucket/prefix` (plus path-style, virtual-hosted and `s3::` endpoint forms)
//! - `memory://`, a fresh in-process store

mod local;
mod memory;
mod s3;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};
use regex::Regex;
use snafu::prelude::*;
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use std::time::Instant;

use crate::emit;
use crate::error::{InvalidUrlSnafu, ObjectStoreSnafu, StorageError};
use crate::metrics::events::{RequestStatus, StorageOperation, StorageRequest};

pub use local::LocalConfig;
pub use s3::S3Config;

/// A reference-counted storage provider.
pub type StorageProviderRef = Arc<StorageProvider>;

/// A storage location backed by an `object_store` implementation.
#[derive(Clone)]
pub struct StorageProvider {
    config: BackendConfig,
    object_store: Arc<dyn ObjectStore>,
    canonical_url: String,
}

impl std::fmt::Debug for StorageProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StorageProvider<{}>", self.canonical_url)
    }
}

const S3_PATH: &str =
    r"^https://s3\.(?P<region>[\w\-]+)\.amazonaws\.com/(?P<bucket>[a-z0-9\-\.]+)(/(?P<key>.+))?$";
const S3_VIRTUAL: &str =
    r"^https://(?P<bucket>[a-z0-9\-\.]+)\.s3\.(?P<region>[\w\-]+)\.amazonaws\.com(/(?P<key>.+))?$";
const S3_ENDPOINT_URL: &str = r"^[sS]3[aA]?::(?P<protocol>https?)://(?P<endpoint>[^:/]+):(?P<port>\d+)/(?P<bucket>[a-z0-9\-\.]+)(/(?P<key>.+))?$";
const S3_URL: &str = r"^[sS]3[aA]?://(?P<bucket>[a-z0-9\-\.]+)(/(?P<key>.+))?$";

const MEMORY_URL: &str = r"^memory://(?P<key>.*)$";

const FILE_URI: &str = r"^file://(?P<path>.*)$";
const FILE_PATH: &str = r"^(?P<path>/.*)$";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backend {
    S3,
    Memory,
    Local,
}

/// URL matchers, tried in order.
static MATCHERS: LazyLock<Vec<(Backend, Regex)>> = LazyLock::new(|| {
    [
        (Backend::S3, S3_PATH),
        (Backend::S3, S3_VIRTUAL),
        (Backend::S3, S3_ENDPOINT_URL),
        (Backend::S3, S3_URL),
        (Backend::Memory, MEMORY_URL),
        (Backend::Local, FILE_URI),
        (Backend::Local, FILE_PATH),
    ]
    .into_iter()
    .map(|(backend, pattern)| (backend, Regex::new(pattern).expect("Invalid storage URL pattern")))
    .collect()
});

/// Backend configuration parsed from a storage URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    S3(S3Config),
    Memory { key: Option<Path> },
    Local(LocalConfig),
}

fn key_from(caps: &regex::Captures<'_>) -> Option<Path> {
    caps.name("key")
        .map(|m| m.as_str().trim_matches('/'))
        .filter(|k| !k.is_empty())
        .map(Path::from)
}

impl BackendConfig {
    /// Parse a storage URL.
    pub fn parse_url(url: &str) -> Result<Self, StorageError> {
        let Some((backend, caps)) = MATCHERS
            .iter()
            .find_map(|(backend, re)| re.captures(url).map(|caps| (*backend, caps)))
        else {
            return InvalidUrlSnafu { url }.fail();
        };

        Ok(match backend {
            Backend::S3 => BackendConfig::S3(S3Config::from_captures(&caps)),
            Backend::Memory => BackendConfig::Memory {
                key: key_from(&caps),
            },
            Backend::Local => BackendConfig::Local(LocalConfig {
                path: caps
                    .name("path")
                    .map_or("/", |m| m.as_str())
                    .trim_end_matches('/')
                    .to_string(),
            }),
        })
    }

    fn key(&self) -> Option<&Path> {
        match self {
            BackendConfig::S3(s3) => s3.key.as_ref(),
            BackendConfig::Memory { key } => key.as_ref(),
            BackendConfig::Local(_) => None,
        }
    }
}

/// An object found by [`StorageProvider::list_dir`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEntry {
    /// Path relative to the provider's location.
    pub path: Path,
    pub last_modified: DateTime<Utc>,
    pub size: u64,
}

/// One level of a directory listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirListing {
    /// Child "directories", relative to the provider's location.
    pub prefixes: Vec<Path>,
    /// Objects directly under the listed directory.
    pub objects: Vec<ObjectEntry>,
}

fn status_of<T, E>(result: &Result<T, E>) -> RequestStatus {
    if result.is_ok() {
        RequestStatus::Success
    } else {
        RequestStatus::Error
    }
}

impl StorageProvider {
    /// Create a storage provider for the given URL with storage options.
    pub async fn for_url_with_options(
        url: &str,
        options: HashMap<String, String>,
    ) -> Result<Self, StorageError> {
        match BackendConfig::parse_url(url)? {
            BackendConfig::S3(config) => Self::construct_s3(config, options).await,
            BackendConfig::Memory { key } => Ok(Self::construct_memory(key)),
            BackendConfig::Local(config) => Self::construct_local(config).await,
        }
    }

    /// Canonical URL of this location, for logging.
    pub fn canonical_url(&self) -> &str {
        &self.canonical_url
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// Qualify a path with the configured key prefix.
    pub fn qualify_path<'a>(&self, path: &'a Path) -> Cow<'a, Path> {
        match self.config.key() {
            Some(prefix) => Cow::Owned(prefix.parts().chain(path.parts()).collect()),
            None => Cow::Borrowed(path),
        }
    }

    fn relative_path(&self, path: &Path) -> Path {
        let skip = self.config.key().map_or(0, |key| key.parts().count());
        path.parts().skip(skip).collect()
    }

    /// Get the contents of an object.
    pub async fn get(&self, path: &Path) -> Result<Bytes, StorageError> {
        let start = Instant::now();
        let result = match self.object_store.get(&self.qualify_path(path)).await {
            Ok(get) => get.bytes().await,
            Err(e) => Err(e),
        };

        emit!(StorageRequest {
            operation: StorageOperation::Get,
            status: status_of(&result),
            duration: start.elapsed(),
        });

        result.context(ObjectStoreSnafu)
    }

    /// Write bytes to an object, replacing any previous content.
    pub async fn put(&self, path: &Path, bytes: impl Into<Bytes>) -> Result<(), StorageError> {
        self.put_payload(path, PutPayload::from(bytes.into())).await
    }

    /// Write a payload to an object.
    pub async fn put_payload(&self, path: &Path, payload: PutPayload) -> Result<(), StorageError> {
        let start = Instant::now();
        let result = self
            .object_store
            .put(&self.qualify_path(path), payload)
            .await;

        emit!(StorageRequest {
            operation: StorageOperation::Put,
            status: status_of(&result),
            duration: start.elapsed(),
        });

        result.context(ObjectStoreSnafu)?;
        Ok(())
    }

    /// List one level under `dir` (relative to this location).
    ///
    /// Prefixes and objects come back sorted by path. A missing directory
    /// lists as empty.
    pub async fn list_dir(&self, dir: Option<&Path>) -> Result<DirListing, StorageError> {
        let qualified = match dir {
            Some(dir) => Some(self.qualify_path(dir).into_owned()),
            None => self.config.key().cloned(),
        };

        let start = Instant::now();
        let result = self.object_store.list_with_delimiter(qualified.as_ref()).await;

        emit!(StorageRequest {
            operation: StorageOperation::List,
            status: status_of(&result),
            duration: start.elapsed(),
        });

        let listing = match result {
            Ok(listing) => listing,
            Err(object_store::Error::NotFound { .. }) => return Ok(DirListing::default()),
            Err(source) => return Err(StorageError::ObjectStore { source }),
        };

        let mut prefixes: Vec<Path> = listing
            .common_prefixes
            .iter()
            .map(|p| self.relative_path(p))
            .collect();
        prefixes.sort();

        let mut objects: Vec<ObjectEntry> = listing
            .objects
            .into_iter()
            .map(|meta| ObjectEntry {
                path: self.relative_path(&meta.location),
                last_modified: meta.last_modified,
                size: meta.size,
            })
            .collect();
        objects.sort_by(|a, b| a.path.cmp(&b.path));

        Ok(DirListing { prefixes, objects })
    }
}
