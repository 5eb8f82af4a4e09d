use std::fmt;

use percent_encoding::percent_decode_str;
use url::Url;

/// The host label that marks a path-style storage URL.
pub const SERVICE_NAME: &str = "s3";

/// The native locator scheme, `s3://bucket/key`.
pub const NATIVE_SCHEME: &str = "s3";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("malformed storage url: {0}")]
    Malformed(String),

    #[error("unsupported storage url scheme {0:?}, expected s3 or https")]
    UnsupportedScheme(String),

    #[error("storage url does not name a bucket")]
    MissingContainer,

    #[error("storage url does not name an object key")]
    MissingKey,
}

/// A canonical (bucket, key) pair naming a single object.
///
/// The key never starts with a `/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageLocator {
    container: String,
    key: String,
}

impl StorageLocator {
    pub fn new(container: impl Into<String>, key: impl Into<String>) -> Result<Self, ResolveError> {
        let container = container.into();
        if container.is_empty() {
            return Err(ResolveError::MissingContainer);
        }

        let key: String = key.into();
        let key = key.trim_start_matches('/');
        if key.is_empty() {
            return Err(ResolveError::MissingKey);
        }

        Ok(Self { container, key: key.to_string() })
    }

    #[inline]
    pub fn container(&self) -> &str {
        &self.container
    }

    #[inline]
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for StorageLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}/{}", NATIVE_SCHEME, self.container, self.key)
    }
}

/// Resolves one of the accepted storage url shapes into a locator.
///
/// ```text
/// s3://bucket/key
/// https://s3.<region>.amazonaws.com/bucket/key
/// https://bucket.s3.<region>.amazonaws.com/key
/// ```
pub fn resolve(raw: &str) -> Result<StorageLocator, ResolveError> {
    let url = Url::parse(raw.trim()).map_err(|e| ResolveError::Malformed(e.to_string()))?;
    let host = url.host_str().unwrap_or_default();
    let path = decode_path(url.path())?;

    match url.scheme() {
        NATIVE_SCHEME => StorageLocator::new(host, path),
        "https" => {
            let first_label = host.split('.').next().unwrap_or_default();

            if first_label == SERVICE_NAME {
                // Path style, the bucket is the first path segment.
                let mut segments = path.strip_prefix('/').unwrap_or(&path).splitn(2, '/');
                let container = segments.next().unwrap_or_default();
                let key = segments.next().ok_or(ResolveError::MissingKey)?;
                StorageLocator::new(container, key)
            } else {
                StorageLocator::new(first_label, path)
            }
        },
        other => Err(ResolveError::UnsupportedScheme(other.to_string())),
    }
}

fn decode_path(path: &str) -> Result<String, ResolveError> {
    percent_decode_str(path)
        .decode_utf8()
        .map(|v| v.into_owned())
        .map_err(|e| ResolveError::Malformed(e.to_string()))
}
