//! Metadata fetch.
//!
//! A [`MetadataSource`] produces the raw metadata document for a session.
//! The default source issues one HTTP GET; there is no retry.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::error::{BufferError, Result};

/// Boxed future returned by [`MetadataSource::fetch`].
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Default timeout for the metadata request.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Supplier of the raw metadata document.
pub trait MetadataSource: Send + Sync + 'static {
    /// Fetch the document for `endpoint`.
    fn fetch<'a>(&'a self, endpoint: &'a str) -> BoxFuture<'a, Result<String>>;
}

/// Fetches the document with an HTTP GET on the endpoint.
#[derive(Debug, Clone)]
pub struct HttpMetadataSource {
    client: reqwest::Client,
}

impl HttpMetadataSource {
    /// Create a source with [`DEFAULT_FETCH_TIMEOUT`].
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_FETCH_TIMEOUT)
    }

    /// Create a source with a custom request timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// Use an existing client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl MetadataSource for HttpMetadataSource {
    fn fetch<'a>(&'a self, endpoint: &'a str) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            tracing::debug!("Fetching session metadata from {}", endpoint);
            let response = self.client.get(endpoint).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(BufferError::Metadata(format!(
                    "metadata request to {endpoint} failed with status {status}"
                )));
            }
            Ok(response.text().await?)
        })
    }
}

/// Serves a fixed document, ignoring the endpoint.
#[derive(Debug, Clone)]
pub struct StaticMetadata {
    document: String,
}

impl StaticMetadata {
    /// Wrap a document.
    pub fn new(document: impl Into<String>) -> Self {
        Self {
            document: document.into(),
        }
    }
}

impl MetadataSource for StaticMetadata {
    fn fetch<'a>(&'a self, _endpoint: &'a str) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move { Ok(self.document.clone()) })
    }
}
