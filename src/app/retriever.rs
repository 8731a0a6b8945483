//! Retriever contract and the HTTP reference implementation
//!
//! A retriever knows how to open the source stream for a product. The
//! download orchestrator is deliberately ignorant of the mechanism: it asks
//! once per attempt and treats every failure as a setup error (first
//! attempt) or a failed attempt (retries). Re-invoking `retrieve()` must
//! yield a fresh stream positioned at byte zero; the orchestrator skips
//! forward itself when resuming.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::Client;
use tokio_util::io::StreamReader;
use url::Url;

use crate::app::transfer::ProductSource;
use crate::constants::http;
use crate::errors::{RetrieveError, RetrieveResult};

/// A freshly opened source stream plus whatever the mechanism knows about it
pub struct RetrievedProduct {
    /// Readable source stream positioned at byte zero
    pub source: ProductSource,
    /// Transport-level properties (content length, content type, ...)
    pub properties: HashMap<String, String>,
}

impl std::fmt::Debug for RetrievedProduct {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievedProduct")
            .field("properties", &self.properties)
            .finish_non_exhaustive()
    }
}

impl RetrievedProduct {
    /// Content length reported by the source, if it announced one
    pub fn content_length(&self) -> Option<u64> {
        self.properties
            .get(http::PROP_CONTENT_LENGTH)
            .and_then(|v| v.parse().ok())
    }
}

/// Mechanism for opening the source stream of a product
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Open a fresh source stream for the product.
    ///
    /// # Errors
    ///
    /// Returns `RetrieveError::NotFound` when the product does not exist,
    /// `NotSupported` when the location cannot be served by this retriever,
    /// and transport variants for everything else.
    async fn retrieve(&self) -> RetrieveResult<RetrievedProduct>;
}

/// Retriever for `http://` and `https://` product locations
#[derive(Debug, Clone)]
pub struct HttpRetriever {
    client: Client,
    url: Url,
}

impl HttpRetriever {
    /// Create a retriever for the given URL.
    ///
    /// # Errors
    ///
    /// Returns `RetrieveError::InvalidUrl` for unparseable locations and
    /// `NotSupported` for non-HTTP schemes.
    pub fn new(url: &str) -> RetrieveResult<Self> {
        let url = Url::parse(url).map_err(|e| RetrieveError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(RetrieveError::NotSupported {
                resource: url.to_string(),
            });
        }

        let client = Client::builder()
            .user_agent(http::USER_AGENT)
            .connect_timeout(http::CONNECT_TIMEOUT)
            .pool_idle_timeout(http::POOL_IDLE_TIMEOUT)
            .redirect(reqwest::redirect::Policy::limited(http::MAX_REDIRECTS))
            .build()?;

        Ok(Self { client, url })
    }

    /// Create a retriever reusing an existing HTTP client
    pub fn with_client(client: Client, url: Url) -> Self {
        Self { client, url }
    }

    /// The product location this retriever serves
    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl Retriever for HttpRetriever {
    async fn retrieve(&self) -> RetrieveResult<RetrievedProduct> {
        let response = self.client.get(self.url.clone()).send().await?;

        let status = response.status();
        if !status.is_success() {
            if status == reqwest::StatusCode::NOT_FOUND {
                return Err(RetrieveError::NotFound {
                    resource: self.url.to_string(),
                });
            }
            return Err(RetrieveError::Upstream {
                status: status.as_u16(),
            });
        }

        let mut properties = HashMap::new();
        if let Some(len) = response.content_length() {
            properties.insert(http::PROP_CONTENT_LENGTH.to_string(), len.to_string());
        }
        if let Some(ct) = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
        {
            properties.insert(http::PROP_CONTENT_TYPE.to_string(), ct.to_string());
        }

        let stream = response
            .bytes_stream()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));
        let source: ProductSource = Box::new(StreamReader::new(Box::pin(stream)));

        Ok(RetrievedProduct { source, properties })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test URL validation at construction time
    #[test]
    fn test_rejects_invalid_and_unsupported_urls() {
        assert!(matches!(
            HttpRetriever::new("not a url"),
            Err(RetrieveError::InvalidUrl { .. })
        ));
        assert!(matches!(
            HttpRetriever::new("ftp://example.com/data.bin"),
            Err(RetrieveError::NotSupported { .. })
        ));
        assert!(HttpRetriever::new("https://example.com/data.bin").is_ok());
    }

    /// Test content length extraction from properties
    #[test]
    fn test_content_length_property() {
        let mut properties = HashMap::new();
        properties.insert(http::PROP_CONTENT_LENGTH.to_string(), "2048".to_string());

        let product = RetrievedProduct {
            source: Box::new(std::io::Cursor::new(Vec::new())),
            properties,
        };
        assert_eq!(product.content_length(), Some(2048));

        let product = RetrievedProduct {
            source: Box::new(std::io::Cursor::new(Vec::new())),
            properties: HashMap::new(),
        };
        assert_eq!(product.content_length(), None);
    }
}
