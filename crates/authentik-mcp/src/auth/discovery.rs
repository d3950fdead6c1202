//! Discovery resolver for the provider's OpenID configuration.
//!
//! The document is fetched lazily and cached for the lifetime of the resolver.
//! Each resolver owns its own slot, so several providers can coexist in one
//! process.

use std::sync::Arc;

use tokio::sync::RwLock;

use super::types::DiscoveryDocument;
use crate::client::HttpClient;
use crate::error::{AuthError, AuthResult};

/// Fetches and memoizes the OpenID configuration document.
pub struct DiscoveryResolver {
    http: Arc<dyn HttpClient>,
    url: String,
    cached: RwLock<Option<Arc<DiscoveryDocument>>>,
}

impl DiscoveryResolver {
    #[must_use]
    pub fn new(http: Arc<dyn HttpClient>, url: impl Into<String>) -> Self {
        Self { http, url: url.into(), cached: RwLock::new(None) }
    }

    /// URL the document is fetched from.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Return the cached document, fetching it on first use.
    ///
    /// The cache is only populated on success. Failures are not retried.
    pub async fn resolve(&self) -> AuthResult<Arc<DiscoveryDocument>> {
        if let Some(doc) = self.cached.read().await.as_ref() {
            return Ok(Arc::clone(doc));
        }

        let mut slot = self.cached.write().await;
        // Another caller may have filled the slot while we waited.
        if let Some(doc) = slot.as_ref() {
            return Ok(Arc::clone(doc));
        }

        let doc = Arc::new(self.fetch().await?);
        *slot = Some(Arc::clone(&doc));
        tracing::debug!(url = %self.url, "Cached OpenID configuration");

        Ok(doc)
    }

    /// Drop the cached document so the next call refetches it.
    pub async fn invalidate(&self) {
        self.cached.write().await.take();
    }

    /// Whether a document is currently cached.
    pub async fn is_cached(&self) -> bool {
        self.cached.read().await.is_some()
    }

    async fn fetch(&self) -> AuthResult<DiscoveryDocument> {
        let response = self.http.get(&self.url, &[]).await.map_err(|e| {
            tracing::error!(url = %self.url, error = %e, "Failed to fetch Authentik discovery document");
            AuthError::discovery(e.to_string())
        })?;

        if !response.is_success() {
            tracing::error!(
                url = %self.url,
                status = response.status,
                "Authentik discovery document request rejected"
            );
            return Err(AuthError::discovery(format!("unexpected status {}", response.status)));
        }

        serde_json::from_value(response.body).map_err(|e| {
            tracing::error!(url = %self.url, error = %e, "Malformed Authentik discovery document");
            AuthError::discovery(format!("malformed document: {e}"))
        })
    }
}

impl std::fmt::Debug for DiscoveryResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryResolver").field("url", &self.url).finish()
    }
}
