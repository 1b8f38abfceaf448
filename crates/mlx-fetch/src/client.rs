// SPDX-License-Identifier: MIT OR Apache-2.0
//! The injected HTTP client abstraction.
//!
//! A trait rather than a hard dependency on one HTTP stack, so the
//! fetch pipeline's core logic (retries across the fetcher chain,
//! concurrency limiting) never has to know which client is behind it.
//! [`ReqwestHttpClient`] is the default production implementation.

use async_trait::async_trait;
use mlx_core::LoaderError;

/// Fetches raw bytes from a URL over the network.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Fetch the bytes at `url`.
    ///
    /// # Errors
    ///
    /// Returns [`LoaderError::FetchFailed`] on any transport error or a
    /// response status of 400 or higher.
    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, LoaderError>;

    /// Resolve `relative_url` (a module's `url` field, which may be
    /// relative) against `base_url` (the manifest's own URL), producing
    /// an absolute URL a module can actually be fetched from.
    ///
    /// The default implementation delegates to [`resolve_against_base`];
    /// implementations with their own URL-joining rules may override it.
    ///
    /// # Errors
    ///
    /// Returns [`LoaderError::FetchFailed`] if `base_url` is not itself a
    /// valid absolute URL.
    fn resolve(&self, base_url: &str, relative_url: &str) -> Result<String, LoaderError> {
        resolve_against_base(base_url, relative_url)
    }
}

/// Join `relative_url` onto `base_url`, the way a browser resolves a
/// relative link against the page that named it.
///
/// If `relative_url` is already absolute, it is returned unchanged
/// (`Url::join` already does this, but short-circuiting avoids needing a
/// valid `base_url` at all in the common case of an embedded or
/// already-pinned bundle where no manifest URL is known).
///
/// # Errors
///
/// Returns [`LoaderError::FetchFailed`] if `base_url` cannot be parsed as
/// an absolute URL, or if joining fails.
pub fn resolve_against_base(base_url: &str, relative_url: &str) -> Result<String, LoaderError> {
    if url::Url::parse(relative_url).is_ok() {
        return Ok(relative_url.to_string());
    }
    let base = url::Url::parse(base_url).map_err(|e| LoaderError::FetchFailed {
        url: Some(base_url.to_string()),
        detail: format!("manifest URL is not a valid base for resolving module URLs: {e}"),
    })?;
    let joined = base.join(relative_url).map_err(|e| LoaderError::FetchFailed {
        url: Some(relative_url.to_string()),
        detail: format!("could not resolve module URL against manifest URL: {e}"),
    })?;
    Ok(joined.to_string())
}

#[cfg(feature = "reqwest-client")]
mod reqwest_impl {
    use super::{HttpClient, LoaderError};
    use async_trait::async_trait;

    /// The default [`HttpClient`], backed by `reqwest`.
    #[derive(Debug, Clone, Default)]
    pub struct ReqwestHttpClient {
        client: reqwest::Client,
    }

    impl ReqwestHttpClient {
        /// Build a client with `reqwest`'s default configuration.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl HttpClient for ReqwestHttpClient {
        async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, LoaderError> {
            let response =
                self.client
                    .get(url)
                    .send()
                    .await
                    .map_err(|e| LoaderError::FetchFailed {
                        url: Some(url.to_string()),
                        detail: e.to_string(),
                    })?;

            let status = response.status();
            if status.as_u16() >= 400 {
                return Err(LoaderError::FetchFailed {
                    url: Some(url.to_string()),
                    detail: format!("HTTP status {status}"),
                });
            }

            let bytes = response.bytes().await.map_err(|e| LoaderError::FetchFailed {
                url: Some(url.to_string()),
                detail: e.to_string(),
            })?;
            Ok(bytes.to_vec())
        }
    }
}

#[cfg(feature = "reqwest-client")]
pub use reqwest_impl::ReqwestHttpClient;
