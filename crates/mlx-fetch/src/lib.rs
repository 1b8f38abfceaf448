// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// The ordered [`FetcherChain`], walked forward for modules and in
/// reverse for manifests.
pub mod chain;
/// The cache-wrapping fetcher.
pub mod cache_wrapping;
/// The injected HTTP client trait and its default `reqwest` impl.
pub mod client;
/// The read-only embedded-directory fetcher.
pub mod embedded;
/// The `Fetcher` trait every implementation satisfies.
pub mod fetcher;
/// The network fetcher.
pub mod http;

pub use cache_wrapping::CacheWrappingFetcher;
pub use chain::FetcherChain;
pub use client::{resolve_against_base, HttpClient};
#[cfg(feature = "reqwest-client")]
pub use client::ReqwestHttpClient;
pub use embedded::EmbeddedFetcher;
pub use fetcher::Fetcher;
pub use http::HttpFetcher;
