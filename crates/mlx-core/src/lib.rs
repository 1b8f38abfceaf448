// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Signature payload canonicalization.
pub mod canon;
/// Configuration defaults and validation.
pub mod config;
/// Dependency-graph validation (cycle detection, transitive closure).
pub mod dag;
/// The error catalog shared by every loader crate.
pub mod error;
/// The event-listener interface consumed by the loader façade.
pub mod events;
/// The manifest data model: `Manifest` and `Module`.
pub mod model;

pub use config::{CacheConfig, LoaderConfig};
pub use error::{ErrorCode, LoaderError, LoaderResult};
pub use events::{EventListener, NoopEventListener, TracingEventListener};
pub use model::{Manifest, Module, Sha256Hex};
