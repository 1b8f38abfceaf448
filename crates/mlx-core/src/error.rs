// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]

//! Error catalog for the manifest loader.
//!
//! Every error code follows the pattern `MLX-X###` where `X` is the
//! category letter and `###` is a three-digit number:
//!
//! - **F** — Fetch errors
//! - **V** — Verification errors (manifest signature, checksum, DAG shape)
//! - **C** — Cache errors
//! - **S** — System errors

use std::fmt;
use std::time::Duration;

/// Enumeration of all loader error codes, organized by category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// No fetcher in the chain could satisfy the request.
    FetchFailed,
    /// A downloaded module's SHA-256 does not match the manifest.
    ChecksumMismatch,
    /// Every trusted key failed to verify the manifest's signature.
    SignatureMismatch,
    /// No recognized key name was present among the manifest's signatures.
    NoTrustedKey,
    /// The manifest bytes could not be parsed as JSON, or didn't match schema.
    ManifestParseFailed,
    /// The module dependency graph contains a cycle.
    CycleDetected,
    /// A `dependsOnIds` entry names a module id absent from `modules`.
    MissingDependency,
    /// The receiver rejected or failed to process a module's bytes.
    ReceiverFailed,
    /// The cache index and filesystem disagree about an entry's existence.
    CacheCorrupt,
    /// A write cannot be satisfied even after evicting every evictable entry.
    CacheFull,
    /// An I/O operation failed.
    Io,
    /// JSON serialization or deserialization failed outside manifest parsing.
    Serialization,
    /// An async task failed to join.
    TaskJoin,
    /// An internal channel was closed unexpectedly.
    ChannelClosed,
    /// An operation exceeded its configured time budget.
    Timeout,
    /// A cooperative cancellation token was observed at a suspension point.
    Cancelled,
}

impl ErrorCode {
    /// Machine-readable code string (e.g. `"MLX-F001"`).
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::FetchFailed => "MLX-F001",
            Self::ChecksumMismatch => "MLX-V001",
            Self::SignatureMismatch => "MLX-V002",
            Self::NoTrustedKey => "MLX-V003",
            Self::ManifestParseFailed => "MLX-V004",
            Self::CycleDetected => "MLX-V005",
            Self::MissingDependency => "MLX-V006",
            Self::ReceiverFailed => "MLX-F002",
            Self::CacheCorrupt => "MLX-C001",
            Self::CacheFull => "MLX-C002",
            Self::Io => "MLX-S001",
            Self::Serialization => "MLX-S002",
            Self::TaskJoin => "MLX-S003",
            Self::ChannelClosed => "MLX-S004",
            Self::Timeout => "MLX-S005",
            Self::Cancelled => "MLX-S006",
        }
    }

    /// Human-readable category label.
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            Self::FetchFailed | Self::ReceiverFailed => "fetch",
            Self::ChecksumMismatch
            | Self::SignatureMismatch
            | Self::NoTrustedKey
            | Self::ManifestParseFailed
            | Self::CycleDetected
            | Self::MissingDependency => "verify",
            Self::CacheCorrupt | Self::CacheFull => "cache",
            Self::Io
            | Self::Serialization
            | Self::TaskJoin
            | Self::ChannelClosed
            | Self::Timeout
            | Self::Cancelled => "system",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Top-level error type returned by every fallible operation in the
/// loader pipeline.
#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    /// No fetcher in the chain satisfied the request.
    #[error("[{code}] fetch failed for {url:?}: {detail}", code = ErrorCode::FetchFailed.code())]
    FetchFailed {
        /// The URL that was requested, if any (embedded/cache lookups have none).
        url: Option<String>,
        /// Human-readable detail.
        detail: String,
    },

    /// A downloaded module's SHA-256 disagreed with the manifest.
    #[error("[{code}] checksum mismatch for module {id}: expected {expected}, got {actual}", code = ErrorCode::ChecksumMismatch.code())]
    ChecksumMismatch {
        /// Module id whose bytes failed verification.
        id: String,
        /// Hex-encoded expected hash.
        expected: String,
        /// Hex-encoded actual hash.
        actual: String,
    },

    /// All known signature keys failed to verify.
    #[error("[{code}] signature verification failed against all {tried} trusted key(s)", code = ErrorCode::SignatureMismatch.code())]
    SignatureMismatch {
        /// Number of trusted keys that were attempted.
        tried: usize,
    },

    /// No signature entry named a key present in the trust store.
    #[error("[{code}] no trusted key among {present} signature(s)", code = ErrorCode::NoTrustedKey.code())]
    NoTrustedKey {
        /// Number of signature entries present on the manifest.
        present: usize,
    },

    /// The manifest bytes failed to parse.
    #[error("[{code}] manifest parse failed: {detail}", code = ErrorCode::ManifestParseFailed.code())]
    ManifestParseFailed {
        /// Human-readable detail, usually the serde error message.
        detail: String,
    },

    /// The module DAG contains a cycle.
    #[error("[{code}] dependency cycle detected, starting at {id}", code = ErrorCode::CycleDetected.code())]
    CycleDetected {
        /// A module id that participates in the detected cycle.
        id: String,
    },

    /// A `dependsOnIds` entry names an id absent from `modules`.
    #[error("[{code}] module {from} depends on unknown module {missing}", code = ErrorCode::MissingDependency.code())]
    MissingDependency {
        /// The module that declared the dependency.
        from: String,
        /// The id it depends on that is not present in `modules`.
        missing: String,
    },

    /// The receiver failed to process a module's bytes.
    #[error("[{code}] receiver failed for module {id}: {detail}", code = ErrorCode::ReceiverFailed.code())]
    ReceiverFailed {
        /// The module id being delivered when the receiver failed.
        id: String,
        /// Human-readable detail.
        detail: String,
    },

    /// The cache index and filesystem disagree.
    #[error("[{code}] cache corrupt for {hash}: {detail}", code = ErrorCode::CacheCorrupt.code())]
    CacheCorrupt {
        /// Hex hash of the affected entry.
        hash: String,
        /// Human-readable detail.
        detail: String,
    },

    /// A write could not be satisfied even after evicting everything evictable.
    #[error("[{code}] cache full: {size} bytes exceeds capacity {capacity} even after eviction", code = ErrorCode::CacheFull.code())]
    CacheFull {
        /// Size of the object that could not be written.
        size: u64,
        /// The cache's configured capacity.
        capacity: u64,
    },

    /// An I/O operation failed.
    #[error("[{code}] I/O error: {0}", code = ErrorCode::Io.code())]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failed outside of manifest parsing.
    #[error("[{code}] serialization error: {0}", code = ErrorCode::Serialization.code())]
    Serialization(#[from] serde_json::Error),

    /// An async task panicked or was cancelled before completion.
    #[error("[{code}] task join error: {0}", code = ErrorCode::TaskJoin.code())]
    TaskJoin(String),

    /// An internal channel closed while a message was still expected.
    #[error("[{code}] channel closed unexpectedly", code = ErrorCode::ChannelClosed.code())]
    ChannelClosed,

    /// The caller asked to wait longer than the configured budget allowed.
    #[error("[{code}] operation timed out after {0:?}", code = ErrorCode::Timeout.code())]
    Timeout(Duration),

    /// A cooperative cancellation token fired while this job was at a
    /// suspension point (a sibling job failed, or the top-level load was
    /// cancelled).
    #[error("[{code}] cancelled: {reason}", code = ErrorCode::Cancelled.code())]
    Cancelled {
        /// Human-readable reason, usually naming the module that failed first.
        reason: String,
    },
}

impl LoaderError {
    /// Returns the stable [`ErrorCode`] for this error.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::FetchFailed { .. } => ErrorCode::FetchFailed,
            Self::ChecksumMismatch { .. } => ErrorCode::ChecksumMismatch,
            Self::SignatureMismatch { .. } => ErrorCode::SignatureMismatch,
            Self::NoTrustedKey { .. } => ErrorCode::NoTrustedKey,
            Self::ManifestParseFailed { .. } => ErrorCode::ManifestParseFailed,
            Self::CycleDetected { .. } => ErrorCode::CycleDetected,
            Self::MissingDependency { .. } => ErrorCode::MissingDependency,
            Self::ReceiverFailed { .. } => ErrorCode::ReceiverFailed,
            Self::CacheCorrupt { .. } => ErrorCode::CacheCorrupt,
            Self::CacheFull { .. } => ErrorCode::CacheFull,
            Self::Io(_) => ErrorCode::Io,
            Self::Serialization(_) => ErrorCode::Serialization,
            Self::TaskJoin(_) => ErrorCode::TaskJoin,
            Self::ChannelClosed => ErrorCode::ChannelClosed,
            Self::Timeout(_) => ErrorCode::Timeout,
            Self::Cancelled { .. } => ErrorCode::Cancelled,
        }
    }
}

/// Convenience result type for loader operations.
pub type LoaderResult<T> = Result<T, LoaderError>;
