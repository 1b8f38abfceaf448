// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// The async-facing file cache: `getOrPut`, `pin`, `unpin`, eviction.
pub mod cache;
/// The synchronous `rusqlite`-backed index of entries and pins.
pub mod index;

pub use cache::{FileCache, SpaceInUse};
pub use index::{CacheIndex, EntryState, FileRow};
