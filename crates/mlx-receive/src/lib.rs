// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Cooperative, run-scoped cancellation shared by every job in one [`engine::ReceiveEngine::run`] call.
pub mod cancel;
/// Per-module completion signaling used to build wait-sets.
pub mod completion;
/// The receive engine itself.
pub mod engine;
/// The single-threaded [`Receiver`](receiver::Receiver) sink trait.
pub mod receiver;

pub use cancel::CancellationToken;
pub use completion::Completion;
pub use engine::ReceiveEngine;
pub use receiver::Receiver;
