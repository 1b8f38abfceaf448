// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// The continuous-load controller.
pub mod controller;
/// The on-disk `download` receiver.
pub mod download;
/// The loader façade: `load_or_fail`, `load_or_fall_back`, `download`.
pub mod facade;
/// The per-load [`Session`](session::Session) target.
pub mod session;

pub use controller::ContinuousLoadController;
pub use download::DownloadReceiver;
pub use facade::{Initializer, LoaderFacade};
pub use session::Session;
