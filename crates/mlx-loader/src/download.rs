// SPDX-License-Identifier: MIT OR Apache-2.0
//! The [`DownloadReceiver`] used by [`crate::facade::LoaderFacade::download`]
//! to materialize a manifest and its modules onto disk.

use async_trait::async_trait;
use mlx_core::{LoaderError, Sha256Hex};
use mlx_receive::Receiver;
use std::path::PathBuf;

/// Writes each received module's bytes to `dir/<sha256-hex>.zipline`.
pub struct DownloadReceiver {
    dir: PathBuf,
}

impl DownloadReceiver {
    /// Target a fresh receiver at `dir`, which must already exist.
    #[must_use]
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn module_path(&self, sha256: Sha256Hex) -> PathBuf {
        self.dir.join(format!("{}.zipline", sha256.to_hex()))
    }
}

#[async_trait]
impl Receiver for DownloadReceiver {
    async fn receive(&self, _id: &str, sha256: Sha256Hex, bytes: Vec<u8>) -> Result<(), String> {
        tokio::fs::write(self.module_path(sha256), bytes)
            .await
            .map_err(|e| e.to_string())
    }
}

/// Write `manifest_json` to `dir/<application_name>.manifest.zipline.json`.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub async fn write_manifest_file(
    dir: &std::path::Path,
    application_name: &str,
    manifest_json: &str,
) -> Result<(), LoaderError> {
    let path = dir.join(format!("{application_name}.manifest.zipline.json"));
    tokio::fs::write(path, manifest_json).await?;
    Ok(())
}
