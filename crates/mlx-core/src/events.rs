// SPDX-License-Identifier: MIT OR Apache-2.0
//! The event-listener interface consumed by the loader façade.
//!
//! Implementations are injected collaborators (telemetry sinks, test
//! spies); the loader never depends on a concrete sink.

use crate::error::LoaderError;

/// Lifecycle events emitted around each top-level load attempt.
///
/// Implementations should not block the calling task for long — they run
/// inline on the loader's call path. Spawn a task internally if a sink
/// needs to do slow work (writing to disk, calling out over the network).
pub trait EventListener: Send + Sync {
    /// A load attempt is starting for `application_name`.
    fn application_load_start(&self, application_name: &str, manifest_url: Option<&str>) {
        let _ = (application_name, manifest_url);
    }

    /// A load attempt for `application_name` completed successfully.
    fn application_load_end(&self, application_name: &str, manifest_url: Option<&str>) {
        let _ = (application_name, manifest_url);
    }

    /// A load attempt for `application_name` failed.
    fn application_load_failed(
        &self,
        application_name: &str,
        manifest_url: Option<&str>,
        error: &LoaderError,
    ) {
        let _ = (application_name, manifest_url, error);
    }
}

/// An [`EventListener`] that drops every event. The default when no sink is
/// configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventListener;

impl EventListener for NoopEventListener {}

/// An [`EventListener`] that logs every event via `tracing`, at the
/// `mlx.loader` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventListener;

impl EventListener for TracingEventListener {
    fn application_load_start(&self, application_name: &str, manifest_url: Option<&str>) {
        tracing::info!(target: "mlx.loader", application_name, manifest_url, "load start");
    }

    fn application_load_end(&self, application_name: &str, manifest_url: Option<&str>) {
        tracing::info!(target: "mlx.loader", application_name, manifest_url, "load end");
    }

    fn application_load_failed(
        &self,
        application_name: &str,
        manifest_url: Option<&str>,
        error: &LoaderError,
    ) {
        tracing::warn!(
            target: "mlx.loader",
            application_name,
            manifest_url,
            error = %error,
            "load failed"
        );
    }
}
