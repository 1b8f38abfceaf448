// SPDX-License-Identifier: MIT OR Apache-2.0
//! The loader façade: `load_or_fail`, `load_or_fall_back`, and `download`.

use crate::download::{write_manifest_file, DownloadReceiver};
use crate::session::Session;
use futures::future::BoxFuture;
use mlx_core::{EventListener, LoaderError, Manifest, NoopEventListener};
use mlx_fetch::FetcherChain;
use mlx_receive::{Receiver, ReceiveEngine};
use mlx_verify::ManifestVerifier;
use std::path::PathBuf;
use std::sync::Arc;

/// The caller-supplied smoke test run against a freshly-populated
/// [`Session`] before a load is considered successful.
///
/// An `Arc<dyn Fn>` rather than a bare generic closure so
/// [`LoaderFacade::load_or_fall_back`] can invoke the same initializer
/// twice (once against the network path, once against the local-only
/// retry) without requiring the caller's closure to be `Clone`.
pub type Initializer =
    Arc<dyn Fn(Arc<Session>) -> BoxFuture<'static, Result<(), String>> + Send + Sync>;

/// Wires together the fetcher chain, manifest verifier, and receive
/// engine into the three façade operations `spec.md` §4.F describes.
pub struct LoaderFacade {
    fetchers: Arc<FetcherChain>,
    verifier: Arc<ManifestVerifier>,
    engine: Arc<ReceiveEngine>,
    listener: Arc<dyn EventListener>,
}

impl LoaderFacade {
    /// Build a façade around `fetchers`, `verifier`, and `engine`, emitting
    /// lifecycle events to `listener`.
    #[must_use]
    pub fn new(
        fetchers: Arc<FetcherChain>,
        verifier: Arc<ManifestVerifier>,
        engine: Arc<ReceiveEngine>,
        listener: Arc<dyn EventListener>,
    ) -> Self {
        Self {
            fetchers,
            verifier,
            engine,
            listener,
        }
    }

    /// Same as [`LoaderFacade::new`] with a [`NoopEventListener`].
    #[must_use]
    pub fn without_listener(
        fetchers: Arc<FetcherChain>,
        verifier: Arc<ManifestVerifier>,
        engine: Arc<ReceiveEngine>,
    ) -> Self {
        Self::new(fetchers, verifier, engine, Arc::new(NoopEventListener))
    }

    /// Fetch `application_name`'s manifest from `url` (or local sources
    /// only, if `None`) and verify its signature.
    ///
    /// # Errors
    ///
    /// Propagates any [`mlx_fetch::Fetcher::fetch_manifest`] or
    /// [`ManifestVerifier::verify`] failure.
    pub async fn fetch_and_verify_manifest(
        &self,
        application_name: &str,
        url: Option<&str>,
    ) -> Result<Manifest, LoaderError> {
        let semaphore = self.engine.semaphore().await;
        let (raw_bytes, manifest) = self
            .fetchers
            .fetch_manifest(&semaphore, application_name, url)
            .await?;
        self.verifier.verify(&raw_bytes, &manifest)?;
        Ok(manifest)
    }

    /// Fetch, verify, receive, and smoke-test `application_name`'s
    /// manifest, returning a populated [`Session`] on success.
    ///
    /// On any failure the target session is closed, the manifest's pin
    /// (if one had been taken by a prior successful load) is released,
    /// and `applicationLoadFailed` is emitted before the error is
    /// returned to the caller.
    ///
    /// # Errors
    ///
    /// Propagates manifest fetch/verify failures, receive-engine
    /// failures, and initializer failures (wrapped as
    /// [`LoaderError::ReceiverFailed`]).
    pub async fn load_or_fail(
        &self,
        application_name: &str,
        manifest_url: Option<&str>,
        initializer: &Initializer,
    ) -> Result<Arc<Session>, LoaderError> {
        self.listener
            .application_load_start(application_name, manifest_url);

        match self
            .load_or_fail_inner(application_name, manifest_url, initializer)
            .await
        {
            Ok(session) => {
                self.listener
                    .application_load_end(application_name, manifest_url);
                Ok(session)
            }
            Err(err) => {
                self.listener
                    .application_load_failed(application_name, manifest_url, &err);
                Err(err)
            }
        }
    }

    async fn load_or_fail_inner(
        &self,
        application_name: &str,
        manifest_url: Option<&str>,
        initializer: &Initializer,
    ) -> Result<Arc<Session>, LoaderError> {
        let manifest = self
            .fetch_and_verify_manifest(application_name, manifest_url)
            .await?;

        match self
            .receive_and_initialize(application_name, &manifest, manifest_url, initializer)
            .await
        {
            Ok(session) => {
                self.fetchers.pin(application_name, &manifest).await?;
                Ok(session)
            }
            Err(err) => {
                let _ = self.fetchers.unpin(application_name, &manifest).await;
                Err(err)
            }
        }
    }

    async fn receive_and_initialize(
        &self,
        application_name: &str,
        manifest: &Manifest,
        manifest_url: Option<&str>,
        initializer: &Initializer,
    ) -> Result<Arc<Session>, LoaderError> {
        let session = Arc::new(Session::new(manifest.clone()));
        let receiver: Arc<dyn Receiver> = session.clone();

        if let Err(err) = self
            .engine
            .run(application_name, manifest, manifest_url, receiver)
            .await
        {
            session.close();
            return Err(err);
        }

        if let Err(detail) = initializer(session.clone()).await {
            session.close();
            return Err(LoaderError::ReceiverFailed {
                id: manifest.main_module_id.clone(),
                detail,
            });
        }

        Ok(session)
    }

    /// Try [`LoaderFacade::load_or_fail`] against `url`; on any failure,
    /// retry once with `manifest_url: None`, forcing the fetcher chain to
    /// satisfy the manifest from local sources only (embedded bundle or
    /// a previously pinned cache entry).
    ///
    /// # Errors
    ///
    /// Returns the error from the local-only retry if both attempts fail.
    pub async fn load_or_fall_back(
        &self,
        application_name: &str,
        url: Option<&str>,
        initializer: &Initializer,
    ) -> Result<Arc<Session>, LoaderError> {
        match self.load_or_fail(application_name, url, initializer).await {
            Ok(session) => Ok(session),
            Err(_) => self.load_or_fail(application_name, None, initializer).await,
        }
    }

    /// Fetch, verify, and receive `application_name`'s manifest as with
    /// [`LoaderFacade::load_or_fail`], but write each module's bytes to
    /// `dir/<sha256-hex>.zipline` and the manifest itself to
    /// `dir/<application_name>.manifest.zipline.json` instead of handing
    /// them to a [`Session`].
    ///
    /// # Errors
    ///
    /// Propagates manifest fetch/verify failures, receive-engine
    /// failures, and any I/O error writing to `dir`.
    pub async fn download(
        &self,
        application_name: &str,
        dir: impl Into<PathBuf>,
        manifest_url: Option<&str>,
    ) -> Result<(), LoaderError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;

        let manifest = self
            .fetch_and_verify_manifest(application_name, manifest_url)
            .await?;

        let receiver: Arc<dyn Receiver> = Arc::new(DownloadReceiver::new(dir.clone()));
        self.engine
            .run(application_name, &manifest, manifest_url, receiver)
            .await?;

        let manifest_json = manifest.to_pretty_json().map_err(LoaderError::Serialization)?;
        write_manifest_file(&dir, application_name, &manifest_json).await
    }
}
