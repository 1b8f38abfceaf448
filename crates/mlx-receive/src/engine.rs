// SPDX-License-Identifier: MIT OR Apache-2.0
//! The dependency-ordered receive engine.

use crate::cancel::CancellationToken;
use crate::completion::Completion;
use crate::receiver::Receiver;
use futures::future::join_all;
use mlx_core::{dag, LoaderError, Manifest, Sha256Hex};
use mlx_fetch::FetcherChain;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, RwLock, Semaphore};

/// A single hand-off to the receiver task.
struct ReceiveRequest {
    id: String,
    sha256: Sha256Hex,
    bytes: Vec<u8>,
    reply: oneshot::Sender<Result<(), LoaderError>>,
}

/// Runs one manifest's modules through fetch, verify, dependency-wait,
/// and receive, concurrently and in dependency order.
///
/// Concurrency is bounded by a swappable [`Semaphore`]: [`ReceiveEngine::set_concurrency`]
/// installs a brand-new semaphore rather than resizing the existing one,
/// so in-flight permits already handed out are unaffected by a
/// reconfiguration mid-run.
pub struct ReceiveEngine {
    fetchers: Arc<FetcherChain>,
    semaphore: RwLock<Arc<Semaphore>>,
}

impl ReceiveEngine {
    /// Build an engine around `fetchers`, bounding concurrent fetches to
    /// `concurrency` permits.
    #[must_use]
    pub fn new(fetchers: Arc<FetcherChain>, concurrency: usize) -> Self {
        Self {
            fetchers,
            semaphore: RwLock::new(Arc::new(Semaphore::new(concurrency.max(1)))),
        }
    }

    /// Replace the concurrency bound for future permit acquisitions.
    ///
    /// Jobs that already hold a permit keep it until they finish; only
    /// newly-contended acquisitions observe the new limit.
    pub async fn set_concurrency(&self, concurrency: usize) {
        let mut guard = self.semaphore.write().await;
        *guard = Arc::new(Semaphore::new(concurrency.max(1)));
    }

    /// The semaphore currently bounding fetch concurrency, shared so
    /// collaborators outside the engine (the façade's manifest fetch) can
    /// acquire permits under the same limit.
    pub async fn semaphore(&self) -> Arc<Semaphore> {
        self.semaphore.read().await.clone()
    }

    /// Receive every module in `manifest`, in dependency order, handing
    /// each to `receiver` exactly once.
    ///
    /// `manifest_url` is the URL the manifest itself was fetched from, if
    /// any; each module's (possibly relative) `url` field is resolved
    /// against it before being handed to the fetcher chain, mirroring how
    /// a browser resolves a relative link against its page. A module
    /// `url` that is already absolute, or a `manifest_url` of `None`
    /// (the embedded/local-only path), leaves the module's `url` as-is.
    ///
    /// # Errors
    ///
    /// Returns the first error encountered: a DAG validation failure (no
    /// jobs are spawned), a fetch failure, a checksum mismatch, or a
    /// receiver failure. When any module fails, every sibling job still
    /// in flight is cancelled and the manifest's pin is released.
    pub async fn run(
        &self,
        application_name: &str,
        manifest: &Manifest,
        manifest_url: Option<&str>,
        receiver: Arc<dyn Receiver>,
    ) -> Result<(), LoaderError> {
        dag::validate(manifest)?;

        let completions: HashMap<String, Arc<Completion>> = manifest
            .modules
            .keys()
            .map(|id| (id.clone(), Arc::new(Completion::new())))
            .collect();

        let token = CancellationToken::new();
        let (tx, mut rx) = mpsc::unbounded_channel::<ReceiveRequest>();

        let dispatcher = tokio::spawn(async move {
            while let Some(req) = rx.recv().await {
                let outcome = receiver
                    .receive(&req.id, req.sha256, req.bytes)
                    .await
                    .map_err(|detail| LoaderError::ReceiverFailed {
                        id: req.id.clone(),
                        detail,
                    });
                let _ = req.reply.send(outcome);
            }
        });

        let mut handles = Vec::with_capacity(manifest.modules.len());
        for (id, module) in &manifest.modules {
            let id = id.clone();
            let url = match manifest_url {
                Some(base) => mlx_fetch::resolve_against_base(base, &module.url)?,
                None => module.url.clone(),
            };
            let sha256 = module.sha256;
            let wait_set: Vec<Arc<Completion>> = module
                .depends_on_ids
                .iter()
                .filter_map(|dep| completions.get(dep).cloned())
                .collect();
            let my_completion = completions[&id].clone();
            let fetchers = self.fetchers.clone();
            let token = token.clone();
            let tx = tx.clone();
            let application_name = application_name.to_string();
            let semaphore = self.semaphore.read().await.clone();

            handles.push(tokio::spawn(async move {
                let bytes = tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        return Err(LoaderError::Cancelled {
                            reason: format!("sibling module failed before {id} could fetch"),
                        });
                    }
                    result = fetchers.fetch(&semaphore, &application_name, &id, sha256, &url) => result?,
                };

                let actual = Sha256Hex::of(&bytes);
                if actual != sha256 {
                    return Err(LoaderError::ChecksumMismatch {
                        id: id.clone(),
                        expected: sha256.to_hex(),
                        actual: actual.to_hex(),
                    });
                }

                tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        return Err(LoaderError::Cancelled {
                            reason: format!("sibling module failed while {id} awaited its dependencies"),
                        });
                    }
                    _ = join_all(wait_set.iter().map(|c| c.wait())) => {}
                }

                let (reply_tx, reply_rx) = oneshot::channel();
                tx.send(ReceiveRequest {
                    id: id.clone(),
                    sha256,
                    bytes,
                    reply: reply_tx,
                })
                .map_err(|_| LoaderError::ChannelClosed)?;
                let result = reply_rx.await.map_err(|_| LoaderError::ChannelClosed)?;
                result?;

                my_completion.signal();
                Ok::<(), LoaderError>(())
            }));
        }
        drop(tx);

        let mut first_error: Option<LoaderError> = None;
        for handle in handles {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    tracing::warn!(target: "mlx.receive", application_name, error = %err, "module job failed, cancelling siblings");
                    token.cancel();
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
                Err(join_err) => {
                    token.cancel();
                    if first_error.is_none() {
                        first_error = Some(LoaderError::TaskJoin(join_err.to_string()));
                    }
                }
            }
        }

        let _ = dispatcher.await;

        if let Some(err) = first_error {
            self.fetchers.unpin(application_name, manifest).await?;
            return Err(err);
        }

        Ok(())
    }
}
