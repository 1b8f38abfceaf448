// SPDX-License-Identifier: MIT OR Apache-2.0
//! The continuous-load controller (component G): turns a stream of
//! manifest URLs into a stream of load sessions, debouncing the
//! upstream, fetching and verifying each manifest, deduping by content,
//! and driving the full load pipeline for every surviving change.

use crate::facade::{Initializer, LoaderFacade};
use crate::session::Session;
use futures::stream::{self, Stream, StreamExt};
use mlx_core::{LoaderError, Sha256Hex};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// A `(url, content hash)` pair used to detect when a polled manifest is
/// byte-identical to the last one successfully loaded, regardless of
/// which URL served it.
#[derive(Clone, PartialEq, Eq)]
struct Seen {
    url: String,
    content_hash: Sha256Hex,
}

struct RebounceState<S> {
    upstream: Pin<Box<S>>,
    last_url: Option<String>,
    poll_interval: Duration,
    exhausted: bool,
}

/// Re-emits the most recent upstream value at least every `poll_interval`;
/// an upstream that emits faster than that passes straight through.
///
/// Ends once `upstream` is exhausted and has never produced a value, or
/// immediately propagates an early-exhausted-with-a-value upstream by
/// continuing to repeat that last value forever (a URL source that
/// completes after naming one URL is treated as "poll this URL
/// indefinitely", matching a `flow { emit(url) }` single-shot source).
fn rebounce<S>(upstream: S, poll_interval: Duration) -> impl Stream<Item = String>
where
    S: Stream<Item = String> + Send + 'static,
{
    let state = RebounceState {
        upstream: Box::pin(upstream),
        last_url: None,
        poll_interval,
        exhausted: false,
    };
    stream::unfold(state, move |mut state| async move {
        loop {
            if state.exhausted {
                if let Some(url) = state.last_url.clone() {
                    tokio::time::sleep(state.poll_interval).await;
                    return Some((url, state));
                }
                return None;
            }

            tokio::select! {
                biased;
                next = state.upstream.next() => {
                    match next {
                        Some(url) => {
                            state.last_url = Some(url.clone());
                            return Some((url, state));
                        }
                        None => {
                            state.exhausted = true;
                            continue;
                        }
                    }
                }
                _ = tokio::time::sleep(state.poll_interval), if state.last_url.is_some() => {
                    let url = state.last_url.clone().expect("guarded by if condition");
                    return Some((url, state));
                }
            }
        }
    })
}

/// Drives [`LoaderFacade::load_or_fail`] over a debounced, deduped stream
/// of manifest URLs.
pub struct ContinuousLoadController {
    facade: Arc<LoaderFacade>,
    poll_interval: Duration,
}

impl ContinuousLoadController {
    /// Build a controller around `facade`, rebouncing the input URL
    /// stream at least every `poll_interval`.
    #[must_use]
    pub fn new(facade: Arc<LoaderFacade>, poll_interval: Duration) -> Self {
        Self {
            facade,
            poll_interval,
        }
    }

    /// Run the continuous-load pipeline for `application_name` over
    /// `urls`, applying `initializer` to every successfully-received
    /// session.
    ///
    /// Dropping the returned stream stops polling and cancels any
    /// in-flight fetch at its next suspension point.
    pub fn run<S>(
        &self,
        application_name: String,
        urls: S,
        initializer: Initializer,
    ) -> impl Stream<Item = Result<Arc<Session>, LoaderError>>
    where
        S: Stream<Item = String> + Send + 'static,
    {
        let facade = self.facade.clone();
        let rebounced = rebounce(urls, self.poll_interval);

        let state = (Box::pin(rebounced), None::<Seen>);
        stream::unfold(state, move |(mut upstream, mut last_seen)| {
            let facade = facade.clone();
            let application_name = application_name.clone();
            let initializer = initializer.clone();
            async move {
                loop {
                    let url = upstream.next().await?;

                    let manifest = match facade
                        .fetch_and_verify_manifest(&application_name, Some(url.as_str()))
                        .await
                    {
                        Ok(manifest) => manifest,
                        Err(_) => continue,
                    };

                    let content_hash = match manifest.to_pretty_json() {
                        Ok(json) => Sha256Hex::of(json.as_bytes()),
                        Err(_) => continue,
                    };
                    let candidate = Seen {
                        url: url.clone(),
                        content_hash,
                    };
                    if last_seen.as_ref().is_some_and(|seen| seen.content_hash == candidate.content_hash) {
                        continue;
                    }
                    last_seen = Some(candidate);

                    let result = facade
                        .load_or_fail(&application_name, Some(url.as_str()), &initializer)
                        .await;
                    return Some((result, (upstream, last_seen)));
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facade::LoaderFacade;
    use async_trait::async_trait;
    use mlx_cache::FileCache;
    use mlx_core::{CacheConfig, Manifest};
    use mlx_fetch::{Fetcher, FetcherChain, HttpFetcher};
    use mlx_receive::ReceiveEngine;
    use mlx_verify::ManifestVerifier;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;
    use tokio::sync::Semaphore;

    struct ScriptedClient {
        bodies: StdMutex<HashMap<String, Vec<u8>>>,
    }

    #[async_trait]
    impl mlx_fetch::HttpClient for ScriptedClient {
        async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, LoaderError> {
            self.bodies
                .lock()
                .unwrap()
                .get(url)
                .cloned()
                .ok_or_else(|| LoaderError::FetchFailed {
                    url: Some(url.to_string()),
                    detail: "no such scripted url".into(),
                })
        }
    }

    struct AlwaysMissModuleFetcher;

    #[async_trait]
    impl Fetcher for AlwaysMissModuleFetcher {
        async fn fetch(
            &self,
            _semaphore: &Semaphore,
            _application_name: &str,
            _id: &str,
            _sha256: Sha256Hex,
            _url: &str,
        ) -> Result<Option<Vec<u8>>, LoaderError> {
            Ok(None)
        }

        async fn fetch_manifest(
            &self,
            _semaphore: &Semaphore,
            _application_name: &str,
            _url: Option<&str>,
        ) -> Result<Option<(Vec<u8>, Manifest)>, LoaderError> {
            Ok(None)
        }
    }

    fn manifest_json(tag: &str) -> String {
        format!(
            r#"{{"modules":{{}},"mainModuleId":"a","mainFunction":"main","signatures":{{}},"build":"{tag}"}}"#
        )
    }

    async fn facade_with_bodies(bodies: HashMap<String, Vec<u8>>) -> Arc<LoaderFacade> {
        let client = Arc::new(ScriptedClient {
            bodies: StdMutex::new(bodies),
        });
        let http = Arc::new(HttpFetcher::new(client));
        let fetchers = Arc::new(FetcherChain::new(vec![Arc::new(AlwaysMissModuleFetcher), http]));
        let engine = Arc::new(ReceiveEngine::new(fetchers.clone(), 2));
        let verifier = Arc::new(ManifestVerifier::no_verify());
        Arc::new(LoaderFacade::without_listener(fetchers, verifier, engine))
    }

    #[tokio::test]
    async fn dedupes_identical_manifest_content_across_urls() {
        let mut bodies = HashMap::new();
        bodies.insert("http://cdn-a/m.json".to_string(), manifest_json("v1").into_bytes());
        bodies.insert("http://cdn-b/m.json".to_string(), manifest_json("v1").into_bytes());
        bodies.insert("http://cdn-a/m2.json".to_string(), manifest_json("v2").into_bytes());
        let facade = facade_with_bodies(bodies).await;

        let urls = stream::iter(vec![
            "http://cdn-a/m.json".to_string(),
            "http://cdn-b/m.json".to_string(),
            "http://cdn-a/m2.json".to_string(),
        ]);
        let initializer: Initializer = Arc::new(|_session| Box::pin(async { Ok(()) }));
        let controller = ContinuousLoadController::new(facade, Duration::from_secs(3600));

        let results: Vec<_> = controller
            .run("app".to_string(), urls, initializer)
            .take(2)
            .collect()
            .await;

        assert_eq!(results.len(), 2, "same-content second URL should be deduped away");
        assert!(results.iter().all(Result::is_ok));
    }

    #[tokio::test]
    async fn fetch_failure_is_dropped_silently() {
        let mut bodies = HashMap::new();
        bodies.insert("http://cdn-a/m.json".to_string(), manifest_json("v1").into_bytes());
        let facade = facade_with_bodies(bodies).await;

        let urls = stream::iter(vec![
            "http://unreachable/m.json".to_string(),
            "http://cdn-a/m.json".to_string(),
        ]);
        let initializer: Initializer = Arc::new(|_session| Box::pin(async { Ok(()) }));
        let controller = ContinuousLoadController::new(facade, Duration::from_secs(3600));

        let results: Vec<_> = controller
            .run("app".to_string(), urls, initializer)
            .take(1)
            .collect()
            .await;

        assert_eq!(results.len(), 1);
        assert!(results[0].is_ok());
    }
}
