// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use mlx_core::{LoaderError, Manifest};
use std::collections::BTreeMap;

/// Maps a signature key name to the public key trusted to sign under it.
///
/// A `BTreeMap` rather than a `HashMap` so debug output and iteration are
/// deterministic, which matters for reproducing verifier test failures.
#[derive(Debug, Clone, Default)]
pub struct TrustStore {
    keys: BTreeMap<String, VerifyingKey>,
}

impl TrustStore {
    /// Create an empty trust store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a trusted public key under `key_name`.
    #[must_use]
    pub fn with_key(mut self, key_name: impl Into<String>, key: VerifyingKey) -> Self {
        self.keys.insert(key_name.into(), key);
        self
    }

    /// Returns `true` if `key_name` is in the trust store.
    #[must_use]
    pub fn contains(&self, key_name: &str) -> bool {
        self.keys.contains_key(key_name)
    }

    fn get(&self, key_name: &str) -> Option<&VerifyingKey> {
        self.keys.get(key_name)
    }
}

/// Controls whether [`ManifestVerifier::verify`] requires a valid signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyMode {
    /// Require a signature from a trusted key; fail otherwise.
    RequireSignature,
    /// Skip signature checking entirely. Only for local development and
    /// tests — never enable this against a network-supplied manifest.
    NoVerify,
}

/// Verifies a manifest's signature against a [`TrustStore`].
#[derive(Debug, Clone)]
pub struct ManifestVerifier {
    trust_store: TrustStore,
    mode: VerifyMode,
}

impl ManifestVerifier {
    /// Create a verifier that requires a valid signature from `trust_store`.
    #[must_use]
    pub fn new(trust_store: TrustStore) -> Self {
        Self {
            trust_store,
            mode: VerifyMode::RequireSignature,
        }
    }

    /// Create a verifier that accepts any manifest unconditionally.
    #[must_use]
    pub fn no_verify() -> Self {
        Self {
            trust_store: TrustStore::new(),
            mode: VerifyMode::NoVerify,
        }
    }

    /// Verify `manifest`'s signature, recomputing the canonical payload from
    /// `raw_bytes` (never from re-serializing `manifest`, to avoid formatter
    /// drift between the signer and this verifier).
    ///
    /// Iterates `manifest.signatures` in order and returns on the first
    /// entry whose key name is recognized and whose signature verifies.
    ///
    /// # Errors
    ///
    /// - [`LoaderError::NoTrustedKey`] if no signature name is recognized
    ///   (including when `signatures` is empty), unless in [`VerifyMode::NoVerify`].
    /// - [`LoaderError::SignatureMismatch`] if at least one key was
    ///   recognized but every one of them failed to verify.
    /// - [`LoaderError::ManifestParseFailed`] if `raw_bytes` cannot be
    ///   parsed as JSON (the canonicalizer needs a [`serde_json::Value`]).
    pub fn verify(&self, raw_bytes: &[u8], manifest: &Manifest) -> Result<String, LoaderError> {
        if self.mode == VerifyMode::NoVerify {
            return Ok(String::new());
        }

        let raw_json: serde_json::Value =
            serde_json::from_slice(raw_bytes).map_err(|e| LoaderError::ManifestParseFailed {
                detail: e.to_string(),
            })?;
        let payload = mlx_core::canon::serialize_compact(&mlx_core::canon::canonicalize(&raw_json))
            .map_err(|e| LoaderError::ManifestParseFailed {
                detail: e.to_string(),
            })?;

        let mut tried = 0usize;
        for (key_name, signature_hex) in &manifest.signatures {
            let Some(verifying_key) = self.trust_store.get(key_name) else {
                continue;
            };
            tried += 1;

            let Ok(sig_bytes) = hex::decode(signature_hex) else {
                tracing::debug!(target: "mlx.verify", key_name, "signature hex decode failed");
                continue;
            };
            let Ok(sig_array): Result<[u8; 64], _> = sig_bytes.try_into() else {
                tracing::debug!(target: "mlx.verify", key_name, "signature wrong length");
                continue;
            };
            let signature = Signature::from_bytes(&sig_array);

            match verifying_key.verify(payload.as_bytes(), &signature) {
                Ok(()) => {
                    tracing::debug!(target: "mlx.verify", key_name, "signature verified");
                    return Ok(key_name.clone());
                }
                Err(_) => {
                    tracing::debug!(target: "mlx.verify", key_name, "signature verification failed");
                }
            }
        }

        if tried == 0 {
            Err(LoaderError::NoTrustedKey {
                present: manifest.signatures.len(),
            })
        } else {
            Err(LoaderError::SignatureMismatch { tried })
        }
    }
}
