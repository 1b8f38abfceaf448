// SPDX-License-Identifier: MIT OR Apache-2.0
//! The manifest data model: [`Manifest`] and [`Module`].
//!
//! Field order of `modules` and `signatures` is semantically significant
//! (it participates in the canonical signature payload, see [`crate::canon`]),
//! so both are backed by [`IndexMap`] rather than a hashing map. Unknown
//! fields — top-level and per-module — are preserved verbatim via
//! `#[serde(flatten)]` so round-tripping a manifest through this type never
//! silently drops data the signer covered.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// A 32-byte SHA-256 digest, stored as bytes but serialized as a lowercase
/// hex string on the wire.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Sha256Hex(pub [u8; 32]);

impl Sha256Hex {
    /// Compute the SHA-256 digest of `bytes`.
    #[must_use]
    pub fn of(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        let digest = hasher.finalize();
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        Self(out)
    }

    /// Lowercase hex representation, as used for cache filenames and the
    /// wire format.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl TryFrom<String> for Sha256Hex {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let bytes = hex::decode(value.trim())
            .map_err(|e| format!("invalid hex in sha256 field: {e}"))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| format!("sha256 must be 32 bytes, got {}", v.len()))?;
        Ok(Self(arr))
    }
}

impl From<Sha256Hex> for String {
    fn from(value: Sha256Hex) -> Self {
        value.to_hex()
    }
}

impl fmt::Debug for Sha256Hex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sha256Hex({})", self.to_hex())
    }
}

impl fmt::Display for Sha256Hex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// A single module: a URL (possibly relative to the manifest URL), its
/// expected content hash, and the ids of modules it depends on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    /// Location to fetch this module's bytes from. May be relative to the
    /// manifest's own URL.
    pub url: String,
    /// Expected SHA-256 of the module's bytes.
    pub sha256: Sha256Hex,
    /// Ids of modules that must be delivered to the receiver before this one.
    #[serde(default, rename = "dependsOnIds")]
    pub depends_on_ids: Vec<String>,
    /// Unknown fields present on the module object, preserved verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A signed manifest: the module graph plus entry point and signatures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Module id -> [`Module`], in the order they appeared on the wire.
    pub modules: IndexMap<String, Module>,
    /// Id of the module whose entry point should run first.
    #[serde(rename = "mainModuleId")]
    pub main_module_id: String,
    /// Name of the entry-point function within `mainModuleId`.
    #[serde(rename = "mainFunction")]
    pub main_function: String,
    /// Signature key name -> hex-encoded signature, in signing order.
    #[serde(default)]
    pub signatures: IndexMap<String, String>,
    /// Unknown top-level fields, preserved verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Manifest {
    /// Parse a manifest from its raw JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if `bytes` is not valid JSON or does not match the
    /// manifest schema.
    pub fn parse(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Serialize this manifest back to pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails (it should not, for a value
    /// built from [`Manifest::parse`]).
    pub fn to_pretty_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
