//! Violation signature canonicalization
//!
//! A [`ViolationSignature`] identifies a constraint failure independently of
//! the node and value that triggered it. Its canonical serialization is a
//! versioned, line-oriented text with a fixed field order; the SHA-256 of that
//! text is the [`SignatureHash`] used as the store key.

pub mod rules;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use crate::error::{ExplainError, Result};
use crate::violation::{ViolationRecord, ViolationType};

pub use rules::{ExtractionRule, ExtractionTable, ParamRule, MESSAGE_PARAM};

/// Header line of the canonical serialization; bump when the format changes
pub const CANONICAL_FORMAT: &str = "xshacl-signature/v1";

/// Fixed-width content hash of a canonical signature
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SignatureHash([u8; 32]);

impl SignatureHash {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex rendering (64 chars)
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First 12 hex chars, for log lines and tables
    pub fn short(&self) -> String {
        let mut hex = self.to_hex();
        hex.truncate(12);
        hex
    }

    /// Parse a store key back into a hash
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        <[u8; 32]>::try_from(bytes).ok().map(Self)
    }
}

impl fmt::Display for SignatureHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for SignatureHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SignatureHash({})", self.short())
    }
}

impl FromStr for SignatureHash {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let bytes = hex::decode(s.trim()).map_err(|e| format!("Invalid signature hash: {}", e))?;
        Self::from_slice(&bytes)
            .ok_or_else(|| format!("Invalid signature hash length: {} bytes", bytes.len()))
    }
}

impl Serialize for SignatureHash {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for SignatureHash {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Canonical, node-independent identity of a constraint failure
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViolationSignature {
    pub shape_id: String,
    pub constraint_id: String,
    pub violation_type: ViolationType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property_path: Option<String>,
    #[serde(default)]
    pub constraint_params: BTreeMap<String, String>,
}

impl ViolationSignature {
    /// Deterministic serialization used as hash input
    pub fn canonical_form(&self) -> String {
        let mut out = String::with_capacity(256);
        out.push_str(CANONICAL_FORMAT);
        out.push('\n');
        push_line(&mut out, "shape", &self.shape_id);
        push_line(&mut out, "constraint", &self.constraint_id);
        push_line(&mut out, "type", self.violation_type.as_str());
        if let Some(path) = &self.property_path {
            push_line(&mut out, "path", path);
        }
        for (key, value) in &self.constraint_params {
            push_line(&mut out, &format!("param.{}", key), value);
        }
        out
    }

    pub fn hash(&self) -> SignatureHash {
        let digest = Sha256::digest(self.canonical_form().as_bytes());
        SignatureHash(digest.into())
    }
}

impl fmt::Display for ViolationSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} on {}",
            crate::vocab::local_name(&self.shape_id),
            crate::vocab::local_name(&self.constraint_id),
            self.property_path
                .as_deref()
                .map(crate::vocab::local_name)
                .unwrap_or("<node>")
        )
    }
}

fn push_line(out: &mut String, key: &str, value: &str) {
    out.push_str(key);
    out.push('=');
    // One field per line.
    out.push_str(&rules::collapse_whitespace(value));
    out.push('\n');
}

/// Derives signatures with a configurable extraction table
#[derive(Debug, Clone, Default)]
pub struct SignatureCanonicalizer {
    table: ExtractionTable,
}

impl SignatureCanonicalizer {
    pub fn new(table: ExtractionTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &ExtractionTable {
        &self.table
    }

    /// Compute the signature of a record.
    ///
    /// Fails with `InvalidViolationRecord` when `shapeId` or `constraintId`
    /// is missing.
    pub fn canonicalize(&self, record: &ViolationRecord) -> Result<ViolationSignature> {
        record.validate()?;

        let signature = ViolationSignature {
            shape_id: record.shape_id.trim().to_string(),
            constraint_id: record.constraint_id.trim().to_string(),
            violation_type: record.violation_type,
            property_path: record.path().map(str::to_string),
            constraint_params: self.table.extract(record),
        };

        tracing::trace!(
            shape = %signature.shape_id,
            constraint = %signature.constraint_id,
            params = signature.constraint_params.len(),
            "Canonicalized violation"
        );

        Ok(signature)
    }
}

fn default_canonicalizer() -> &'static SignatureCanonicalizer {
    static CANONICALIZER: OnceLock<SignatureCanonicalizer> = OnceLock::new();
    CANONICALIZER.get_or_init(SignatureCanonicalizer::default)
}

/// Canonicalize with the built-in extraction table
pub fn canonicalize(record: &ViolationRecord) -> Result<ViolationSignature> {
    default_canonicalizer().canonicalize(record)
}

/// Parse a hex signature hash, mapping failures to `InvalidViolationRecord`
pub fn parse_hash(hex: &str) -> Result<SignatureHash> {
    hex.parse().map_err(ExplainError::invalid_record)
}
