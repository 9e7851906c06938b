//! Change detection for translated documents.
//!
//! The English output stores the SHA-256 of the Korean source it was made
//! from under `source_sha`. A document is retranslated only when the digest
//! of the current source differs.

use std::fmt;

use sha2::{Digest, Sha256};
use tracing::warn;

use crate::frontmatter;

/// Front matter key holding the source fingerprint in an EN output.
pub const SOURCE_SHA_KEY: &str = "source_sha";

/// Lowercase hex SHA-256 of a document's raw bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Digest of the full raw content, front matter and fences included.
    pub fn of(raw: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(raw.as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why a document has to be (re)translated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslateReason {
    /// No previous output exists.
    NoOutput,
    /// The previous output carries no `source_sha`.
    NoFingerprint,
    /// The previous output's front matter could not be parsed.
    MetadataUnreadable,
    /// The source changed since the previous output was made.
    Changed,
}

impl fmt::Display for TranslateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranslateReason::NoOutput => write!(f, "no output yet"),
            TranslateReason::NoFingerprint => write!(f, "output has no source_sha"),
            TranslateReason::MetadataUnreadable => write!(f, "output metadata unreadable"),
            TranslateReason::Changed => write!(f, "source changed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Up to date; no call is made.
    Skip,
    Translate(TranslateReason),
}

/// Decides whether `fingerprint` still matches the existing output, if any.
pub fn decide(fingerprint: &Fingerprint, existing_output: Option<&str>) -> GateDecision {
    let Some(existing) = existing_output else {
        return GateDecision::Translate(TranslateReason::NoOutput);
    };

    let fm = match frontmatter::split(existing) {
        Ok((fm, _)) => fm,
        Err(err) => {
            warn!(stage = "gate", error = %err, "existing output metadata unreadable, retranslating");
            return GateDecision::Translate(TranslateReason::MetadataUnreadable);
        }
    };

    match fm.get_str(SOURCE_SHA_KEY) {
        Some(stored) if stored == fingerprint.as_str() => GateDecision::Skip,
        Some(_) => GateDecision::Translate(TranslateReason::Changed),
        None => GateDecision::Translate(TranslateReason::NoFingerprint),
    }
}
