//! Analysis records: the structured output of one detected exploit attempt.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use uuid::Uuid;

use crate::expr::DeobfuscationResult;
use crate::target::ResolvedTarget;

/// Where a retrieved artifact's bytes ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Storage {
    /// Bytes were held only for hashing and discarded.
    Transient,
    /// Bytes persist on disk under a digest-derived name.
    Persisted { path: PathBuf },
}

/// One remote object fetched (or attempted) during payload acquisition.
/// Bytes are never executed; they are hashed, optionally stored, and the
/// metadata is what gets reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetrievedArtifact {
    pub source_url: String,
    pub byte_length: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    pub storage: Storage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RetrievedArtifact {
    /// An artifact slot for a fetch that failed before producing bytes.
    #[must_use]
    pub fn failed(source_url: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            byte_length: 0,
            sha256: None,
            storage: Storage::Transient,
            error: Some(error.into()),
        }
    }
}

/// The complete, immutable account of one detected exploit attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisRecord {
    pub correlation_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub location: String,
    pub raw_payload: String,
    pub deobfuscated_payload: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<ResolvedTarget>,
    pub artifacts: Vec<RetrievedArtifact>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AnalysisRecord {
    /// Pure assembly, no I/O. Deterministic given inputs (the timestamp is
    /// taken once, at construction).
    #[must_use]
    pub fn build(
        correlation_id: Uuid,
        location: &str,
        deob: &DeobfuscationResult,
        target: Option<ResolvedTarget>,
        artifacts: Vec<RetrievedArtifact>,
        error: Option<String>,
    ) -> Self {
        Self {
            correlation_id,
            timestamp: Utc::now(),
            location: location.to_string(),
            raw_payload: deob.original.clone(),
            deobfuscated_payload: deob.flattened.clone(),
            truncated: deob.truncated,
            target,
            artifacts,
            error,
        }
    }
}
