//! Engine failure taxonomy.
//!
//! Discovery and fetch are best-effort: their per-group and per-kind failures
//! surface as warnings, not errors. These variants are the fatal ends of the
//! pipeline, each mapped to a process exit code.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// No API groups could be listed at all.
    #[error("discovery failed: {0}")]
    DiscoveryUnavailable(String),

    /// No objects of any kind could be fetched.
    #[error("no objects could be fetched from the cluster")]
    FetchFailed,

    /// The root reference matched nothing in the fetched set.
    #[error("no object found matching {0}")]
    RootNotFound(String),

    /// The root reference matched more than one object.
    #[error("ambiguous reference {0}: matches {1}")]
    AmbiguousRoot(String, String),

    /// No Helm storage record for the release in the target namespace.
    #[error("helm release {release:?} not found in namespace {namespace:?}")]
    HelmReleaseNotFound { release: String, namespace: String },

    /// The storage record exists but its payload could not be decoded.
    #[error("failed to decode helm release record {record}: {reason}")]
    HelmReleaseDecodeFailed { record: String, reason: String },

    /// An adjacency references a UID missing from the node map. Defensive;
    /// indicates a bug in graph construction.
    #[error("graph adjacency references unknown uid {0}")]
    InconsistentGraph(String),

    /// The caller's cancellation signal fired.
    #[error("canceled")]
    Canceled,
}

impl EngineError {
    /// Process exit code for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            EngineError::RootNotFound(_) | EngineError::HelmReleaseNotFound { .. } => 1,
            EngineError::AmbiguousRoot(..) => 2,
            EngineError::DiscoveryUnavailable(_) => 3,
            EngineError::Canceled => 4,
            EngineError::FetchFailed
            | EngineError::HelmReleaseDecodeFailed { .. }
            | EngineError::InconsistentGraph(_) => 1,
        }
    }
}
