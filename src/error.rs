//! Error taxonomy for the retrieval pipeline.
//!
//! Per-record problems ([`Error::MalformedRecord`]) are absorbed by the
//! corpus builder; everything else propagates to the caller as a typed
//! outcome. "No relevant match" is not an error and has no variant here:
//! see [`SearchOutcome::NoMatch`](crate::search::SearchOutcome::NoMatch).

use thiserror::Error;

/// Errors produced by the pipeline and its external collaborators.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum Error {
    /// The knowledge base is unreachable or rejected our credentials.
    ///
    /// Fatal to the rebuild in progress. A previously built index, if any,
    /// stays installed.
    #[error("knowledge base fetch failed: {0}")]
    FetchFailure(String),

    /// A single record could not be read or decoded.
    #[error("malformed record {record_id}: {reason}")]
    MalformedRecord { record_id: String, reason: String },

    /// The corpus is non-empty but contains no indexable text.
    #[error("corpus produced no n-gram features")]
    EmptyVocabulary,

    /// The downstream generator failed (quota, network, bad response).
    #[error("generation failed: {0}")]
    GenerationFailure(String),

    /// Invalid runtime parameters (e.g. an inverted n-gram range).
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Shorthand for [`Error::MalformedRecord`].
    pub fn malformed(record_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::MalformedRecord {
            record_id: record_id.into(),
            reason: reason.into(),
        }
    }

    /// Machine-readable code used by the HTTP layer and CLI.
    pub fn code(&self) -> &'static str {
        match self {
            Error::FetchFailure(_) => "fetch_failure",
            Error::MalformedRecord { .. } => "malformed_record",
            Error::EmptyVocabulary => "empty_vocabulary",
            Error::GenerationFailure(_) => "generation_failure",
            Error::Config(_) => "invalid_config",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
