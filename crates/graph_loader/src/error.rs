//! src/error.rs
//!
//! Error taxonomy for the loader pipeline.
//!
//! Everything fallible in this crate returns `anyhow::Result`. The variants below
//! are what gets wrapped inside the `anyhow::Error`, so callers that need to branch
//! on the failure class can `downcast_ref::<LoaderError>()` and look at
//! [`LoaderError::category`].

use thiserror::Error;

/// Broad class of a [`LoaderError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad loader definition. Raised at construction or decode time, never retried.
    Configuration,
    /// The database or the broker refused or failed a request. Fatal to the pass.
    Remote,
    /// A peer sent something the pipeline cannot interpret. Fatal to the pass.
    Protocol,
    /// Worker threads misbehaved (panic, stall).
    Runtime,
}

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("attribute(s) {missing:?} not available for vertex type {vertex_type}")]
    InvalidAttribute {
        vertex_type: String,
        missing: Vec<String>,
    },

    #[error("string type not allowed for input and output features (column '{0}')")]
    StringFeature(String),

    #[error("unsupported output format '{0}'")]
    UnsupportedOutput(String),

    #[error("{backend} support is not compiled in; enable the '{feature}' feature")]
    MissingBackend {
        backend: &'static str,
        feature: &'static str,
    },

    #[error("invalid loader configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to install query: {0}")]
    QueryInstall(String),

    #[error("error generating data. Query {0}")]
    QueryFailed(String),

    #[error("error writing to broker: {0}")]
    BrokerDelivery(String),

    #[error("failed to create topic {topic} at {address} (error code {code})")]
    TopicCreate {
        topic: String,
        address: String,
        code: i32,
    },

    #[error("failed to delete topic {topic} (error code {code})")]
    TopicDelete { topic: String, code: i32 },

    #[error("unrecognized key {0} for messages in broker")]
    UnrecognizedKey(String),

    #[error("payload does not match the loader's raw format: {0}")]
    PayloadShape(String),

    #[error("worker thread '{0}' panicked")]
    WorkerPanicked(String),

    #[error("no batch received within {0:?}")]
    Timeout(std::time::Duration),
}

impl LoaderError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            LoaderError::InvalidAttribute { .. }
            | LoaderError::StringFeature(_)
            | LoaderError::UnsupportedOutput(_)
            | LoaderError::MissingBackend { .. }
            | LoaderError::InvalidConfig(_) => ErrorCategory::Configuration,
            LoaderError::QueryInstall(_)
            | LoaderError::QueryFailed(_)
            | LoaderError::BrokerDelivery(_)
            | LoaderError::TopicCreate { .. }
            | LoaderError::TopicDelete { .. } => ErrorCategory::Remote,
            LoaderError::UnrecognizedKey(_) | LoaderError::PayloadShape(_) => {
                ErrorCategory::Protocol
            }
            LoaderError::WorkerPanicked(_) | LoaderError::Timeout(_) => ErrorCategory::Runtime,
        }
    }
}

/// Returns the [`LoaderError`] carried by an `anyhow::Error`, if any.
///
/// Looks through the whole context chain, so errors wrapped with `.context(..)`
/// on their way up are still recognised.
pub fn loader_error(err: &anyhow::Error) -> Option<&LoaderError> {
    err.chain().find_map(|cause| cause.downcast_ref::<LoaderError>())
}

#[cfg(test)]
mod error_test {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_category_survives_context() {
        let err: anyhow::Result<()> = Err(LoaderError::UnrecognizedKey("foo:1".into()))
            .context("Downloader failed");
        let err = err.unwrap_err();

        let inner = loader_error(&err).expect("loader error in chain");
        assert_eq!(inner.category(), ErrorCategory::Protocol);
        assert!(err.to_string().contains("Downloader failed"));
    }

    #[test]
    fn test_categories() {
        assert_eq!(
            LoaderError::StringFeature("name".into()).category(),
            ErrorCategory::Configuration
        );
        assert_eq!(
            LoaderError::TopicDelete {
                topic: "t".into(),
                code: 3
            }
            .category(),
            ErrorCategory::Remote
        );
        assert_eq!(
            LoaderError::WorkerPanicked("reader".into()).category(),
            ErrorCategory::Runtime
        );
    }
}
