//! Error types for the relay subsystem.

use thiserror::Error;

/// Errors that can occur in the relay subsystem.
#[derive(Debug, Error)]
pub enum RelayError {
    /// A value could not be serialized or parsed by the codec.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// A remote action description could not be turned into an action.
    #[error("{msg}")]
    Evaluation {
        /// Error message describing the failure.
        msg: String,
    },

    /// The wrapped reducer failed while computing a state.
    #[error("{msg}")]
    Reducer {
        /// Error message returned by the reducer.
        msg: String,
    },

    /// No instance is registered under the given identifier.
    #[error("unknown instance: {id}")]
    UnknownInstance {
        /// The unknown instance identifier.
        id: String,
    },

    /// The transport's receiving side has gone away.
    #[error("transport closed")]
    TransportClosed,

    /// A whitelist/blacklist pattern is not a valid regular expression.
    #[error("invalid action filter: {0}")]
    InvalidFilter(#[from] regex::Error),

    /// An action or lifted action has the wrong shape.
    #[error("invalid action: {msg}")]
    InvalidAction {
        /// Error message describing the problem.
        msg: String,
    },
}

impl RelayError {
    /// Shorthand for an [`RelayError::Evaluation`] error.
    pub fn evaluation(msg: impl Into<String>) -> Self {
        RelayError::Evaluation { msg: msg.into() }
    }

    /// Shorthand for an [`RelayError::InvalidAction`] error.
    pub fn invalid_action(msg: impl Into<String>) -> Self {
        RelayError::InvalidAction { msg: msg.into() }
    }
}
