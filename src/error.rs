//! Error types shared by the lifecycle layer
//!
//! Scenario code works with `anyhow`; everything that talks to the cluster or
//! to the identity provider returns this typed error so callers can tell a
//! timeout from a rejected document.

use std::time::Duration;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum Error {
    /// A polled condition never reached the expected value
    #[error("{what} did not get ready within {}s, last observed: {last_observed}", waited.as_secs())]
    NotReady {
        what: String,
        waited: Duration,
        last_observed: String,
    },

    #[error("{kind} {name} not found")]
    NotFound { kind: String, name: String },

    /// The API server refused the request
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    #[error("{kind} {name} kept conflicting after {attempts} attempts")]
    Conflict {
        kind: String,
        name: String,
        attempts: u32,
    },

    #[error("{dependency} is unavailable: {reason}")]
    DependencyUnavailable { dependency: String, reason: String },

    #[error("Keycloak returned {status}: {body}")]
    Keycloak { status: u16, body: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Prerequisites of a scenario are not met
    #[error("skipped: {0}")]
    Skipped(String),
}

impl Error {
    pub fn not_ready(what: impl Into<String>, waited: Duration, last: impl Into<String>) -> Self {
        Error::NotReady {
            what: what.into(),
            waited,
            last_observed: last.into(),
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Error::Skipped(reason.into())
    }

    /// HTTP status code of an API server rejection, if any
    pub fn api_code(&self) -> Option<u16> {
        match self {
            Error::Api(kube::Error::Api(response)) => Some(response.code),
            _ => None,
        }
    }
}

/// Status code carried by a raw kube error
pub fn kube_code(err: &kube::Error) -> Option<u16> {
    match err {
        kube::Error::Api(response) => Some(response.code),
        _ => None,
    }
}
