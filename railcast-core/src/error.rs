use thiserror::Error;

/// Why a single prediction endpoint attempt did not produce a value.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AttemptError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("undecodable response: {0}")]
    Decode(String),
}

/// One failed attempt, kept so callers can log it even when a later
/// candidate succeeds.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{endpoint}: {reason}")]
pub struct AttemptFailure {
    pub endpoint: String,
    pub reason: AttemptError,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Request to {url} failed")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} responded with status {status}: {body}")]
    Service { url: String, status: u16, body: String },

    #[error("Unexpected response shape from {origin}: {message}")]
    DataShape { origin: String, message: String },

    #[error("All {} prediction endpoints failed: {}", .0.len(), join_attempts(.0))]
    EndpointsExhausted(Vec<AttemptFailure>),
}

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Error::Configuration(message.into())
    }

    pub fn shape(origin: impl Into<String>, message: impl Into<String>) -> Self {
        Error::DataShape {
            origin: origin.into(),
            message: message.into(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

fn join_attempts(attempts: &[AttemptFailure]) -> String {
    attempts
        .iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() > MAX {
        let mut end = MAX;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &body[..end])
    } else {
        body.to_string()
    }
}
