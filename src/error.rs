use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Unexpected HTTP status: {0}")]
    HttpStatus(u16),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Pattern error: {0}")]
    Pattern(String),
}

impl Error {
    /// True for failures that happened below the protocol layer
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::HttpStatus(_))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Timeout(err.to_string())
        } else {
            Error::Transport(err.to_string())
        }
    }
}

// A payload we could not decode is a shape mismatch, not a local bug.
impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Protocol(format!("malformed JSON payload: {}", err))
    }
}

// Every URL we parse came from the server
impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::Protocol(format!("bad URL from server: {}", err))
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        Error::Timeout(err.to_string())
    }
}
