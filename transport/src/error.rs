use thiserror::Error;

/// Failures surfaced by a [`crate::session::SessionHandle`] to whoever
/// issued a request through it.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("connection lost before a response arrived")]
    ConnectionLost,

    #[error("malformed frame: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("no response within the request timeout")]
    Timeout,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
