use std::fmt;

/// Errors produced while enriching a batch of points.
#[derive(Debug, Clone)]
pub enum EnrichError {
    /// Invalid or expired credential. Fatal to the whole batch: every point
    /// needs the same token, so nothing useful can be produced after this.
    Auth(String),
    /// Network-level failure: connect error, timeout, or a non-success HTTP
    /// status from the remote service.
    Transport(String),
    /// The remote service answered, but the payload did not have the
    /// expected shape.
    ResponseFormat(String),
    /// Invalid client or enrichment configuration. Raised before any
    /// request is sent.
    Config(String),
}

impl fmt::Display for EnrichError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnrichError::Auth(msg) => write!(f, "Authentication error: {}", msg),
            EnrichError::Transport(msg) => write!(f, "Transport error: {}", msg),
            EnrichError::ResponseFormat(msg) => write!(f, "Response format error: {}", msg),
            EnrichError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for EnrichError {}

impl EnrichError {
    /// Whether the error invalidates the credential shared by the batch.
    pub fn is_auth(&self) -> bool {
        matches!(self, EnrichError::Auth(_))
    }

    /// Whether a request may be retried after this error. Only transient
    /// transport failures qualify; auth and config errors never recover on
    /// their own, and a malformed body will be malformed again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EnrichError::Transport(_))
    }
}
