//! Error types for the portal client.

/// Errors that can occur when talking to the marketplace portal.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// An HTTP request failed before producing a response (network error,
    /// timeout, TLS failure).
    #[error("request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    /// A URL could not be parsed or joined.
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    /// The portal returned a non-success status with a body snippet.
    #[error("request failed with status {status}")]
    HttpStatus { status: u16, body: String },
    /// The portal flagged the account as blocked during login.
    #[error("account is blocked by the portal")]
    AccountLocked,
    /// The portal rejected the RUT/password pair.
    #[error("login rejected: wrong RUT or password")]
    InvalidCredentials,
    /// The login flow did not reach the organism selection step.
    #[error("login failed: {0}")]
    Auth(String),
    /// The session expired and a single re-login did not restore it.
    #[error("session expired and could not be renewed")]
    SessionExpired,
    /// A page did not have the expected shape. The full body is carried so
    /// callers can dump it for diagnosis.
    #[error("unexpected page structure: {what}")]
    Structure { what: String, body: String },
}

impl Error {
    /// Whether a retry with backoff can plausibly succeed.
    ///
    /// Timeouts, connection failures, and server-side statuses (5xx, 429)
    /// are transient; auth and structural failures never are.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::RequestFailed(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Error::HttpStatus { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}
