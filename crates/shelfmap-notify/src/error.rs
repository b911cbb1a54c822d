use thiserror::Error;

/// Errors returned by the email provider client.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// Network or TLS failure from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered with a non-2xx status.
    #[error("provider rejected message ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("invalid notifier configuration: {0}")]
    InvalidConfig(String),
}
