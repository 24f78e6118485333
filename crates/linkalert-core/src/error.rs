use thiserror::Error;

/// Application-wide error types for linkalert.
#[derive(Error, Debug)]
pub enum AppError {
    /// Analytics credentials are expired, revoked, or lack access to a profile.
    #[error("Authorization error: {0}")]
    AuthError(String),

    /// Network failure or provider-side outage worth retrying later.
    #[error("Transient error: {0}")]
    TransientError(String),

    /// Request timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Provider quota or rate limit exceeded.
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// Provider rejected the request for a non-transient reason.
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Seen-link or account storage failed.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Delivering the digest to one recipient failed.
    #[error("Notification to {recipient} failed: {message}")]
    NotificationError { recipient: String, message: String },

    /// Missing or malformed configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl AppError {
    /// Returns true if this error is transient and worth retrying on a later run.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::TransientError(_) | AppError::Timeout(_) | AppError::RateLimitExceeded
        )
    }

    /// Returns true if the credentials behind the traffic source are unusable.
    pub fn is_auth(&self) -> bool {
        matches!(self, AppError::AuthError(_))
    }
}
