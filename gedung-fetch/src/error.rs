use std::error::Error as StdError;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP request failed: {}", source_chain(.0))]
    HttpError(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Image decode failed: {0}")]
    DecodeError(#[from] image::ImageError),
}

impl FetchError {
    /// True when the request gave up because the timeout elapsed.
    pub fn is_timeout(&self) -> bool {
        match self {
            FetchError::Timeout(_) => true,
            FetchError::HttpError(e) => e.is_timeout(),
            _ => false,
        }
    }
}

/// reqwest's own message only names the URL; the cause (refused, reset,
/// DNS) lives further down the source chain.
fn source_chain(err: &reqwest::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}

pub type Result<T> = std::result::Result<T, FetchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_display_names_the_limit() {
        let err = FetchError::Timeout(Duration::from_millis(300));
        assert_eq!(err.to_string(), "Request timed out after 300ms");
        assert!(err.is_timeout());
    }

    #[test]
    fn test_invalid_url_is_not_timeout() {
        assert!(!FetchError::InvalidUrl("x".to_string()).is_timeout());
    }
}
