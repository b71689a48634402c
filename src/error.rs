use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ScanError {
    #[error("Input file not found: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error("Input file contains no targets: {}", .0.display())]
    EmptyInput(PathBuf),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Browser launch failed: {0}")]
    BrowserLaunchFailed(String),

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Capture failed: {0}")]
    CaptureFailed(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ScanError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ScanError::Timeout(_))
    }

    /// Errors that abort a run before any worker starts.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ScanError::InputNotFound(_)
                | ScanError::EmptyInput(_)
                | ScanError::Configuration(_)
                | ScanError::BrowserLaunchFailed(_)
        )
    }
}

impl From<std::io::Error> for ScanError {
    fn from(err: std::io::Error) -> Self {
        ScanError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ScanError {
    fn from(err: serde_json::Error) -> Self {
        ScanError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for ScanError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            // reqwest does not report the elapsed budget
            ScanError::Timeout(Duration::ZERO)
        } else {
            ScanError::Network(err.to_string())
        }
    }
}

impl From<minijinja::Error> for ScanError {
    fn from(err: minijinja::Error) -> Self {
        ScanError::Template(err.to_string())
    }
}

impl From<url::ParseError> for ScanError {
    fn from(err: url::ParseError) -> Self {
        ScanError::InvalidUrl(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_message_carries_signature() {
        let err = ScanError::Timeout(Duration::from_secs(5));
        assert!(err.is_timeout());
        assert!(err.to_string().to_lowercase().contains("timeout"));
    }

    #[test]
    fn precondition_errors_are_fatal() {
        assert!(ScanError::InputNotFound(PathBuf::from("targets.txt")).is_fatal());
        assert!(ScanError::EmptyInput(PathBuf::from("targets.txt")).is_fatal());
        assert!(!ScanError::Navigation("net::ERR_NAME_NOT_RESOLVED".to_string()).is_fatal());
        assert!(!ScanError::Timeout(Duration::from_secs(1)).is_fatal());
    }
}
