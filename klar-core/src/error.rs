//! Error types for klar.
//!
//! All errors use `thiserror` for ergonomic error handling and proper error chains.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for klar operations.
pub type Result<T> = std::result::Result<T, KlarError>;

/// Main error type for klar.
#[derive(Error, Debug)]
pub enum KlarError {
    // Configuration errors
    #[error("{name} must be provided")]
    MissingRequired { name: String },

    #[error("{name} value {value:?} is not supported, only support {allowed:?}")]
    InvalidEnumValue { name: String, value: String, allowed: Vec<String> },

    #[error("{name} value {value:?} is not a valid {expected}")]
    InvalidSetting { name: String, value: String, expected: &'static str },

    // Credential errors
    #[error("Malformed image pull secret: {reason}")]
    MalformedPullSecret { reason: String },

    #[error("Invalid image reference {image:?}: {reason}")]
    InvalidImageReference { image: String, reason: String },

    #[error(
        "Failed to get secret docker credentials for {image}: expected exactly one matching entry, found {matches}"
    )]
    CredentialLookup { image: String, matches: usize },

    // Registry errors
    #[error("Failed to pull image {image}: {reason}")]
    PullFailed { image: String, reason: String },

    #[error("Failed to pull fsLayers for {image}: image has no filesystem layers")]
    NoFsLayers { image: String },

    #[error("Failed to fetch layer commands for {image}: {reason}")]
    LayerCommands { image: String, reason: String },

    // Analysis service errors
    #[error("Failed to analyze {image} using API: {reason}")]
    ScannerFailed { image: String, reason: String },

    #[error("{operation} timed out after {}s", timeout.as_secs())]
    Timeout { operation: String, timeout: Duration, kind: ErrorKind },

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Coarse classification of a [`KlarError`], one per pipeline concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Config,
    Credential,
    Reference,
    Pull,
    LayerExtraction,
    Scanner,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Config => "config",
            ErrorKind::Credential => "credential",
            ErrorKind::Reference => "reference",
            ErrorKind::Pull => "pull",
            ErrorKind::LayerExtraction => "layer_extraction",
            ErrorKind::Scanner => "scanner",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl KlarError {
    /// Create an Internal error from any error type.
    pub fn internal(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Internal(err.to_string())
    }

    /// Which concern raised this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            KlarError::MissingRequired { .. }
            | KlarError::InvalidEnumValue { .. }
            | KlarError::InvalidSetting { .. } => ErrorKind::Config,
            KlarError::MalformedPullSecret { .. } | KlarError::CredentialLookup { .. } => {
                ErrorKind::Credential
            }
            KlarError::InvalidImageReference { .. } => ErrorKind::Reference,
            KlarError::PullFailed { .. } => ErrorKind::Pull,
            KlarError::NoFsLayers { .. } | KlarError::LayerCommands { .. } => {
                ErrorKind::LayerExtraction
            }
            KlarError::ScannerFailed { .. } => ErrorKind::Scanner,
            KlarError::Timeout { kind, .. } => *kind,
            KlarError::Internal(_) | KlarError::Other(_) => ErrorKind::Internal,
        }
    }

    /// Everything except an analysis-service failure aborts the scan.
    pub fn is_fatal(&self) -> bool {
        self.kind() != ErrorKind::Scanner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_classification() {
        let err = KlarError::MissingRequired { name: "CLAIR_ADDR".into() };
        assert_eq!(err.kind(), ErrorKind::Config);
        assert!(err.is_fatal());

        let err = KlarError::CredentialLookup { image: "docker.io/library/nginx".into(), matches: 2 };
        assert_eq!(err.kind(), ErrorKind::Credential);

        let err = KlarError::NoFsLayers { image: "nginx".into() };
        assert_eq!(err.kind(), ErrorKind::LayerExtraction);

        let err = KlarError::ScannerFailed { image: "nginx".into(), reason: "refused".into() };
        assert_eq!(err.kind(), ErrorKind::Scanner);
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_timeout_carries_stage_kind() {
        let err = KlarError::Timeout {
            operation: "Clair analysis".into(),
            timeout: Duration::from_secs(60),
            kind: ErrorKind::Scanner,
        };
        assert!(!err.is_fatal());
        assert_eq!(err.to_string(), "Clair analysis timed out after 60s");

        let err = KlarError::Timeout {
            operation: "Registry pull".into(),
            timeout: Duration::from_secs(60),
            kind: ErrorKind::Pull,
        };
        assert!(err.is_fatal());
    }

    #[test]
    fn test_invalid_enum_value_names_allowed_set() {
        let err = KlarError::InvalidEnumValue {
            name: "CLAIR_OUTPUT".into(),
            value: "banana".into(),
            allowed: vec!["Unknown".into(), "Low".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("banana"));
        assert!(msg.contains("Unknown"));
        assert!(msg.contains("Low"));
    }
}
