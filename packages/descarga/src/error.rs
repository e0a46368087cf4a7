//! Error types for the bulk download client.
//!
//! Messages carry the underlying cause (fault text, HTTP status, parser
//! error) and never include key material or tokens.

use thiserror::Error;

/// Main error type for the bulk download client.
#[derive(Debug, Error)]
pub enum DescargaError {
    /// No supported encoding could decode the private key.
    #[error(
        "Unsupported or undecryptable private key: tried {tried}. \
         Check the key file and its passphrase"
    )]
    KeyFormat { tried: String },

    /// The key decoded but cannot produce a verifiable signature.
    #[error("Private key cannot sign: {0}")]
    KeySignCapability(String),

    /// Every transport attempt failed.
    #[error("Transport failed after {attempts} attempt(s): {last_cause}")]
    Transport { attempts: u32, last_cause: String },

    /// The authentication exchange failed or returned no token.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The service refused or garbled a download request submission.
    #[error("Download request creation failed: {0}")]
    RequestCreation(String),

    /// The service refused or garbled a verification call.
    #[error("Download request verification failed: {0}")]
    RequestVerification(String),

    /// The service refused a package download or returned nothing.
    #[error("Package download failed: {0}")]
    PackageDownload(String),

    /// The downloaded package is not a zip archive.
    #[error("Package {package_id} is not a zip archive")]
    InvalidPackageFormat { package_id: String },

    /// The requested period ends before it starts.
    #[error("Invalid date range: {start} is after {end}")]
    InvalidDateRange { start: String, end: String },

    /// Invalid RFC format.
    #[error("Invalid RFC format: '{0}'")]
    InvalidRfc(String),

    /// Invalid date format.
    #[error("Invalid date format: '{0}'. Expected YYYY-MM-DD (e.g., 2024-01-31)")]
    InvalidDate(String),

    /// A poll result would move a request backwards or out of a terminal state.
    #[error("Invalid state transition for request {id}: {from} -> {to}")]
    InvalidStateTransition { id: String, from: String, to: String },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization error.
    #[error("YAML serialization failed: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    /// A document inside a package could not be parsed.
    #[error("CFDI parsing failed: {0}")]
    Cfdi(#[from] sat_cfdi::CfdiError),
}

impl DescargaError {
    /// Whether retrying the same call could succeed.
    ///
    /// Only transport failures qualify; protocol and validation errors are
    /// deterministic.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

/// Result type alias for bulk download operations.
pub type Result<T> = std::result::Result<T, DescargaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_display() {
        let err = DescargaError::Transport {
            attempts: 3,
            last_cause: "Server error: 503 Service Unavailable".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Transport failed after 3 attempt(s): Server error: 503 Service Unavailable"
        );
        assert!(err.is_retryable());
    }

    #[test]
    fn test_protocol_errors_are_not_retryable() {
        assert!(!DescargaError::Authentication("fault".into()).is_retryable());
        assert!(!DescargaError::InvalidPackageFormat {
            package_id: "P1".into()
        }
        .is_retryable());
        assert!(!DescargaError::InvalidRfc("x".into()).is_retryable());
    }

    #[test]
    fn test_key_format_display_hints_at_passphrase() {
        let err = DescargaError::KeyFormat {
            tried: "PKCS#8 encrypted DER, PKCS#8 DER".into(),
        };
        assert_eq!(
            err.to_string(),
            "Unsupported or undecryptable private key: tried PKCS#8 encrypted DER, PKCS#8 DER. \
             Check the key file and its passphrase"
        );
    }

    #[test]
    fn test_state_transition_display() {
        let err = DescargaError::InvalidStateTransition {
            id: "abc".into(),
            from: "Completed".into(),
            to: "InProgress".into(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid state transition for request abc: Completed -> InProgress"
        );
    }
}
