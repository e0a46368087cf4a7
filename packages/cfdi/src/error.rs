//! Error types for CFDI parsing.
//!
//! Only input that is not XML at all is an error. Unsupported schema
//! versions and missing optional nodes degrade to `None` or empty fields.

use thiserror::Error;

/// Main error type for the CFDI parser.
#[derive(Debug, Error)]
pub enum CfdiError {
    /// The input is not well-formed XML.
    #[error("XML parsing failed: {0}")]
    XmlParse(#[from] roxmltree::Error),
}

/// Result type alias for CFDI operations.
pub type Result<T> = std::result::Result<T, CfdiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_keeps_cause() {
        let err = CfdiError::from(roxmltree::Document::parse("<a>").unwrap_err());
        assert!(err.to_string().starts_with("XML parsing failed:"));
    }
}
