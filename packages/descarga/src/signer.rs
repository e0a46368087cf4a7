//! WS-Security timestamp signing for the authentication call.
//!
//! The service verifies an XML signature over the `u:Timestamp` element.
//! Both the timestamp and the `SignedInfo` are rendered from fixed compact
//! templates, and the envelope embeds exactly the bytes that were hashed.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};
use sha1::{Digest, Sha1};
use uuid::Uuid;

use crate::error::{DescargaError, Result};
use crate::keys::SigningKey;

/// Timestamp element, referenced by the signature as `#_0`.
pub fn timestamp_xml(created: &str, expires: &str) -> String {
    format!(
        r#"<u:Timestamp u:Id="_0"><u:Created>{created}</u:Created><u:Expires>{expires}</u:Expires></u:Timestamp>"#
    )
}

/// `SignedInfo` element for a given timestamp digest.
pub fn signed_info_xml(digest_value: &str) -> String {
    format!(
        concat!(
            r#"<SignedInfo>"#,
            r#"<CanonicalizationMethod Algorithm="http://www.w3.org/2001/10/xml-exc-c14n#"/>"#,
            r#"<SignatureMethod Algorithm="http://www.w3.org/2000/09/xmldsig#rsa-sha1"/>"#,
            r##"<Reference URI="#_0">"##,
            r#"<Transforms><Transform Algorithm="http://www.w3.org/2001/10/xml-exc-c14n#"/></Transforms>"#,
            r#"<DigestMethod Algorithm="http://www.w3.org/2000/09/xmldsig#sha1"/>"#,
            r#"<DigestValue>{digest}</DigestValue>"#,
            r#"</Reference>"#,
            r#"</SignedInfo>"#,
        ),
        digest = digest_value
    )
}

/// Format an instant as ISO-8601 UTC with milliseconds (`2024-01-01T00:00:00.000Z`).
pub fn format_instant(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Validity window of a security header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecurityTimestamp {
    pub created: DateTime<Utc>,
    pub expires: DateTime<Utc>,
}

impl SecurityTimestamp {
    /// A window opening at `created`.
    ///
    /// # Errors
    /// Returns `Config` when `window` does not fit a date offset.
    pub fn starting_at(created: DateTime<Utc>, window: Duration) -> Result<Self> {
        let window = chrono::Duration::from_std(window)
            .map_err(|e| DescargaError::Config(format!("invalid timestamp window: {e}")))?;
        let expires = created
            .checked_add_signed(window)
            .ok_or_else(|| DescargaError::Config("timestamp window overflows".into()))?;
        Ok(Self { created, expires })
    }

    /// A window opening now.
    pub fn now(window: Duration) -> Result<Self> {
        Self::starting_at(Utc::now(), window)
    }
}

/// Digest and signature for one authentication call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTimestamp {
    pub created: String,
    pub expires: String,
    pub digest_value: String,
    pub signature_value: String,

    /// Fresh per call; sent as the `ActivityId` correlation id.
    pub correlation_id: Uuid,
}

/// Sign a security timestamp.
///
/// Digest and signature are deterministic for the same timestamp and key
/// (PKCS#1 v1.5 padding has no randomness); only the correlation id varies.
pub fn sign_timestamp(key: &SigningKey, timestamp: &SecurityTimestamp) -> Result<SignedTimestamp> {
    let created = format_instant(timestamp.created);
    let expires = format_instant(timestamp.expires);

    let digest_value = STANDARD.encode(Sha1::digest(timestamp_xml(&created, &expires)));
    let signature = key.sign_sha1(signed_info_xml(&digest_value).as_bytes())?;

    Ok(SignedTimestamp {
        created,
        expires,
        digest_value,
        signature_value: STANDARD.encode(signature),
        correlation_id: Uuid::new_v4(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::load_signing_key;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    const KEY: &[u8] = include_bytes!("../tests/fixtures/key_pkcs1.pem");

    /// Signature of the 2024-01-01T00:00:00.000Z window, computed with
    /// `openssl dgst -sha1 -sign` over the same SignedInfo bytes.
    const EXPECTED_SIGNATURE: &str = "ZS0YdOAZENw2WcT9ANfudeqc3ulzKw105AepOSBzUj1Pef+zdz6ViJeqeN6oY29DucOR0Fd4UDtuzolVCPpzCZlOirqo7Di0oC095uchK+Vhtkk9Mta5CW3h90AwOKJGkx+l5qPJ8RgAiM+8nqtEnNS56ewfFEdk3sZlvZaU0W6xjxetHyOXLeuAelGa9Ax4uZevwegLtwyPWhjGY0eQ8+X6C9HVwq1kgiy/5zuHaDH1aW9nhB/+2bS5RLl7G8Sxnx8U8Du7XpUAz0vSSY0Gs8fQkrefSXaQuf5kdG3zQ7pK7xBCj50pU7yhoHUsiJoe9uxMlPZ10BORvB/lOVrduQ==";

    fn new_year() -> SecurityTimestamp {
        let created = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        SecurityTimestamp::starting_at(created, Duration::from_secs(300)).unwrap()
    }

    #[test]
    fn test_instant_format_has_millis_and_z() {
        let instant = Utc.with_ymd_and_hms(2024, 3, 5, 7, 8, 9).unwrap();
        assert_eq!(format_instant(instant), "2024-03-05T07:08:09.000Z");
    }

    #[test]
    fn test_timestamp_template() {
        assert_eq!(
            timestamp_xml("A", "B"),
            r#"<u:Timestamp u:Id="_0"><u:Created>A</u:Created><u:Expires>B</u:Expires></u:Timestamp>"#
        );
    }

    #[test]
    fn test_signed_info_template() {
        assert_eq!(
            signed_info_xml("DIGEST"),
            "<SignedInfo><CanonicalizationMethod Algorithm=\"http://www.w3.org/2001/10/xml-exc-c14n#\"/><SignatureMethod Algorithm=\"http://www.w3.org/2000/09/xmldsig#rsa-sha1\"/><Reference URI=\"#_0\"><Transforms><Transform Algorithm=\"http://www.w3.org/2001/10/xml-exc-c14n#\"/></Transforms><DigestMethod Algorithm=\"http://www.w3.org/2000/09/xmldsig#sha1\"/><DigestValue>DIGEST</DigestValue></Reference></SignedInfo>"
        );
    }

    #[test]
    fn test_known_digest_and_signature() {
        let key = load_signing_key(KEY, "").unwrap();
        let signed = sign_timestamp(&key, &new_year()).unwrap();

        assert_eq!(signed.created, "2024-01-01T00:00:00.000Z");
        assert_eq!(signed.expires, "2024-01-01T00:05:00.000Z");
        assert_eq!(signed.digest_value, "wOon46X9g3rmx4hq1kXkDJkBoTM=");
        assert_eq!(signed.signature_value, EXPECTED_SIGNATURE);
    }

    #[test]
    fn test_signing_is_deterministic() {
        let key = load_signing_key(KEY, "").unwrap();
        let first = sign_timestamp(&key, &new_year()).unwrap();
        let second = sign_timestamp(&key, &new_year()).unwrap();

        assert_eq!(first.digest_value, second.digest_value);
        assert_eq!(first.signature_value, second.signature_value);
        assert_ne!(first.correlation_id, second.correlation_id);
    }
}
