//! Taxpayer credential (e.firma): certificate, private key and passphrase.

use std::fmt;
use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use zeroize::Zeroizing;

use crate::config::validate_rfc;
use crate::error::{DescargaError, Result};

const PEM_CERT_BEGIN: &str = "-----BEGIN CERTIFICATE-----";
const PEM_CERT_END: &str = "-----END CERTIFICATE-----";

/// The holder's certificate and private key, owned by one client session.
///
/// Key bytes and passphrase are wiped on drop. `Debug` never prints them.
pub struct Credential {
    certificate_der: Vec<u8>,
    private_key: Zeroizing<Vec<u8>>,
    passphrase: Zeroizing<String>,
    rfc: String,
}

impl Credential {
    /// Build a credential from in-memory material.
    ///
    /// A PEM certificate is normalized to DER.
    ///
    /// # Errors
    /// Returns `InvalidRfc` for a malformed RFC and `Config` for a PEM
    /// certificate whose body is not base64.
    pub fn new(
        certificate: impl Into<Vec<u8>>,
        private_key: impl Into<Vec<u8>>,
        passphrase: impl Into<String>,
        rfc: impl Into<String>,
    ) -> Result<Self> {
        let rfc = rfc.into().trim().to_uppercase();
        validate_rfc(&rfc)?;

        Ok(Self {
            certificate_der: certificate_to_der(certificate.into())?,
            private_key: Zeroizing::new(private_key.into()),
            passphrase: Zeroizing::new(passphrase.into()),
            rfc,
        })
    }

    /// Read the `.cer` and `.key` files of an e.firma.
    pub fn from_files(
        certificate_path: &Path,
        key_path: &Path,
        passphrase: impl Into<String>,
        rfc: impl Into<String>,
    ) -> Result<Self> {
        let certificate = std::fs::read(certificate_path)?;
        let private_key = std::fs::read(key_path)?;
        Self::new(certificate, private_key, passphrase, rfc)
    }

    /// DER-encoded X.509 certificate.
    pub fn certificate_der(&self) -> &[u8] {
        &self.certificate_der
    }

    /// Certificate as embedded in the `BinarySecurityToken`.
    pub fn certificate_base64(&self) -> String {
        STANDARD.encode(&self.certificate_der)
    }

    pub fn private_key(&self) -> &[u8] {
        &self.private_key
    }

    pub fn passphrase(&self) -> &str {
        &self.passphrase
    }

    /// Requester RFC, upper-cased.
    pub fn rfc(&self) -> &str {
        &self.rfc
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("rfc", &self.rfc)
            .field("certificate_len", &self.certificate_der.len())
            .field("private_key", &"<redacted>")
            .field("passphrase", &"<redacted>")
            .finish()
    }
}

fn certificate_to_der(bytes: Vec<u8>) -> Result<Vec<u8>> {
    let Ok(text) = std::str::from_utf8(&bytes) else {
        return Ok(bytes);
    };
    let Some(start) = text.find(PEM_CERT_BEGIN) else {
        return Ok(bytes);
    };

    let body = &text[start + PEM_CERT_BEGIN.len()..];
    let body = body.find(PEM_CERT_END).map_or(body, |end| &body[..end]);
    let compact: String = body.chars().filter(|c| !c.is_whitespace()).collect();

    STANDARD
        .decode(compact)
        .map_err(|e| DescargaError::Config(format!("PEM certificate is not valid base64: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const RFC: &str = "GOGR810728TV5";

    #[test]
    fn test_der_certificate_kept_as_is() {
        let credential = Credential::new(vec![0x30, 0x82, 0x01], vec![1, 2], "pw", RFC).unwrap();
        assert_eq!(credential.certificate_der(), &[0x30, 0x82, 0x01]);
        assert_eq!(credential.certificate_base64(), "MIIB");
    }

    #[test]
    fn test_pem_certificate_normalized_to_der() {
        let pem = format!("{PEM_CERT_BEGIN}\nMIIB\nAQID\n{PEM_CERT_END}\n");
        let credential = Credential::new(pem, vec![], "", RFC).unwrap();
        assert_eq!(credential.certificate_der(), &[0x30, 0x82, 0x01, 0x01, 0x02, 0x03]);
    }

    #[test]
    fn test_pem_and_der_fixtures_agree() {
        let der = include_bytes!("../tests/fixtures/certificate.cer");
        let pem = include_bytes!("../tests/fixtures/certificate.pem");

        let from_der = Credential::new(der.as_slice(), vec![], "", RFC).unwrap();
        let from_pem = Credential::new(pem.as_slice(), vec![], "", RFC).unwrap();
        assert_eq!(from_der.certificate_der(), from_pem.certificate_der());
    }

    #[test]
    fn test_rfc_is_normalized_and_validated() {
        let credential = Credential::new(vec![0x30], vec![], "", " gogr810728tv5 ").unwrap();
        assert_eq!(credential.rfc(), RFC);

        let err = Credential::new(vec![0x30], vec![], "", "NOT-AN-RFC").unwrap_err();
        assert!(matches!(err, DescargaError::InvalidRfc(_)));
    }

    #[test]
    fn test_debug_is_redacted() {
        let credential =
            Credential::new(vec![0x30], b"SECRETKEY".to_vec(), "hunter2", RFC).unwrap();
        let debug = format!("{credential:?}");
        assert!(debug.contains(RFC));
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("SECRETKEY"));
        assert!(!debug.contains("83, 69, 67"));
    }

    #[test]
    fn test_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let cer = dir.path().join("cert.cer");
        let key = dir.path().join("key.key");
        std::fs::write(&cer, [0x30, 0x01]).unwrap();
        std::fs::write(&key, [0x30, 0x02]).unwrap();

        let credential = Credential::from_files(&cer, &key, "pw", RFC).unwrap();
        assert_eq!(credential.private_key(), &[0x30, 0x02]);
        assert_eq!(credential.passphrase(), "pw");
    }
}
