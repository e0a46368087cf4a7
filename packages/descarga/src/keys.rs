//! Private key loading.
//!
//! SAT issues e.firma keys as DER-encoded, password-protected PKCS#8
//! (PBES2, PBKDF2 with HMAC-SHA1, DES-EDE3-CBC), but users routinely convert
//! them with OpenSSL into one of the PEM variants. The loader tries each
//! known encoding in a fixed order and keeps the first that decodes.

use std::fmt;

use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::{Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use sha1::{Digest, Sha1};

use crate::error::{DescargaError, Result};

/// ASN.1 SEQUENCE tag; every DER private key starts with it.
const DER_SEQUENCE_TAG: u8 = 0x30;

const SIGN_PROBE: &[u8] = b"sat-descarga signing probe";

/// One private key encoding.
pub trait KeyDecoder: Send + Sync {
    /// Short name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Decode `bytes`, or `None` when they are not in this encoding (or the
    /// passphrase does not decrypt them).
    fn decode(&self, bytes: &[u8], passphrase: &str) -> Option<RsaPrivateKey>;
}

fn pem_text(bytes: &[u8], label: &str) -> Option<String> {
    let text = std::str::from_utf8(bytes).ok()?;
    let begin = format!("-----BEGIN {label}-----");
    let start = text.find(&begin)?;
    Some(text[start..].trim().to_string())
}

fn is_der(bytes: &[u8]) -> bool {
    bytes.first() == Some(&DER_SEQUENCE_TAG)
}

/// PEM `ENCRYPTED PRIVATE KEY`.
pub struct EncryptedPkcs8Pem;

impl KeyDecoder for EncryptedPkcs8Pem {
    fn name(&self) -> &'static str {
        "PKCS#8 encrypted PEM"
    }

    fn decode(&self, bytes: &[u8], passphrase: &str) -> Option<RsaPrivateKey> {
        let pem = pem_text(bytes, "ENCRYPTED PRIVATE KEY")?;
        RsaPrivateKey::from_pkcs8_encrypted_pem(&pem, passphrase.as_bytes()).ok()
    }
}

/// PEM `PRIVATE KEY`.
pub struct Pkcs8Pem;

impl KeyDecoder for Pkcs8Pem {
    fn name(&self) -> &'static str {
        "PKCS#8 PEM"
    }

    fn decode(&self, bytes: &[u8], _passphrase: &str) -> Option<RsaPrivateKey> {
        let pem = pem_text(bytes, "PRIVATE KEY")?;
        RsaPrivateKey::from_pkcs8_pem(&pem).ok()
    }
}

/// PEM `RSA PRIVATE KEY`.
pub struct Pkcs1Pem;

impl KeyDecoder for Pkcs1Pem {
    fn name(&self) -> &'static str {
        "PKCS#1 PEM"
    }

    fn decode(&self, bytes: &[u8], _passphrase: &str) -> Option<RsaPrivateKey> {
        let pem = pem_text(bytes, "RSA PRIVATE KEY")?;
        RsaPrivateKey::from_pkcs1_pem(&pem).ok()
    }
}

/// Unencrypted PKCS#8 DER.
pub struct Pkcs8Der;

impl KeyDecoder for Pkcs8Der {
    fn name(&self) -> &'static str {
        "PKCS#8 DER"
    }

    fn decode(&self, bytes: &[u8], _passphrase: &str) -> Option<RsaPrivateKey> {
        if !is_der(bytes) {
            return None;
        }
        RsaPrivateKey::from_pkcs8_der(bytes).ok()
    }
}

/// Encrypted PKCS#8 DER, the format of SAT-issued `.key` files.
pub struct EncryptedPkcs8Der;

impl KeyDecoder for EncryptedPkcs8Der {
    fn name(&self) -> &'static str {
        "PKCS#8 encrypted DER"
    }

    fn decode(&self, bytes: &[u8], passphrase: &str) -> Option<RsaPrivateKey> {
        if !is_der(bytes) {
            return None;
        }
        RsaPrivateKey::from_pkcs8_encrypted_der(bytes, passphrase.as_bytes()).ok()
    }
}

/// An RSA private key that passed the signing probe.
///
/// `Debug` shows only the modulus size.
#[derive(Clone)]
pub struct SigningKey {
    key: RsaPrivateKey,
}

impl SigningKey {
    /// Wrap a decoded key after checking it can sign.
    ///
    /// # Errors
    /// Returns `KeySignCapability` when the key is inconsistent or its
    /// signature does not verify against its own public half.
    pub fn new(key: RsaPrivateKey) -> Result<Self> {
        key.validate()
            .map_err(|e| DescargaError::KeySignCapability(e.to_string()))?;

        let signing_key = Self { key };
        let signature = signing_key.sign_sha1(SIGN_PROBE)?;
        let digest = Sha1::digest(SIGN_PROBE);
        signing_key
            .public_key()
            .verify(Pkcs1v15Sign::new::<Sha1>(), &digest, &signature)
            .map_err(|e| DescargaError::KeySignCapability(e.to_string()))?;

        Ok(signing_key)
    }

    /// RSASSA-PKCS1-v1_5 signature with SHA-1 over `data`.
    pub fn sign_sha1(&self, data: &[u8]) -> Result<Vec<u8>> {
        let digest = Sha1::digest(data);
        self.key
            .sign(Pkcs1v15Sign::new::<Sha1>(), &digest)
            .map_err(|e| DescargaError::KeySignCapability(e.to_string()))
    }

    pub fn public_key(&self) -> RsaPublicKey {
        self.key.to_public_key()
    }

    /// Modulus size in bits.
    pub fn bits(&self) -> usize {
        use rsa::traits::PublicKeyParts;
        self.key.size() * 8
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("bits", &self.bits())
            .finish_non_exhaustive()
    }
}

/// Ordered set of key decoders.
pub struct KeyLoader {
    decoders: Vec<Box<dyn KeyDecoder>>,
}

impl Default for KeyLoader {
    /// Encrypted PEM, PKCS#8 PEM, PKCS#1 PEM, PKCS#8 DER, encrypted DER.
    fn default() -> Self {
        Self {
            decoders: vec![
                Box::new(EncryptedPkcs8Pem),
                Box::new(Pkcs8Pem),
                Box::new(Pkcs1Pem),
                Box::new(Pkcs8Der),
                Box::new(EncryptedPkcs8Der),
            ],
        }
    }
}

impl KeyLoader {
    /// A loader with a custom decoder order.
    pub fn with_decoders(decoders: Vec<Box<dyn KeyDecoder>>) -> Self {
        Self { decoders }
    }

    pub fn decoder_names(&self) -> Vec<&'static str> {
        self.decoders.iter().map(|d| d.name()).collect()
    }

    /// Decode `bytes` with the first matching decoder and probe the result.
    ///
    /// # Errors
    /// `KeyFormat` when no decoder succeeds (including a wrong passphrase
    /// on an encrypted key); `KeySignCapability` when the decoded key
    /// cannot sign.
    pub fn load(&self, bytes: &[u8], passphrase: &str) -> Result<SigningKey> {
        for decoder in &self.decoders {
            if let Some(key) = decoder.decode(bytes, passphrase) {
                tracing::debug!(format = decoder.name(), "private key decoded");
                return SigningKey::new(key);
            }
        }

        Err(DescargaError::KeyFormat {
            tried: self.decoder_names().join(", "),
        })
    }
}

/// Load a signing key with the default decoder order.
pub fn load_signing_key(bytes: &[u8], passphrase: &str) -> Result<SigningKey> {
    KeyLoader::default().load(bytes, passphrase)
}
