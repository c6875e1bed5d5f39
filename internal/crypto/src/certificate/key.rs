// Copyright 2025 Sello MX. All rights reserved.
// This file is licensed to you under the Apache License,
// Version 2.0 (http://www.apache.org/licenses/LICENSE-2.0)
// or the MIT license (http://opensource.org/licenses/MIT),
// at your option.

// Unless required by applicable law or agreed to in writing,
// this software is distributed on an "AS IS" BASIS, WITHOUT
// WARRANTIES OR REPRESENTATIONS OF ANY KIND, either express or
// implied. See the LICENSE-MIT and LICENSE-APACHE files for the
// specific language governing permissions and limitations under
// each license.

use std::path::Path;

use der::SecretDocument;
use log::debug;
use pkcs8::{EncryptedPrivateKeyInfo, ObjectIdentifier, PrivateKeyInfo};
use rsa::{pkcs1::DecodeRsaPrivateKey, pkcs8::DecodePrivateKey, RsaPrivateKey};
use zeroize::Zeroizing;

use crate::certificate::CertificateError;

const RSA_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");
const EC_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");
const P256_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.3.1.7");

/// Algorithm family of a loaded private key.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum KeyAlgorithm {
    /// RSA, signed as PKCS#1 v1.5 with SHA-256.
    Rsa,

    /// ECDSA over NIST P-256 with SHA-256.
    EcdsaP256,
}

/// An asymmetric signing key pair, exclusively owned by the signing session.
///
/// SAT `.key` files come in several encodings; [`SigningKeyPair::load`] walks
/// an ordered list of decoders and the first success wins. Key material is
/// zeroized on drop by the underlying key types; intermediate buffers are
/// wrapped in [`Zeroizing`]. The key is never logged and there is no API to
/// serialize it back out.
pub enum SigningKeyPair {
    /// RSA PKCS#1 v1.5 signing key (SHA-256).
    Rsa(rsa::pkcs1v15::SigningKey<sha2::Sha256>),

    /// ECDSA P-256 signing key.
    EcdsaP256(p256::ecdsa::SigningKey),
}

impl SigningKeyPair {
    /// Load a private key from a `.key` file, trying DER/PKCS#8 (plain and
    /// encrypted), PEM, then PKCS#12.
    pub fn from_file(path: &Path, password: &str) -> Result<Self, CertificateError> {
        if !path.exists() {
            return Err(CertificateError::NotFound(path.to_path_buf()));
        }

        let data = Zeroizing::new(std::fs::read(path)?);
        Self::load(&data, password)
    }

    /// Load a private key from raw bytes.
    ///
    /// A password failure on an otherwise well-formed container is reported
    /// as [`CertificateError::WrongPassword`]; exhausting every decoder
    /// yields [`CertificateError::UnsupportedKeyFormat`].
    pub fn load(data: &[u8], password: &str) -> Result<Self, CertificateError> {
        let mut wrong_password = false;

        // 1. DER: unencrypted PKCS#8, then encrypted PKCS#8.
        if PrivateKeyInfo::try_from(data).is_ok() {
            return Self::from_pkcs8_der(data);
        }
        if let Ok(encrypted) = EncryptedPrivateKeyInfo::try_from(data) {
            match encrypted.decrypt(password) {
                Ok(plain) => return Self::from_pkcs8_der(plain.as_bytes()),
                Err(err) => {
                    debug!("encrypted PKCS#8 decryption failed: {err}");
                    wrong_password = true;
                }
            }
        }

        // 2. PEM.
        if let Ok(text) = std::str::from_utf8(data) {
            if text.contains("-----BEGIN") {
                match Self::from_pem(text, password) {
                    Ok(key) => return Ok(key),
                    Err(CertificateError::WrongPassword) => wrong_password = true,
                    Err(err) => debug!("PEM key loading failed: {err}"),
                }
            }
        }

        // 3. PKCS#12 bundle.
        if let Ok(pfx) = p12::PFX::parse(data) {
            if !pfx.verify_mac(password) {
                wrong_password = true;
            } else if let Some(key_der) = pfx
                .key_bags(password)
                .ok()
                .and_then(|bags| bags.into_iter().next())
            {
                let key_der = Zeroizing::new(key_der);
                return Self::from_pkcs8_der(&key_der);
            }
        }

        if wrong_password {
            Err(CertificateError::WrongPassword)
        } else {
            Err(CertificateError::UnsupportedKeyFormat)
        }
    }

    /// The algorithm family of this key.
    pub fn algorithm(&self) -> KeyAlgorithm {
        match self {
            Self::Rsa(_) => KeyAlgorithm::Rsa,
            Self::EcdsaP256(_) => KeyAlgorithm::EcdsaP256,
        }
    }

    fn from_pkcs8_der(der: &[u8]) -> Result<Self, CertificateError> {
        let pki =
            PrivateKeyInfo::try_from(der).map_err(|_| CertificateError::UnsupportedKeyFormat)?;

        if pki.algorithm.oid == RSA_OID {
            let key = RsaPrivateKey::from_pkcs8_der(der)
                .map_err(|_| CertificateError::UnsupportedKeyFormat)?;
            Ok(Self::Rsa(rsa::pkcs1v15::SigningKey::new(key)))
        } else if pki.algorithm.oid == EC_OID {
            match pki.algorithm.parameters_oid() {
                Ok(curve) if curve == P256_OID => {}
                Ok(curve) => {
                    return Err(CertificateError::UnsupportedKeyAlgorithm(curve.to_string()))
                }
                Err(_) => return Err(CertificateError::UnsupportedKeyFormat),
            }

            let secret = p256::SecretKey::from_pkcs8_der(der)
                .map_err(|_| CertificateError::UnsupportedKeyFormat)?;
            Ok(Self::EcdsaP256(p256::ecdsa::SigningKey::from(secret)))
        } else {
            Err(CertificateError::UnsupportedKeyAlgorithm(
                pki.algorithm.oid.to_string(),
            ))
        }
    }

    fn from_pem(text: &str, password: &str) -> Result<Self, CertificateError> {
        let (label, doc) =
            SecretDocument::from_pem(text).map_err(|_| CertificateError::UnsupportedKeyFormat)?;

        match label {
            "PRIVATE KEY" => Self::from_pkcs8_der(doc.as_bytes()),
            "ENCRYPTED PRIVATE KEY" => {
                let encrypted = EncryptedPrivateKeyInfo::try_from(doc.as_bytes())
                    .map_err(|_| CertificateError::UnsupportedKeyFormat)?;
                let plain = encrypted
                    .decrypt(password)
                    .map_err(|_| CertificateError::WrongPassword)?;
                Self::from_pkcs8_der(plain.as_bytes())
            }
            "RSA PRIVATE KEY" => {
                let key = RsaPrivateKey::from_pkcs1_der(doc.as_bytes())
                    .map_err(|_| CertificateError::UnsupportedKeyFormat)?;
                Ok(Self::Rsa(rsa::pkcs1v15::SigningKey::new(key)))
            }
            "EC PRIVATE KEY" => {
                let secret = p256::SecretKey::from_sec1_der(doc.as_bytes())
                    .map_err(|_| CertificateError::UnsupportedKeyFormat)?;
                Ok(Self::EcdsaP256(p256::ecdsa::SigningKey::from(secret)))
            }
            _ => Err(CertificateError::UnsupportedKeyFormat),
        }
    }
}

impl std::fmt::Debug for SigningKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKeyPair")
            .field("algorithm", &self.algorithm())
            .field("key", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    const PASSWORD: &str = "sello123";

    fn fixture(name: &str) -> Vec<u8> {
        let path = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("tests/fixtures")
            .join(name);
        std::fs::read(path).unwrap()
    }

    #[test]
    fn loads_plain_pkcs8_der() {
        let key = SigningKeyPair::load(&fixture("signer_pkcs8.der"), "").unwrap();
        assert_eq!(key.algorithm(), KeyAlgorithm::Rsa);
    }

    #[test]
    fn loads_encrypted_pkcs8_der() {
        let key = SigningKeyPair::load(&fixture("signer_pkcs8_enc.der"), PASSWORD).unwrap();
        assert_eq!(key.algorithm(), KeyAlgorithm::Rsa);
    }

    #[test]
    fn wrong_password_is_distinct_from_bad_format() {
        let err = SigningKeyPair::load(&fixture("signer_pkcs8_enc.der"), "nope").unwrap_err();
        assert!(matches!(err, CertificateError::WrongPassword));

        let err = SigningKeyPair::load(b"definitely not a key", "nope").unwrap_err();
        assert!(matches!(err, CertificateError::UnsupportedKeyFormat));
    }

    #[test]
    fn loads_pkcs8_pem() {
        let key = SigningKeyPair::load(&fixture("signer_pkcs8.pem"), "").unwrap();
        assert_eq!(key.algorithm(), KeyAlgorithm::Rsa);
    }

    #[test]
    fn loads_encrypted_pkcs8_pem() {
        let key = SigningKeyPair::load(&fixture("signer_pkcs8_enc.pem"), PASSWORD).unwrap();
        assert_eq!(key.algorithm(), KeyAlgorithm::Rsa);

        let err = SigningKeyPair::load(&fixture("signer_pkcs8_enc.pem"), "nope").unwrap_err();
        assert!(matches!(err, CertificateError::WrongPassword));
    }

    #[test]
    fn loads_pkcs12_bundle() {
        let key = SigningKeyPair::load(&fixture("signer.p12"), PASSWORD).unwrap();
        assert_eq!(key.algorithm(), KeyAlgorithm::Rsa);

        let err = SigningKeyPair::load(&fixture("signer.p12"), "nope").unwrap_err();
        assert!(matches!(err, CertificateError::WrongPassword));
    }

    #[test]
    fn loads_ec_pkcs8_der() {
        let key = SigningKeyPair::load(&fixture("signer_ec.der"), "").unwrap();
        assert_eq!(key.algorithm(), KeyAlgorithm::EcdsaP256);
    }

    #[test]
    fn debug_never_prints_key_material() {
        let key = SigningKeyPair::load(&fixture("signer_pkcs8.der"), "").unwrap();
        let debug = format!("{key:?}");
        assert!(debug.contains("[REDACTED]"));
    }
}
