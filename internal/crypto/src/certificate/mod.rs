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

//! e.firma certificate loading and validation.

mod key;
pub use key::{KeyAlgorithm, SigningKeyPair};

mod validator;
pub use validator::{CertificateValidator, RevocationPolicy};

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use x509_parser::prelude::*;

/// Describes errors that can occur while loading or validating signing
/// credentials.
#[derive(Debug, Error)]
pub enum CertificateError {
    /// The certificate or key file does not exist.
    #[error("file not found: {0}")]
    NotFound(PathBuf),

    /// The certificate parsed as neither DER nor PEM.
    #[error("certificate could not be parsed as DER or PEM")]
    InvalidFormat,

    /// The private key password is incorrect.
    #[error("incorrect private key password")]
    WrongPassword,

    /// The private key parsed under none of the supported encodings.
    #[error("unsupported or corrupt private key (tried PKCS#8 DER, PEM and PKCS#12)")]
    UnsupportedKeyFormat,

    /// The key algorithm is not supported for signing.
    #[error("unsupported key algorithm ({0})")]
    UnsupportedKeyAlgorithm(String),

    /// The certificate validity window has not started.
    #[error("certificate is not yet valid (valid from {not_before})")]
    NotYetValid {
        /// Start of the validity window.
        not_before: DateTime<Utc>,
    },

    /// The certificate validity window has ended.
    #[error("certificate expired on {not_after}")]
    Expired {
        /// End of the validity window.
        not_after: DateTime<Utc>,
    },

    /// The issuing CA reports the certificate as revoked.
    #[error("certificate has been revoked")]
    Revoked {
        /// Revocation instant, when the CA reported one.
        revoked_at: Option<DateTime<Utc>>,
    },

    /// Validation could not be completed.
    #[error("certificate validation failed: {0}")]
    Validation(String),

    /// An I/O error occurred while reading credential files.
    ///
    /// NOTE: We do not directly capture the I/O error itself because it
    /// lacks an `Eq` implementation. Instead we capture the error description.
    #[error("I/O error ({0})")]
    Io(String),
}

impl From<std::io::Error> for CertificateError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// An X.509 signing certificate, immutable once loaded.
///
/// Holds the raw DER plus the projection of the fields this SDK needs;
/// nothing borrows from the DER, so the value can be freely moved, shared
/// and dropped at session end.
#[derive(Clone, Debug)]
pub struct Certificate {
    der: Vec<u8>,
    subject: String,
    issuer: String,
    serial_hex: String,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
    common_name: Option<String>,
}

impl Certificate {
    /// Load a certificate from a `.cer` file (DER or PEM).
    pub fn from_file(path: &Path) -> Result<Self, CertificateError> {
        if !path.exists() {
            return Err(CertificateError::NotFound(path.to_path_buf()));
        }

        let data = std::fs::read(path)?;
        Self::from_der_or_pem(&data)
    }

    /// Parse certificate bytes, trying DER first (the common e.firma
    /// encoding), then PEM.
    pub fn from_der_or_pem(data: &[u8]) -> Result<Self, CertificateError> {
        if let Ok(cert) = Self::from_der(data) {
            return Ok(cert);
        }

        let (_, pem) =
            parse_x509_pem(data).map_err(|_| CertificateError::InvalidFormat)?;
        Self::from_der(&pem.contents)
    }

    /// Parse a DER-encoded certificate.
    pub fn from_der(der: &[u8]) -> Result<Self, CertificateError> {
        let (_, cert) =
            X509Certificate::from_der(der).map_err(|_| CertificateError::InvalidFormat)?;

        let not_before = DateTime::from_timestamp(cert.validity().not_before.timestamp(), 0)
            .ok_or(CertificateError::InvalidFormat)?;
        let not_after = DateTime::from_timestamp(cert.validity().not_after.timestamp(), 0)
            .ok_or(CertificateError::InvalidFormat)?;

        let common_name = cert
            .subject()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .map(str::to_string);

        Ok(Self {
            subject: cert.subject().to_string(),
            issuer: cert.issuer().to_string(),
            serial_hex: cert.tbs_certificate.serial.to_str_radix(16),
            not_before,
            not_after,
            common_name,
            der: der.to_vec(),
        })
    }

    /// Raw DER bytes.
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Subject distinguished name.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Issuer distinguished name.
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Serial number as lowercase hex.
    pub fn serial_hex(&self) -> &str {
        &self.serial_hex
    }

    /// Start of the validity window (UTC).
    pub fn not_before(&self) -> DateTime<Utc> {
        self.not_before
    }

    /// End of the validity window (UTC).
    pub fn not_after(&self) -> DateTime<Utc> {
        self.not_after
    }

    /// Subject common name, when present.
    pub fn common_name(&self) -> Option<&str> {
        self.common_name.as_deref()
    }

    /// Display projection of this certificate.
    pub fn info(&self) -> CertificateInfo {
        CertificateInfo {
            subject: self.subject.clone(),
            issuer: self.issuer.clone(),
            serial_number: self.serial_hex.clone(),
            not_before: self.not_before.to_rfc3339(),
            not_after: self.not_after.to_rfc3339(),
            common_name: self.common_name.clone(),
        }
    }

    /// Check that `now` falls inside the validity window.
    pub fn check_validity_window(&self, now: DateTime<Utc>) -> Result<(), CertificateError> {
        if now < self.not_before {
            return Err(CertificateError::NotYetValid {
                not_before: self.not_before,
            });
        }

        if now > self.not_after {
            return Err(CertificateError::Expired {
                not_after: self.not_after,
            });
        }

        Ok(())
    }
}

/// Read-only projection of a certificate for display purposes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CertificateInfo {
    /// Subject distinguished name.
    pub subject: String,

    /// Issuer distinguished name.
    pub issuer: String,

    /// Serial number as lowercase hex.
    pub serial_number: String,

    /// Start of the validity window, ISO-8601.
    pub not_before: String,

    /// End of the validity window, ISO-8601.
    pub not_after: String,

    /// Subject common name; absent when the attribute is missing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub common_name: Option<String>,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use chrono::TimeZone;

    use super::*;

    fn fixture(name: &str) -> Vec<u8> {
        let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("tests/fixtures")
            .join(name);
        std::fs::read(path).unwrap()
    }

    #[test]
    fn loads_der_certificate() {
        let cert = Certificate::from_der_or_pem(&fixture("signer.der")).unwrap();

        assert_eq!(cert.common_name(), Some("JUAN PRUEBA GARCIA"));
        assert!(cert.subject().contains("CN=JUAN PRUEBA GARCIA"));
        assert!(!cert.serial_hex().is_empty());
        assert!(cert.not_before() < cert.not_after());
    }

    #[test]
    fn loads_pem_certificate() {
        let der = Certificate::from_der_or_pem(&fixture("signer.der")).unwrap();
        let pem = Certificate::from_der_or_pem(&fixture("signer.pem")).unwrap();

        assert_eq!(der.serial_hex(), pem.serial_hex());
        assert_eq!(der.der(), pem.der());
    }

    #[test]
    fn garbage_is_invalid_format() {
        assert!(matches!(
            Certificate::from_der_or_pem(b"not a certificate"),
            Err(CertificateError::InvalidFormat)
        ));
    }

    #[test]
    fn info_projection_is_iso8601() {
        let cert = Certificate::from_der_or_pem(&fixture("signer.der")).unwrap();
        let info = cert.info();

        assert!(info.not_before.contains('T'));
        assert_eq!(info.common_name.as_deref(), Some("JUAN PRUEBA GARCIA"));
        assert_eq!(info.serial_number, cert.serial_hex());
    }

    #[test]
    fn validity_window_bounds() {
        let cert = Certificate::from_der_or_pem(&fixture("signer.der")).unwrap();

        let inside = cert.not_before() + chrono::Duration::days(1);
        assert!(cert.check_validity_window(inside).is_ok());

        let before = cert.not_before() - chrono::Duration::seconds(1);
        assert!(matches!(
            cert.check_validity_window(before),
            Err(CertificateError::NotYetValid { .. })
        ));

        let after = cert.not_after() + chrono::Duration::seconds(1);
        assert!(matches!(
            cert.check_validity_window(after),
            Err(CertificateError::Expired { .. })
        ));

        // Timezone normalization: the same instant expressed from a
        // non-UTC offset behaves identically.
        let offset = chrono::FixedOffset::west_opt(6 * 3600).unwrap();
        let local = offset.from_utc_datetime(&inside.naive_utc());
        assert!(cert
            .check_validity_window(local.with_timezone(&Utc))
            .is_ok());
    }
}
