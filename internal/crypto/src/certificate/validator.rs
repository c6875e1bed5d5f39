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

use std::path::PathBuf;

use chrono::Utc;
use log::{info, warn};
use zeroize::Zeroizing;

use crate::{
    certificate::{Certificate, CertificateError, CertificateInfo, SigningKeyPair},
    revocation::{self, RevocationStatus, RevocationTimeouts},
};

/// How an inconclusive revocation check is treated.
///
/// A positively confirmed revocation always fails validation; this policy
/// only governs the ambiguous case where no revocation source gave a
/// conclusive answer.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RevocationPolicy {
    /// Tolerate an inconclusive check and proceed with a warning.
    SoftFail,

    /// Reject unless non-revocation is positively confirmed.
    HardFail,
}

/// Validates an e.firma certificate/key pair before a signing session.
///
/// Validation covers: multi-format loading of both files, the certificate
/// validity window, and the revocation status under the configured policy.
pub struct CertificateValidator {
    cert_path: PathBuf,
    key_path: PathBuf,
    password: Zeroizing<String>,
    policy: RevocationPolicy,
    timeouts: RevocationTimeouts,
}

impl CertificateValidator {
    /// Create a validator over a `.cer`/`.key` pair. The revocation policy
    /// defaults to [`RevocationPolicy::SoftFail`].
    pub fn new(
        cert_path: impl Into<PathBuf>,
        key_path: impl Into<PathBuf>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            cert_path: cert_path.into(),
            key_path: key_path.into(),
            password: Zeroizing::new(password.into()),
            policy: RevocationPolicy::SoftFail,
            timeouts: RevocationTimeouts::default(),
        }
    }

    /// Override the revocation policy.
    pub fn with_revocation_policy(mut self, policy: RevocationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Override the revocation network timeouts.
    pub fn with_revocation_timeouts(mut self, timeouts: RevocationTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Fully validate the certificate and load the private key.
    ///
    /// The returned pair is meant to be validated once per batch and shared
    /// read-only across that batch's documents.
    pub fn validate_all(&self) -> Result<(Certificate, SigningKeyPair), CertificateError> {
        let cert = Certificate::from_file(&self.cert_path)?;
        info!("certificate loaded: {}", cert.subject());

        let key = SigningKeyPair::from_file(&self.key_path, &self.password)?;
        info!("private key loaded successfully");

        cert.check_validity_window(Utc::now())?;
        info!("certificate validity OK (expires: {})", cert.not_after());

        match revocation::check_revocation_status(&cert, &self.timeouts) {
            RevocationStatus::Good => {
                info!("certificate revocation status OK");
            }
            RevocationStatus::Revoked { revoked_at } => {
                return Err(CertificateError::Revoked { revoked_at });
            }
            RevocationStatus::Unknown(reason) => match self.policy {
                RevocationPolicy::HardFail => {
                    return Err(CertificateError::Validation(format!(
                        "could not verify revocation status: {reason}"
                    )));
                }
                RevocationPolicy::SoftFail => {
                    warn!("could not verify revocation status ({reason}); continuing with unverified revocation");
                }
            },
        }

        info!("certificate validation successful");
        Ok((cert, key))
    }

    /// Read-only projection of a certificate for display purposes.
    pub fn get_certificate_info(cert: &Certificate) -> CertificateInfo {
        cert.info()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::path::Path;

    use super::*;

    fn fixture(name: &str) -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("tests/fixtures")
            .join(name)
    }

    // The fixture certificate carries no AIA or CRL extension, so revocation
    // stays inconclusive without touching the network; the two policies must
    // then disagree.

    #[test]
    fn soft_fail_tolerates_inconclusive_revocation() {
        let validator = CertificateValidator::new(
            fixture("signer.der"),
            fixture("signer_pkcs8_enc.der"),
            "sello123",
        );

        let (cert, key) = validator.validate_all().unwrap();
        assert_eq!(cert.common_name(), Some("JUAN PRUEBA GARCIA"));
        assert_eq!(
            key.algorithm(),
            crate::certificate::KeyAlgorithm::Rsa
        );
    }

    #[test]
    fn hard_fail_rejects_inconclusive_revocation() {
        let validator = CertificateValidator::new(
            fixture("signer.der"),
            fixture("signer_pkcs8.der"),
            "",
        )
        .with_revocation_policy(RevocationPolicy::HardFail);

        assert!(matches!(
            validator.validate_all(),
            Err(CertificateError::Validation(_))
        ));
    }

    #[test]
    fn missing_files_are_reported_as_not_found() {
        let validator =
            CertificateValidator::new(fixture("missing.der"), fixture("missing.key"), "");

        assert!(matches!(
            validator.validate_all(),
            Err(CertificateError::NotFound(_))
        ));
    }

    #[test]
    fn wrong_key_password_aborts_validation() {
        let validator = CertificateValidator::new(
            fixture("signer.der"),
            fixture("signer_pkcs8_enc.der"),
            "wrong password",
        );

        assert!(matches!(
            validator.validate_all(),
            Err(CertificateError::WrongPassword)
        ));
    }
}
