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

//! Network revocation checking: OCSP first, CRL distribution points as the
//! fallback when OCSP stays inconclusive.

use std::{io::Read, time::Duration};

use chrono::{DateTime, Utc};
use log::debug;
use x509_parser::{extensions::ParsedExtension, prelude::*};

use crate::{certificate::Certificate, ocsp};

/// Per-source network timeouts for revocation checking.
#[derive(Clone, Copy, Debug)]
pub struct RevocationTimeouts {
    /// Timeout for OCSP responder and issuer-certificate fetches.
    pub ocsp: Duration,

    /// Timeout for CRL fetches.
    pub crl: Duration,
}

impl Default for RevocationTimeouts {
    fn default() -> Self {
        Self {
            ocsp: Duration::from_secs(10),
            crl: Duration::from_secs(15),
        }
    }
}

/// Outcome of a revocation lookup across every reachable source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RevocationStatus {
    /// At least one source vouches the certificate is not revoked.
    Good,

    /// A source positively reports the certificate revoked.
    Revoked {
        /// Revocation instant, when reported.
        revoked_at: Option<DateTime<Utc>>,
    },

    /// No source produced a conclusive answer.
    Unknown(String),
}

/// Determine the revocation status of `cert` by querying OCSP responders
/// and, when those stay inconclusive, CRL distribution points.
///
/// Issues outbound network calls; a confirmed revocation from any source
/// short-circuits everything else.
pub fn check_revocation_status(
    cert: &Certificate,
    timeouts: &RevocationTimeouts,
) -> RevocationStatus {
    let Ok((_, parsed)) = X509Certificate::from_der(cert.der()) else {
        return RevocationStatus::Unknown("certificate could not be re-parsed".into());
    };

    let mut reasons: Vec<String> = Vec::new();

    match ocsp_status(cert, &parsed, timeouts.ocsp) {
        RevocationStatus::Good => return RevocationStatus::Good,
        RevocationStatus::Revoked { revoked_at } => {
            return RevocationStatus::Revoked { revoked_at }
        }
        RevocationStatus::Unknown(reason) => reasons.push(reason),
    }

    match crl_status(&parsed, timeouts.crl) {
        RevocationStatus::Good => return RevocationStatus::Good,
        RevocationStatus::Revoked { revoked_at } => {
            return RevocationStatus::Revoked { revoked_at }
        }
        RevocationStatus::Unknown(reason) => reasons.push(reason),
    }

    RevocationStatus::Unknown(reasons.join("; "))
}

fn ocsp_status(
    cert: &Certificate,
    parsed: &X509Certificate,
    timeout: Duration,
) -> RevocationStatus {
    let Some(responders) = ocsp::extract_aia_responders(parsed) else {
        return RevocationStatus::Unknown("certificate names no OCSP responder".into());
    };

    let Some(issuer_der) = ocsp::fetch_issuer_certificate(parsed, timeout) else {
        return RevocationStatus::Unknown("issuer certificate could not be fetched".into());
    };

    let mut last_reason = String::from("no OCSP responder reachable");

    for responder in responders {
        debug!("querying OCSP responder {responder}");

        let Some(der) = ocsp::fetch_ocsp_response(cert.der(), &issuer_der, &responder, timeout)
        else {
            last_reason = format!("OCSP responder {responder} unreachable");
            continue;
        };

        match ocsp::check_response(&der, cert.der(), &issuer_der) {
            ocsp::CertificateStatus::Good => return RevocationStatus::Good,
            ocsp::CertificateStatus::Revoked { revoked_at } => {
                return RevocationStatus::Revoked { revoked_at }
            }
            ocsp::CertificateStatus::Unknown(reason) => last_reason = reason,
        }
    }

    RevocationStatus::Unknown(last_reason)
}

fn crl_urls(parsed: &X509Certificate) -> Vec<String> {
    let mut urls = Vec::new();

    for ext in parsed.extensions() {
        let ParsedExtension::CRLDistributionPoints(points) = ext.parsed_extension() else {
            continue;
        };

        for point in points.iter() {
            let Some(x509_parser::extensions::DistributionPointName::FullName(names)) =
                &point.distribution_point
            else {
                continue;
            };

            for name in names {
                if let x509_parser::extensions::GeneralName::URI(uri) = name {
                    urls.push(uri.to_string());
                }
            }
        }
    }

    urls
}

fn crl_status(parsed: &X509Certificate, timeout: Duration) -> RevocationStatus {
    let urls = crl_urls(parsed);
    if urls.is_empty() {
        return RevocationStatus::Unknown("certificate names no CRL distribution point".into());
    }

    let serial = &parsed.tbs_certificate.serial;
    let agent = ureq::AgentBuilder::new().timeout(timeout).build();
    let mut checked_any = false;

    for url in urls {
        debug!("fetching CRL from {url}");

        let Ok(response) = agent.get(&url).call() else {
            continue;
        };
        if response.status() != 200 {
            continue;
        }

        let mut crl_data = Vec::new();
        if response
            .into_reader()
            .take(8_000_000)
            .read_to_end(&mut crl_data)
            .is_err()
        {
            continue;
        }

        // Distribution points usually serve DER, occasionally PEM.
        let der = if CertificateRevocationList::from_der(&crl_data).is_ok() {
            crl_data
        } else {
            match parse_x509_pem(&crl_data) {
                Ok((_, pem)) => pem.contents,
                Err(_) => continue,
            }
        };

        let Ok((_, crl)) = CertificateRevocationList::from_der(&der) else {
            continue;
        };

        checked_any = true;

        let revoked_at = crl
            .iter_revoked_certificates()
            .find(|revoked| &revoked.user_certificate == serial)
            .map(|entry| entry.revocation_date.timestamp());
        if let Some(timestamp) = revoked_at {
            return RevocationStatus::Revoked {
                revoked_at: DateTime::from_timestamp(timestamp, 0),
            };
        }
    }

    if checked_any {
        // The serial appears on none of the issuer's lists.
        RevocationStatus::Good
    } else {
        RevocationStatus::Unknown("no CRL distribution point reachable".into())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn certificate_without_sources_is_unknown() {
        let data = std::fs::read(
            std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/signer.der"),
        )
        .unwrap();
        let cert = Certificate::from_der(&data).unwrap();

        let status = check_revocation_status(&cert, &RevocationTimeouts::default());
        assert!(matches!(status, RevocationStatus::Unknown(_)));
    }
}
