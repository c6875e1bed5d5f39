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

//! Tools for working with OCSP responses.

use chrono::{DateTime, Utc};
use rasn::prelude::*;
use rasn_ocsp::{BasicOcspResponse, CertId, CertStatus, OcspResponseStatus};
use rasn_pkix::Certificate;

mod fetch;
pub use fetch::{
    extract_aia_ca_issuers, extract_aia_responders, fetch_issuer_certificate, fetch_ocsp_response,
};

/// Outcome of interpreting an OCSP response for one certificate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CertificateStatus {
    /// The responder vouches the certificate is not revoked.
    Good,

    /// The responder reports the certificate revoked.
    Revoked {
        /// Revocation instant, when reported.
        revoked_at: Option<DateTime<Utc>>,
    },

    /// No conclusive answer could be extracted.
    Unknown(String),
}

/// Build the `CertId` for a subject/issuer pair, SHA-1 hashed as OCSP
/// responders conventionally expect.
pub(crate) fn cert_id_for(cert_der: &[u8], issuer_der: &[u8]) -> Option<CertId> {
    let subject: Certificate = rasn::der::decode(cert_der).ok()?;
    let issuer: Certificate = rasn::der::decode(issuer_der).ok()?;

    let issuer_name_raw = rasn::der::encode(&issuer.tbs_certificate.subject).ok()?;
    let issuer_key_raw = issuer
        .tbs_certificate
        .subject_public_key_info
        .subject_public_key
        .as_raw_slice();

    let issuer_name_hash = OctetString::from(crate::hash::sha1(&issuer_name_raw));
    let issuer_key_hash = OctetString::from(crate::hash::sha1(issuer_key_raw));

    let sha1_oid = rasn::types::Oid::new(&[1, 3, 14, 3, 2, 26])?;
    let alg = rasn::types::ObjectIdentifier::from(sha1_oid);

    let sha1_ai = rasn_pkix::AlgorithmIdentifier {
        algorithm: alg,
        parameters: Some(Any::new(rasn::der::encode(&()).ok()?)),
        // Many OCSP responders expect this to be NULL not None.
    };

    Some(CertId {
        hash_algorithm: sha1_ai,
        issuer_name_hash,
        issuer_key_hash,
        serial_number: subject.tbs_certificate.serial_number,
    })
}

fn cert_id_matches(candidate: &CertId, ours: &CertId) -> bool {
    candidate.issuer_name_hash == ours.issuer_name_hash
        && candidate.issuer_key_hash == ours.issuer_key_hash
        && candidate.serial_number == ours.serial_number
}

/// Interpret a DER-encoded OCSP response for the given subject/issuer pair.
///
/// A response that cannot be parsed, that reports a non-successful overall
/// status or that carries no entry for the subject yields
/// [`CertificateStatus::Unknown`]; only an explicit status from the responder
/// produces `Good` or `Revoked`.
pub fn check_response(der: &[u8], cert_der: &[u8], issuer_der: &[u8]) -> CertificateStatus {
    let Ok(ocsp_response) = rasn::der::decode::<rasn_ocsp::OcspResponse>(der) else {
        return CertificateStatus::Unknown("OCSP response could not be parsed".into());
    };

    if ocsp_response.status != OcspResponseStatus::Successful {
        return CertificateStatus::Unknown(format!(
            "OCSP responder returned status {:?}",
            ocsp_response.status
        ));
    }

    let Some(response_bytes) = ocsp_response.bytes else {
        return CertificateStatus::Unknown("OCSP response carried no body".into());
    };

    let Ok(basic_response) = rasn::der::decode::<BasicOcspResponse>(&response_bytes.response)
    else {
        return CertificateStatus::Unknown("basic OCSP response could not be parsed".into());
    };

    let Some(our_id) = cert_id_for(cert_der, issuer_der) else {
        return CertificateStatus::Unknown("certificate identity could not be derived".into());
    };

    let now = Utc::now();

    for single_response in &basic_response.tbs_response_data.responses {
        if !cert_id_matches(&single_response.cert_id, &our_id) {
            continue;
        }

        match &single_response.cert_status {
            CertStatus::Good => {
                let this_update = single_response.this_update.with_timezone(&Utc);
                let fresh = match &single_response.next_update {
                    Some(next_update) => {
                        now >= this_update && now <= next_update.with_timezone(&Utc)
                    }
                    None => now >= this_update,
                };

                if fresh {
                    return CertificateStatus::Good;
                }
                return CertificateStatus::Unknown("OCSP response is stale".into());
            }

            CertStatus::Revoked(revoked_info) => {
                let revoked_at = Some(revoked_info.revocation_time.with_timezone(&Utc));
                return CertificateStatus::Revoked { revoked_at };
            }

            CertStatus::Unknown(_) => {
                return CertificateStatus::Unknown(
                    "OCSP responder does not know the certificate".into(),
                );
            }
        }
    }

    CertificateStatus::Unknown("OCSP response carried no entry for the certificate".into())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::panic)]
    #![allow(clippy::unwrap_used)]

    use chrono::Duration;
    use rasn_ocsp::{
        OcspResponse, ResponderId, ResponseBytes, ResponseData, RevokedInfo, SingleResponse,
        Version,
    };

    use super::*;

    fn fixture(name: &str) -> Vec<u8> {
        let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("tests/fixtures")
            .join(name);
        std::fs::read(path).unwrap()
    }

    fn encode_response(cert_der: &[u8], issuer_der: &[u8], status: CertStatus) -> Vec<u8> {
        let cert_id = cert_id_for(cert_der, issuer_der).unwrap();
        let now = Utc::now().fixed_offset();

        let single = SingleResponse {
            cert_id,
            cert_status: status,
            this_update: now - Duration::hours(1),
            next_update: Some(now + Duration::hours(1)),
            single_extensions: None,
        };

        let response_data = ResponseData {
            version: Version::from(0u8),
            responder_id: ResponderId::ByKey(OctetString::from(vec![0u8; 20])),
            produced_at: now,
            responses: vec![single],
            response_extensions: None,
        };

        let sha256_rsa = rasn::types::Oid::new(&[1, 2, 840, 113549, 1, 1, 11]).unwrap();
        let basic = BasicOcspResponse {
            tbs_response_data: response_data,
            signature_algorithm: rasn_pkix::AlgorithmIdentifier {
                algorithm: rasn::types::ObjectIdentifier::from(sha256_rsa),
                parameters: None,
            },
            signature: rasn::types::BitString::new(),
            certs: None,
        };

        let basic_oid = rasn::types::Oid::new(&[1, 3, 6, 1, 5, 5, 7, 48, 1, 1]).unwrap();
        let response = OcspResponse {
            status: OcspResponseStatus::Successful,
            bytes: Some(ResponseBytes {
                r#type: rasn::types::ObjectIdentifier::from(basic_oid),
                response: OctetString::from(rasn::der::encode(&basic).unwrap()),
            }),
        };

        rasn::der::encode(&response).unwrap()
    }

    #[test]
    fn good_response_is_good() {
        let cert = fixture("signer.der");
        let issuer = fixture("signer.der");

        let der = encode_response(&cert, &issuer, CertStatus::Good);
        assert_eq!(check_response(&der, &cert, &issuer), CertificateStatus::Good);
    }

    #[test]
    fn revoked_response_is_revoked() {
        let cert = fixture("signer.der");
        let issuer = fixture("signer.der");

        let revoked_at = Utc::now().fixed_offset() - Duration::days(3);
        let der = encode_response(
            &cert,
            &issuer,
            CertStatus::Revoked(RevokedInfo {
                revocation_time: revoked_at,
                revocation_reason: None,
            }),
        );

        match check_response(&der, &cert, &issuer) {
            CertificateStatus::Revoked { revoked_at } => assert!(revoked_at.is_some()),
            other => panic!("expected revoked, got {other:?}"),
        }
    }

    #[test]
    fn garbage_is_unknown() {
        let cert = fixture("signer.der");
        assert!(matches!(
            check_response(b"garbage", &cert, &cert),
            CertificateStatus::Unknown(_)
        ));
    }
}
