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

use std::{io::Read, time::Duration};

use x509_parser::{
    der_parser::{oid, Oid},
    extensions::ParsedExtension,
    prelude::*,
};

use crate::base64;

const AD_OCSP_OID: Oid<'static> = oid!(1.3.6 .1 .5 .5 .7 .48 .1);
const AD_CA_ISSUERS_OID: Oid<'static> = oid!(1.3.6 .1 .5 .5 .7 .48 .2);
const AUTHORITY_INFO_ACCESS_OID: Oid<'static> = oid!(1.3.6 .1 .5 .5 .7 .1 .1);

const MAX_RESPONSE_BYTES: u64 = 1_000_000;

/// Extract the OCSP responder URLs from a certificate's Authority Info
/// Access extension.
pub fn extract_aia_responders(cert: &X509Certificate) -> Option<Vec<String>> {
    extract_aia(cert, &AD_OCSP_OID)
}

/// Extract the issuing-CA certificate URLs from a certificate's Authority
/// Info Access extension.
pub fn extract_aia_ca_issuers(cert: &X509Certificate) -> Option<Vec<String>> {
    extract_aia(cert, &AD_CA_ISSUERS_OID)
}

fn extract_aia(cert: &X509Certificate, access_method: &Oid<'static>) -> Option<Vec<String>> {
    let em = cert.extensions_map().ok()?;

    let aia_extension = em.get(&AUTHORITY_INFO_ACCESS_OID)?;

    let ParsedExtension::AuthorityInfoAccess(aia) = aia_extension.parsed_extension() else {
        return None;
    };

    let mut output = Vec::new();

    for ad in &aia.accessdescs {
        if let x509_parser::extensions::GeneralName::URI(uri) = ad.access_location {
            if &ad.access_method == access_method {
                output.push(uri.to_string())
            }
        }
    }

    if output.is_empty() {
        None
    } else {
        Some(output)
    }
}

/// Fetch the issuing-CA certificate named by the subject certificate's AIA
/// extension, if any. Responds with the issuer's DER bytes.
pub fn fetch_issuer_certificate(cert: &X509Certificate, timeout: Duration) -> Option<Vec<u8>> {
    let agent = ureq::AgentBuilder::new().timeout(timeout).build();

    for url in extract_aia_ca_issuers(cert)? {
        let Ok(response) = agent.get(&url).call() else {
            continue;
        };

        if response.status() != 200 {
            continue;
        }

        let mut issuer_der = Vec::new();
        if response
            .into_reader()
            .take(MAX_RESPONSE_BYTES)
            .read_to_end(&mut issuer_der)
            .is_err()
        {
            continue;
        }

        // Some CAs serve PEM from this endpoint.
        if X509Certificate::from_der(&issuer_der).is_ok() {
            return Some(issuer_der);
        }
        if let Ok((_, pem)) = parse_x509_pem(&issuer_der) {
            return Some(pem.contents);
        }
    }

    None
}

/// Retrieve a raw DER-encoded OCSP response for the subject certificate from
/// one responder URL.
pub fn fetch_ocsp_response(
    cert_der: &[u8],
    issuer_der: &[u8],
    responder_url: &str,
    timeout: Duration,
) -> Option<Vec<u8>> {
    let url = url::Url::parse(responder_url).ok()?;

    let req_cert = super::cert_id_for(cert_der, issuer_der)?;

    let ocsp_req = rasn_ocsp::Request {
        req_cert,
        single_request_extensions: None,
    };

    let tbs_request = rasn_ocsp::TbsRequest {
        version: rasn_ocsp::Version::from(0u8),
        requestor_name: None,
        request_list: vec![ocsp_req],
        request_extensions: None,
    };

    let ocsp_request = rasn_ocsp::OcspRequest {
        tbs_request,
        optional_signature: None,
    };

    // build query param
    let request_der = rasn::der::encode(&ocsp_request).ok()?;
    let request_str = base64::encode(&request_der);

    let req_url = url.join(&request_str).ok()?;

    let agent = ureq::AgentBuilder::new().timeout(timeout).build();
    let request = agent.get(req_url.as_str());

    let response = if let Some(host) = url.host() {
        request.set("Host", &host.to_string()).call().ok()? // for responders that don't support http 1.0
    } else {
        request.call().ok()?
    };

    if response.status() == 200 {
        let len = response
            .header("Content-Length")
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(10000);

        let mut ocsp_rsp: Vec<u8> = Vec::with_capacity(len);

        response
            .into_reader()
            .take(MAX_RESPONSE_BYTES)
            .read_to_end(&mut ocsp_rsp)
            .ok()?;

        return Some(ocsp_rsp);
    }

    None
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn fixture_certificate_has_no_aia() {
        let data = std::fs::read(
            std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/signer.der"),
        )
        .unwrap();
        let (_, cert) = X509Certificate::from_der(&data).unwrap();

        assert!(extract_aia_responders(&cert).is_none());
        assert!(extract_aia_ca_issuers(&cert).is_none());
    }
}
