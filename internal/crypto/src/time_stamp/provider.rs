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

use std::time::Duration;

use bcder::{Integer, OctetString};
use rand::{thread_rng, Rng};

use crate::{
    asn1::rfc3161::{MessageImprint, TimeStampReq},
    time_stamp::{DigestAlgorithm, TimeStampError},
};

/// A `TimeStampProvider` implementation can contact a [RFC 3161] time stamp
/// service and generate a corresponding time stamp for a specific piece of
/// data.
///
/// [RFC 3161]: https://datatracker.ietf.org/doc/html/rfc3161
pub trait TimeStampProvider {
    /// Return the URL for time stamp service.
    fn time_stamp_service_url(&self) -> Option<String> {
        None
    }

    /// Additional request headers to pass to the time stamp service.
    ///
    /// IMPORTANT: You should not include the "Content-type" header here.
    /// That is provided by default.
    fn time_stamp_request_headers(&self) -> Option<Vec<(String, String)>> {
        None
    }

    /// Per-request timeout for the time stamp service.
    fn time_stamp_request_timeout(&self) -> Duration {
        Duration::from_secs(30)
    }

    /// Generate the request body for the HTTP request to the time stamp
    /// service.
    fn time_stamp_request_body(&self, message: &[u8]) -> Result<Vec<u8>, TimeStampError> {
        default_rfc3161_message(message, DigestAlgorithm::Sha256)
    }

    /// Request a [RFC 3161] time stamp over an arbitrary data packet.
    ///
    /// The default implementation will send the request to the URL provided
    /// by [`Self::time_stamp_service_url()`], if any, and respond with the
    /// raw `TimeStampResp` bytes.
    ///
    /// [RFC 3161]: https://datatracker.ietf.org/doc/html/rfc3161
    fn send_time_stamp_request(&self, message: &[u8]) -> Option<Result<Vec<u8>, TimeStampError>> {
        if let Some(url) = self.time_stamp_service_url() {
            let body = match self.time_stamp_request_body(message) {
                Ok(body) => body,
                Err(err) => return Some(Err(err)),
            };

            let headers = self.time_stamp_request_headers();
            return Some(super::http_request::default_rfc3161_request(
                &url,
                headers,
                &body,
                self.time_stamp_request_timeout(),
            ));
        }

        None
    }
}

/// Build the DER-encoded `TimeStampReq` body for an arbitrary data packet.
///
/// The message is digested with the given algorithm; a random nonce is
/// attached and reflection is verified when the response is received;
/// `certReq` is set so the TSA includes its certificate in the token.
pub fn default_rfc3161_message(
    data: &[u8],
    digest_algorithm: DigestAlgorithm,
) -> Result<Vec<u8>, TimeStampError> {
    let request = time_stamp_message_http(data, digest_algorithm)?;

    request
        .to_der()
        .map_err(|err| TimeStampError::InternalError(err.to_string()))
}

fn time_stamp_message_http(
    message: &[u8],
    digest_algorithm: DigestAlgorithm,
) -> Result<TimeStampReq, TimeStampError> {
    let digest = digest_algorithm.digest(message);

    let mut random = [0u8; 8];
    thread_rng().try_fill(&mut random).map_err(|_| {
        TimeStampError::InternalError("unable to generate random number".to_string())
    })?;

    let request = TimeStampReq {
        version: Integer::from(1_u8),
        message_imprint: MessageImprint {
            hash_algorithm: digest_algorithm.into(),
            hashed_message: OctetString::new(bytes::Bytes::copy_from_slice(digest.as_ref())),
        },
        req_policy: None,
        nonce: Some(Integer::from(u64::from_le_bytes(random))),
        cert_req: Some(true),
        extensions: None,
    };

    Ok(request)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use bcder::{decode::Constructed, Mode};

    use super::*;

    #[test]
    fn default_message_carries_nonce_and_cert_req() {
        let body = default_rfc3161_message(b"payload", DigestAlgorithm::Sha256).unwrap();

        let req = Constructed::decode(body.as_slice(), Mode::Der, |cons| {
            TimeStampReq::take_from(cons)
        })
        .unwrap();

        assert!(req.nonce.is_some());
        assert_eq!(req.cert_req, Some(true));
        assert_eq!(req.message_imprint.hashed_message.to_bytes().len(), 32);
    }

    #[test]
    fn sha1_imprint_is_twenty_bytes() {
        let body = default_rfc3161_message(b"payload", DigestAlgorithm::Sha1).unwrap();

        let req = Constructed::decode(body.as_slice(), Mode::Der, |cons| {
            TimeStampReq::take_from(cons)
        })
        .unwrap();

        assert_eq!(req.message_imprint.hashed_message.to_bytes().len(), 20);
    }
}
