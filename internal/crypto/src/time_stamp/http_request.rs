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

use bcder::{decode::Constructed, Mode};

use crate::{
    asn1::rfc3161::TimeStampReq,
    time_stamp::{response::TimeStampResponse, TimeStampError},
};

const HTTP_CONTENT_TYPE_REQUEST: &str = "application/timestamp-query";
const HTTP_CONTENT_TYPE_RESPONSE: &str = "application/timestamp-reply";

/// Request an [RFC 3161] time stamp over HTTP.
///
/// `data` is a DER-encoded `TimeStampReq` (see
/// [`default_rfc3161_message`](super::default_rfc3161_message)). If
/// successful, responds with the raw bytestream of the `TimeStampResp`.
///
/// [RFC 3161]: https://datatracker.ietf.org/doc/html/rfc3161
pub fn default_rfc3161_request(
    url: &str,
    headers: Option<Vec<(String, String)>>,
    data: &[u8],
    timeout: Duration,
) -> Result<Vec<u8>, TimeStampError> {
    let request = Constructed::decode(data, Mode::Der, TimeStampReq::take_from)
        .map_err(|_err| TimeStampError::InternalError("failure to decode TimeStampReq".into()))?;

    time_stamp_request_http(url, headers, &request, data, timeout)
}

fn time_stamp_request_http(
    url: &str,
    headers: Option<Vec<(String, String)>>,
    request: &TimeStampReq,
    body: &[u8],
    timeout: Duration,
) -> Result<Vec<u8>, TimeStampError> {
    let agent = ureq::AgentBuilder::new().timeout(timeout).build();

    let mut req = agent.post(url);

    if let Some(headers) = headers {
        for (ref name, ref value) in headers {
            req = req.set(name.as_str(), value.as_str());
        }
    }

    let response = req
        .set("Content-Type", HTTP_CONTENT_TYPE_REQUEST)
        .send_bytes(body)
        .map_err(|err| match err {
            ureq::Error::Status(status, response) => {
                TimeStampError::HttpErrorResponse(status, response.content_type().to_string())
            }
            ureq::Error::Transport(transport) => {
                TimeStampError::HttpConnectionError(transport.to_string())
            }
        })?;

    if response.status() != 200 || response.content_type() != HTTP_CONTENT_TYPE_RESPONSE {
        return Err(TimeStampError::HttpErrorResponse(
            response.status(),
            response.content_type().to_string(),
        ));
    }

    let len = response
        .header("Content-Length")
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(20000);

    let mut response_bytes: Vec<u8> = Vec::with_capacity(len);

    response
        .into_reader()
        .take(1_000_000)
        .read_to_end(&mut response_bytes)?;

    let res = TimeStampResponse::parse(&response_bytes)?;

    // Verify nonce was reflected, if present.
    if res.is_success() {
        if let Some(tst_info) = res.tst_info() {
            if tst_info.nonce != request.nonce {
                return Err(TimeStampError::NonceMismatch);
            }
        }
    }

    Ok(response_bytes)
}
