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

use bcder::{decode::Constructed, Integer, Mode, OctetString, Oid, Tag};

use crate::{
    asn1::rfc3161::{
        PkiStatus, TimeStampResp, TstInfo, OID_CONTENT_TYPE_TST_INFO, OID_ID_SIGNED_DATA,
    },
    time_stamp::TimeStampError,
};

/// A parsed `TimeStampResp` plus the raw bytes it came from.
pub struct TimeStampResponse {
    raw: Vec<u8>,
    resp: TimeStampResp,
}

impl std::ops::Deref for TimeStampResponse {
    type Target = TimeStampResp;

    fn deref(&self) -> &Self::Target {
        &self.resp
    }
}

impl TimeStampResponse {
    /// Parse a DER-encoded `TimeStampResp`.
    pub fn parse(bytes: &[u8]) -> Result<Self, TimeStampError> {
        let resp = Constructed::decode(bytes, Mode::Der, |cons| TimeStampResp::take_from(cons))
            .map_err(|e| TimeStampError::DecodeError(e.to_string()))?;

        Ok(Self {
            raw: bytes.to_vec(),
            resp,
        })
    }

    /// Return `true` if the request was successful.
    pub fn is_success(&self) -> bool {
        matches!(
            self.resp.status.status,
            PkiStatus::Granted | PkiStatus::GrantedWithMods
        )
    }

    /// The raw response bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    /// The DER bytes of the embedded time stamp token, if any.
    ///
    /// This is the `ContentInfo` (CMS SignedData) exactly as issued by the
    /// TSA, suitable for embedding as an unsigned `timeStampToken` attribute.
    pub fn token_bytes(&self) -> Option<Vec<u8>> {
        let token = self.resp.time_stamp_token.as_ref()?;

        if token.content_type != OID_ID_SIGNED_DATA {
            return None;
        }

        token.to_der().ok()
    }

    /// Best-effort extraction of the `TSTInfo` payload.
    ///
    /// Returns `None` when the token is absent or its CMS envelope cannot be
    /// walked; callers treat that as "no info available", not an error.
    pub fn tst_info(&self) -> Option<TstInfo> {
        let token = self.resp.time_stamp_token.as_ref()?;

        if token.content_type != OID_ID_SIGNED_DATA {
            return None;
        }

        // SignedData ::= SEQUENCE { version, digestAlgorithms SET,
        //   encapContentInfo SEQUENCE { eContentType, [0] EXPLICIT OCTET
        //   STRING OPTIONAL }, ... }
        //
        // The token content is `[0] EXPLICIT SignedData`; walk just far
        // enough to pull out the eContent octets.
        let econtent: Option<(Oid, Option<OctetString>)> = token
            .content
            .clone()
            .decode(|cons| {
                cons.take_constructed_if(Tag::CTX_0, |cons| {
                    cons.take_sequence(|cons| {
                        let _version = Integer::take_from(cons)?;
                        cons.take_constructed_if(Tag::SET, |cons| cons.capture_all())?;
                        let inner = cons.take_sequence(|cons| {
                            let content_type = Oid::take_from(cons)?;
                            let content = cons.take_opt_constructed_if(Tag::CTX_0, |cons| {
                                OctetString::take_from(cons)
                            })?;
                            Ok((content_type, content))
                        })?;
                        cons.capture_all()?;
                        Ok(inner)
                    })
                })
            })
            .ok();

        let (content_type, content) = econtent?;
        if content_type != OID_CONTENT_TYPE_TST_INFO {
            return None;
        }

        let content = content?.to_bytes();
        Constructed::decode(content.as_ref(), Mode::Der, |cons| TstInfo::take_from(cons)).ok()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use bcder::Captured;

    use super::*;
    use crate::asn1::rfc3161::{ContentInfo, PkiStatusInfo};

    fn stub_token() -> ContentInfo {
        use bcder::encode::Values;

        let inner = OctetString::new(bytes::Bytes::from_static(b"opaque"));
        ContentInfo {
            content_type: Oid(bytes::Bytes::from_static(&[
                42, 134, 72, 134, 247, 13, 1, 7, 2,
            ])),
            content: Captured::from_values(Mode::Der, inner.encode().explicit(Tag::CTX_0)),
        }
    }

    #[test]
    fn granted_response_yields_token_bytes() {
        let resp = TimeStampResp {
            status: PkiStatusInfo::from(PkiStatus::Granted),
            time_stamp_token: Some(stub_token()),
        };
        let der = resp.to_der().unwrap();

        let parsed = TimeStampResponse::parse(&der).unwrap();
        assert!(parsed.is_success());

        let token = parsed.token_bytes().unwrap();
        assert_eq!(token, stub_token().to_der().unwrap());

        // An opaque stub is not a real SignedData; info extraction degrades
        // to None rather than failing.
        assert!(parsed.tst_info().is_none());
    }

    #[test]
    fn rejection_response_has_no_token() {
        let resp = TimeStampResp {
            status: PkiStatusInfo::from(PkiStatus::Rejection),
            time_stamp_token: None,
        };
        let der = resp.to_der().unwrap();

        let parsed = TimeStampResponse::parse(&der).unwrap();
        assert!(!parsed.is_success());
        assert!(parsed.token_bytes().is_none());
    }
}
