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

//! ASN.1 types defined by [RFC 3161].
//!
//! Only the subset needed to build `TimeStampReq` structures and interpret
//! `TimeStampResp` structures is modeled. Nested CMS content is carried as
//! captured DER and never re-serialized, so a token round-trips through this
//! module byte for byte.
//!
//! [RFC 3161]: https://datatracker.ietf.org/doc/html/rfc3161

use bcder::{
    decode::{Constructed, DecodeError, Source},
    encode::{self, PrimitiveContent, Values},
    Captured, ConstOid, Integer, Mode, OctetString, Oid, Tag,
};

/// Content type for CMS SignedData.
///
/// 1.2.840.113549.1.7.2
pub const OID_ID_SIGNED_DATA: ConstOid = Oid(&[42, 134, 72, 134, 247, 13, 1, 7, 2]);

/// Content type for a time-stamp token info payload.
///
/// 1.2.840.113549.1.9.16.1.4
pub const OID_CONTENT_TYPE_TST_INFO: ConstOid = Oid(&[42, 134, 72, 134, 247, 13, 1, 9, 16, 1, 4]);

/// Algorithm identifier with parameters carried opaquely.
///
/// Encoding always emits an explicit NULL parameter, which is what the
/// message-digest algorithms used here expect and what TSAs in the wild
/// require.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AlgorithmIdentifier {
    /// The algorithm OID.
    pub algorithm: Oid,
}

impl AlgorithmIdentifier {
    /// Decode a value of this type.
    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            let algorithm = Oid::take_from(cons)?;
            cons.capture_all()?;
            Ok(Self { algorithm })
        })
    }

    /// Encode a reference to this value.
    pub fn encode_ref(&self) -> impl Values + '_ {
        encode::sequence((self.algorithm.encode_ref(), ().encode()))
    }
}

/// Generalized time carried as captured DER.
#[derive(Clone, Debug)]
pub struct GeneralizedTime(Captured);

impl PartialEq for GeneralizedTime {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_slice() == other.0.as_slice()
    }
}

impl Eq for GeneralizedTime {}

impl GeneralizedTime {
    /// Decode one primitive value, fractional seconds and all.
    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        cons.capture_one().map(GeneralizedTime)
    }

    /// Encode a reference to this value.
    pub fn encode_ref(&self) -> impl Values + '_ {
        &self.0
    }

    /// The raw time string (`YYYYMMDDHHMMSS[.f*]Z`), empty on malformed input.
    pub fn as_str(&self) -> &str {
        let slice = self.0.as_slice();

        // tag (1 byte) + short-form length (1 byte) + content
        if slice.len() >= 2 {
            let length = slice[1] as usize;
            if length < 128 && slice.len() >= 2 + length {
                if let Ok(s) = std::str::from_utf8(&slice[2..2 + length]) {
                    return s;
                }
            }
        }

        ""
    }

    /// Best-effort conversion to a UTC timestamp.
    pub fn to_datetime(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        use chrono::TimeZone;

        let s = self.as_str().trim_end_matches('Z');
        let (s, _frac) = s.split_once('.').unwrap_or((s, ""));
        if s.len() < 14 {
            return None;
        }

        let year = s[0..4].parse().ok()?;
        let month = s[4..6].parse().ok()?;
        let day = s[6..8].parse().ok()?;
        let hour = s[8..10].parse().ok()?;
        let minute = s[10..12].parse().ok()?;
        let second = s[12..14].parse().ok()?;

        chrono::Utc
            .with_ymd_and_hms(year, month, day, hour, minute, second)
            .single()
    }
}

/// Extensions carried as captured DER.
#[derive(Clone, Debug)]
pub struct Extensions(Captured);

impl PartialEq for Extensions {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_slice() == other.0.as_slice()
    }
}

impl Eq for Extensions {}

impl Extensions {
    /// Decode a value of this type.
    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        cons.capture_all().map(Extensions)
    }
}

/// A time-stamp request.
///
/// ```ASN.1
/// TimeStampReq ::= SEQUENCE  {
///    version                  INTEGER  { v1(1) },
///    messageImprint           MessageImprint,
///    reqPolicy                TSAPolicyId                OPTIONAL,
///    nonce                    INTEGER                    OPTIONAL,
///    certReq                  BOOLEAN                    DEFAULT FALSE,
///    extensions               [0] IMPLICIT Extensions    OPTIONAL  }
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TimeStampReq {
    /// Version (always v1).
    pub version: Integer,

    /// Hash algorithm OID and the hash value of the data to be time-stamped.
    pub message_imprint: MessageImprint,

    /// Requested TSA policy.
    pub req_policy: Option<TsaPolicyId>,

    /// Nonce to be reflected in the response.
    pub nonce: Option<Integer>,

    /// Whether the TSA certificate should be included in the response.
    pub cert_req: Option<bool>,

    /// Request extensions.
    pub extensions: Option<Extensions>,
}

impl TimeStampReq {
    /// Decode a value of this type.
    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            let version = Integer::take_from(cons)?;
            let message_imprint = MessageImprint::take_from(cons)?;
            let req_policy = TsaPolicyId::take_opt_from(cons)?;
            let nonce =
                cons.take_opt_primitive_if(Tag::INTEGER, |prim| Integer::from_primitive(prim))?;
            let cert_req = cons.take_opt_bool()?;
            let extensions =
                cons.take_opt_constructed_if(Tag::CTX_0, |cons| Extensions::take_from(cons))?;

            Ok(Self {
                version,
                message_imprint,
                req_policy,
                nonce,
                cert_req,
                extensions,
            })
        })
    }

    /// Encode a reference to this value.
    pub fn encode_ref(&self) -> impl Values + '_ {
        encode::sequence((
            (&self.version).encode(),
            self.message_imprint.encode_ref(),
            self.req_policy
                .as_ref()
                .map(|req_policy| req_policy.encode_ref()),
            self.nonce.as_ref().map(|nonce| nonce.encode()),
            self.cert_req.as_ref().map(|cert_req| cert_req.encode_ref()),
        ))
    }

    /// Serialize to DER.
    pub fn to_der(&self) -> Result<Vec<u8>, std::io::Error> {
        let mut body = Vec::new();
        self.encode_ref().write_encoded(Mode::Der, &mut body)?;
        Ok(body)
    }
}

/// Message imprint.
///
/// ```ASN.1
/// MessageImprint ::= SEQUENCE  {
///      hashAlgorithm                AlgorithmIdentifier,
///      hashedMessage                OCTET STRING  }
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MessageImprint {
    /// Digest algorithm used over the message.
    pub hash_algorithm: AlgorithmIdentifier,

    /// The digest itself.
    pub hashed_message: OctetString,
}

impl MessageImprint {
    /// Decode a value of this type.
    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            let hash_algorithm = AlgorithmIdentifier::take_from(cons)?;
            let hashed_message = OctetString::take_from(cons)?;

            Ok(Self {
                hash_algorithm,
                hashed_message,
            })
        })
    }

    /// Encode a reference to this value.
    pub fn encode_ref(&self) -> impl Values + '_ {
        encode::sequence((self.hash_algorithm.encode_ref(), self.hashed_message.encode_ref()))
    }
}

/// TSA policy ID.
pub type TsaPolicyId = Oid;

/// Time stamp response.
///
/// ```ASN.1
/// TimeStampResp ::= SEQUENCE  {
///      status                  PKIStatusInfo,
///      timeStampToken          TimeStampToken     OPTIONAL  }
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TimeStampResp {
    /// Status of the request.
    pub status: PkiStatusInfo,

    /// The issued token, present when the request was granted.
    pub time_stamp_token: Option<TimeStampToken>,
}

impl TimeStampResp {
    /// Decode a value of this type.
    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            let status = PkiStatusInfo::take_from(cons)?;
            let time_stamp_token = TimeStampToken::take_opt_from(cons)?;

            Ok(Self {
                status,
                time_stamp_token,
            })
        })
    }

    /// Encode a reference to this value.
    pub fn encode_ref(&self) -> impl Values + '_ {
        encode::sequence((
            self.status.encode_ref(),
            self.time_stamp_token.as_ref().map(|token| token.encode_ref()),
        ))
    }

    /// Serialize to DER.
    pub fn to_der(&self) -> Result<Vec<u8>, std::io::Error> {
        let mut body = Vec::new();
        self.encode_ref().write_encoded(Mode::Der, &mut body)?;
        Ok(body)
    }
}

/// PKI status info.
///
/// ```ASN.1
/// PKIStatusInfo ::= SEQUENCE {
///     status        PKIStatus,
///     statusString  PKIFreeText     OPTIONAL,
///     failInfo      PKIFailureInfo  OPTIONAL  }
/// ```
///
/// The optional status text and failure info are kept as captured DER; the
/// status code alone drives control flow.
#[derive(Clone, Debug)]
pub struct PkiStatusInfo {
    /// Status of the request.
    pub status: PkiStatus,

    /// Captured statusString/failInfo tail, if any.
    pub details: Option<Captured>,
}

impl PartialEq for PkiStatusInfo {
    fn eq(&self, other: &Self) -> bool {
        self.status == other.status
            && self.details.as_ref().map(Captured::as_slice)
                == other.details.as_ref().map(Captured::as_slice)
    }
}

impl Eq for PkiStatusInfo {}

impl PkiStatusInfo {
    /// Decode a value of this type.
    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            let status = PkiStatus::take_from(cons)?;
            let details = cons.capture_all()?;
            let details = if details.as_slice().is_empty() {
                None
            } else {
                Some(details)
            };

            Ok(Self { status, details })
        })
    }

    /// Encode a reference to this value.
    pub fn encode_ref(&self) -> impl Values + '_ {
        encode::sequence((self.status.encode(), self.details.as_ref()))
    }
}

impl From<PkiStatus> for PkiStatusInfo {
    fn from(status: PkiStatus) -> Self {
        Self {
            status,
            details: None,
        }
    }
}

/// PKI status.
///
/// ```ASN.1
/// PKIStatus ::= INTEGER {
///     granted                (0),
///     grantedWithMods        (1),
///     rejection              (2),
///     waiting                (3),
///     revocationWarning      (4),
///     revocationNotification (5) }
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[allow(missing_docs)]
pub enum PkiStatus {
    Granted = 0,
    GrantedWithMods = 1,
    Rejection = 2,
    Waiting = 3,
    RevocationWarning = 4,
    RevocationNotification = 5,
}

impl PkiStatus {
    /// Decode a value of this type.
    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        match cons.take_primitive_if(Tag::INTEGER, Integer::i8_from_primitive)? {
            0 => Ok(Self::Granted),
            1 => Ok(Self::GrantedWithMods),
            2 => Ok(Self::Rejection),
            3 => Ok(Self::Waiting),
            4 => Ok(Self::RevocationWarning),
            5 => Ok(Self::RevocationNotification),
            _ => Err(cons.content_err("unknown PKIStatus value")),
        }
    }

    /// Encode this value.
    pub fn encode(self) -> impl Values {
        u8::from(self).encode()
    }
}

impl From<PkiStatus> for u8 {
    fn from(v: PkiStatus) -> u8 {
        match v {
            PkiStatus::Granted => 0,
            PkiStatus::GrantedWithMods => 1,
            PkiStatus::Rejection => 2,
            PkiStatus::Waiting => 3,
            PkiStatus::RevocationWarning => 4,
            PkiStatus::RevocationNotification => 5,
        }
    }
}

/// Time stamp token.
///
/// ```ASN.1
/// TimeStampToken ::= ContentInfo
/// ```
pub type TimeStampToken = ContentInfo;

/// CMS content info wrapper.
///
/// The content is kept as captured DER (including its `[0] EXPLICIT` tag) so
/// the token bytes produced by a TSA are embedded without re-serialization.
#[derive(Clone, Debug)]
pub struct ContentInfo {
    /// Content type OID (`id-signedData` for time stamp tokens).
    pub content_type: Oid,

    /// Captured `[0] EXPLICIT` content.
    pub content: Captured,
}

impl PartialEq for ContentInfo {
    fn eq(&self, other: &Self) -> bool {
        self.content_type == other.content_type
            && self.content.as_slice() == other.content.as_slice()
    }
}

impl Eq for ContentInfo {}

impl ContentInfo {
    /// Decode an optional value of this type.
    pub fn take_opt_from<S: Source>(
        cons: &mut Constructed<S>,
    ) -> Result<Option<Self>, DecodeError<S::Error>> {
        cons.take_opt_sequence(|cons| {
            let content_type = Oid::take_from(cons)?;
            let content = cons.capture_all()?;
            Ok(Self {
                content_type,
                content,
            })
        })
    }

    /// Decode a value of this type.
    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            let content_type = Oid::take_from(cons)?;
            let content = cons.capture_all()?;
            Ok(Self {
                content_type,
                content,
            })
        })
    }

    /// Encode a reference to this value.
    pub fn encode_ref(&self) -> impl Values + '_ {
        encode::sequence((self.content_type.encode_ref(), &self.content))
    }

    /// Serialize to DER.
    pub fn to_der(&self) -> Result<Vec<u8>, std::io::Error> {
        let mut body = Vec::new();
        self.encode_ref().write_encoded(Mode::Der, &mut body)?;
        Ok(body)
    }
}

/// Time stamp token info.
///
/// ```ASN.1
/// TSTInfo ::= SEQUENCE  {
///     version                      INTEGER  { v1(1) },
///     policy                       TSAPolicyId,
///     messageImprint               MessageImprint,
///     serialNumber                 INTEGER,
///     genTime                      GeneralizedTime,
///     accuracy                     Accuracy                 OPTIONAL,
///     ordering                     BOOLEAN             DEFAULT FALSE,
///     nonce                        INTEGER                  OPTIONAL,
///     tsa                          [0] GeneralName          OPTIONAL,
///     extensions                   [1] IMPLICIT Extensions  OPTIONAL   }
/// ```
#[derive(Clone, Debug)]
#[allow(missing_docs)]
pub struct TstInfo {
    pub version: Integer,
    pub policy: TsaPolicyId,
    pub message_imprint: MessageImprint,
    pub serial_number: Integer,
    pub gen_time: GeneralizedTime,
    pub accuracy: Option<Accuracy>,
    pub ordering: Option<bool>,
    pub nonce: Option<Integer>,
    pub tsa: Option<Captured>,
    pub extensions: Option<Extensions>,
}

impl PartialEq for TstInfo {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version
            && self.policy == other.policy
            && self.message_imprint == other.message_imprint
            && self.serial_number == other.serial_number
            && self.gen_time == other.gen_time
            && self.nonce == other.nonce
    }
}

impl Eq for TstInfo {}

impl TstInfo {
    /// Decode a value of this type.
    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            let version = Integer::take_from(cons)?;
            let policy = TsaPolicyId::take_from(cons)?;
            let message_imprint = MessageImprint::take_from(cons)?;
            let serial_number = Integer::take_from(cons)?;
            let gen_time = GeneralizedTime::take_from(cons)?;
            let accuracy = Accuracy::take_opt_from(cons)?;
            let ordering = cons.take_opt_bool()?;
            let nonce =
                cons.take_opt_primitive_if(Tag::INTEGER, |prim| Integer::from_primitive(prim))?;
            let tsa = cons.take_opt_constructed_if(Tag::CTX_0, |cons| cons.capture_all())?;
            let extensions =
                cons.take_opt_constructed_if(Tag::CTX_1, |cons| Extensions::take_from(cons))?;

            Ok(Self {
                version,
                policy,
                message_imprint,
                serial_number,
                gen_time,
                accuracy,
                ordering,
                nonce,
                tsa,
                extensions,
            })
        })
    }
}

/// Accuracy.
///
/// ```ASN.1
/// Accuracy ::= SEQUENCE {
///                 seconds        INTEGER           OPTIONAL,
///                 millis     [0] INTEGER  (1..999) OPTIONAL,
///                 micros     [1] INTEGER  (1..999) OPTIONAL  }
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
#[allow(missing_docs)]
pub struct Accuracy {
    pub seconds: Option<Integer>,
    pub millis: Option<Integer>,
    pub micros: Option<Integer>,
}

impl Accuracy {
    /// Decode an optional value of this type.
    pub fn take_opt_from<S: Source>(
        cons: &mut Constructed<S>,
    ) -> Result<Option<Self>, DecodeError<S::Error>> {
        cons.take_opt_sequence(|cons| {
            let seconds =
                cons.take_opt_primitive_if(Tag::INTEGER, |prim| Integer::from_primitive(prim))?;
            let millis =
                cons.take_opt_primitive_if(Tag::CTX_0, |prim| Integer::from_primitive(prim))?;
            let micros =
                cons.take_opt_primitive_if(Tag::CTX_1, |prim| Integer::from_primitive(prim))?;

            Ok(Self {
                seconds,
                millis,
                micros,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use bytes::Bytes;

    use super::*;
    use crate::time_stamp::DigestAlgorithm;

    #[test]
    fn request_round_trip() {
        let alg = DigestAlgorithm::Sha256;
        let digest = alg.digest(b"some signed bytes");

        let req = TimeStampReq {
            version: Integer::from(1_u8),
            message_imprint: MessageImprint {
                hash_algorithm: alg.into(),
                hashed_message: OctetString::new(Bytes::copy_from_slice(&digest)),
            },
            req_policy: None,
            nonce: Some(Integer::from(0x1122_3344_5566_u64)),
            cert_req: Some(true),
            extensions: None,
        };

        let der = req.to_der().unwrap();
        let parsed = Constructed::decode(der.as_slice(), Mode::Der, |cons| {
            TimeStampReq::take_from(cons)
        })
        .unwrap();

        assert_eq!(parsed, req);
        assert_eq!(parsed.message_imprint.hashed_message.to_bytes().len(), 32);
        assert_eq!(parsed.cert_req, Some(true));
    }

    #[test]
    fn response_without_token() {
        let resp = TimeStampResp {
            status: PkiStatus::Rejection.into(),
            time_stamp_token: None,
        };

        let der = resp.to_der().unwrap();
        let parsed = Constructed::decode(der.as_slice(), Mode::Der, |cons| {
            TimeStampResp::take_from(cons)
        })
        .unwrap();

        assert_eq!(parsed.status.status, PkiStatus::Rejection);
        assert!(parsed.time_stamp_token.is_none());
    }

    #[test]
    fn generalized_time_parses() {
        let der = [0x18, 0x0f, b'2', b'0', b'2', b'5', b'0', b'3', b'1', b'4', b'0', b'9', b'2',
            b'6', b'5', b'3', b'Z'];
        let gt = Constructed::decode(der.as_slice(), Mode::Der, |cons| {
            GeneralizedTime::take_from(cons)
        })
        .unwrap();

        assert_eq!(gt.as_str(), "20250314092653Z");
        let dt = gt.to_datetime().unwrap();
        assert_eq!(dt.to_rfc3339(), "2025-03-14T09:26:53+00:00");
    }
}
