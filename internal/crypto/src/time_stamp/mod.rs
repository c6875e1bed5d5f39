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

//! Functions for working with [RFC 3161] time stamp service providers.
//!
//! [RFC 3161]: https://www.ietf.org/rfc/rfc3161.txt

mod error;
pub use error::TimeStampError;

mod http_request;
pub use http_request::default_rfc3161_request;

mod provider;
pub use provider::{default_rfc3161_message, TimeStampProvider};

mod response;
pub use response::TimeStampResponse;

use sha2::{Digest as _, Sha256, Sha384, Sha512};

/// Message digest algorithms supported for time stamp imprints.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum DigestAlgorithm {
    /// SHA-1 (legacy TSAs only).
    Sha1,

    /// SHA-256 (default).
    Sha256,

    /// SHA-384.
    Sha384,

    /// SHA-512.
    Sha512,
}

impl DigestAlgorithm {
    /// BER-encoded OID content octets for this algorithm.
    pub(crate) fn oid_bytes(self) -> &'static [u8] {
        match self {
            // 1.3.14.3.2.26
            Self::Sha1 => &[43, 14, 3, 2, 26],
            // 2.16.840.1.101.3.4.2.1
            Self::Sha256 => &[96, 134, 72, 1, 101, 3, 4, 2, 1],
            // 2.16.840.1.101.3.4.2.2
            Self::Sha384 => &[96, 134, 72, 1, 101, 3, 4, 2, 2],
            // 2.16.840.1.101.3.4.2.3
            Self::Sha512 => &[96, 134, 72, 1, 101, 3, 4, 2, 3],
        }
    }

    /// Digest `data` with this algorithm.
    pub fn digest(self, data: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha1 => crate::hash::sha1(data),
            Self::Sha256 => Sha256::digest(data).to_vec(),
            Self::Sha384 => Sha384::digest(data).to_vec(),
            Self::Sha512 => Sha512::digest(data).to_vec(),
        }
    }
}

impl From<DigestAlgorithm> for crate::asn1::rfc3161::AlgorithmIdentifier {
    fn from(alg: DigestAlgorithm) -> Self {
        Self {
            algorithm: bcder::Oid(bytes::Bytes::from_static(alg.oid_bytes())),
        }
    }
}
