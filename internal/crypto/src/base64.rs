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

//! Wrapper for base64 crate to alleviate need of calling
//! Engine trait everywhere.

#![allow(missing_docs)]

use base64::{prelude::*, DecodeError};

pub fn encode(data: &[u8]) -> String {
    BASE64_STANDARD.encode(data)
}

pub fn decode(data: &str) -> Result<Vec<u8>, DecodeError> {
    BASE64_STANDARD.decode(data)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn round_trip() {
        let data = b"\x30\x82\x01\x0a";
        let b64 = encode(data);
        assert_eq!(decode(&b64).unwrap(), data);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode("not//valid==b64!").is_err());
    }
}
