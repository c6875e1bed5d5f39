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

//! Wire types for the relay backend API.

use serde::{Deserialize, Serialize};

/// Metadata the relay reports about the authenticated token.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct TokenInfo {
    /// Whether this is the account's primary token.
    pub is_primary: bool,

    /// User-assigned alias, for derived tokens.
    #[serde(default)]
    pub alias: Option<String>,

    /// ISO-8601 expiry, when the token has one.
    #[serde(default)]
    pub expires_at: Option<String>,

    /// Whether the relay still honors the token.
    pub is_active: bool,
}

/// `GET /api/v1/balance`.
#[derive(Clone, Debug, Deserialize)]
pub struct BalanceResponse {
    /// Credits available to the account.
    pub credits_remaining: u32,

    /// Account e-mail.
    #[serde(default)]
    pub email: String,

    /// Subscription plan identifier.
    #[serde(default)]
    pub plan: String,

    /// Metadata about the authenticated token.
    #[serde(default)]
    pub token_info: Option<TokenInfo>,
}

/// `POST /api/v1/timestamp/relay` request body.
#[derive(Clone, Debug, Serialize)]
pub struct RelayTimestampRequest {
    /// Base64 of the DER `TimeStampReq`.
    pub tsa_req_b64: String,

    /// Original PDF filename, for attribution.
    pub filename: String,

    /// Document size in bytes.
    pub size_bytes: u64,

    /// Signer common name from the certificate.
    pub signer_cn: String,

    /// Certificate serial number (hex).
    pub signer_serial: String,
}

/// `POST /api/v1/timestamp/relay` response body.
#[derive(Clone, Debug, Deserialize)]
pub struct RelayTimestampResponse {
    /// Relay-assigned record identifier for later finalization.
    pub record_id: String,

    /// Base64 of the DER `TimeStampResp` from the upstream TSA.
    pub tsa_resp_b64: String,

    /// Public verification page for this record, when issued.
    #[serde(default)]
    pub verification_url: Option<String>,

    /// Credits left after this call.
    #[serde(default)]
    pub credits_remaining: Option<u32>,
}

/// `POST /api/v1/timestamp/{record_id}/complete` request body.
#[derive(Clone, Debug, Serialize)]
pub struct CompleteTimestampRequest {
    /// SHA-256 of the final signed file, hex.
    pub document_hash: String,

    /// Final size of the signed file in bytes.
    pub size_bytes: u64,
}

/// One record in the account's timestamp history.
#[derive(Clone, Debug, Deserialize)]
pub struct TimestampRecord {
    /// Relay-assigned record identifier.
    pub record_id: String,

    /// Original filename.
    #[serde(default)]
    pub filename: String,

    /// Document size in bytes.
    #[serde(default)]
    pub size_bytes: u64,

    /// ISO-8601 creation instant.
    #[serde(default)]
    pub created_at: String,

    /// Public verification page, when issued.
    #[serde(default)]
    pub verification_url: Option<String>,
}

/// `GET /api/v1/timestamp/history`.
#[derive(Clone, Debug, Deserialize)]
pub struct HistoryResponse {
    /// Records, newest first.
    #[serde(default)]
    pub records: Vec<TimestampRecord>,
}

/// `GET /api/v1/verify/by-hash` (public endpoint).
#[derive(Clone, Debug, Deserialize)]
pub struct VerificationRecord {
    /// Original filename.
    #[serde(default)]
    pub filename: Option<String>,

    /// ISO-8601 timestamp instant.
    #[serde(default)]
    pub timestamp_utc: Option<String>,

    /// Public verification page.
    #[serde(default)]
    pub verification_url: Option<String>,

    /// Signer common name recorded with the timestamp.
    #[serde(default)]
    pub signer_cn: Option<String>,
}

/// One token in `GET /api/v1/tokens/list`.
#[derive(Clone, Debug, Deserialize)]
pub struct TokenSummary {
    /// Token identifier (not the secret).
    pub token_id: String,

    /// User-assigned alias.
    #[serde(default)]
    pub alias: Option<String>,

    /// Whether this is the primary token.
    #[serde(default)]
    pub is_primary: bool,

    /// ISO-8601 expiry, when set.
    #[serde(default)]
    pub expires_at: Option<String>,

    /// Whether the relay still honors the token.
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

/// `GET /api/v1/tokens/list`.
#[derive(Clone, Debug, Deserialize)]
pub struct TokenList {
    /// The primary token, when visible to the caller.
    #[serde(default)]
    pub primary: Option<TokenSummary>,

    /// Derived tokens.
    #[serde(default)]
    pub derived: Vec<TokenSummary>,
}

/// `POST /api/v1/tokens/derive`.
#[derive(Clone, Debug, Deserialize)]
pub struct DerivedToken {
    /// The full token secret. Only shown once.
    pub token: String,

    /// Alias assigned at creation.
    pub alias: String,

    /// ISO-8601 expiry, when requested.
    #[serde(default)]
    pub expires_at: Option<String>,
}

/// Error body the relay attaches to 4xx responses.
#[derive(Clone, Debug, Default, Deserialize)]
pub(crate) struct ApiErrorBody {
    #[serde(default)]
    pub error: Option<String>,

    #[serde(default)]
    pub message: Option<String>,

    #[serde(default)]
    pub available_credits: Option<u32>,
}
