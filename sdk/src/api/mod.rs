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

//! HTTP client for the Sello relay backend.
//!
//! The relay forwards RFC 3161 timestamp requests to a commercial TSA while
//! metering a per-account credit balance. This module is a *client* of that
//! ledger; the ledger itself lives server-side.

mod client;
pub use client::RelayClient;

mod error;
pub use error::{ApiError, AuthErrorKind};

mod types;
pub use types::{
    BalanceResponse, CompleteTimestampRequest, DerivedToken, HistoryResponse,
    RelayTimestampRequest, RelayTimestampResponse, TimestampRecord, TokenInfo, TokenList,
    TokenSummary, VerificationRecord,
};

/// The subset of the relay API the signing pipeline depends on.
///
/// Extracted as a trait so batch semantics can be exercised against scripted
/// test doubles; [`RelayClient`] is the production implementation.
pub trait RelayApi: Send + Sync {
    /// Forward a raw RFC 3161 request; consumes one credit on success.
    fn relay_timestamp(
        &self,
        request: &RelayTimestampRequest,
    ) -> Result<RelayTimestampResponse, ApiError>;

    /// Attach the final on-disk hash/size to a relay record. Best-effort
    /// bookkeeping; the token issued earlier stays valid regardless.
    fn complete_timestamp(
        &self,
        record_id: &str,
        document_hash: &str,
        size_bytes: u64,
    ) -> Result<(), ApiError>;
}
