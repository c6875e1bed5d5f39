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

use thiserror::Error;

/// Why an authentication attempt was rejected.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AuthErrorKind {
    /// No token is configured at all.
    MissingToken,

    /// The relay rejected the token without further detail.
    InvalidToken,

    /// The relay signaled the token expired.
    TokenExpired,

    /// The relay signaled the token was revoked.
    TokenRevoked,
}

impl std::fmt::Display for AuthErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::MissingToken => "no token configured",
            Self::InvalidToken => "token invalid",
            Self::TokenExpired => "token expired",
            Self::TokenRevoked => "token revoked",
        };
        f.write_str(text)
    }
}

/// Describes errors reported by (or while reaching) the relay backend.
///
/// Every variant carries enough structure for callers to drive
/// retry/upsell/reconfigure flows without parsing messages.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApiError {
    /// Authentication failed (HTTP 401 or missing credential).
    #[error("authentication failed: {kind}")]
    Authentication {
        /// Failure sub-kind.
        kind: AuthErrorKind,
    },

    /// The account has no credits left for the operation (HTTP 403).
    #[error("insufficient credits ({available} available)")]
    InsufficientCredits {
        /// Credits currently available to the account.
        available: u32,
    },

    /// The operation requires a primary-tier token (HTTP 403).
    #[error("a primary token is required for this operation")]
    PrimaryTokenRequired,

    /// The server could not be reached or timed out.
    #[error("network error: {0}")]
    Network(String),

    /// The server answered with an error status.
    #[error("server error (HTTP {status}): {message}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Server-supplied message, or a generic fallback.
        message: String,
    },

    /// A successful response could not be decoded.
    #[error("unexpected response payload: {0}")]
    Decode(String),
}

impl ApiError {
    /// True for the error kinds that must abort a batch: continuing would
    /// either repeat an unrecoverable auth/credit problem or keep hitting an
    /// unreachable service.
    pub fn is_batch_fatal(&self) -> bool {
        matches!(
            self,
            Self::Authentication { .. }
                | Self::InsufficientCredits { .. }
                | Self::Network(_)
                | Self::Server { .. }
                | Self::PrimaryTokenRequired
                | Self::Decode(_)
        )
    }
}
