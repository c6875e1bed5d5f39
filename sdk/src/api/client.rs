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

use log::{debug, info, warn};

use crate::{
    api::{
        types::ApiErrorBody, ApiError, AuthErrorKind, BalanceResponse, CompleteTimestampRequest,
        DerivedToken, HistoryResponse, RelayApi, RelayTimestampRequest, RelayTimestampResponse,
        TimestampRecord, TokenList, VerificationRecord,
    },
    config::RelayConfig,
    credentials::CredentialStore,
};

const USER_AGENT: &str = concat!("sello/", env!("CARGO_PKG_VERSION"));

/// Client for the Sello relay backend.
///
/// Handles bearer authentication, JSON transport and the mapping of HTTP
/// error statuses onto the typed [`ApiError`] taxonomy.
pub struct RelayClient {
    agent: ureq::Agent,
    base_url: String,
    token: Option<String>,
}

impl RelayClient {
    /// Create a client with an explicit token (or none, for public
    /// endpoints only).
    pub fn new(config: &RelayConfig, token: Option<String>) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(config.timeout).build(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    /// Create a client taking its token from the injected credential store.
    pub fn from_store(config: &RelayConfig, store: &dyn CredentialStore) -> Self {
        Self::new(config, store.token())
    }

    /// Whether a token is configured.
    pub fn is_configured(&self) -> bool {
        self.token.as_deref().is_some_and(|token| !token.is_empty())
    }

    /// Check a token against the `smx_` + lowercase-hex format.
    pub fn validate_token_format(token: &str) -> bool {
        match token.strip_prefix("smx_") {
            Some(rest) => {
                rest.len() >= 5 && rest.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase())
            }
            None => false,
        }
    }

    /// Probe the relay by fetching the balance. Errors collapse to `false`.
    pub fn test_connection(&self) -> bool {
        match self.get_balance() {
            Ok(_) => true,
            Err(err) => {
                warn!("relay connection test failed: {err}");
                false
            }
        }
    }

    /// `GET /api/v1/balance`.
    pub fn get_balance(&self) -> Result<BalanceResponse, ApiError> {
        let value = self.request("GET", "/api/v1/balance", None, true)?;
        let balance: BalanceResponse = decode(value)?;
        info!("current balance: {} credits", balance.credits_remaining);
        Ok(balance)
    }

    /// `GET /api/v1/timestamp/history`.
    pub fn get_history(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<TimestampRecord>, ApiError> {
        let value = self.request(
            "GET",
            &format!("/api/v1/timestamp/history?limit={limit}&offset={offset}"),
            None,
            true,
        )?;
        let history: HistoryResponse = decode(value)?;
        Ok(history.records)
    }

    /// `GET /api/v1/verify/by-hash` — public, unauthenticated lookup.
    /// Responds with `None` when the hash is unknown.
    pub fn verify_by_hash(&self, document_hash: &str) -> Result<Option<VerificationRecord>, ApiError> {
        match self.request(
            "GET",
            &format!("/api/v1/verify/by-hash?hash={document_hash}"),
            None,
            false,
        ) {
            Ok(value) => Ok(Some(decode(value)?)),
            Err(ApiError::Server { status: 404, .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// `GET /api/v1/tokens/list`.
    pub fn list_tokens(&self) -> Result<TokenList, ApiError> {
        decode(self.request("GET", "/api/v1/tokens/list", None, true)?)
    }

    /// `POST /api/v1/tokens/derive` — requires a primary-tier token.
    pub fn derive_token(
        &self,
        alias: &str,
        expires_in_days: Option<u32>,
    ) -> Result<DerivedToken, ApiError> {
        let mut body = serde_json::json!({ "alias": alias });
        if let Some(days) = expires_in_days {
            body["expires_in_days"] = days.into();
        }
        decode(self.request("POST", "/api/v1/tokens/derive", Some(body), true)?)
    }

    /// `DELETE /api/v1/tokens/{token_id}` — requires a primary-tier token.
    pub fn revoke_token(&self, token_id: &str) -> Result<(), ApiError> {
        self.request("DELETE", &format!("/api/v1/tokens/{token_id}"), None, true)?;
        Ok(())
    }

    fn request(
        &self,
        method: &str,
        path: &str,
        body: Option<serde_json::Value>,
        require_auth: bool,
    ) -> Result<serde_json::Value, ApiError> {
        if require_auth && !self.is_configured() {
            return Err(ApiError::Authentication {
                kind: AuthErrorKind::MissingToken,
            });
        }

        let url = format!("{}{}", self.base_url, path);
        debug!("{method} {url}");

        let mut request = self.agent.request(method, &url).set("User-Agent", USER_AGENT);
        if let Some(token) = &self.token {
            request = request.set("Authorization", &format!("Bearer {token}"));
        }

        let result = match body {
            Some(json) => request.send_json(json),
            None => request.call(),
        };

        match result {
            // Tolerate empty success bodies.
            Ok(response) => Ok(response
                .into_json::<serde_json::Value>()
                .unwrap_or(serde_json::Value::Null)),
            Err(ureq::Error::Status(status, response)) => {
                let body = response.into_json::<ApiErrorBody>().unwrap_or_default();
                Err(map_error_status(status, body))
            }
            Err(ureq::Error::Transport(transport)) => Err(ApiError::Network(transport.to_string())),
        }
    }
}

impl RelayApi for RelayClient {
    fn relay_timestamp(
        &self,
        request: &RelayTimestampRequest,
    ) -> Result<RelayTimestampResponse, ApiError> {
        let body = serde_json::to_value(request).map_err(|e| ApiError::Decode(e.to_string()))?;
        let value = self.request("POST", "/api/v1/timestamp/relay", Some(body), true)?;
        let response: RelayTimestampResponse = decode(value)?;

        info!(
            "timestamp relayed for {} (record {})",
            request.filename, response.record_id
        );
        Ok(response)
    }

    fn complete_timestamp(
        &self,
        record_id: &str,
        document_hash: &str,
        size_bytes: u64,
    ) -> Result<(), ApiError> {
        let body = CompleteTimestampRequest {
            document_hash: document_hash.to_string(),
            size_bytes,
        };
        let body = serde_json::to_value(&body).map_err(|e| ApiError::Decode(e.to_string()))?;

        self.request(
            "POST",
            &format!("/api/v1/timestamp/{record_id}/complete"),
            Some(body),
            true,
        )?;
        Ok(())
    }
}

fn decode<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> Result<T, ApiError> {
    serde_json::from_value(value).map_err(|err| ApiError::Decode(err.to_string()))
}

/// Map an HTTP error status plus the relay's error body onto the typed
/// taxonomy: 401 → authentication (with expired/revoked sub-kinds), 403 →
/// insufficient credits or primary-required, anything else → server error.
fn map_error_status(status: u16, body: ApiErrorBody) -> ApiError {
    match status {
        401 => {
            let kind = match body.error.as_deref() {
                Some("token_expired") => AuthErrorKind::TokenExpired,
                Some("token_revoked") => AuthErrorKind::TokenRevoked,
                _ => AuthErrorKind::InvalidToken,
            };
            ApiError::Authentication { kind }
        }
        403 => {
            if body.error.as_deref() == Some("insufficient_credits") {
                ApiError::InsufficientCredits {
                    available: body.available_credits.unwrap_or(0),
                }
            } else if body
                .error
                .as_deref()
                .is_some_and(|e| e.to_lowercase().contains("primary token"))
            {
                ApiError::PrimaryTokenRequired
            } else {
                ApiError::Server {
                    status,
                    message: body
                        .message
                        .unwrap_or_else(|| "operación no permitida".to_string()),
                }
            }
        }
        _ => ApiError::Server {
            status,
            message: body
                .message
                .or(body.error)
                .unwrap_or_else(|| "error desconocido".to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn body(json: serde_json::Value) -> ApiErrorBody {
        serde_json::from_value(json).unwrap_or_default()
    }

    #[test]
    fn maps_401_sub_kinds() {
        assert_eq!(
            map_error_status(401, body(serde_json::json!({"error": "token_expired"}))),
            ApiError::Authentication {
                kind: AuthErrorKind::TokenExpired
            }
        );
        assert_eq!(
            map_error_status(401, body(serde_json::json!({"error": "token_revoked"}))),
            ApiError::Authentication {
                kind: AuthErrorKind::TokenRevoked
            }
        );
        assert_eq!(
            map_error_status(401, ApiErrorBody::default()),
            ApiError::Authentication {
                kind: AuthErrorKind::InvalidToken
            }
        );
    }

    #[test]
    fn maps_403_insufficient_credits_with_balance() {
        let err = map_error_status(
            403,
            body(serde_json::json!({
                "error": "insufficient_credits",
                "message": "Sin créditos disponibles",
                "available_credits": 2
            })),
        );
        assert_eq!(err, ApiError::InsufficientCredits { available: 2 });
    }

    #[test]
    fn maps_403_primary_token_required() {
        let err = map_error_status(
            403,
            body(serde_json::json!({"error": "primary token required"})),
        );
        assert_eq!(err, ApiError::PrimaryTokenRequired);
    }

    #[test]
    fn maps_other_statuses_to_server_error() {
        let err = map_error_status(500, body(serde_json::json!({"message": "boom"})));
        assert_eq!(
            err,
            ApiError::Server {
                status: 500,
                message: "boom".into()
            }
        );
    }

    #[test]
    fn token_format_validation() {
        assert!(RelayClient::validate_token_format("smx_0123abcdef"));
        assert!(!RelayClient::validate_token_format("smx_012")); // too short
        assert!(!RelayClient::validate_token_format("smx_0123ABCD")); // uppercase
        assert!(!RelayClient::validate_token_format("tok_0123abcd")); // prefix
        assert!(!RelayClient::validate_token_format(""));
    }

    #[test]
    fn unconfigured_client_fails_fast_on_auth_endpoints() {
        let client = RelayClient::new(&crate::config::RelayConfig::default(), None);
        let err = client.get_balance().unwrap_err();
        assert_eq!(
            err,
            ApiError::Authentication {
                kind: AuthErrorKind::MissingToken
            }
        );
    }
}
