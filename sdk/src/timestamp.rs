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

//! Timestamp acquisition: free public TSAs with ordered fallback, and the
//! credit-metered relay path.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use log::{info, warn};
use sello_crypto::{
    base64,
    time_stamp::{
        default_rfc3161_message, DigestAlgorithm, TimeStampError, TimeStampProvider,
        TimeStampResponse,
    },
};

use crate::{
    api::{RelayApi, RelayTimestampRequest},
    config::TsaConfig,
    error::{Error, Result},
};

/// Reserve used for a timestamp token when no better estimate is available.
pub(crate) const DEFAULT_TOKEN_RESERVE: usize = 10_000;

/// Client for free public TSA endpoints with ordered multi-provider
/// fallback.
#[derive(Clone, Debug)]
pub struct TsaClient {
    config: TsaConfig,
}

impl TsaClient {
    /// Create a client over an ordered provider list.
    pub fn new(config: TsaConfig) -> Self {
        info!(
            "TSA client initialized with primary URL: {}",
            config.primary()
        );
        Self { config }
    }

    /// Walk the provider list in order and return a handle for the first
    /// provider that constructs.
    ///
    /// Construction success does not guarantee the TSA will answer later —
    /// that is detected at signing time. Exhausting the list is an error
    /// carrying the attempt count and the last cause.
    pub fn get_timestamper(&self) -> Result<TimestamperHandle> {
        let mut last_error: Option<TimeStampError> = None;

        for url in &self.config.providers {
            match TimestamperHandle::new(url, self.config.timeout) {
                Ok(handle) => {
                    info!("using TSA provider {url}");
                    return Ok(handle);
                }
                Err(err) => {
                    warn!("TSA provider {url} unusable: {err}");
                    last_error = Some(err);
                }
            }
        }

        Err(Error::Tsa {
            attempts: self.config.providers.len(),
            last_error: last_error
                .map(|err| err.to_string())
                .unwrap_or_else(|| "no providers configured".to_string()),
        })
    }

    /// Probe one provider (default: the primary) with a HEAD request.
    ///
    /// Considered successful for any response with a status below 500;
    /// transport errors collapse to `false` instead of propagating.
    pub fn test_connection(&self, url: Option<&str>) -> bool {
        let test_url = url.unwrap_or_else(|| self.config.primary());

        let agent = ureq::AgentBuilder::new()
            .timeout(self.config.timeout)
            .build();

        match agent.head(test_url).call() {
            Ok(response) => {
                info!(
                    "TSA connection test successful for {test_url} ({})",
                    response.status()
                );
                true
            }
            Err(ureq::Error::Status(status, _)) => {
                let success = status < 500;
                if !success {
                    warn!("TSA connection test failed for {test_url} with status {status}");
                }
                success
            }
            Err(ureq::Error::Transport(err)) => {
                warn!("TSA connection test failed for {test_url}: {err}");
                false
            }
        }
    }

    /// Probe every configured provider. Diagnostic only; live signing
    /// decisions use [`TsaClient::get_timestamper`].
    pub fn test_all_providers(&self) -> HashMap<String, bool> {
        self.config
            .providers
            .iter()
            .map(|url| (url.clone(), self.test_connection(Some(url))))
            .collect()
    }
}

/// A live timestamper bound to one TSA endpoint.
#[derive(Clone, Debug)]
pub struct TimestamperHandle {
    url: url::Url,
    timeout: Duration,
}

impl TimestamperHandle {
    /// Validate the endpoint and construct a handle.
    pub fn new(url: &str, timeout: Duration) -> std::result::Result<Self, TimeStampError> {
        let parsed = url::Url::parse(url)
            .map_err(|err| TimeStampError::InternalError(format!("invalid TSA URL: {err}")))?;

        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(TimeStampError::InternalError(format!(
                "unsupported TSA URL scheme: {}",
                parsed.scheme()
            )));
        }

        Ok(Self {
            url: parsed,
            timeout,
        })
    }

    /// The endpoint this handle is bound to.
    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    /// Request a granted token over `message`, responding with the raw
    /// token DER.
    pub(crate) fn request_token(&self, message: &[u8]) -> Result<Vec<u8>> {
        let response_bytes = self
            .send_time_stamp_request(message)
            .ok_or_else(|| TimeStampError::InternalError("no TSA URL configured".into()))??;

        token_from_response(&response_bytes)
    }
}

impl TimeStampProvider for TimestamperHandle {
    fn time_stamp_service_url(&self) -> Option<String> {
        Some(self.url.to_string())
    }

    fn time_stamp_request_timeout(&self) -> Duration {
        self.timeout
    }
}

/// Extract the token bytes from a raw `TimeStampResp`, enforcing a granted
/// status.
pub(crate) fn token_from_response(response_bytes: &[u8]) -> Result<Vec<u8>> {
    let response = TimeStampResponse::parse(response_bytes)?;

    if !response.is_success() {
        return Err(Error::TimeStamp(TimeStampError::NotGranted {
            status: response.status.status.into(),
        }));
    }

    response
        .token_bytes()
        .ok_or(Error::TimeStamp(TimeStampError::MissingToken))
}

/// Metadata captured from a successful relay round trip.
///
/// Not part of the cryptographic token; used afterwards for the relay's
/// `complete` call and the user-facing verification link.
#[derive(Clone, Debug)]
pub struct RelayOutcome {
    /// Relay-assigned record identifier.
    pub record_id: String,

    /// Public verification page, when issued.
    pub verification_url: Option<String>,

    /// Credits left after the call.
    pub credits_remaining: Option<u32>,
}

/// Per-document timestamper that forwards raw RFC 3161 requests through the
/// relay backend.
///
/// Created fresh for every document because the filename/size metadata is
/// embedded per request; discarded once the document's outcome is produced.
pub struct RelayTimestamper {
    api: Arc<dyn RelayApi>,
    filename: String,
    size_bytes: u64,
    signer_cn: String,
    signer_serial: String,
    outcome: Mutex<Option<RelayOutcome>>,
    sizing_tsa: Option<TimestamperHandle>,
    dummy_cache: Mutex<HashMap<DigestAlgorithm, usize>>,
}

impl RelayTimestamper {
    /// Bind a relay timestamper to one document's attribution metadata.
    pub fn new(
        api: Arc<dyn RelayApi>,
        filename: impl Into<String>,
        size_bytes: u64,
        signer_cn: impl Into<String>,
        signer_serial: impl Into<String>,
    ) -> Self {
        Self {
            api,
            filename: filename.into(),
            size_bytes,
            signer_cn: signer_cn.into(),
            signer_serial: signer_serial.into(),
            outcome: Mutex::new(None),
            sizing_tsa: None,
            dummy_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Use a free-tier TSA to size signature placeholders so estimation
    /// never consumes a paid credit.
    pub fn with_sizing_tsa(mut self, handle: TimestamperHandle) -> Self {
        self.sizing_tsa = Some(handle);
        self
    }

    /// Forward a timestamp request for `message` through the relay and
    /// respond with the decoded token DER. Captures the relay's record
    /// metadata on success.
    pub(crate) fn request_token(&self, message: &[u8]) -> Result<Vec<u8>> {
        let body = default_rfc3161_message(message, DigestAlgorithm::Sha256)?;

        let request = RelayTimestampRequest {
            tsa_req_b64: base64::encode(&body),
            filename: self.filename.clone(),
            size_bytes: self.size_bytes,
            signer_cn: self.signer_cn.clone(),
            signer_serial: self.signer_serial.clone(),
        };

        let response = self.api.relay_timestamp(&request)?;

        let tsa_resp = base64::decode(&response.tsa_resp_b64)
            .map_err(|err| Error::TimeStamp(TimeStampError::DecodeError(err.to_string())))?;

        if let Ok(mut outcome) = self.outcome.lock() {
            *outcome = Some(RelayOutcome {
                record_id: response.record_id,
                verification_url: response.verification_url,
                credits_remaining: response.credits_remaining,
            });
        }

        token_from_response(&tsa_resp)
    }

    /// The metadata captured by the last successful relay call, if any.
    pub fn outcome(&self) -> Option<RelayOutcome> {
        self.outcome.lock().ok()?.clone()
    }

    /// Estimated token size for placeholder sizing.
    ///
    /// Resolved against the free sizing TSA with a throwaway digest and
    /// cached per hash algorithm; falls back to a generous fixed reserve
    /// when no sizing TSA is configured or reachable.
    pub(crate) fn estimated_token_size(&self, algorithm: DigestAlgorithm) -> usize {
        if let Ok(cache) = self.dummy_cache.lock() {
            if let Some(size) = cache.get(&algorithm) {
                return *size;
            }
        }

        let Some(sizing_tsa) = &self.sizing_tsa else {
            return DEFAULT_TOKEN_RESERVE;
        };

        let dummy = algorithm.digest(&[]);
        let size = match sizing_tsa.request_token(&dummy) {
            Ok(token) => token.len() + 1024,
            Err(err) => {
                warn!("dummy timestamp for sizing failed: {err}");
                return DEFAULT_TOKEN_RESERVE;
            }
        };

        if let Ok(mut cache) = self.dummy_cache.lock() {
            cache.insert(algorithm, size);
        }

        size
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::panic)]
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn fallback_returns_first_constructible_provider() {
        let config = TsaConfig {
            providers: vec![
                "not a url at all".to_string(),
                "ftp://wrong.scheme.example".to_string(),
                "http://timestamp.example/tsr".to_string(),
                "http://never.reached.example".to_string(),
            ],
            timeout: Duration::from_secs(5),
        };

        let handle = TsaClient::new(config).get_timestamper().unwrap();
        assert_eq!(handle.url(), "http://timestamp.example/tsr");
    }

    #[test]
    fn exhausted_providers_report_attempts_and_cause() {
        let config = TsaConfig {
            providers: vec!["nope".to_string(), "also nope".to_string()],
            timeout: Duration::from_secs(5),
        };

        match TsaClient::new(config).get_timestamper() {
            Err(Error::Tsa {
                attempts,
                last_error,
            }) => {
                assert_eq!(attempts, 2);
                assert!(last_error.contains("invalid TSA URL"));
            }
            other => panic!("expected Error::Tsa, got {other:?}"),
        }
    }

    #[test]
    fn handle_reports_bound_url() {
        let handle =
            TimestamperHandle::new("https://freetsa.org/tsr", Duration::from_secs(5)).unwrap();
        assert_eq!(handle.url(), "https://freetsa.org/tsr");
        assert_eq!(
            handle.time_stamp_service_url().as_deref(),
            Some("https://freetsa.org/tsr")
        );
    }
}
