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

//! Centralized configuration: endpoints, provider lists and timeouts,
//! overridable by environment at process start.

use std::time::Duration;

/// Suffix inserted before the extension of signed output files.
pub const SIGNED_SUFFIX: &str = "_firmado";

/// Default production relay endpoint. Override with `SELLO_API_URL`.
pub const DEFAULT_API_BASE_URL: &str = "https://www.sello.mx";

/// Primary free-tier TSA. Override with `SELLO_TSA_URL`.
const DEFAULT_FREE_TSA: &str = "http://timestamp.digicert.com";

/// Free-tier TSA fallbacks, tried in order after the primary.
const FREE_TSA_FALLBACKS: [&str; 2] = [
    "http://timestamp.sectigo.com",
    "https://freetsa.org/tsr",
];

/// Ordered list of public TSA endpoints plus the per-call timeout.
///
/// Immutable once constructed; the first entry is the primary provider and
/// the rest are fallbacks in priority order.
#[derive(Clone, Debug)]
pub struct TsaConfig {
    /// Candidate endpoints, primary first.
    pub providers: Vec<String>,

    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for TsaConfig {
    fn default() -> Self {
        let mut providers = vec![DEFAULT_FREE_TSA.to_string()];
        providers.extend(FREE_TSA_FALLBACKS.iter().map(|url| url.to_string()));

        Self {
            providers,
            timeout: Duration::from_secs(30),
        }
    }
}

impl TsaConfig {
    /// Default configuration with the primary provider overridable through
    /// the `SELLO_TSA_URL` environment variable.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("SELLO_TSA_URL") {
            if !url.is_empty() {
                config.providers[0] = url;
            }
        }
        config
    }

    /// Configuration pinned to a single provider, no fallbacks.
    pub fn single(url: impl Into<String>) -> Self {
        Self {
            providers: vec![url.into()],
            timeout: Duration::from_secs(30),
        }
    }

    /// The primary provider URL.
    pub fn primary(&self) -> &str {
        self.providers
            .first()
            .map(String::as_str)
            .unwrap_or(DEFAULT_FREE_TSA)
    }
}

/// Relay backend endpoint configuration.
#[derive(Clone, Debug)]
pub struct RelayConfig {
    /// Base URL, without a trailing slash.
    pub base_url: String,

    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl RelayConfig {
    /// Default configuration with the base URL overridable through the
    /// `SELLO_API_URL` environment variable.
    pub fn from_env() -> Self {
        let base_url = std::env::var("SELLO_API_URL")
            .ok()
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Public pricing page, used in credit-exhaustion messages.
    pub fn buy_credits_url(&self) -> String {
        format!("{}/precios", self.base_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tsa_config_has_fallbacks() {
        let config = TsaConfig::default();
        assert_eq!(config.providers.len(), 3);
        assert_eq!(config.primary(), DEFAULT_FREE_TSA);
    }

    #[test]
    fn single_provider_has_no_fallbacks() {
        let config = TsaConfig::single("http://tsa.example");
        assert_eq!(config.providers, vec!["http://tsa.example".to_string()]);
    }

    #[test]
    fn relay_config_strips_trailing_slash() {
        let config = RelayConfig {
            base_url: "https://api.example".into(),
            timeout: Duration::from_secs(30),
        };
        assert_eq!(config.buy_credits_url(), "https://api.example/precios");
    }
}
