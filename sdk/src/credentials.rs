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

//! Boundary contract for the host application's credential/settings store.
//!
//! The SDK treats the relay token as an opaque bearer credential and never
//! manages storage security itself. Implementations are injected into the
//! coordinator and API client explicitly; nothing in this crate reads
//! ambient global state.

use std::{
    path::{Path, PathBuf},
    sync::Mutex,
};

use chrono::{DateTime, Utc};

/// Metadata the relay reports about the active token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenMetadata {
    /// Whether this is the account's primary token.
    pub is_primary: bool,

    /// User-assigned alias, for derived tokens.
    pub alias: Option<String>,

    /// Expiry instant, when the token has one.
    pub expires_at: Option<DateTime<Utc>>,

    /// Whether the relay still honors the token.
    pub is_active: bool,
}

/// Host-provided persistence for relay credentials and related caches.
pub trait CredentialStore: Send + Sync {
    /// The relay bearer token, if one is configured.
    fn token(&self) -> Option<String>;

    /// Persist the most recent credit balance reported by the relay.
    fn set_cached_credits(&self, credits: u32);

    /// The last cached credit balance, if any.
    fn cached_credits(&self) -> Option<u32>;

    /// Persist metadata about the active token.
    fn set_token_metadata(&self, metadata: TokenMetadata);

    /// The last stored token metadata, if any.
    fn token_metadata(&self) -> Option<TokenMetadata>;

    /// Persist the last-used certificate/key paths.
    fn set_last_certificate_paths(&self, cert_path: &Path, key_path: &Path);

    /// The last-used certificate/key paths, if any.
    fn last_certificate_paths(&self) -> Option<(PathBuf, PathBuf)>;
}

#[derive(Debug, Default)]
struct MemoryCredentialStoreInner {
    token: Option<String>,
    cached_credits: Option<u32>,
    token_metadata: Option<TokenMetadata>,
    last_paths: Option<(PathBuf, PathBuf)>,
}

/// In-memory [`CredentialStore`] for tests and embedders without their own
/// persistence layer.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    inner: Mutex<MemoryCredentialStoreInner>,
}

impl MemoryCredentialStore {
    /// Store with a token already configured.
    pub fn with_token(token: impl Into<String>) -> Self {
        let store = Self::default();
        if let Ok(mut inner) = store.inner.lock() {
            inner.token = Some(token.into());
        }
        store
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn token(&self) -> Option<String> {
        self.inner.lock().ok()?.token.clone()
    }

    fn set_cached_credits(&self, credits: u32) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.cached_credits = Some(credits);
        }
    }

    fn cached_credits(&self) -> Option<u32> {
        self.inner.lock().ok()?.cached_credits
    }

    fn set_token_metadata(&self, metadata: TokenMetadata) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.token_metadata = Some(metadata);
        }
    }

    fn token_metadata(&self) -> Option<TokenMetadata> {
        self.inner.lock().ok()?.token_metadata.clone()
    }

    fn set_last_certificate_paths(&self, cert_path: &Path, key_path: &Path) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.last_paths = Some((cert_path.to_path_buf(), key_path.to_path_buf()));
        }
    }

    fn last_certificate_paths(&self) -> Option<(PathBuf, PathBuf)> {
        self.inner.lock().ok()?.last_paths.clone()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn memory_store_round_trips() {
        let store = MemoryCredentialStore::with_token("smx_0123abcd");
        assert_eq!(store.token().as_deref(), Some("smx_0123abcd"));

        store.set_cached_credits(42);
        assert_eq!(store.cached_credits(), Some(42));

        store.set_last_certificate_paths(Path::new("a.cer"), Path::new("a.key"));
        let (cert, key) = store.last_certificate_paths().unwrap();
        assert_eq!(cert, PathBuf::from("a.cer"));
        assert_eq!(key, PathBuf::from("a.key"));
    }
}
