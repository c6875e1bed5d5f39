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

#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg, doc_cfg_hide))]

pub mod api;
pub mod batch;
pub mod config;
pub mod credentials;
mod error;
pub mod pdf;
pub mod timestamp;

pub use api::{ApiError, AuthErrorKind, RelayApi, RelayClient};
pub use batch::{
    BatchRequest, BatchSigningCoordinator, SigningEvent, SigningOutcome, TimestampMode,
};
pub use config::{RelayConfig, TsaConfig, SIGNED_SUFFIX};
pub use credentials::{CredentialStore, MemoryCredentialStore, TokenMetadata};
pub use error::{Error, Result};
pub use pdf::{verify_file, DocumentSigner, PdfError, TimestampSource};
pub use timestamp::{RelayOutcome, RelayTimestamper, TimestamperHandle, TsaClient};
