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

//! Incremental PDF signing.
//!
//! The original file content and cross-reference structure are preserved
//! byte for byte; the signature is appended as an incremental update, never
//! by rewriting the whole file. Re-serializing a PDF can silently invalidate
//! prior signatures, so every write path here goes through
//! [`update::IncrementalUpdate`].

mod byterange;
mod cms;
mod object;
mod signer;
mod update;
mod verifier;

pub use signer::{DocumentSigner, TimestampSource};
pub use verifier::verify_file;

use thiserror::Error;

/// Describes errors raised while reading or updating PDF documents.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PdfError {
    /// The source file does not exist.
    #[error("PDF file not found: {0}")]
    NotFound(std::path::PathBuf),

    /// The file does not begin with a `%PDF-` header.
    #[error("invalid PDF header")]
    InvalidHeader,

    /// Parse failure at a specific byte offset.
    #[error("failed to parse PDF at byte {offset}: {reason}")]
    Parse {
        /// Byte offset where parsing failed.
        offset: usize,
        /// Reason for the failure.
        reason: String,
    },

    /// A referenced object is missing from the cross-reference data.
    #[error("object not found: {0} {1} R")]
    ObjectNotFound(u32, u16),

    /// Structurally invalid document.
    #[error("invalid PDF: {0}")]
    Malformed(String),

    /// A stream filter this writer does not implement.
    #[error("unsupported PDF feature: {0}")]
    Unsupported(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
