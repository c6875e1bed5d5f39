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

/// `Error` enumerates errors returned by most sello operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Certificate or private key could not be loaded or validated.
    #[error(transparent)]
    Certificate(#[from] sello_crypto::certificate::CertificateError),

    /// The source PDF is missing, unreadable or structurally broken.
    #[error(transparent)]
    Pdf(#[from] crate::pdf::PdfError),

    /// CMS construction or timestamp embedding failed.
    #[error("could not sign the PDF: {message}")]
    Signing {
        /// Underlying cause, as text.
        message: String,
    },

    /// No configured TSA provider could be used.
    #[error("no TSA provider available ({attempts} attempted, last error: {last_error})")]
    Tsa {
        /// Number of providers attempted.
        attempts: usize,
        /// Description of the last failure.
        last_error: String,
    },

    /// A time stamp request failed.
    #[error(transparent)]
    TimeStamp(#[from] sello_crypto::time_stamp::TimeStampError),

    /// The relay API reported a failure.
    #[error(transparent)]
    Api(#[from] crate::api::ApiError),

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A specialized `Result` type for sello operations.
pub type Result<T> = std::result::Result<T, Error>;
