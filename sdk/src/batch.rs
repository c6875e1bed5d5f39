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

//! Batch signing coordination.
//!
//! One worker thread per `start` call processes the batch strictly
//! sequentially: relay credit consumption and fatal-error short-circuiting
//! require ordering, and nothing here is worth a lock hierarchy. Progress
//! and outcomes stream back over a channel; the caller never blocks on the
//! worker.

use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{Receiver, Sender},
        Arc,
    },
    thread::JoinHandle,
};

use log::{error, info, warn};
use sello_crypto::certificate::{Certificate, SigningKeyPair};
use sha2::{Digest, Sha256};

use crate::{
    api::{ApiError, RelayApi},
    config::{RelayConfig, TsaConfig, SIGNED_SUFFIX},
    credentials::CredentialStore,
    error::Error,
    pdf::{DocumentSigner, TimestampSource},
    timestamp::{RelayTimestamper, TsaClient},
};

/// Which timestamp source a batch uses.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TimestampMode {
    /// Free public TSAs with multi-provider fallback.
    Free,

    /// The credit-metered relay service.
    Relay,
}

/// One batch of documents to sign.
#[derive(Clone, Debug)]
pub struct BatchRequest {
    /// Source PDFs, processed in order.
    pub documents: Vec<PathBuf>,

    /// Shared output directory; `None` writes next to each source.
    pub output_dir: Option<PathBuf>,

    /// Timestamp source for the whole batch.
    pub mode: TimestampMode,

    /// Signer common name, embedded in relay requests.
    pub signer_cn: String,

    /// Certificate serial (hex), embedded in relay requests.
    pub signer_serial: String,
}

/// Result of one document's signing attempt.
#[derive(Clone, Debug)]
pub struct SigningOutcome {
    /// Source filename.
    pub filename: String,

    /// Whether the document was signed.
    pub success: bool,

    /// Human-readable outcome message.
    pub message: String,

    /// Public verification page; present only for relay successes.
    pub verification_url: Option<String>,
}

/// Events emitted by the batch worker, in order.
#[derive(Clone, Debug)]
pub enum SigningEvent {
    /// Emitted exactly once per document attempt, before the attempt.
    Progress {
        /// 1-based index of the document being attempted.
        current: usize,
        /// Total number of documents in the batch.
        total: usize,
    },

    /// Emitted after each attempt, success or failure.
    FileCompleted(SigningOutcome),

    /// Emitted once, after the last attempt, with every accumulated error.
    Finished {
        /// `"{filename}: {message}"` per failed document; empty when all
        /// succeeded.
        errors: Vec<String>,
    },
}

/// Coordinates batch signing runs.
///
/// Reentrancy-guarded: a second [`start`](Self::start) while a run is in
/// flight is rejected with a warning, not queued.
pub struct BatchSigningCoordinator {
    tsa_config: TsaConfig,
    relay_config: RelayConfig,
    relay: Option<Arc<dyn RelayApi>>,
    store: Arc<dyn CredentialStore>,
    running: Arc<AtomicBool>,
    cancel: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl BatchSigningCoordinator {
    /// Create a coordinator. `relay` is required only for
    /// [`TimestampMode::Relay`] batches.
    pub fn new(
        tsa_config: TsaConfig,
        relay: Option<Arc<dyn RelayApi>>,
        store: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            tsa_config,
            relay_config: RelayConfig::from_env(),
            relay,
            store,
            running: Arc::new(AtomicBool::new(false)),
            cancel: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    /// Override the relay endpoint configuration.
    pub fn with_relay_config(mut self, relay_config: RelayConfig) -> Self {
        self.relay_config = relay_config;
        self
    }

    /// Start a batch on a dedicated worker thread.
    ///
    /// The certificate/key pair must already be validated; it is shared
    /// read-only across the batch and dropped with the worker. Responds with
    /// the event channel, or `None` if a batch is already running.
    pub fn start(
        &mut self,
        batch: BatchRequest,
        cert: Arc<Certificate>,
        key: Arc<SigningKeyPair>,
    ) -> Option<Receiver<SigningEvent>> {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("a signing batch is already running; ignoring start request");
            return None;
        }

        // Reap the previous worker, if any.
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }

        self.cancel.store(false, Ordering::SeqCst);

        let (tx, rx) = std::sync::mpsc::channel();
        let worker = BatchWorker {
            batch,
            cert,
            key,
            tsa_config: self.tsa_config.clone(),
            relay_config: self.relay_config.clone(),
            relay: self.relay.clone(),
            store: self.store.clone(),
            cancel: self.cancel.clone(),
        };

        let running = self.running.clone();
        self.handle = Some(std::thread::spawn(move || {
            worker.run(tx);
            running.store(false, Ordering::SeqCst);
        }));

        Some(rx)
    }

    /// Request cancellation; takes effect between documents.
    pub fn stop(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Whether a batch is currently in flight.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Block until the current batch (if any) finishes.
    pub fn wait(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

struct BatchWorker {
    batch: BatchRequest,
    cert: Arc<Certificate>,
    key: Arc<SigningKeyPair>,
    tsa_config: TsaConfig,
    relay_config: RelayConfig,
    relay: Option<Arc<dyn RelayApi>>,
    store: Arc<dyn CredentialStore>,
    cancel: Arc<AtomicBool>,
}

impl BatchWorker {
    fn run(&self, tx: Sender<SigningEvent>) {
        let total = self.batch.documents.len();
        let mut errors: Vec<String> = Vec::new();

        for (index, source) in self.batch.documents.iter().enumerate() {
            if self.cancel.load(Ordering::SeqCst) {
                info!("batch cancelled after {index} of {total} documents");
                break;
            }

            let _ = tx.send(SigningEvent::Progress {
                current: index + 1,
                total,
            });

            let filename = source
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| source.display().to_string());

            match self.sign_one(source) {
                Ok(outcome) => {
                    let _ = tx.send(SigningEvent::FileCompleted(outcome));
                }
                Err(err) => {
                    let (message, fatal) = self.describe_failure(&err);
                    error!("error signing {filename}: {err}");

                    errors.push(format!("{filename}: {message}"));
                    let _ = tx.send(SigningEvent::FileCompleted(SigningOutcome {
                        filename,
                        success: false,
                        message,
                        verification_url: None,
                    }));

                    // Relay auth/credit/service failures are batch-fatal;
                    // never fall back to free timestamping once relay mode
                    // was requested.
                    if fatal {
                        break;
                    }
                }
            }
        }

        let _ = tx.send(SigningEvent::Finished { errors });
    }

    fn sign_one(&self, source: &std::path::Path) -> Result<SigningOutcome, Error> {
        let filename = source
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| source.display().to_string());

        let output_path = self.batch.output_dir.as_ref().map(|dir| {
            let stem = source
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default();
            match source.extension() {
                Some(ext) => dir.join(format!("{stem}{SIGNED_SUFFIX}.{}", ext.to_string_lossy())),
                None => dir.join(format!("{stem}{SIGNED_SUFFIX}")),
            }
        });

        match self.batch.mode {
            TimestampMode::Free => {
                let handle = TsaClient::new(self.tsa_config.clone()).get_timestamper()?;
                let signer = DocumentSigner::new(&self.cert, &self.key)
                    .with_timestamp(TimestampSource::Tsa(&handle));
                let output = signer.sign(source, output_path.as_deref())?;

                Ok(SigningOutcome {
                    filename,
                    success: true,
                    message: format!(
                        "Signed successfully: {}",
                        output.file_name().unwrap_or_default().to_string_lossy()
                    ),
                    verification_url: None,
                })
            }
            TimestampMode::Relay => {
                let api = self.relay.clone().ok_or(Error::Api(ApiError::Authentication {
                    kind: crate::api::AuthErrorKind::MissingToken,
                }))?;

                let size_bytes = std::fs::metadata(source).map(|m| m.len()).unwrap_or(0);

                // Per-document timestamper: the relay request embeds this
                // document's filename/size and the signer identity.
                let mut timestamper = RelayTimestamper::new(
                    api.clone(),
                    filename.clone(),
                    size_bytes,
                    self.batch.signer_cn.clone(),
                    self.batch.signer_serial.clone(),
                );
                if let Ok(sizing) = TsaClient::new(self.tsa_config.clone()).get_timestamper() {
                    timestamper = timestamper.with_sizing_tsa(sizing);
                }

                let signer = DocumentSigner::new(&self.cert, &self.key)
                    .with_timestamp(TimestampSource::Relay(&timestamper));
                let output = signer.sign(source, output_path.as_deref())?;

                let mut verification_url = None;
                if let Some(outcome) = timestamper.outcome() {
                    self.finalize_record(&api, &outcome.record_id, &output);

                    if let Some(credits) = outcome.credits_remaining {
                        self.store.set_cached_credits(credits);
                    }
                    verification_url = outcome.verification_url;
                }

                Ok(SigningOutcome {
                    filename,
                    success: true,
                    message: format!(
                        "Signed successfully: {}",
                        output.file_name().unwrap_or_default().to_string_lossy()
                    ),
                    verification_url,
                })
            }
        }
    }

    /// Attach the final on-disk hash/size to the relay record. Best-effort:
    /// the signature and token are already valid, only the relay's
    /// bookkeeping is at risk.
    fn finalize_record(&self, api: &Arc<dyn RelayApi>, record_id: &str, output: &std::path::Path) {
        let (hash, size) = match std::fs::read(output) {
            Ok(bytes) => (hex::encode(Sha256::digest(&bytes)), bytes.len() as u64),
            Err(err) => {
                warn!("could not hash signed output for record {record_id}: {err}");
                return;
            }
        };

        if let Err(err) = api.complete_timestamp(record_id, &hash, size) {
            warn!("failed to update record {record_id} with final hash: {err}");
        }
    }

    fn describe_failure(&self, err: &Error) -> (String, bool) {
        match err {
            Error::Api(api) => {
                let message = match api {
                    ApiError::InsufficientCredits { .. } => format!(
                        "No tienes créditos suficientes. Compra más en {}",
                        self.relay_config.buy_credits_url()
                    ),
                    ApiError::Authentication { .. } => {
                        "Token inválido o expirado. Reconfigura tu token.".to_string()
                    }
                    ApiError::Server { message, .. } if !message.is_empty() => message.clone(),
                    _ => "Servicio no disponible. Intenta más tarde.".to_string(),
                };
                (message, api.is_batch_fatal())
            }
            other => (other.to_string(), false),
        }
    }
}
