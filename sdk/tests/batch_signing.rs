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

//! Batch semantics against a scripted relay double: stop-on-fatal,
//! continue-on-document-error, progress ordering and relay bookkeeping.

use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};

use bcder::{
    encode::Values,
    Captured, Mode, OctetString, Oid, Tag,
};
use sello::{
    ApiError, AuthErrorKind, BatchRequest, BatchSigningCoordinator, MemoryCredentialStore,
    RelayApi, SigningEvent, TimestampMode, TsaConfig,
};
use sello::api::{RelayTimestampRequest, RelayTimestampResponse};
use sello::CredentialStore;
use sello_crypto::{
    asn1::rfc3161::{ContentInfo, PkiStatus, PkiStatusInfo, TimeStampResp, OID_ID_SIGNED_DATA},
    base64,
    certificate::{Certificate, SigningKeyPair},
};

fn fixture(name: &str) -> Vec<u8> {
    std::fs::read(
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("tests/fixtures")
            .join(name),
    )
    .unwrap()
}

fn credentials() -> (Arc<Certificate>, Arc<SigningKeyPair>) {
    let _ = env_logger::builder().is_test(true).try_init();

    let cert = Certificate::from_der_or_pem(&fixture("signer.der")).unwrap();
    let key = SigningKeyPair::load(&fixture("signer_pkcs8.der"), "").unwrap();
    (Arc::new(cert), Arc::new(key))
}

/// A syntactically valid granted response whose token is an opaque CMS
/// envelope; the signing pipeline embeds it without inspecting the inside.
fn granted_tsa_response() -> Vec<u8> {
    let payload = OctetString::new(bytes::Bytes::from_static(b"stub token payload"));
    let token = ContentInfo {
        content_type: Oid(bytes::Bytes::from_static(OID_ID_SIGNED_DATA.0)),
        content: Captured::from_values(Mode::Der, payload.encode().explicit(Tag::CTX_0)),
    };

    TimeStampResp {
        status: PkiStatusInfo::from(PkiStatus::Granted),
        time_stamp_token: Some(token),
    }
    .to_der()
    .unwrap()
}

#[derive(Default)]
struct MockRelay {
    calls: Mutex<u32>,
    completed: Mutex<Vec<String>>,
    fail_from_call: Option<(u32, ApiError)>,
    delay: Option<Duration>,
}

impl MockRelay {
    fn failing_from(call: u32, error: ApiError) -> Self {
        Self {
            fail_from_call: Some((call, error)),
            ..Self::default()
        }
    }

    fn relay_calls(&self) -> u32 {
        *self.calls.lock().unwrap()
    }

    fn completed_records(&self) -> Vec<String> {
        self.completed.lock().unwrap().clone()
    }
}

impl RelayApi for MockRelay {
    fn relay_timestamp(
        &self,
        _request: &RelayTimestampRequest,
    ) -> Result<RelayTimestampResponse, ApiError> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }

        let mut calls = self.calls.lock().unwrap();
        *calls += 1;
        let n = *calls;

        if let Some((from, error)) = &self.fail_from_call {
            if n >= *from {
                return Err(error.clone());
            }
        }

        Ok(RelayTimestampResponse {
            record_id: format!("rec-{n}"),
            tsa_resp_b64: base64::encode(&granted_tsa_response()),
            verification_url: Some(format!("https://verificar.example/rec-{n}")),
            credits_remaining: Some(5 - n),
        })
    }

    fn complete_timestamp(
        &self,
        record_id: &str,
        _document_hash: &str,
        _size_bytes: u64,
    ) -> Result<(), ApiError> {
        self.completed.lock().unwrap().push(record_id.to_string());
        Ok(())
    }
}

/// TSA pointing at a closed local port: provider construction succeeds,
/// network use fails instantly, so placeholder sizing falls back to its
/// fixed reserve without leaving the machine.
fn offline_tsa_config() -> TsaConfig {
    TsaConfig {
        providers: vec!["http://127.0.0.1:1/tsr".to_string()],
        timeout: Duration::from_millis(200),
    }
}

fn write_documents(dir: &Path, count: usize) -> Vec<PathBuf> {
    let source = fixture("minimal.pdf");
    (0..count)
        .map(|i| {
            let path = dir.join(format!("doc{i}.pdf"));
            std::fs::write(&path, &source).unwrap();
            path
        })
        .collect()
}

fn relay_batch(documents: Vec<PathBuf>) -> BatchRequest {
    BatchRequest {
        documents,
        output_dir: None,
        mode: TimestampMode::Relay,
        signer_cn: "JUAN PRUEBA GARCIA".to_string(),
        signer_serial: "1a2b3c".to_string(),
    }
}

fn collect_events(rx: std::sync::mpsc::Receiver<SigningEvent>) -> Vec<SigningEvent> {
    rx.iter().collect()
}

fn progress_events(events: &[SigningEvent]) -> Vec<(usize, usize)> {
    events
        .iter()
        .filter_map(|event| match event {
            SigningEvent::Progress { current, total } => Some((*current, *total)),
            _ => None,
        })
        .collect()
}

fn outcomes(events: &[SigningEvent]) -> Vec<&sello::SigningOutcome> {
    events
        .iter()
        .filter_map(|event| match event {
            SigningEvent::FileCompleted(outcome) => Some(outcome),
            _ => None,
        })
        .collect()
}

fn final_errors(events: &[SigningEvent]) -> Vec<String> {
    events
        .iter()
        .find_map(|event| match event {
            SigningEvent::Finished { errors } => Some(errors.clone()),
            _ => None,
        })
        .expect("batch did not emit Finished")
}

#[test]
fn relay_batch_signs_every_document() {
    let dir = tempfile::tempdir().unwrap();
    let documents = write_documents(dir.path(), 3);
    let (cert, key) = credentials();

    let relay = Arc::new(MockRelay::default());
    let store = Arc::new(MemoryCredentialStore::default());
    let mut coordinator =
        BatchSigningCoordinator::new(offline_tsa_config(), Some(relay.clone()), store.clone());

    let rx = coordinator
        .start(relay_batch(documents.clone()), cert, key)
        .unwrap();
    let events = collect_events(rx);
    coordinator.wait();

    assert_eq!(progress_events(&events), vec![(1, 3), (2, 3), (3, 3)]);

    let outcomes = outcomes(&events);
    assert_eq!(outcomes.len(), 3);
    assert!(outcomes.iter().all(|o| o.success));

    let urls: Vec<&str> = outcomes
        .iter()
        .map(|o| o.verification_url.as_deref().unwrap())
        .collect();
    assert_eq!(urls.len(), 3);
    assert!(urls.windows(2).all(|w| w[0] != w[1]));

    assert!(final_errors(&events).is_empty());

    // Every output exists, verifies, and was finalized with the relay.
    for source in &documents {
        let output = source.with_file_name(
            source
                .file_stem()
                .unwrap()
                .to_string_lossy()
                .into_owned()
                + "_firmado.pdf",
        );
        assert!(output.exists());
        assert!(sello::verify_file(&output).unwrap());
    }
    assert_eq!(relay.completed_records(), vec!["rec-1", "rec-2", "rec-3"]);
    assert_eq!(store.cached_credits(), Some(2));
}

#[test]
fn insufficient_credits_aborts_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    let documents = write_documents(dir.path(), 3);
    let (cert, key) = credentials();

    let relay = Arc::new(MockRelay::failing_from(
        1,
        ApiError::InsufficientCredits { available: 0 },
    ));
    let store = Arc::new(MemoryCredentialStore::default());
    let mut coordinator =
        BatchSigningCoordinator::new(offline_tsa_config(), Some(relay.clone()), store);

    let rx = coordinator
        .start(relay_batch(documents.clone()), cert, key)
        .unwrap();
    let events = collect_events(rx);
    coordinator.wait();

    // Exactly one attempt, one failure outcome, one aggregated error.
    assert_eq!(progress_events(&events), vec![(1, 3)]);
    let outcomes = outcomes(&events);
    assert_eq!(outcomes.len(), 1);
    assert!(!outcomes[0].success);
    assert!(outcomes[0].message.contains("créditos"));
    assert_eq!(final_errors(&events).len(), 1);

    // Documents 2..3 were never attempted.
    assert_eq!(relay.relay_calls(), 1);
    assert!(!documents[1].with_file_name("doc1_firmado.pdf").exists());
    assert!(!documents[2].with_file_name("doc2_firmado.pdf").exists());
}

#[test]
fn authentication_failure_aborts_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    let documents = write_documents(dir.path(), 2);
    let (cert, key) = credentials();

    let relay = Arc::new(MockRelay::failing_from(
        1,
        ApiError::Authentication {
            kind: AuthErrorKind::TokenExpired,
        },
    ));
    let mut coordinator = BatchSigningCoordinator::new(
        offline_tsa_config(),
        Some(relay.clone()),
        Arc::new(MemoryCredentialStore::default()),
    );

    let rx = coordinator
        .start(relay_batch(documents), cert, key)
        .unwrap();
    let events = collect_events(rx);
    coordinator.wait();

    let outcomes = outcomes(&events);
    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].message.contains("Token"));
    assert_eq!(final_errors(&events).len(), 1);
    assert_eq!(relay.relay_calls(), 1);
}

#[test]
fn network_failure_aborts_without_free_fallback() {
    let dir = tempfile::tempdir().unwrap();
    let documents = write_documents(dir.path(), 3);
    let (cert, key) = credentials();

    let relay = Arc::new(MockRelay::failing_from(
        2,
        ApiError::Network("connection reset".to_string()),
    ));
    let mut coordinator = BatchSigningCoordinator::new(
        offline_tsa_config(),
        Some(relay.clone()),
        Arc::new(MemoryCredentialStore::default()),
    );

    let rx = coordinator
        .start(relay_batch(documents.clone()), cert, key)
        .unwrap();
    let events = collect_events(rx);
    coordinator.wait();

    // First document signed, second failed fatally, third never attempted.
    assert_eq!(progress_events(&events), vec![(1, 3), (2, 3)]);
    let outcomes = outcomes(&events);
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes[0].success);
    assert!(!outcomes[1].success);
    assert_eq!(final_errors(&events).len(), 1);
    assert_eq!(relay.relay_calls(), 2);
    assert!(!documents[2].with_file_name("doc2_firmado.pdf").exists());
}

#[test]
fn corrupt_document_fails_alone_and_the_batch_continues() {
    let dir = tempfile::tempdir().unwrap();
    let documents = write_documents(dir.path(), 3);
    std::fs::write(&documents[1], b"definitely not a pdf").unwrap();
    let (cert, key) = credentials();

    let relay = Arc::new(MockRelay::default());
    let mut coordinator = BatchSigningCoordinator::new(
        offline_tsa_config(),
        Some(relay.clone()),
        Arc::new(MemoryCredentialStore::default()),
    );

    let rx = coordinator
        .start(relay_batch(documents.clone()), cert, key)
        .unwrap();
    let events = collect_events(rx);
    coordinator.wait();

    assert_eq!(progress_events(&events), vec![(1, 3), (2, 3), (3, 3)]);

    let outcomes = outcomes(&events);
    assert_eq!(outcomes.len(), 3);
    assert!(outcomes[0].success);
    assert!(!outcomes[1].success);
    assert!(outcomes[2].success);

    assert_eq!(final_errors(&events).len(), 1);
    // The corrupt document failed before spending a relay call.
    assert_eq!(relay.relay_calls(), 2);
}

#[test]
fn second_start_while_running_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let documents = write_documents(dir.path(), 1);
    let (cert, key) = credentials();

    let relay = Arc::new(MockRelay {
        delay: Some(Duration::from_millis(300)),
        ..MockRelay::default()
    });
    let mut coordinator = BatchSigningCoordinator::new(
        offline_tsa_config(),
        Some(relay),
        Arc::new(MemoryCredentialStore::default()),
    );

    let rx = coordinator
        .start(relay_batch(documents.clone()), cert.clone(), key.clone())
        .unwrap();
    assert!(coordinator.is_running());

    // Reentrant start is rejected, not queued.
    assert!(coordinator
        .start(relay_batch(documents), cert, key)
        .is_none());

    let _ = collect_events(rx);
    coordinator.wait();
    assert!(!coordinator.is_running());
}

#[test]
fn shared_output_directory_is_honored() {
    let dir = tempfile::tempdir().unwrap();
    let out_dir = tempfile::tempdir().unwrap();
    let documents = write_documents(dir.path(), 1);
    let (cert, key) = credentials();

    let relay = Arc::new(MockRelay::default());
    let mut coordinator = BatchSigningCoordinator::new(
        offline_tsa_config(),
        Some(relay),
        Arc::new(MemoryCredentialStore::default()),
    );

    let mut batch = relay_batch(documents);
    batch.output_dir = Some(out_dir.path().to_path_buf());

    let rx = coordinator.start(batch, cert, key).unwrap();
    let events = collect_events(rx);
    coordinator.wait();

    assert!(final_errors(&events).is_empty());
    let output = out_dir.path().join("doc0_firmado.pdf");
    assert!(output.exists());
    assert!(sello::verify_file(&output).unwrap());
}
