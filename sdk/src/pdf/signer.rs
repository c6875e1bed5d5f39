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

use std::path::{Path, PathBuf};

use log::info;
use sello_crypto::{
    certificate::{Certificate, SigningKeyPair},
    time_stamp::DigestAlgorithm,
};
use sha2::{Digest, Sha256};

use super::{
    byterange::ByteRangeCalculator,
    cms,
    object::{find, Dictionary, ObjRef, Object, PdfFile},
    update::{pdf_text_bytes, IncrementalUpdate},
    PdfError,
};
use crate::{
    config::SIGNED_SUFFIX,
    error::{Error, Result},
    timestamp::{RelayTimestamper, TimestamperHandle, DEFAULT_TOKEN_RESERVE},
};

const SIGNATURE_FIELD_NAME: &str = "Firma1";
const SIGNATURE_LOCATION: &str = "México";
const FALLBACK_SIGNER_NAME: &str = "Firmante Digital";

/// Room for the CMS envelope around the certificate and timestamp token.
const CMS_BASE_RESERVE: usize = 4096;

const BYTE_RANGE_TEMPLATE: &str = "[0 0000000000 0000000000 0000000000]";

/// Where a signature's RFC 3161 token comes from. The variants are mutually
/// exclusive by construction — a signature never mixes sources.
#[derive(Default)]
pub enum TimestampSource<'a> {
    /// Sign without a timestamp.
    #[default]
    None,

    /// Direct request to a public TSA.
    Tsa(&'a TimestamperHandle),

    /// Relay round trip through the credit-metered backend.
    Relay(&'a RelayTimestamper),
}

impl TimestampSource<'_> {
    /// Acquire a token over `message`, or `None` when no source was chosen.
    pub(crate) fn token_for(&self, message: &[u8]) -> Result<Option<Vec<u8>>> {
        match self {
            Self::None => Ok(None),
            Self::Tsa(handle) => handle.request_token(message).map(Some),
            Self::Relay(relay) => relay.request_token(message).map(Some),
        }
    }

    /// Placeholder headroom for the token this source will produce.
    fn reserve_size(&self) -> usize {
        match self {
            Self::None => 0,
            Self::Tsa(_) => DEFAULT_TOKEN_RESERVE,
            Self::Relay(relay) => relay.estimated_token_size(DigestAlgorithm::Sha256),
        }
    }
}

/// Signs PDF documents with a validated certificate/key pair.
///
/// Signatures are invisible (no appearance stream) and always appended as an
/// incremental update.
pub struct DocumentSigner<'a> {
    cert: &'a Certificate,
    key: &'a SigningKeyPair,
    timestamp: TimestampSource<'a>,
}

impl<'a> DocumentSigner<'a> {
    /// Create a signer over a validated certificate/key pair.
    pub fn new(cert: &'a Certificate, key: &'a SigningKeyPair) -> Self {
        Self {
            cert,
            key,
            timestamp: TimestampSource::None,
        }
    }

    /// Choose the timestamp source for signatures produced by this signer.
    pub fn with_timestamp(mut self, timestamp: TimestampSource<'a>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Default output path: same directory, filename suffixed before the
    /// extension.
    pub fn default_output_path(source: &Path) -> PathBuf {
        let stem = source
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();

        let file_name = match source.extension() {
            Some(ext) => format!("{stem}{SIGNED_SUFFIX}.{}", ext.to_string_lossy()),
            None => format!("{stem}{SIGNED_SUFFIX}"),
        };

        source.parent().unwrap_or(Path::new("")).join(file_name)
    }

    /// Sign `source` and write the result to `destination` (or the default
    /// suffixed path). Responds with the path written.
    pub fn sign(&self, source: &Path, destination: Option<&Path>) -> Result<PathBuf> {
        if !source.exists() {
            return Err(Error::Pdf(PdfError::NotFound(source.to_path_buf())));
        }

        let destination = destination
            .map(Path::to_path_buf)
            .unwrap_or_else(|| Self::default_output_path(source));

        info!("signing PDF: {}", source.display());

        let data = std::fs::read(source).map_err(PdfError::Io)?;
        let signed = self.sign_bytes(&data)?;

        std::fs::write(&destination, signed).map_err(PdfError::Io)?;

        info!("PDF signed successfully: {}", destination.display());
        Ok(destination)
    }

    /// Verify every signature in the PDF at `path`; see
    /// [`verify_file`](super::verify_file).
    pub fn verify(path: &Path) -> Result<bool> {
        super::verifier::verify_file(path)
    }

    /// Sign in-memory PDF bytes, appending the signature incrementally.
    pub fn sign_bytes(&self, data: &[u8]) -> Result<Vec<u8>> {
        let file = PdfFile::parse(data)?;
        let (catalog_ref, catalog) = file.catalog()?;
        let (page_ref, page) = file.first_page()?;

        let mut update = IncrementalUpdate::new(&file);
        let sig_ref = update.allocate();
        let field_ref = update.allocate();

        let reserve = CMS_BASE_RESERVE + self.cert.der().len() + self.timestamp.reserve_size();
        let calculator = ByteRangeCalculator::new(reserve);

        update.set_raw(sig_ref, self.signature_dictionary(&calculator));
        update.set(field_ref, Object::Dictionary(self.signature_field(sig_ref, page_ref)));

        self.attach_to_page(&file, &mut update, page_ref, &page, field_ref)?;
        self.attach_to_acroform(&file, &mut update, catalog_ref, &catalog, field_ref)?;

        let (mut out, body_offsets) = update.render();
        let sig_body_offset = body_offsets[0];

        let contents_offset = ByteRangeCalculator::find_contents_offset(&out, sig_body_offset)
            .ok_or_else(|| PdfError::Malformed("signature placeholder not found".into()))?;

        let byte_range = calculator.calculate_byte_range(out.len(), contents_offset);
        patch_byte_range(&mut out, sig_body_offset, &byte_range)?;

        let signed_bytes = ByteRangeCalculator::extract_signed_bytes(&out, &byte_range)?;
        let digest = Sha256::digest(&signed_bytes);

        let signature = cms::sign_detached(self.cert.der(), self.key, &digest, &self.timestamp)?;
        if signature.len() > reserve {
            return Err(Error::Signing {
                message: format!(
                    "signature of {} bytes exceeds the reserved {reserve} bytes",
                    signature.len()
                ),
            });
        }

        let mut signature_hex = String::with_capacity(signature.len() * 2);
        for byte in &signature {
            signature_hex.push_str(&format!("{byte:02X}"));
        }
        calculator.insert_signature(&mut out, contents_offset, &signature_hex)?;

        Ok(out)
    }

    fn signer_name(&self) -> String {
        self.cert
            .common_name()
            .unwrap_or(FALLBACK_SIGNER_NAME)
            .to_string()
    }

    /// The signature dictionary is pre-serialized so the `/Contents` and
    /// `/ByteRange` placeholders land at stable offsets in the rendered
    /// update.
    fn signature_dictionary(&self, calculator: &ByteRangeCalculator) -> Vec<u8> {
        let mut body = Vec::with_capacity(calculator.placeholder_size() + 256);

        body.extend_from_slice(b"<<\n/Type /Sig\n/Filter /Adobe.PPKLite\n/SubFilter /adbe.pkcs7.detached\n");
        body.extend_from_slice(format!("/ByteRange {BYTE_RANGE_TEMPLATE}\n").as_bytes());
        body.extend_from_slice(b"/Contents ");
        body.extend_from_slice(calculator.generate_placeholder().as_bytes());
        body.push(b'\n');

        body.extend_from_slice(b"/Name ");
        write_literal_string(&mut body, &pdf_text_bytes(&self.signer_name()));
        body.push(b'\n');

        body.extend_from_slice(b"/Location ");
        write_literal_string(&mut body, &pdf_text_bytes(SIGNATURE_LOCATION));
        body.push(b'\n');

        let signing_time = chrono::Utc::now().format("D:%Y%m%d%H%M%SZ").to_string();
        body.extend_from_slice(b"/M ");
        write_literal_string(&mut body, signing_time.as_bytes());
        body.extend_from_slice(b"\n>>");

        body
    }

    /// Invisible widget annotation doubling as the signature form field.
    fn signature_field(&self, sig_ref: ObjRef, page_ref: ObjRef) -> Dictionary {
        let mut field = Dictionary::new();
        field.insert("Type".into(), Object::Name("Annot".into()));
        field.insert("Subtype".into(), Object::Name("Widget".into()));
        field.insert("FT".into(), Object::Name("Sig".into()));
        field.insert(
            "T".into(),
            Object::String(SIGNATURE_FIELD_NAME.as_bytes().to_vec()),
        );
        // Print + locked; rect [0 0 0 0] keeps the signature non-visual.
        field.insert("F".into(), Object::Integer(132));
        field.insert(
            "Rect".into(),
            Object::Array(vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(0),
            ]),
        );
        field.insert("V".into(), Object::Reference(sig_ref));
        field.insert("P".into(), Object::Reference(page_ref));
        field
    }

    fn attach_to_page(
        &self,
        file: &PdfFile<'_>,
        update: &mut IncrementalUpdate<'_, '_>,
        page_ref: ObjRef,
        page: &Dictionary,
        field_ref: ObjRef,
    ) -> Result<()> {
        match page.get("Annots") {
            None => {
                let mut page = page.clone();
                page.insert(
                    "Annots".into(),
                    Object::Array(vec![Object::Reference(field_ref)]),
                );
                update.set(page_ref, Object::Dictionary(page));
            }
            Some(Object::Array(items)) => {
                let mut items = items.clone();
                items.push(Object::Reference(field_ref));
                let mut page = page.clone();
                page.insert("Annots".into(), Object::Array(items));
                update.set(page_ref, Object::Dictionary(page));
            }
            Some(Object::Reference(annots_ref)) => {
                // Rewriting the annotation array object leaves the page
                // object itself untouched.
                let resolved = file.resolve(Object::Reference(*annots_ref))?;
                let mut items = resolved
                    .as_array()
                    .ok_or_else(|| PdfError::Malformed("/Annots is not an array".into()))?
                    .to_vec();
                items.push(Object::Reference(field_ref));
                update.set(*annots_ref, Object::Array(items));
            }
            Some(_) => {
                return Err(Error::Pdf(PdfError::Malformed(
                    "/Annots has an unexpected type".into(),
                )))
            }
        }
        Ok(())
    }

    fn attach_to_acroform(
        &self,
        file: &PdfFile<'_>,
        update: &mut IncrementalUpdate<'_, '_>,
        catalog_ref: ObjRef,
        catalog: &Dictionary,
        field_ref: ObjRef,
    ) -> Result<()> {
        match catalog.get("AcroForm") {
            None => {
                let acroform_ref = update.allocate();
                update.set(
                    acroform_ref,
                    Object::Dictionary(new_acroform(vec![Object::Reference(field_ref)])),
                );

                let mut catalog = catalog.clone();
                catalog.insert("AcroForm".into(), Object::Reference(acroform_ref));
                update.set(catalog_ref, Object::Dictionary(catalog));
            }
            Some(Object::Reference(acroform_ref)) => {
                let resolved = file.resolve(Object::Reference(*acroform_ref))?;
                let acroform = resolved
                    .as_dict()
                    .ok_or_else(|| PdfError::Malformed("/AcroForm is not a dictionary".into()))?;
                let updated = extended_acroform(file, acroform, field_ref)?;
                update.set(*acroform_ref, Object::Dictionary(updated));
            }
            Some(Object::Dictionary(acroform)) => {
                let updated = extended_acroform(file, acroform, field_ref)?;
                let mut catalog = catalog.clone();
                catalog.insert("AcroForm".into(), Object::Dictionary(updated));
                update.set(catalog_ref, Object::Dictionary(catalog));
            }
            Some(_) => {
                return Err(Error::Pdf(PdfError::Malformed(
                    "/AcroForm has an unexpected type".into(),
                )))
            }
        }
        Ok(())
    }
}

fn new_acroform(fields: Vec<Object>) -> Dictionary {
    let mut acroform = Dictionary::new();
    acroform.insert("Fields".into(), Object::Array(fields));
    // Signatures exist + append-only.
    acroform.insert("SigFlags".into(), Object::Integer(3));
    acroform
}

fn extended_acroform(
    file: &PdfFile<'_>,
    acroform: &Dictionary,
    field_ref: ObjRef,
) -> Result<Dictionary> {
    let mut fields = match acroform.get("Fields") {
        None => Vec::new(),
        Some(object) => file
            .resolve(object.clone())?
            .as_array()
            .ok_or_else(|| PdfError::Malformed("/Fields is not an array".into()))?
            .to_vec(),
    };
    fields.push(Object::Reference(field_ref));

    let mut updated = acroform.clone();
    updated.insert("Fields".into(), Object::Array(fields));
    updated.insert("SigFlags".into(), Object::Integer(3));
    Ok(updated)
}

fn write_literal_string(out: &mut Vec<u8>, bytes: &[u8]) {
    out.push(b'(');
    for &b in bytes {
        match b {
            b'(' | b')' | b'\\' => {
                out.push(b'\\');
                out.push(b);
            }
            b'\r' => out.extend_from_slice(b"\\r"),
            b'\n' => out.extend_from_slice(b"\\n"),
            other => out.push(other),
        }
    }
    out.push(b')');
}

fn patch_byte_range(out: &mut [u8], from: usize, byte_range: &[i64; 4]) -> Result<()> {
    let idx = find(&out[from..], BYTE_RANGE_TEMPLATE.as_bytes())
        .ok_or_else(|| PdfError::Malformed("ByteRange template not found".into()))?
        + from;

    let mut formatted = format!(
        "[0 {} {} {}]",
        byte_range[1], byte_range[2], byte_range[3]
    )
    .into_bytes();

    if formatted.len() > BYTE_RANGE_TEMPLATE.len() {
        return Err(Error::Pdf(PdfError::Malformed(
            "ByteRange does not fit its template".into(),
        )));
    }
    formatted.resize(BYTE_RANGE_TEMPLATE.len(), b' ');

    out[idx..idx + BYTE_RANGE_TEMPLATE.len()].copy_from_slice(&formatted);
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use sello_crypto::certificate::Certificate;

    use super::*;
    use crate::pdf::verifier;

    fn fixture(name: &str) -> Vec<u8> {
        std::fs::read(
            std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
                .join("tests/fixtures")
                .join(name),
        )
        .unwrap()
    }

    fn credentials() -> (Certificate, SigningKeyPair) {
        let cert = Certificate::from_der_or_pem(&fixture("signer.der")).unwrap();
        let key = SigningKeyPair::load(&fixture("signer_pkcs8.der"), "").unwrap();
        (cert, key)
    }

    #[test]
    fn round_trip_preserves_original_bytes() {
        let (cert, key) = credentials();
        let source = fixture("minimal.pdf");

        let signed = DocumentSigner::new(&cert, &key).sign_bytes(&source).unwrap();

        assert!(signed.len() > source.len());
        assert_eq!(&signed[..5], b"%PDF-");
        // Incremental update: the original file is a byte-for-byte prefix.
        assert_eq!(&signed[..source.len()], &source[..]);

        assert!(verifier::verify_bytes(&signed).unwrap());
    }

    #[test]
    fn tampering_invalidates_the_signature() {
        let (cert, key) = credentials();
        let source = fixture("minimal.pdf");

        let mut signed = DocumentSigner::new(&cert, &key).sign_bytes(&source).unwrap();

        // Flip a byte inside the signed region.
        signed[40] ^= 0x01;
        assert!(!verifier::verify_bytes(&signed).unwrap());
    }

    #[test]
    fn signs_xref_stream_files() {
        let (cert, key) = credentials();
        let source = fixture("xrefstream.pdf");

        let signed = DocumentSigner::new(&cert, &key).sign_bytes(&source).unwrap();
        assert_eq!(&signed[..source.len()], &source[..]);
        assert!(verifier::verify_bytes(&signed).unwrap());
    }

    #[test]
    fn signs_twice_incrementally() {
        let (cert, key) = credentials();
        let source = fixture("minimal.pdf");

        let signer = DocumentSigner::new(&cert, &key);
        let once = signer.sign_bytes(&source).unwrap();
        let twice = signer.sign_bytes(&once).unwrap();

        assert_eq!(&twice[..once.len()], &once[..]);
        assert!(verifier::verify_bytes(&twice).unwrap());
    }

    #[test]
    fn ec_key_round_trip() {
        let cert = Certificate::from_der_or_pem(&fixture("signer_ec_cert.der")).unwrap();
        let key = SigningKeyPair::load(&fixture("signer_ec.der"), "").unwrap();
        let source = fixture("minimal.pdf");

        let signed = DocumentSigner::new(&cert, &key).sign_bytes(&source).unwrap();
        assert!(verifier::verify_bytes(&signed).unwrap());
    }

    #[test]
    fn missing_source_is_a_pdf_error() {
        let (cert, key) = credentials();
        let err = DocumentSigner::new(&cert, &key)
            .sign(Path::new("/nonexistent/file.pdf"), None)
            .unwrap_err();
        assert!(matches!(err, Error::Pdf(PdfError::NotFound(_))));
    }

    #[test]
    fn default_output_path_inserts_suffix() {
        let path = DocumentSigner::default_output_path(Path::new("/tmp/contrato.pdf"));
        assert_eq!(path, Path::new("/tmp/contrato_firmado.pdf"));

        let bare = DocumentSigner::default_output_path(Path::new("informe"));
        assert_eq!(bare, Path::new("informe_firmado"));
    }

    #[test]
    fn signs_to_temp_directory() {
        let (cert, key) = credentials();
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("doc.pdf");
        std::fs::write(&source, fixture("minimal.pdf")).unwrap();

        let out = DocumentSigner::new(&cert, &key).sign(&source, None).unwrap();
        assert_eq!(out, dir.path().join("doc_firmado.pdf"));
        assert!(verifier::verify_file(&out).unwrap());
    }
}
