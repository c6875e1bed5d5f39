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

//! Verification of existing PDF signatures.
//!
//! Every signature field is enumerated; a field without an embedded
//! signature counts as invalid, and one failing digest or signature
//! verification makes the whole document report invalid.

use std::path::Path;

use cms::{
    cert::CertificateChoices,
    content_info::ContentInfo,
    signed_data::{SignedData, SignerInfo},
};
use der::{
    asn1::{ObjectIdentifier, OctetString},
    Decode, Encode,
};
use log::warn;
use rsa::signature::Verifier;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};
use x509_parser::prelude::*;

use super::{
    byterange::ByteRangeCalculator,
    object::{Dictionary, Object, PdfFile},
    PdfError,
};
use crate::error::{Error, Result};

const ID_SIGNED_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.2");
const ID_MESSAGE_DIGEST: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.4");

const ID_SHA1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.14.3.2.26");
const ID_SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.1");
const ID_SHA384: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.2");
const ID_SHA512: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.3");

/// Verify every signature in the PDF at `path`.
///
/// `Ok(true)` only when the document has at least one signature field and
/// every field carries a signature that verifies. Read or parse failures
/// surface as errors rather than silently reporting `false`.
pub fn verify_file(path: &Path) -> Result<bool> {
    if !path.exists() {
        return Err(Error::Pdf(PdfError::NotFound(path.to_path_buf())));
    }

    let data = std::fs::read(path).map_err(PdfError::Io)?;
    verify_bytes(&data)
}

/// Verify every signature in an in-memory PDF.
pub(crate) fn verify_bytes(data: &[u8]) -> Result<bool> {
    let file = PdfFile::parse(data)?;
    let fields = signature_fields(&file)?;

    if fields.is_empty() {
        return Ok(false);
    }

    let mut all_valid = true;
    for (name, signature) in fields {
        match signature {
            None => {
                warn!("signature field {name} has no signature");
                all_valid = false;
            }
            Some(dict) => {
                if !verify_embedded(data, &dict) {
                    warn!("signature {name} is invalid");
                    all_valid = false;
                }
            }
        }
    }

    Ok(all_valid)
}

fn signature_fields(file: &PdfFile<'_>) -> Result<Vec<(String, Option<Dictionary>)>> {
    let (_, catalog) = file.catalog()?;

    let Some(acroform) = catalog.get("AcroForm") else {
        return Ok(Vec::new());
    };
    let acroform = file.resolve(acroform.clone())?;
    let acroform = acroform
        .as_dict()
        .ok_or_else(|| PdfError::Malformed("/AcroForm is not a dictionary".into()))?;

    let fields = match acroform.get("Fields") {
        None => return Ok(Vec::new()),
        Some(object) => file.resolve(object.clone())?,
    };
    let fields = fields
        .as_array()
        .ok_or_else(|| PdfError::Malformed("/Fields is not an array".into()))?
        .to_vec();

    let mut out = Vec::new();
    for field in fields {
        let field = file.resolve(field)?;
        if let Some(dict) = field.as_dict() {
            collect_field(file, dict, &mut out, 4)?;
        }
    }

    Ok(out)
}

fn collect_field(
    file: &PdfFile<'_>,
    dict: &Dictionary,
    out: &mut Vec<(String, Option<Dictionary>)>,
    depth: usize,
) -> Result<()> {
    if dict.get("FT").and_then(Object::as_name) == Some("Sig") {
        let name = dict
            .get("T")
            .and_then(Object::as_string_bytes)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .unwrap_or_else(|| "(unnamed)".to_string());

        let signature = match dict.get("V") {
            None => None,
            Some(value) => file.resolve(value.clone())?.as_dict().cloned(),
        };

        out.push((name, signature));
    }

    if depth > 0 {
        if let Some(kids) = dict.get("Kids").and_then(Object::as_array) {
            for kid in kids.to_vec() {
                let kid = file.resolve(kid)?;
                if let Some(kid) = kid.as_dict() {
                    collect_field(file, kid, out, depth - 1)?;
                }
            }
        }
    }

    Ok(())
}

fn verify_embedded(data: &[u8], signature: &Dictionary) -> bool {
    let Some(contents) = signature.get("Contents").and_then(Object::as_string_bytes) else {
        return false;
    };

    let byte_range: Vec<i64> = match signature.get("ByteRange").and_then(Object::as_array) {
        Some(items) => items.iter().filter_map(Object::as_int).collect(),
        None => return false,
    };
    let Ok(byte_range) = <[i64; 4]>::try_from(byte_range) else {
        return false;
    };

    if ByteRangeCalculator::validate_byte_range(&byte_range, data.len()).is_err() {
        return false;
    }

    let Ok(signed_bytes) = ByteRangeCalculator::extract_signed_bytes(data, &byte_range) else {
        return false;
    };

    verify_cms(contents, &signed_bytes)
}

fn verify_cms(contents: &[u8], signed_bytes: &[u8]) -> bool {
    // The placeholder pads the DER with zeros; decode from a reader that
    // tolerates trailing data.
    let Ok(mut reader) = der::SliceReader::new(contents) else {
        return false;
    };
    let Ok(content_info) = ContentInfo::decode(&mut reader) else {
        return false;
    };

    if content_info.content_type != ID_SIGNED_DATA {
        return false;
    }

    let Ok(signed_data) = content_info.content.decode_as::<SignedData>() else {
        return false;
    };

    let mut signer_count = 0usize;
    for signer_info in signed_data.signer_infos.0.iter() {
        signer_count += 1;
        if !verify_signer(&signed_data, signer_info, signed_bytes) {
            return false;
        }
    }

    signer_count > 0
}

fn compute_digest(oid: ObjectIdentifier, data: &[u8]) -> Option<Vec<u8>> {
    if oid == ID_SHA1 {
        Some(Sha1::digest(data).to_vec())
    } else if oid == ID_SHA256 {
        Some(Sha256::digest(data).to_vec())
    } else if oid == ID_SHA384 {
        Some(Sha384::digest(data).to_vec())
    } else if oid == ID_SHA512 {
        Some(Sha512::digest(data).to_vec())
    } else {
        None
    }
}

fn verify_signer(signed_data: &SignedData, signer_info: &SignerInfo, signed_bytes: &[u8]) -> bool {
    let digest_oid = signer_info.digest_alg.oid;
    let Some(digest) = compute_digest(digest_oid, signed_bytes) else {
        return false;
    };

    // With signed attributes present, the messageDigest attribute must match
    // the document digest and the signature covers the SET OF attributes.
    let message: Vec<u8> = match &signer_info.signed_attrs {
        Some(attrs) => {
            let Some(md_attr) = attrs.iter().find(|attr| attr.oid == ID_MESSAGE_DIGEST) else {
                return false;
            };
            let Some(value) = md_attr.values.iter().next() else {
                return false;
            };
            let Ok(expected) = value.decode_as::<OctetString>() else {
                return false;
            };
            if expected.as_bytes() != digest.as_slice() {
                return false;
            }

            match attrs.to_der() {
                Ok(der) => der,
                Err(_) => return false,
            }
        }
        None => signed_bytes.to_vec(),
    };

    let Some(certificates) = signed_data.certificates.as_ref() else {
        return false;
    };

    let signature = signer_info.signature.as_bytes();

    certificates.0.iter().any(|choice| {
        let CertificateChoices::Certificate(cert) = choice else {
            return false;
        };
        let Ok(cert_der) = cert.to_der() else {
            return false;
        };
        verify_with_certificate(&cert_der, digest_oid, &message, signature)
    })
}

fn verify_with_certificate(
    cert_der: &[u8],
    digest_oid: ObjectIdentifier,
    message: &[u8],
    signature: &[u8],
) -> bool {
    let Ok((_, cert)) = X509Certificate::from_der(cert_der) else {
        return false;
    };
    let spki = cert.public_key();

    match spki.parsed() {
        Ok(x509_parser::public_key::PublicKey::RSA(_)) => {
            use rsa::pkcs8::DecodePublicKey;

            let Ok(public_key) = rsa::RsaPublicKey::from_public_key_der(spki.raw) else {
                return false;
            };
            let Ok(sig) = rsa::pkcs1v15::Signature::try_from(signature) else {
                return false;
            };

            if digest_oid == ID_SHA1 {
                rsa::pkcs1v15::VerifyingKey::<Sha1>::new(public_key)
                    .verify(message, &sig)
                    .is_ok()
            } else if digest_oid == ID_SHA256 {
                rsa::pkcs1v15::VerifyingKey::<Sha256>::new(public_key)
                    .verify(message, &sig)
                    .is_ok()
            } else if digest_oid == ID_SHA384 {
                rsa::pkcs1v15::VerifyingKey::<Sha384>::new(public_key)
                    .verify(message, &sig)
                    .is_ok()
            } else if digest_oid == ID_SHA512 {
                rsa::pkcs1v15::VerifyingKey::<Sha512>::new(public_key)
                    .verify(message, &sig)
                    .is_ok()
            } else {
                false
            }
        }
        Ok(x509_parser::public_key::PublicKey::EC(_)) => {
            use p256::pkcs8::DecodePublicKey;

            if digest_oid != ID_SHA256 {
                return false;
            }

            let Ok(verifying_key) = p256::ecdsa::VerifyingKey::from_public_key_der(spki.raw)
            else {
                return false;
            };
            let Ok(sig) = p256::ecdsa::DerSignature::try_from(signature) else {
                return false;
            };

            verifying_key.verify(message, &sig).is_ok()
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn fixture(name: &str) -> Vec<u8> {
        std::fs::read(
            std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
                .join("tests/fixtures")
                .join(name),
        )
        .unwrap()
    }

    #[test]
    fn unsigned_document_reports_invalid() {
        assert!(!verify_bytes(&fixture("minimal.pdf")).unwrap());
    }

    #[test]
    fn garbage_is_an_error_not_false() {
        assert!(matches!(
            verify_bytes(b"this is not a pdf"),
            Err(Error::Pdf(PdfError::InvalidHeader))
        ));
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(matches!(
            verify_file(Path::new("/nonexistent/signed.pdf")),
            Err(Error::Pdf(PdfError::NotFound(_)))
        ));
    }
}
