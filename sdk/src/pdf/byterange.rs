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

//! ByteRange calculation for PDF signatures.
//!
//! A PDF signature covers the whole file except the `/Contents` hex
//! placeholder the signature itself is written into. The ByteRange array
//! `[offset1 length1 offset2 length2]` records the two covered spans.

use super::PdfError;

/// Calculator for PDF signature byte ranges.
#[derive(Debug)]
pub(crate) struct ByteRangeCalculator {
    /// Size of the `/Contents` placeholder: hex digits plus the two angle
    /// brackets.
    placeholder_size: usize,
}

impl ByteRangeCalculator {
    /// Calculator for a signature of up to `estimated_signature_size` DER
    /// bytes; the placeholder doubles that (hex) and adds the brackets.
    pub fn new(estimated_signature_size: usize) -> Self {
        Self {
            placeholder_size: estimated_signature_size * 2 + 2,
        }
    }

    pub fn placeholder_size(&self) -> usize {
        self.placeholder_size
    }

    /// The `<000…0>` placeholder written in place of the signature.
    pub fn generate_placeholder(&self) -> String {
        format!("<{}>", "0".repeat(self.placeholder_size - 2))
    }

    /// ByteRange for a file of `file_size` bytes whose placeholder starts
    /// (at the `<`) at `contents_offset`.
    pub fn calculate_byte_range(&self, file_size: usize, contents_offset: usize) -> [i64; 4] {
        let before_sig = contents_offset as i64;
        let after_sig_start = (contents_offset + self.placeholder_size) as i64;
        let after_sig_len = file_size as i64 - after_sig_start;

        [0, before_sig, after_sig_start, after_sig_len]
    }

    /// Concatenate the two covered spans.
    pub fn extract_signed_bytes(pdf_data: &[u8], byte_range: &[i64; 4]) -> Result<Vec<u8>, PdfError> {
        let offset1 = byte_range[0] as usize;
        let length1 = byte_range[1] as usize;
        let offset2 = byte_range[2] as usize;
        let length2 = byte_range[3] as usize;

        if byte_range.iter().any(|v| *v < 0)
            || offset1 + length1 > pdf_data.len()
            || offset2 + length2 > pdf_data.len()
        {
            return Err(PdfError::Malformed(format!(
                "ByteRange {byte_range:?} exceeds file size {}",
                pdf_data.len()
            )));
        }

        let mut signed_bytes = Vec::with_capacity(length1 + length2);
        signed_bytes.extend_from_slice(&pdf_data[offset1..offset1 + length1]);
        signed_bytes.extend_from_slice(&pdf_data[offset2..offset2 + length2]);
        Ok(signed_bytes)
    }

    /// A valid ByteRange starts at 0, ends within the file (at the end of
    /// the revision it covers — later incremental updates may follow), and
    /// leaves no gap other than the placeholder itself.
    pub fn validate_byte_range(byte_range: &[i64; 4], file_size: usize) -> Result<(), PdfError> {
        if byte_range[0] != 0 {
            return Err(PdfError::Malformed(format!(
                "ByteRange must start at 0, got {}",
                byte_range[0]
            )));
        }

        let actual_end = byte_range[2] + byte_range[3];
        if byte_range.iter().any(|v| *v < 0) || actual_end > file_size as i64 {
            return Err(PdfError::Malformed(format!(
                "ByteRange ends at {actual_end}, beyond file size {file_size}"
            )));
        }

        if byte_range[1] > byte_range[2] {
            return Err(PdfError::Malformed(
                "ByteRange spans overlap the placeholder".into(),
            ));
        }

        Ok(())
    }

    /// Find the `<` of the `/Contents` placeholder, searching forward from
    /// `sig_dict_offset`.
    pub fn find_contents_offset(pdf_data: &[u8], sig_dict_offset: usize) -> Option<usize> {
        let window_end = pdf_data.len().min(sig_dict_offset + 4096);
        let window = &pdf_data[sig_dict_offset..window_end];

        let contents_at = super::object::find(window, b"/Contents")?;
        let mut pos = contents_at + b"/Contents".len();

        while pos < window.len() {
            match window[pos] {
                b'<' => return Some(sig_dict_offset + pos),
                b' ' | b'\t' | b'\r' | b'\n' => pos += 1,
                _ => return None,
            }
        }

        None
    }

    /// Overwrite the placeholder with the hex signature, zero-padded to the
    /// placeholder size.
    pub fn insert_signature(
        &self,
        pdf_data: &mut [u8],
        contents_offset: usize,
        signature_hex: &str,
    ) -> Result<(), PdfError> {
        let sig_len = signature_hex.len() + 2;
        if sig_len > self.placeholder_size {
            return Err(PdfError::Malformed(format!(
                "signature ({sig_len} chars) exceeds placeholder ({} chars)",
                self.placeholder_size
            )));
        }

        if contents_offset + self.placeholder_size > pdf_data.len() {
            return Err(PdfError::Malformed(
                "signature insertion would exceed file bounds".into(),
            ));
        }

        let mut value = String::with_capacity(self.placeholder_size);
        value.push('<');
        value.push_str(signature_hex);
        for _ in 0..(self.placeholder_size - 2 - signature_hex.len()) {
            value.push('0');
        }
        value.push('>');

        pdf_data[contents_offset..contents_offset + self.placeholder_size]
            .copy_from_slice(value.as_bytes());

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn placeholder_size_doubles_plus_brackets() {
        let calc = ByteRangeCalculator::new(1024);
        assert_eq!(calc.placeholder_size(), 2050);
        let placeholder = calc.generate_placeholder();
        assert_eq!(placeholder.len(), 2050);
        assert!(placeholder.starts_with('<') && placeholder.ends_with('>'));
    }

    #[test]
    fn byte_range_math() {
        let calc = ByteRangeCalculator::new(50); // placeholder = 102
        let byte_range = calc.calculate_byte_range(1000, 400);
        assert_eq!(byte_range, [0, 400, 502, 498]);
    }

    #[test]
    fn extracts_signed_bytes() {
        let data = b"AAABBBCCC";
        let signed =
            ByteRangeCalculator::extract_signed_bytes(data, &[0, 3, 6, 3]).unwrap();
        assert_eq!(signed, b"AAACCC");
    }

    #[test]
    fn validates_byte_range() {
        assert!(ByteRangeCalculator::validate_byte_range(&[0, 100, 150, 50], 200).is_ok());
        // An earlier revision of a multiply-signed file ends before EOF.
        assert!(ByteRangeCalculator::validate_byte_range(&[0, 100, 150, 30], 200).is_ok());
        assert!(ByteRangeCalculator::validate_byte_range(&[10, 100, 150, 50], 200).is_err());
        assert!(ByteRangeCalculator::validate_byte_range(&[0, 100, 150, 100], 200).is_err());
        assert!(ByteRangeCalculator::validate_byte_range(&[0, 160, 150, 50], 200).is_err());
    }

    #[test]
    fn finds_contents_offset() {
        let data = b"<< /Type /Sig /Contents <0000> >>";
        let offset = ByteRangeCalculator::find_contents_offset(data, 0).unwrap();
        assert_eq!(data[offset], b'<');
        assert_eq!(&data[offset..offset + 6], b"<0000>");
    }

    #[test]
    fn inserts_and_pads_signature() {
        let calc = ByteRangeCalculator {
            placeholder_size: 10,
        };
        let mut data = b"XX<00000000>YY".to_vec();
        calc.insert_signature(&mut data, 2, "ABCD").unwrap();
        assert_eq!(&data, b"XX<ABCD0000>YY");

        let too_big = calc.insert_signature(&mut data, 2, "AABBCCDDEE");
        assert!(too_big.is_err());
    }
}
