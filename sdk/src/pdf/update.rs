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

//! Incremental update writer.
//!
//! Appends new or replacement object versions after the original bytes and
//! closes the section with either a classic cross-reference table or a
//! cross-reference stream, matching whichever form the original file uses.
//! The original content is never touched.

use std::collections::BTreeMap;

use super::object::{Dictionary, ObjRef, Object, PdfFile};

/// An object body queued for the update section.
pub(crate) enum ObjectBody {
    Parsed(Object),
    /// Pre-serialized bytes, emitted verbatim (used for the signature
    /// dictionary, whose placeholders must land at predictable offsets).
    Raw(Vec<u8>),
}

pub(crate) struct IncrementalUpdate<'a, 'b> {
    file: &'b PdfFile<'a>,
    objects: Vec<(ObjRef, ObjectBody)>,
    next_number: u32,
}

impl<'a, 'b> IncrementalUpdate<'a, 'b> {
    pub fn new(file: &'b PdfFile<'a>) -> Self {
        let size = file
            .trailer
            .get("Size")
            .and_then(Object::as_int)
            .unwrap_or(0) as u32;

        Self {
            file,
            objects: Vec::new(),
            next_number: size.max(file.max_object_number() + 1),
        }
    }

    /// Allocate a fresh object number.
    pub fn allocate(&mut self) -> ObjRef {
        let r = ObjRef {
            number: self.next_number,
            generation: 0,
        };
        self.next_number += 1;
        r
    }

    /// Queue a parsed object (new or replacement version).
    pub fn set(&mut self, r: ObjRef, object: Object) {
        self.objects.push((r, ObjectBody::Parsed(object)));
    }

    /// Queue pre-serialized object bytes.
    pub fn set_raw(&mut self, r: ObjRef, body: Vec<u8>) {
        self.objects.push((r, ObjectBody::Raw(body)));
    }

    /// Render the original file plus the update section.
    ///
    /// Returns the combined bytes and the offset at which the body of each
    /// queued object begins (after its `N G obj` header), in queue order.
    pub fn render(&mut self) -> (Vec<u8>, Vec<usize>) {
        let mut out = self.file.data.to_vec();
        if !matches!(out.last(), Some(b'\n' | b'\r')) {
            out.push(b'\n');
        }

        let mut offsets: Vec<(ObjRef, usize)> = Vec::with_capacity(self.objects.len());
        let mut body_offsets = Vec::with_capacity(self.objects.len());

        for (r, body) in &self.objects {
            offsets.push((*r, out.len()));
            out.extend_from_slice(format!("{} {} obj\n", r.number, r.generation).as_bytes());
            body_offsets.push(out.len());
            match body {
                ObjectBody::Parsed(object) => serialize_object(object, &mut out),
                ObjectBody::Raw(bytes) => out.extend_from_slice(bytes),
            }
            out.extend_from_slice(b"\nendobj\n");
        }

        let xref_pos = out.len();

        if self.file.uses_xref_stream {
            self.write_xref_stream(&mut out, &offsets, xref_pos);
        } else {
            self.write_xref_table(&mut out, &offsets);
        }

        out.extend_from_slice(format!("startxref\n{xref_pos}\n%%EOF\n").as_bytes());

        (out, body_offsets)
    }

    fn carried_trailer_keys(&self) -> Dictionary {
        let mut trailer = Dictionary::new();
        for key in ["Root", "Info", "ID"] {
            if let Some(value) = self.file.trailer.get(key) {
                trailer.insert(key.to_string(), value.clone());
            }
        }
        trailer
    }

    fn previous_startxref(&self) -> Option<usize> {
        // A reconstructed file has no usable prior xref to chain to.
        (self.file.startxref < self.file.data.len()).then_some(self.file.startxref)
    }

    fn write_xref_table(&self, out: &mut Vec<u8>, offsets: &[(ObjRef, usize)]) {
        let mut entries: BTreeMap<u32, usize> = BTreeMap::new();
        for (r, offset) in offsets {
            entries.insert(r.number, *offset);
        }

        out.extend_from_slice(b"xref\n");

        let numbers: Vec<u32> = entries.keys().copied().collect();
        let mut run_start = 0usize;
        while run_start < numbers.len() {
            let mut run_end = run_start + 1;
            while run_end < numbers.len() && numbers[run_end] == numbers[run_end - 1] + 1 {
                run_end += 1;
            }

            out.extend_from_slice(
                format!("{} {}\n", numbers[run_start], run_end - run_start).as_bytes(),
            );
            for number in &numbers[run_start..run_end] {
                out.extend_from_slice(format!("{:010} {:05} n \n", entries[number], 0).as_bytes());
            }

            run_start = run_end;
        }

        let mut trailer = self.carried_trailer_keys();
        trailer.insert(
            "Size".to_string(),
            Object::Integer(self.next_number as i64),
        );
        if let Some(prev) = self.previous_startxref() {
            trailer.insert("Prev".to_string(), Object::Integer(prev as i64));
        }

        out.extend_from_slice(b"trailer\n");
        serialize_object(&Object::Dictionary(trailer), out);
        out.push(b'\n');
    }

    fn write_xref_stream(&mut self, out: &mut Vec<u8>, offsets: &[(ObjRef, usize)], xref_pos: usize) {
        let stream_ref = self.allocate();

        let mut entries: BTreeMap<u32, usize> = BTreeMap::new();
        for (r, offset) in offsets {
            entries.insert(r.number, *offset);
        }
        entries.insert(stream_ref.number, xref_pos);

        // W = [1 4 2]: type byte, 4-byte offset, 2-byte generation.
        let mut rows: Vec<u8> = Vec::with_capacity(entries.len() * 7);
        let mut index: Vec<Object> = Vec::new();

        let numbers: Vec<u32> = entries.keys().copied().collect();
        let mut run_start = 0usize;
        while run_start < numbers.len() {
            let mut run_end = run_start + 1;
            while run_end < numbers.len() && numbers[run_end] == numbers[run_end - 1] + 1 {
                run_end += 1;
            }

            index.push(Object::Integer(numbers[run_start] as i64));
            index.push(Object::Integer((run_end - run_start) as i64));

            for number in &numbers[run_start..run_end] {
                rows.push(1);
                rows.extend_from_slice(&(entries[number] as u32).to_be_bytes());
                rows.extend_from_slice(&0u16.to_be_bytes());
            }

            run_start = run_end;
        }

        let mut dict = self.carried_trailer_keys();
        dict.insert("Type".to_string(), Object::Name("XRef".to_string()));
        dict.insert(
            "Size".to_string(),
            Object::Integer(self.next_number as i64),
        );
        dict.insert(
            "W".to_string(),
            Object::Array(vec![
                Object::Integer(1),
                Object::Integer(4),
                Object::Integer(2),
            ]),
        );
        dict.insert("Index".to_string(), Object::Array(index));
        dict.insert("Length".to_string(), Object::Integer(rows.len() as i64));
        if let Some(prev) = self.previous_startxref() {
            dict.insert("Prev".to_string(), Object::Integer(prev as i64));
        }

        out.extend_from_slice(
            format!("{} {} obj\n", stream_ref.number, stream_ref.generation).as_bytes(),
        );
        serialize_object(
            &Object::Stream {
                dict,
                data: rows,
            },
            out,
        );
        out.extend_from_slice(b"\nendobj\n");
    }
}

/// Serialize one object in PDF syntax.
pub(crate) fn serialize_object(object: &Object, out: &mut Vec<u8>) {
    match object {
        Object::Null => out.extend_from_slice(b"null"),
        Object::Boolean(true) => out.extend_from_slice(b"true"),
        Object::Boolean(false) => out.extend_from_slice(b"false"),
        Object::Integer(value) => out.extend_from_slice(value.to_string().as_bytes()),
        Object::Real(value) => out.extend_from_slice(format!("{value}").as_bytes()),
        Object::String(bytes) => {
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
        Object::HexString(bytes) => {
            out.push(b'<');
            for b in bytes {
                out.extend_from_slice(format!("{b:02X}").as_bytes());
            }
            out.push(b'>');
        }
        Object::Name(name) => {
            out.push(b'/');
            for &b in name.as_bytes() {
                let delimiter = matches!(
                    b,
                    b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%' | b'#'
                );
                if b <= b' ' || b > b'~' || delimiter {
                    out.extend_from_slice(format!("#{b:02X}").as_bytes());
                } else {
                    out.push(b);
                }
            }
        }
        Object::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b' ');
                }
                serialize_object(item, out);
            }
            out.push(b']');
        }
        Object::Dictionary(dict) => serialize_dictionary(dict, out),
        Object::Stream { dict, data } => {
            serialize_dictionary(dict, out);
            out.extend_from_slice(b"\nstream\n");
            out.extend_from_slice(data);
            out.extend_from_slice(b"\nendstream");
        }
        Object::Reference(r) => {
            out.extend_from_slice(format!("{} {} R", r.number, r.generation).as_bytes())
        }
    }
}

fn serialize_dictionary(dict: &Dictionary, out: &mut Vec<u8>) {
    out.extend_from_slice(b"<< ");
    for (key, value) in dict {
        serialize_object(&Object::Name(key.clone()), out);
        out.push(b' ');
        serialize_object(value, out);
        out.push(b' ');
    }
    out.extend_from_slice(b">>");
}

/// Encode a text string for a PDF literal string: PDFDocEncoding-compatible
/// Latin-1 when possible, UTF-16BE with BOM otherwise.
pub(crate) fn pdf_text_bytes(text: &str) -> Vec<u8> {
    if text.chars().all(|c| (c as u32) < 0x100) {
        text.chars().map(|c| c as u8).collect()
    } else {
        let mut bytes = vec![0xFE, 0xFF];
        for unit in text.encode_utf16() {
            bytes.extend_from_slice(&unit.to_be_bytes());
        }
        bytes
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::pdf::object::Parser;

    fn serialized(object: &Object) -> Vec<u8> {
        let mut out = Vec::new();
        serialize_object(object, &mut out);
        out
    }

    #[test]
    fn serialization_round_trips_through_parser() {
        let mut dict = Dictionary::new();
        dict.insert("Type".into(), Object::Name("Annot".into()));
        dict.insert("Rect".into(), Object::Array(vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(0),
        ]));
        dict.insert(
            "T".into(),
            Object::String(b"Firma1".to_vec()),
        );
        dict.insert(
            "V".into(),
            Object::Reference(ObjRef {
                number: 9,
                generation: 0,
            }),
        );
        let original = Object::Dictionary(dict);

        let bytes = serialized(&original);
        let reparsed = Parser::new(&bytes, 0).parse_object().unwrap();
        assert_eq!(reparsed, original);
    }

    #[test]
    fn string_escapes() {
        let object = Object::String(b"a(b)c\\d".to_vec());
        assert_eq!(serialized(&object), b"(a\\(b\\)c\\\\d)");
    }

    #[test]
    fn latin1_text_stays_single_byte() {
        assert_eq!(pdf_text_bytes("M\u{e9}xico"), b"M\xe9xico".to_vec());
    }

    #[test]
    fn non_latin1_text_is_utf16be() {
        let bytes = pdf_text_bytes("\u{2713}");
        assert_eq!(&bytes[..2], &[0xFE, 0xFF]);
        assert_eq!(&bytes[2..], &[0x27, 0x13]);
    }
}
