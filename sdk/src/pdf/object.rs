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

//! Minimal PDF object model and parser.
//!
//! Covers exactly what incremental signing needs: the object syntax, classic
//! cross-reference tables, cross-reference streams (FlateDecode, optional
//! PNG predictors), object streams, and an offset-reconstruction fallback
//! for files whose xref data is broken.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Read;

use super::PdfError;

/// A PDF dictionary. Ordered so serialization is deterministic.
pub(crate) type Dictionary = BTreeMap<String, Object>;

/// An indirect object reference (`N G R`).
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub(crate) struct ObjRef {
    pub number: u32,
    pub generation: u16,
}

/// A PDF object.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Object {
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    /// Literal string, escape sequences decoded.
    String(Vec<u8>),
    /// Hex string, decoded to bytes.
    HexString(Vec<u8>),
    Name(String),
    Array(Vec<Object>),
    Dictionary(Dictionary),
    Stream { dict: Dictionary, data: Vec<u8> },
    Reference(ObjRef),
}

impl Object {
    pub fn as_dict(&self) -> Option<&Dictionary> {
        match self {
            Object::Dictionary(dict) => Some(dict),
            Object::Stream { dict, .. } => Some(dict),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Object::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<ObjRef> {
        match self {
            Object::Reference(r) => Some(*r),
            _ => None,
        }
    }

    pub fn as_name(&self) -> Option<&str> {
        match self {
            Object::Name(name) => Some(name),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Object]> {
        match self {
            Object::Array(items) => Some(items),
            _ => None,
        }
    }

    /// String bytes from either string form.
    pub fn as_string_bytes(&self) -> Option<&[u8]> {
        match self {
            Object::String(bytes) | Object::HexString(bytes) => Some(bytes),
            _ => None,
        }
    }
}

fn is_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n' | b'\x0c' | b'\0')
}

fn is_delimiter(b: u8) -> bool {
    matches!(b, b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%')
}

fn is_regular(b: u8) -> bool {
    !is_whitespace(b) && !is_delimiter(b)
}

/// Tokenizing parser over a byte slice.
pub(crate) struct Parser<'a> {
    data: &'a [u8],
    pub pos: usize,
}

impl<'a> Parser<'a> {
    pub fn new(data: &'a [u8], pos: usize) -> Self {
        Self { data, pos }
    }

    fn err(&self, reason: impl Into<String>) -> PdfError {
        PdfError::Parse {
            offset: self.pos,
            reason: reason.into(),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    pub fn skip_whitespace(&mut self) {
        while let Some(b) = self.peek() {
            if is_whitespace(b) {
                self.pos += 1;
            } else if b == b'%' {
                while let Some(c) = self.peek() {
                    if c == b'\r' || c == b'\n' {
                        break;
                    }
                    self.pos += 1;
                }
            } else {
                break;
            }
        }
    }

    pub fn starts_with(&self, keyword: &[u8]) -> bool {
        self.data[self.pos..].starts_with(keyword)
    }

    pub fn expect_keyword(&mut self, keyword: &[u8]) -> Result<(), PdfError> {
        if self.starts_with(keyword) {
            self.pos += keyword.len();
            Ok(())
        } else {
            Err(self.err(format!(
                "expected keyword '{}'",
                String::from_utf8_lossy(keyword)
            )))
        }
    }

    /// Parse a bare unsigned integer (used in xref tables and object
    /// headers).
    pub fn parse_plain_integer(&mut self) -> Result<i64, PdfError> {
        let start = self.pos;
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.err("expected integer"));
        }
        std::str::from_utf8(&self.data[start..self.pos])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| self.err("integer out of range"))
    }

    fn parse_numeric(&mut self) -> Result<Object, PdfError> {
        let start = self.pos;
        if matches!(self.peek(), Some(b'+' | b'-')) {
            self.pos += 1;
        }
        let mut is_real = false;
        while let Some(b) = self.peek() {
            if b.is_ascii_digit() {
                self.pos += 1;
            } else if b == b'.' && !is_real {
                is_real = true;
                self.pos += 1;
            } else {
                break;
            }
        }

        let text = std::str::from_utf8(&self.data[start..self.pos])
            .map_err(|_| self.err("invalid number"))?;
        if text.is_empty() || text == "+" || text == "-" {
            return Err(self.err("expected number"));
        }

        if is_real {
            text.parse()
                .map(Object::Real)
                .map_err(|_| self.err("invalid real"))
        } else {
            text.parse()
                .map(Object::Integer)
                .map_err(|_| self.err("invalid integer"))
        }
    }

    fn parse_name(&mut self) -> Result<String, PdfError> {
        self.pos += 1; // '/'
        let mut name = String::new();
        while let Some(b) = self.peek() {
            if !is_regular(b) {
                break;
            }
            if b == b'#' {
                let hex = self
                    .data
                    .get(self.pos + 1..self.pos + 3)
                    .and_then(|h| std::str::from_utf8(h).ok())
                    .and_then(|h| u8::from_str_radix(h, 16).ok())
                    .ok_or_else(|| self.err("bad name escape"))?;
                name.push(hex as char);
                self.pos += 3;
            } else {
                name.push(b as char);
                self.pos += 1;
            }
        }
        Ok(name)
    }

    fn parse_literal_string(&mut self) -> Result<Vec<u8>, PdfError> {
        self.pos += 1; // '('
        let mut out = Vec::new();
        let mut depth = 1usize;

        while let Some(b) = self.peek() {
            self.pos += 1;
            match b {
                b'\\' => {
                    let Some(escaped) = self.peek() else {
                        return Err(self.err("unterminated string escape"));
                    };
                    self.pos += 1;
                    match escaped {
                        b'n' => out.push(b'\n'),
                        b'r' => out.push(b'\r'),
                        b't' => out.push(b'\t'),
                        b'b' => out.push(0x08),
                        b'f' => out.push(0x0c),
                        b'(' => out.push(b'('),
                        b')' => out.push(b')'),
                        b'\\' => out.push(b'\\'),
                        b'\r' => {
                            if self.peek() == Some(b'\n') {
                                self.pos += 1;
                            }
                        }
                        b'\n' => {}
                        b'0'..=b'7' => {
                            let mut value = (escaped - b'0') as u16;
                            for _ in 0..2 {
                                match self.peek() {
                                    Some(d @ b'0'..=b'7') => {
                                        value = value * 8 + (d - b'0') as u16;
                                        self.pos += 1;
                                    }
                                    _ => break,
                                }
                            }
                            out.push(value as u8);
                        }
                        other => out.push(other),
                    }
                }
                b'(' => {
                    depth += 1;
                    out.push(b'(');
                }
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(out);
                    }
                    out.push(b')');
                }
                other => out.push(other),
            }
        }

        Err(self.err("unterminated literal string"))
    }

    fn parse_hex_string(&mut self) -> Result<Vec<u8>, PdfError> {
        self.pos += 1; // '<'
        let mut digits = Vec::new();
        loop {
            match self.peek() {
                Some(b'>') => {
                    self.pos += 1;
                    break;
                }
                Some(b) if b.is_ascii_hexdigit() => {
                    digits.push(b);
                    self.pos += 1;
                }
                Some(b) if is_whitespace(b) => self.pos += 1,
                Some(_) => return Err(self.err("invalid hex string byte")),
                None => return Err(self.err("unterminated hex string")),
            }
        }

        if digits.len() % 2 == 1 {
            digits.push(b'0');
        }

        let mut out = Vec::with_capacity(digits.len() / 2);
        for pair in digits.chunks_exact(2) {
            let hi = (pair[0] as char).to_digit(16).unwrap_or(0) as u8;
            let lo = (pair[1] as char).to_digit(16).unwrap_or(0) as u8;
            out.push(hi << 4 | lo);
        }
        Ok(out)
    }

    pub fn parse_object(&mut self) -> Result<Object, PdfError> {
        self.skip_whitespace();
        let Some(b) = self.peek() else {
            return Err(self.err("unexpected end of data"));
        };

        match b {
            b'/' => Ok(Object::Name(self.parse_name()?)),
            b'(' => Ok(Object::String(self.parse_literal_string()?)),
            b'[' => {
                self.pos += 1;
                let mut items = Vec::new();
                loop {
                    self.skip_whitespace();
                    if self.peek() == Some(b']') {
                        self.pos += 1;
                        return Ok(Object::Array(items));
                    }
                    items.push(self.parse_object()?);
                }
            }
            b'<' => {
                if self.data.get(self.pos + 1) == Some(&b'<') {
                    self.pos += 2;
                    let mut dict = Dictionary::new();
                    loop {
                        self.skip_whitespace();
                        if self.starts_with(b">>") {
                            self.pos += 2;
                            return Ok(Object::Dictionary(dict));
                        }
                        if self.peek() != Some(b'/') {
                            return Err(self.err("expected name key in dictionary"));
                        }
                        let key = self.parse_name()?;
                        let value = self.parse_object()?;
                        dict.insert(key, value);
                    }
                } else {
                    Ok(Object::HexString(self.parse_hex_string()?))
                }
            }
            b't' => {
                self.expect_keyword(b"true")?;
                Ok(Object::Boolean(true))
            }
            b'f' => {
                self.expect_keyword(b"false")?;
                Ok(Object::Boolean(false))
            }
            b'n' => {
                self.expect_keyword(b"null")?;
                Ok(Object::Null)
            }
            _ => self.parse_number_or_reference(),
        }
    }

    fn parse_number_or_reference(&mut self) -> Result<Object, PdfError> {
        let first = self.parse_numeric()?;

        if let Object::Integer(number) = &first {
            let number = *number;
            if number >= 0 {
                let save = self.pos;
                self.skip_whitespace();

                let generation = self.parse_plain_integer();
                if let Ok(generation) = generation {
                    if generation <= u16::MAX as i64 {
                        self.skip_whitespace();
                        let next_is_regular = self
                            .data
                            .get(self.pos + 1)
                            .copied()
                            .map(is_regular)
                            .unwrap_or(false);
                        if self.peek() == Some(b'R') && !next_is_regular {
                            self.pos += 1;
                            return Ok(Object::Reference(ObjRef {
                                number: number as u32,
                                generation: generation as u16,
                            }));
                        }
                    }
                }
                self.pos = save;
            }
        }

        Ok(first)
    }
}

/// Parse the indirect object starting at `offset` (`N G obj ... endobj`).
///
/// `file` is used to resolve an indirect `/Length`; pass `None` when no
/// cross-reference data is available yet, in which case stream extents fall
/// back to scanning for `endstream`.
pub(crate) fn parse_indirect_at(
    data: &[u8],
    offset: usize,
    file: Option<&PdfFile<'_>>,
) -> Result<(ObjRef, Object), PdfError> {
    if offset >= data.len() {
        return Err(PdfError::Parse {
            offset,
            reason: "object offset beyond end of file".into(),
        });
    }

    let mut p = Parser::new(data, offset);
    p.skip_whitespace();
    let number = p.parse_plain_integer()? as u32;
    p.skip_whitespace();
    let generation = p.parse_plain_integer()? as u16;
    p.skip_whitespace();
    p.expect_keyword(b"obj")?;

    let mut object = p.parse_object()?;
    p.skip_whitespace();

    if p.starts_with(b"stream") {
        p.pos += b"stream".len();
        if p.peek() == Some(b'\r') {
            p.pos += 1;
        }
        if p.peek() == Some(b'\n') {
            p.pos += 1;
        }

        let dict = match object {
            Object::Dictionary(dict) => dict,
            _ => {
                return Err(PdfError::Parse {
                    offset: p.pos,
                    reason: "stream keyword without a dictionary".into(),
                })
            }
        };

        let declared_len = match dict.get("Length") {
            Some(Object::Integer(len)) if *len >= 0 => Some(*len as usize),
            Some(Object::Reference(r)) => file
                .and_then(|f| f.object(*r).ok())
                .and_then(|obj| obj.as_int())
                .map(|len| len as usize),
            _ => None,
        };

        let start = p.pos;
        let end = match declared_len {
            Some(len)
                if start + len <= data.len()
                    && ends_with_endstream(data, start + len) =>
            {
                start + len
            }
            _ => scan_for_endstream(data, start).ok_or(PdfError::Parse {
                offset: start,
                reason: "endstream not found".into(),
            })?,
        };

        let stream_data = data[start..end].to_vec();
        p.pos = end;
        p.skip_whitespace();
        p.expect_keyword(b"endstream")?;

        object = Object::Stream {
            dict,
            data: stream_data,
        };
    }

    Ok((
        ObjRef { number, generation },
        object,
    ))
}

fn ends_with_endstream(data: &[u8], mut pos: usize) -> bool {
    while pos < data.len() && is_whitespace(data[pos]) {
        pos += 1;
    }
    data[pos..].starts_with(b"endstream")
}

fn scan_for_endstream(data: &[u8], start: usize) -> Option<usize> {
    let idx = find(&data[start..], b"endstream")? + start;
    // Back off the EOL that precedes the keyword.
    let mut end = idx;
    if end > start && data[end - 1] == b'\n' {
        end -= 1;
    }
    if end > start && data[end - 1] == b'\r' {
        end -= 1;
    }
    Some(end)
}

pub(crate) fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

pub(crate) fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .rposition(|window| window == needle)
}

/// A parsed PDF file: raw bytes plus the object location tables and the
/// merged trailer of the newest-to-oldest cross-reference chain.
pub(crate) struct PdfFile<'a> {
    pub data: &'a [u8],
    offsets: HashMap<u32, usize>,
    compressed: HashMap<u32, (u32, usize)>,
    pub trailer: Dictionary,
    pub startxref: usize,
    pub uses_xref_stream: bool,
}

impl<'a> PdfFile<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Self, PdfError> {
        if !data.starts_with(b"%PDF-") {
            return Err(PdfError::InvalidHeader);
        }

        match Self::parse_via_xref(data) {
            Ok(file) if file.trailer.contains_key("Root") && !file.offsets.is_empty() => Ok(file),
            _ => Self::reconstruct(data),
        }
    }

    fn parse_via_xref(data: &'a [u8]) -> Result<Self, PdfError> {
        let startxref = Self::find_startxref(data)?;

        let mut file = Self {
            data,
            offsets: HashMap::new(),
            compressed: HashMap::new(),
            trailer: Dictionary::new(),
            startxref,
            uses_xref_stream: false,
        };

        let mut visited = HashSet::new();
        let mut next = Some(startxref);
        while let Some(pos) = next {
            if !visited.insert(pos) {
                break;
            }
            next = file.parse_xref_section(pos)?;
        }

        Ok(file)
    }

    fn find_startxref(data: &[u8]) -> Result<usize, PdfError> {
        let tail_start = data.len().saturating_sub(2048);
        let tail = &data[tail_start..];
        let idx = rfind(tail, b"startxref").ok_or(PdfError::Malformed(
            "startxref keyword not found".into(),
        ))?;

        let mut p = Parser::new(data, tail_start + idx + b"startxref".len());
        p.skip_whitespace();
        let offset = p.parse_plain_integer()? as usize;
        if offset >= data.len() {
            return Err(PdfError::Malformed("startxref beyond end of file".into()));
        }
        Ok(offset)
    }

    fn parse_xref_section(&mut self, pos: usize) -> Result<Option<usize>, PdfError> {
        let mut p = Parser::new(self.data, pos);
        p.skip_whitespace();

        if p.starts_with(b"xref") {
            p.pos += b"xref".len();

            loop {
                p.skip_whitespace();
                if p.starts_with(b"trailer") {
                    p.pos += b"trailer".len();
                    break;
                }

                let start = p.parse_plain_integer()?;
                p.skip_whitespace();
                let count = p.parse_plain_integer()?;

                for i in 0..count {
                    p.skip_whitespace();
                    let offset = p.parse_plain_integer()? as usize;
                    p.skip_whitespace();
                    let _generation = p.parse_plain_integer()?;
                    p.skip_whitespace();
                    let kind = p.peek().ok_or(PdfError::Malformed(
                        "truncated xref entry".into(),
                    ))?;
                    p.pos += 1;

                    let number = (start + i) as u32;
                    // Chain is walked newest-first; first seen wins.
                    if kind == b'n' {
                        self.offsets.entry(number).or_insert(offset);
                    }
                }
            }

            let trailer = p.parse_object()?;
            let Object::Dictionary(trailer) = trailer else {
                return Err(PdfError::Malformed("trailer is not a dictionary".into()));
            };

            // Hybrid-reference files park the full table in an xref stream.
            if let Some(Object::Integer(xref_stm)) = trailer.get("XRefStm") {
                let _ = self.parse_xref_section(*xref_stm as usize)?;
            }

            let prev = trailer.get("Prev").and_then(Object::as_int);
            for (key, value) in trailer {
                self.trailer.entry(key).or_insert(value);
            }

            Ok(prev.map(|offset| offset as usize))
        } else {
            self.uses_xref_stream = true;
            self.parse_xref_stream(pos)
        }
    }

    fn parse_xref_stream(&mut self, pos: usize) -> Result<Option<usize>, PdfError> {
        let (_, object) = parse_indirect_at(self.data, pos, None)?;
        let Object::Stream { dict, data } = object else {
            return Err(PdfError::Malformed(
                "cross-reference stream expected".into(),
            ));
        };

        let decoded = decode_stream(&dict, &data)?;

        let widths: Vec<usize> = dict
            .get("W")
            .and_then(Object::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Object::as_int)
                    .map(|w| w as usize)
                    .collect()
            })
            .ok_or(PdfError::Malformed("xref stream missing /W".into()))?;
        if widths.len() != 3 {
            return Err(PdfError::Malformed("xref stream /W must have 3 fields".into()));
        }

        let size = dict
            .get("Size")
            .and_then(Object::as_int)
            .ok_or(PdfError::Malformed("xref stream missing /Size".into()))?;

        let index: Vec<i64> = dict
            .get("Index")
            .and_then(Object::as_array)
            .map(|items| items.iter().filter_map(Object::as_int).collect())
            .unwrap_or_else(|| vec![0, size]);

        let row_len: usize = widths.iter().sum();
        if row_len == 0 {
            return Err(PdfError::Malformed("xref stream /W is all zero".into()));
        }

        let mut rows = decoded.chunks_exact(row_len);
        for run in index.chunks_exact(2) {
            let (start, count) = (run[0], run[1]);
            for i in 0..count {
                let Some(row) = rows.next() else {
                    return Err(PdfError::Malformed("xref stream data truncated".into()));
                };

                let mut cursor = 0usize;
                let mut field = |width: usize| -> u64 {
                    let mut value = 0u64;
                    for _ in 0..width {
                        value = value << 8 | row[cursor] as u64;
                        cursor += 1;
                    }
                    value
                };

                let entry_type = if widths[0] == 0 { 1 } else { field(widths[0]) };
                let f1 = field(widths[1]);
                let f2 = field(widths[2]);
                let number = (start + i) as u32;

                match entry_type {
                    1 => {
                        self.offsets.entry(number).or_insert(f1 as usize);
                    }
                    2 => {
                        self.compressed
                            .entry(number)
                            .or_insert((f1 as u32, f2 as usize));
                    }
                    _ => {}
                }
            }
        }

        for key in ["Root", "Info", "Size", "ID"] {
            if let Some(value) = dict.get(key) {
                self.trailer
                    .entry(key.to_string())
                    .or_insert_with(|| value.clone());
            }
        }

        Ok(dict
            .get("Prev")
            .and_then(Object::as_int)
            .map(|offset| offset as usize))
    }

    /// Rebuild object offsets by scanning for `N G obj` headers, for files
    /// whose cross-reference data is damaged or unsupported.
    fn reconstruct(data: &'a [u8]) -> Result<Self, PdfError> {
        let mut offsets = HashMap::new();

        let mut search = 0usize;
        while let Some(found) = find(&data[search..], b" obj") {
            let keyword_at = search + found + 1;
            search = keyword_at + 3;

            if let Some((number, start)) = backtrack_object_header(data, keyword_at) {
                // Scanning forward means later versions overwrite earlier
                // ones, which is the incremental-update precedence.
                offsets.insert(number, start);
            }
        }

        if offsets.is_empty() {
            return Err(PdfError::Malformed("no objects found".into()));
        }

        let mut trailer = Dictionary::new();
        if let Some(idx) = rfind(data, b"trailer") {
            let mut p = Parser::new(data, idx + b"trailer".len());
            if let Ok(Object::Dictionary(dict)) = p.parse_object() {
                trailer = dict;
            }
        }

        let uses_xref_stream = trailer.is_empty();
        let startxref = data.len();

        let mut file = Self {
            data,
            offsets,
            compressed: HashMap::new(),
            trailer,
            startxref,
            uses_xref_stream,
        };

        if !file.trailer.contains_key("Root") {
            let catalog = file
                .offsets
                .iter()
                .find_map(|(number, offset)| {
                    let (r, object) = parse_indirect_at(data, *offset, None).ok()?;
                    let dict = object.as_dict()?;
                    (dict.get("Type").and_then(Object::as_name) == Some("Catalog")
                        && r.number == *number)
                        .then_some(r)
                })
                .ok_or(PdfError::Malformed("document catalog not found".into()))?;
            file.trailer
                .insert("Root".to_string(), Object::Reference(catalog));
        }

        if !file.trailer.contains_key("Size") {
            file.trailer.insert(
                "Size".to_string(),
                Object::Integer(file.max_object_number() as i64 + 1),
            );
        }

        Ok(file)
    }

    pub fn max_object_number(&self) -> u32 {
        let by_offset = self.offsets.keys().copied().max().unwrap_or(0);
        let by_stream = self.compressed.keys().copied().max().unwrap_or(0);
        by_offset.max(by_stream)
    }

    /// Load an object by reference, transparently extracting it from an
    /// object stream when needed.
    pub fn object(&self, r: ObjRef) -> Result<Object, PdfError> {
        if let Some(offset) = self.offsets.get(&r.number) {
            let (found, object) = parse_indirect_at(self.data, *offset, Some(self))?;
            if found.number != r.number {
                return Err(PdfError::ObjectNotFound(r.number, r.generation));
            }
            return Ok(object);
        }

        if let Some((container, index)) = self.compressed.get(&r.number) {
            return self.object_from_stream(r, *container, *index);
        }

        Err(PdfError::ObjectNotFound(r.number, r.generation))
    }

    fn object_from_stream(
        &self,
        r: ObjRef,
        container: u32,
        index: usize,
    ) -> Result<Object, PdfError> {
        let stream = self.object(ObjRef {
            number: container,
            generation: 0,
        })?;
        let Object::Stream { dict, data } = stream else {
            return Err(PdfError::Malformed("object stream container is not a stream".into()));
        };

        let n = dict
            .get("N")
            .and_then(Object::as_int)
            .ok_or(PdfError::Malformed("object stream missing /N".into()))? as usize;
        let first = dict
            .get("First")
            .and_then(Object::as_int)
            .ok_or(PdfError::Malformed("object stream missing /First".into()))?
            as usize;

        let decoded = decode_stream(&dict, &data)?;
        let mut header = Parser::new(&decoded, 0);

        let mut entries = Vec::with_capacity(n);
        for _ in 0..n {
            header.skip_whitespace();
            let number = header.parse_plain_integer()? as u32;
            header.skip_whitespace();
            let offset = header.parse_plain_integer()? as usize;
            entries.push((number, offset));
        }

        let (_, offset) = entries
            .iter()
            .find(|(number, _)| *number == r.number)
            .copied()
            .or_else(|| entries.get(index).copied())
            .ok_or(PdfError::ObjectNotFound(r.number, r.generation))?;

        let mut p = Parser::new(&decoded, first + offset);
        p.parse_object()
    }

    /// Dereference until a non-reference object is reached.
    pub fn resolve(&self, object: Object) -> Result<Object, PdfError> {
        let mut current = object;
        for _ in 0..32 {
            match current {
                Object::Reference(r) => current = self.object(r)?,
                other => return Ok(other),
            }
        }
        Err(PdfError::Malformed("reference chain too deep".into()))
    }

    pub fn catalog(&self) -> Result<(ObjRef, Dictionary), PdfError> {
        let root = self
            .trailer
            .get("Root")
            .and_then(Object::as_reference)
            .ok_or(PdfError::Malformed("trailer has no /Root".into()))?;

        match self.object(root)? {
            Object::Dictionary(dict) => Ok((root, dict)),
            _ => Err(PdfError::Malformed("catalog is not a dictionary".into())),
        }
    }

    /// Walk the page tree down to the first leaf page.
    pub fn first_page(&self) -> Result<(ObjRef, Dictionary), PdfError> {
        let (_, catalog) = self.catalog()?;
        let mut node = catalog
            .get("Pages")
            .and_then(Object::as_reference)
            .ok_or(PdfError::Malformed("catalog has no /Pages".into()))?;

        for _ in 0..64 {
            let dict = match self.object(node)? {
                Object::Dictionary(dict) => dict,
                _ => return Err(PdfError::Malformed("page tree node is not a dictionary".into())),
            };

            match dict.get("Type").and_then(Object::as_name) {
                Some("Page") => return Ok((node, dict)),
                _ => {
                    let kids = dict
                        .get("Kids")
                        .and_then(Object::as_array)
                        .ok_or(PdfError::Malformed("page tree node has no /Kids".into()))?;
                    node = kids
                        .first()
                        .and_then(Object::as_reference)
                        .ok_or(PdfError::Malformed("empty /Kids array".into()))?;
                }
            }
        }

        Err(PdfError::Malformed("page tree too deep".into()))
    }
}

fn backtrack_object_header(data: &[u8], keyword_at: usize) -> Option<(u32, usize)> {
    let mut pos = keyword_at;

    // whitespace between the generation and the keyword
    let kw_ws_end = pos;
    while pos > 0 && is_whitespace(data[pos - 1]) {
        pos -= 1;
    }
    if pos == kw_ws_end {
        return None;
    }

    // generation digits
    let gen_end = pos;
    while pos > 0 && data[pos - 1].is_ascii_digit() {
        pos -= 1;
    }
    if pos == gen_end {
        return None;
    }

    // separating whitespace
    let ws_end = pos;
    while pos > 0 && is_whitespace(data[pos - 1]) {
        pos -= 1;
    }
    if pos == ws_end {
        return None;
    }

    // object number digits
    let num_end = pos;
    while pos > 0 && data[pos - 1].is_ascii_digit() {
        pos -= 1;
    }
    if pos == num_end {
        return None;
    }

    let number: u32 = std::str::from_utf8(&data[pos..num_end]).ok()?.parse().ok()?;
    Some((number, pos))
}

/// Decode a stream's data according to its `/Filter` entry.
///
/// Only `FlateDecode` (with optional PNG predictors) is implemented; that is
/// what cross-reference and object streams use in practice.
pub(crate) fn decode_stream(dict: &Dictionary, data: &[u8]) -> Result<Vec<u8>, PdfError> {
    let filters: Vec<String> = match dict.get("Filter") {
        None => return Ok(data.to_vec()),
        Some(Object::Name(name)) => vec![name.clone()],
        Some(Object::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_name().map(str::to_string))
            .collect(),
        Some(_) => return Err(PdfError::Malformed("invalid /Filter".into())),
    };

    let mut current = data.to_vec();
    for filter in filters {
        match filter.as_str() {
            "FlateDecode" => {
                let mut decoded = Vec::new();
                flate2::read::ZlibDecoder::new(current.as_slice())
                    .read_to_end(&mut decoded)
                    .map_err(|err| PdfError::Malformed(format!("flate decode failed: {err}")))?;
                current = decoded;
            }
            other => {
                return Err(PdfError::Unsupported(format!("stream filter {other}")));
            }
        }
    }

    if let Some(parms) = dict.get("DecodeParms").and_then(Object::as_dict) {
        let predictor = parms.get("Predictor").and_then(Object::as_int).unwrap_or(1);
        if predictor >= 10 {
            let columns = parms.get("Columns").and_then(Object::as_int).unwrap_or(1) as usize;
            let colors = parms.get("Colors").and_then(Object::as_int).unwrap_or(1) as usize;
            let bpc = parms
                .get("BitsPerComponent")
                .and_then(Object::as_int)
                .unwrap_or(8) as usize;
            let row_len = (columns * colors * bpc).div_ceil(8);
            current = apply_png_predictor(&current, row_len)?;
        }
    }

    Ok(current)
}

fn apply_png_predictor(data: &[u8], row_len: usize) -> Result<Vec<u8>, PdfError> {
    if row_len == 0 || data.len() % (row_len + 1) != 0 {
        return Err(PdfError::Malformed("predictor row size mismatch".into()));
    }

    let mut out: Vec<u8> = Vec::with_capacity(data.len() / (row_len + 1) * row_len);
    let mut previous = vec![0u8; row_len];

    for row in data.chunks_exact(row_len + 1) {
        let filter = row[0];
        let mut decoded = row[1..].to_vec();

        for i in 0..row_len {
            let left = if i > 0 { decoded[i - 1] } else { 0 };
            let up = previous[i];
            let up_left = if i > 0 { previous[i - 1] } else { 0 };

            decoded[i] = match filter {
                0 => decoded[i],
                1 => decoded[i].wrapping_add(left),
                2 => decoded[i].wrapping_add(up),
                3 => decoded[i].wrapping_add(((left as u16 + up as u16) / 2) as u8),
                4 => {
                    let p = left as i16 + up as i16 - up_left as i16;
                    let (pa, pb, pc) = (
                        (p - left as i16).abs(),
                        (p - up as i16).abs(),
                        (p - up_left as i16).abs(),
                    );
                    let paeth = if pa <= pb && pa <= pc {
                        left
                    } else if pb <= pc {
                        up
                    } else {
                        up_left
                    };
                    decoded[i].wrapping_add(paeth)
                }
                _ => {
                    return Err(PdfError::Malformed(format!(
                        "unsupported PNG predictor filter {filter}"
                    )))
                }
            };
        }

        previous.copy_from_slice(&decoded);
        out.extend_from_slice(&decoded);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn parse_one(input: &[u8]) -> Object {
        Parser::new(input, 0).parse_object().unwrap()
    }

    #[test]
    fn parses_scalars() {
        assert_eq!(parse_one(b"42"), Object::Integer(42));
        assert_eq!(parse_one(b"-3.5"), Object::Real(-3.5));
        assert_eq!(parse_one(b"true"), Object::Boolean(true));
        assert_eq!(parse_one(b"null"), Object::Null);
        assert_eq!(parse_one(b"/Name#20X"), Object::Name("Name X".into()));
    }

    #[test]
    fn parses_strings() {
        assert_eq!(
            parse_one(b"(Hola \\(mundo\\))"),
            Object::String(b"Hola (mundo)".to_vec())
        );
        assert_eq!(
            parse_one(b"(nested (parens) ok)"),
            Object::String(b"nested (parens) ok".to_vec())
        );
        assert_eq!(
            parse_one(b"<48656C 6C6F>"),
            Object::HexString(b"Hello".to_vec())
        );
        assert_eq!(parse_one(b"(\\101\\102)"), Object::String(b"AB".to_vec()));
    }

    #[test]
    fn parses_references_and_arrays() {
        assert_eq!(
            parse_one(b"[1 0 R 2 3.5 (x)]"),
            Object::Array(vec![
                Object::Reference(ObjRef {
                    number: 1,
                    generation: 0
                }),
                Object::Integer(2),
                Object::Real(3.5),
                Object::String(b"x".to_vec()),
            ])
        );

        // Two integers not followed by R stay integers.
        assert_eq!(
            parse_one(b"[1 2]"),
            Object::Array(vec![Object::Integer(1), Object::Integer(2)])
        );
    }

    #[test]
    fn parses_dictionaries() {
        let object = parse_one(b"<< /Type /Page /Count 2 /Kids [3 0 R] >>");
        let dict = object.as_dict().unwrap();
        assert_eq!(dict.get("Type").unwrap().as_name(), Some("Page"));
        assert_eq!(dict.get("Count").unwrap().as_int(), Some(2));
    }

    #[test]
    fn parses_minimal_file() {
        let data = std::fs::read(
            std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
                .join("tests/fixtures/minimal.pdf"),
        )
        .unwrap();

        let file = PdfFile::parse(&data).unwrap();
        assert!(!file.uses_xref_stream);

        let (_, catalog) = file.catalog().unwrap();
        assert_eq!(catalog.get("Type").unwrap().as_name(), Some("Catalog"));

        let (_, page) = file.first_page().unwrap();
        assert_eq!(page.get("Type").unwrap().as_name(), Some("Page"));
    }

    #[test]
    fn parses_xref_stream_file() {
        let data = std::fs::read(
            std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
                .join("tests/fixtures/xrefstream.pdf"),
        )
        .unwrap();

        let file = PdfFile::parse(&data).unwrap();
        let (_, page) = file.first_page().unwrap();
        assert_eq!(page.get("Type").unwrap().as_name(), Some("Page"));
    }

    #[test]
    fn reconstructs_broken_xref() {
        let mut data = std::fs::read(
            std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
                .join("tests/fixtures/minimal.pdf"),
        )
        .unwrap();

        // Corrupt the startxref offset.
        let idx = rfind(&data, b"startxref").unwrap();
        data[idx + 10] = b'9';
        data[idx + 11] = b'9';

        let file = PdfFile::parse(&data).unwrap();
        let (_, page) = file.first_page().unwrap();
        assert_eq!(page.get("Type").unwrap().as_name(), Some("Page"));
    }

    #[test]
    fn png_predictor_up_round_trip() {
        // Two rows of 3 bytes, filter 2 (Up).
        let encoded = [2u8, 1, 2, 3, 2, 1, 1, 1];
        let decoded = apply_png_predictor(&encoded, 3).unwrap();
        assert_eq!(decoded, vec![1, 2, 3, 2, 3, 4]);
    }
}
