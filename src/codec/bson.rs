//! BSON binary encoding and decoding.
//!
//! Layout: a 4-byte little-endian signed length prefix covering the whole
//! document (itself and the trailing terminator included), a sequence of
//! elements — 1-byte type tag, null-terminated key, type-specific payload —
//! and a single 0x00 terminator. Arrays reuse the document layout with
//! numeric-string keys "0", "1", ….
//!
//! Pure transformation: no I/O, no shared state.

use crate::codec::value::tag;
use crate::codec::{Binary, Decimal128, Document, ObjectId, Regex, Timestamp, Value};
use crate::error::{DocwireError, Result};

/// Smallest legal document: length prefix plus terminator.
const MIN_DOCUMENT_LEN: i32 = 5;

/// BSON codec for [`Document`] trees.
pub struct BsonCodec;

impl BsonCodec {
    /// Encode a document to its wire form.
    ///
    /// # Errors
    ///
    /// Returns `MalformedDocument` if a key or cstring payload contains an
    /// interior NUL byte.
    pub fn encode(doc: &Document) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(128);
        write_document(&mut buf, doc)?;
        Ok(buf)
    }

    /// Decode one document starting at `offset`.
    ///
    /// Returns the document and the number of bytes consumed. The declared
    /// length must equal the bytes actually consumed.
    pub fn decode(bytes: &[u8], offset: usize) -> Result<(Document, usize)> {
        let mut cursor = Cursor {
            buf: bytes,
            pos: offset,
        };
        let doc = read_document(&mut cursor)?;
        Ok((doc, cursor.pos - offset))
    }
}

fn write_document(buf: &mut Vec<u8>, doc: &Document) -> Result<()> {
    let start = buf.len();
    buf.extend_from_slice(&[0u8; 4]);
    for (key, value) in doc.iter() {
        buf.push(value.element_type());
        write_cstring(buf, key)?;
        write_value(buf, value)?;
    }
    buf.push(0);
    patch_length(buf, start);
    Ok(())
}

fn write_value(buf: &mut Vec<u8>, value: &Value) -> Result<()> {
    match value {
        Value::Double(v) => buf.extend_from_slice(&v.to_le_bytes()),
        Value::String(v) => write_string(buf, v),
        Value::Document(v) => write_document(buf, v)?,
        Value::Array(items) => {
            let start = buf.len();
            buf.extend_from_slice(&[0u8; 4]);
            for (index, item) in items.iter().enumerate() {
                buf.push(item.element_type());
                write_cstring(buf, &index.to_string())?;
                write_value(buf, item)?;
            }
            buf.push(0);
            patch_length(buf, start);
        }
        Value::Binary(Binary { subtype, bytes }) => {
            buf.extend_from_slice(&(bytes.len() as i32).to_le_bytes());
            buf.push(*subtype);
            buf.extend_from_slice(bytes);
        }
        Value::ObjectId(oid) => buf.extend_from_slice(oid.bytes()),
        Value::Boolean(v) => buf.push(u8::from(*v)),
        Value::DateTime(millis) => buf.extend_from_slice(&millis.to_le_bytes()),
        Value::Null | Value::MinKey | Value::MaxKey => {}
        Value::Regex(Regex { pattern, options }) => {
            write_cstring(buf, pattern)?;
            write_cstring(buf, options)?;
        }
        Value::Int32(v) => buf.extend_from_slice(&v.to_le_bytes()),
        Value::Timestamp(Timestamp { time, increment }) => {
            buf.extend_from_slice(&increment.to_le_bytes());
            buf.extend_from_slice(&time.to_le_bytes());
        }
        Value::Int64(v) => buf.extend_from_slice(&v.to_le_bytes()),
        Value::Decimal128(v) => buf.extend_from_slice(&v.bytes()),
    }
    Ok(())
}

fn write_cstring(buf: &mut Vec<u8>, s: &str) -> Result<()> {
    if s.as_bytes().contains(&0) {
        return Err(DocwireError::MalformedDocument(format!(
            "cstring contains interior NUL: {s:?}"
        )));
    }
    buf.extend_from_slice(s.as_bytes());
    buf.push(0);
    Ok(())
}

fn write_string(buf: &mut Vec<u8>, s: &str) {
    // Length counts the payload plus its terminator; the string itself may
    // contain NUL bytes.
    buf.extend_from_slice(&((s.len() + 1) as i32).to_le_bytes());
    buf.extend_from_slice(s.as_bytes());
    buf.push(0);
}

/// Backpatch the 4-byte length prefix at `start` now that the end is known.
fn patch_length(buf: &mut [u8], start: usize) {
    let len = (buf.len() - start) as i32;
    buf[start..start + 4].copy_from_slice(&len.to_le_bytes());
}

/// Bounds-checked reader over the input slice.
struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(n).filter(|&end| end <= self.buf.len());
        match end {
            Some(end) => {
                let slice = &self.buf[self.pos..end];
                self.pos = end;
                Ok(slice)
            }
            None => Err(DocwireError::MalformedDocument(format!(
                "{what} runs past the end of the buffer"
            ))),
        }
    }

    fn u8(&mut self, what: &str) -> Result<u8> {
        Ok(self.take(1, what)?[0])
    }

    fn i32_le(&mut self, what: &str) -> Result<i32> {
        let bytes = self.take(4, what)?;
        Ok(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn u32_le(&mut self, what: &str) -> Result<u32> {
        let bytes = self.take(4, what)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn i64_le(&mut self, what: &str) -> Result<i64> {
        let bytes = self.take(8, what)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(i64::from_le_bytes(raw))
    }

    fn f64_le(&mut self, what: &str) -> Result<f64> {
        let bytes = self.take(8, what)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(f64::from_le_bytes(raw))
    }

    fn cstring(&mut self, what: &str) -> Result<&'a str> {
        let rest = &self.buf[self.pos..];
        let nul = rest.iter().position(|&b| b == 0).ok_or_else(|| {
            DocwireError::MalformedDocument(format!("{what} is missing its terminator"))
        })?;
        let s = std::str::from_utf8(&rest[..nul])
            .map_err(|_| DocwireError::MalformedDocument(format!("{what} is not valid UTF-8")))?;
        self.pos += nul + 1;
        Ok(s)
    }
}

fn read_document(cursor: &mut Cursor<'_>) -> Result<Document> {
    let start = cursor.pos;
    let declared = cursor.i32_le("document length")?;
    if declared < MIN_DOCUMENT_LEN {
        return Err(DocwireError::MalformedDocument(format!(
            "document length {declared} is below the minimum of {MIN_DOCUMENT_LEN}"
        )));
    }
    let end = start + declared as usize;
    if end > cursor.buf.len() {
        return Err(DocwireError::MalformedDocument(format!(
            "document length {declared} runs past the end of the buffer"
        )));
    }

    let mut doc = Document::new();
    loop {
        let tag_byte = cursor.u8("element tag")?;
        if tag_byte == 0 {
            break;
        }
        let key = cursor.cstring("element key")?.to_string();
        let value = read_value(cursor, tag_byte)?;
        doc.push_entry(key, value);
        if cursor.pos >= end {
            return Err(DocwireError::MalformedDocument(
                "element list runs past the declared document end".to_string(),
            ));
        }
    }

    let consumed = cursor.pos - start;
    if consumed != declared as usize {
        return Err(DocwireError::MalformedDocument(format!(
            "declared length {declared} does not match bytes consumed {consumed}"
        )));
    }
    Ok(doc)
}

fn read_value(cursor: &mut Cursor<'_>, tag_byte: u8) -> Result<Value> {
    let value = match tag_byte {
        tag::DOUBLE => Value::Double(cursor.f64_le("double")?),
        tag::STRING => Value::String(read_string(cursor)?),
        tag::DOCUMENT => Value::Document(read_document(cursor)?),
        tag::ARRAY => {
            // Array keys are "0", "1", …; only the values matter.
            let doc = read_document(cursor)?;
            Value::Array(doc.into_iter().map(|(_, v)| v).collect())
        }
        tag::BINARY => {
            let len = cursor.i32_le("binary length")?;
            if len < 0 {
                return Err(DocwireError::MalformedDocument(format!(
                    "negative binary length {len}"
                )));
            }
            let subtype = cursor.u8("binary subtype")?;
            let bytes = cursor.take(len as usize, "binary payload")?.to_vec();
            Value::Binary(Binary { subtype, bytes })
        }
        tag::OBJECT_ID => {
            let bytes = cursor.take(12, "object id")?;
            let mut raw = [0u8; 12];
            raw.copy_from_slice(bytes);
            Value::ObjectId(ObjectId::from_bytes(raw))
        }
        tag::BOOLEAN => match cursor.u8("boolean")? {
            0 => Value::Boolean(false),
            1 => Value::Boolean(true),
            other => {
                return Err(DocwireError::MalformedDocument(format!(
                    "invalid boolean byte {other:#04x}"
                )))
            }
        },
        tag::DATETIME => Value::DateTime(cursor.i64_le("datetime")?),
        tag::NULL => Value::Null,
        tag::REGEX => {
            let pattern = cursor.cstring("regex pattern")?.to_string();
            let options = cursor.cstring("regex options")?.to_string();
            Value::Regex(Regex { pattern, options })
        }
        tag::INT32 => Value::Int32(cursor.i32_le("int32")?),
        tag::TIMESTAMP => {
            let increment = cursor.u32_le("timestamp increment")?;
            let time = cursor.u32_le("timestamp time")?;
            Value::Timestamp(Timestamp { time, increment })
        }
        tag::INT64 => Value::Int64(cursor.i64_le("int64")?),
        tag::DECIMAL128 => {
            let bytes = cursor.take(16, "decimal128")?;
            let mut raw = [0u8; 16];
            raw.copy_from_slice(bytes);
            Value::Decimal128(Decimal128::from_bytes(raw))
        }
        tag::MIN_KEY => Value::MinKey,
        tag::MAX_KEY => Value::MaxKey,
        other => {
            return Err(DocwireError::MalformedDocument(format!(
                "unrecognized type tag {other:#04x}"
            )))
        }
    };
    Ok(value)
}

fn read_string(cursor: &mut Cursor<'_>) -> Result<String> {
    let len = cursor.i32_le("string length")?;
    if len < 1 {
        return Err(DocwireError::MalformedDocument(format!(
            "string length {len} must be positive"
        )));
    }
    let bytes = cursor.take(len as usize, "string payload")?;
    let (payload, terminator) = bytes.split_at(len as usize - 1);
    if terminator != [0] {
        return Err(DocwireError::MalformedDocument(
            "string payload is missing its terminator".to_string(),
        ));
    }
    String::from_utf8(payload.to_vec())
        .map_err(|_| DocwireError::MalformedDocument("string payload is not valid UTF-8".to_string()))
}
