//! Message building and parsing.
//!
//! A message is: header, 4-byte flag field, one or more sections, and an
//! optional trailing CRC-32C checksum. Building backpatches the header
//! length once the total size is known; parsing works on a complete frame
//! (see [`MessageBuffer`](super::MessageBuffer) for reassembly).

use crate::codec::{BsonCodec, Document};
use crate::error::{DocwireError, Result};

use super::wire_format::{checksum, flags, MsgHeader, HEADER_SIZE, OP_MSG};

/// One payload section of a wire message.
#[derive(Debug, Clone, PartialEq)]
pub enum Section {
    /// Kind 0: the command body, exactly one document.
    Body(Document),
    /// Kind 1: an identified ordered sequence of documents, used for bulk
    /// payloads (e.g. the `documents` array of an insert).
    DocumentSequence {
        identifier: String,
        documents: Vec<Document>,
    },
}

impl Section {
    pub const KIND_BODY: u8 = 0;
    pub const KIND_DOCUMENT_SEQUENCE: u8 = 1;

    /// Wire kind byte for this section.
    pub fn kind(&self) -> u8 {
        match self {
            Section::Body(_) => Self::KIND_BODY,
            Section::DocumentSequence { .. } => Self::KIND_DOCUMENT_SEQUENCE,
        }
    }
}

/// A fully parsed wire message.
#[derive(Debug, Clone, PartialEq)]
pub struct WireMessage {
    pub header: MsgHeader,
    pub flag_bits: u32,
    pub sections: Vec<Section>,
    /// Verified checksum value, when the message carried one.
    pub checksum: Option<u32>,
}

impl WireMessage {
    /// The first kind-0 section, if any.
    pub fn body(&self) -> Option<&Document> {
        self.sections.iter().find_map(|section| match section {
            Section::Body(doc) => Some(doc),
            Section::DocumentSequence { .. } => None,
        })
    }
}

/// Encode a request message. `response_to` is always 0 on requests.
pub fn build_message(flag_bits: u32, sections: &[Section], request_id: i32) -> Result<Vec<u8>> {
    encode_message(flag_bits, sections, request_id, 0)
}

/// Encode a reply message. Used by test harnesses standing in for a server.
pub fn build_reply(
    flag_bits: u32,
    sections: &[Section],
    request_id: i32,
    response_to: i32,
) -> Result<Vec<u8>> {
    encode_message(flag_bits, sections, request_id, response_to)
}

fn encode_message(
    flag_bits: u32,
    sections: &[Section],
    request_id: i32,
    response_to: i32,
) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(256);
    // Length placeholder; backpatched below.
    buf.extend_from_slice(&MsgHeader::new(0, request_id, response_to, OP_MSG).encode());
    buf.extend_from_slice(&flag_bits.to_le_bytes());

    for section in sections {
        buf.push(section.kind());
        match section {
            Section::Body(doc) => {
                buf.extend_from_slice(&BsonCodec::encode(doc)?);
            }
            Section::DocumentSequence {
                identifier,
                documents,
            } => {
                if identifier.as_bytes().contains(&0) {
                    return Err(DocwireError::Protocol(format!(
                        "section identifier contains interior NUL: {identifier:?}"
                    )));
                }
                // The section size covers the size field itself, the
                // identifier, and the documents.
                let size_at = buf.len();
                buf.extend_from_slice(&[0u8; 4]);
                buf.extend_from_slice(identifier.as_bytes());
                buf.push(0);
                for doc in documents {
                    buf.extend_from_slice(&BsonCodec::encode(doc)?);
                }
                let size = (buf.len() - size_at) as i32;
                buf[size_at..size_at + 4].copy_from_slice(&size.to_le_bytes());
            }
        }
    }

    let with_checksum = flags::has_flag(flag_bits, flags::CHECKSUM_PRESENT);
    let total = buf.len() + if with_checksum { 4 } else { 0 };
    buf[0..4].copy_from_slice(&(total as i32).to_le_bytes());
    if with_checksum {
        let sum = checksum(&buf);
        buf.extend_from_slice(&sum.to_le_bytes());
    }
    Ok(buf)
}

/// Parse one complete frame into a [`WireMessage`].
///
/// The frame must be exactly one message; the declared header length has to
/// match the slice length. Validates the operation code, the required flag
/// bits, and the checksum when present.
pub fn parse_message(bytes: &[u8]) -> Result<WireMessage> {
    let header = MsgHeader::decode(bytes)
        .ok_or_else(|| DocwireError::Protocol("message shorter than its header".to_string()))?;
    if header.op_code != OP_MSG {
        return Err(DocwireError::Protocol(format!(
            "unexpected operation code {} (expected {})",
            header.op_code, OP_MSG
        )));
    }
    if header.message_length as i64 != bytes.len() as i64 {
        return Err(DocwireError::Protocol(format!(
            "declared length {} does not match frame size {}",
            header.message_length,
            bytes.len()
        )));
    }

    let mut pos = HEADER_SIZE;
    if bytes.len() < pos + 4 {
        return Err(DocwireError::Protocol(
            "message too short for its flag field".to_string(),
        ));
    }
    let flag_bits = u32::from_le_bytes([bytes[pos], bytes[pos + 1], bytes[pos + 2], bytes[pos + 3]]);
    pos += 4;

    let unknown = flags::unknown_required(flag_bits);
    if unknown != 0 {
        return Err(DocwireError::Protocol(format!(
            "unrecognized required flag bits {unknown:#010x}"
        )));
    }

    let mut body_end = bytes.len();
    let mut verified_checksum = None;
    if flags::has_flag(flag_bits, flags::CHECKSUM_PRESENT) {
        if body_end < pos + 4 {
            return Err(DocwireError::Protocol(
                "message too short for its checksum".to_string(),
            ));
        }
        body_end -= 4;
        let declared = u32::from_le_bytes([
            bytes[body_end],
            bytes[body_end + 1],
            bytes[body_end + 2],
            bytes[body_end + 3],
        ]);
        let computed = checksum(&bytes[..body_end]);
        if declared != computed {
            return Err(DocwireError::Protocol(format!(
                "checksum mismatch: declared {declared:#010x}, computed {computed:#010x}"
            )));
        }
        verified_checksum = Some(declared);
    }

    let mut sections = Vec::new();
    while pos < body_end {
        let kind = bytes[pos];
        pos += 1;
        match kind {
            Section::KIND_BODY => {
                let (doc, used) = BsonCodec::decode(&bytes[..body_end], pos)?;
                pos += used;
                sections.push(Section::Body(doc));
            }
            Section::KIND_DOCUMENT_SEQUENCE => {
                if body_end - pos < 4 {
                    return Err(DocwireError::Protocol(
                        "document sequence section truncated".to_string(),
                    ));
                }
                let size = i32::from_le_bytes([
                    bytes[pos],
                    bytes[pos + 1],
                    bytes[pos + 2],
                    bytes[pos + 3],
                ]);
                if size < 5 || pos + size as usize > body_end {
                    return Err(DocwireError::Protocol(format!(
                        "document sequence size {size} is out of bounds"
                    )));
                }
                let end = pos + size as usize;
                let ident_start = pos + 4;
                let nul = bytes[ident_start..end]
                    .iter()
                    .position(|&b| b == 0)
                    .ok_or_else(|| {
                        DocwireError::Protocol(
                            "section identifier is missing its terminator".to_string(),
                        )
                    })?;
                let identifier = std::str::from_utf8(&bytes[ident_start..ident_start + nul])
                    .map_err(|_| {
                        DocwireError::Protocol("section identifier is not valid UTF-8".to_string())
                    })?
                    .to_string();

                let mut doc_pos = ident_start + nul + 1;
                let mut documents = Vec::new();
                while doc_pos < end {
                    let (doc, used) = BsonCodec::decode(&bytes[..end], doc_pos)?;
                    doc_pos += used;
                    documents.push(doc);
                }
                pos = end;
                sections.push(Section::DocumentSequence {
                    identifier,
                    documents,
                });
            }
            other => {
                return Err(DocwireError::Protocol(format!(
                    "unknown section kind {other}"
                )));
            }
        }
    }

    Ok(WireMessage {
        header,
        flag_bits,
        sections,
        checksum: verified_checksum,
    })
}
