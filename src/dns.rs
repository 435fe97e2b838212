//! DNS message parsing and construction.
//!
//! Only the pieces the filter and the authoritative responder need are
//! decoded: the header, the first question and the owner names of the
//! answer section. Every length read from the wire is checked against the
//! buffer before it is used.

use std::borrow::Cow;
use std::net::Ipv4Addr;

use thiserror::Error;

pub const HEADER_LEN: usize = 12;

/// RFC 1035 limit on the wire length of a name.
const MAX_NAME_LEN: usize = 255;
const MAX_POINTER_HOPS: usize = 16;
const ANSWER_TTL: u32 = 3600;

pub const TYPE_A: u16 = 1;
pub const CLASS_IN: u16 = 1;

const FLAG_QR: u16 = 0x8000;
const FLAGS_QUERY: u16 = 0x0100; // Standard query, recursion desired
const FLAGS_RESPONSE: u16 = 0x8180; // Standard response, no error
const FLAGS_NXDOMAIN: u16 = 0x8183;

/// Reasons a DNS message could not be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("message truncated at offset {offset}")]
    Truncated { offset: usize },

    #[error("message carries no question")]
    NoQuestion,

    #[error("unsupported label type 0x{byte:02x} at offset {offset}")]
    UnsupportedLabel { byte: u8, offset: usize },

    #[error("non-ASCII label at offset {offset}")]
    InvalidLabel { offset: usize },

    #[error("invalid compression pointer at offset {offset}")]
    BadPointer { offset: usize },

    #[error("name exceeds 255 octets")]
    NameTooLong,
}

/// A parsed DNS query (first question only).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsQuery {
    pub id: u16,
    pub flags: u16,
    /// Dotted name without the trailing dot; the root name is empty.
    pub name: String,
    pub qtype: u16,
    pub qclass: u16,
    /// Offset of the first byte after the question.
    pub question_end: usize,
}

impl DnsQuery {
    /// Parse the header and first question of a DNS message.
    ///
    /// Compression pointers are rejected in the question name: a query
    /// has nothing earlier in the message to point at.
    pub fn parse(data: &[u8]) -> Result<Self, DecodeError> {
        let id = read_u16(data, 0)?;
        let flags = read_u16(data, 2)?;
        let qdcount = read_u16(data, 4)?;
        if data.len() < HEADER_LEN {
            return Err(DecodeError::Truncated { offset: data.len() });
        }
        if qdcount == 0 {
            return Err(DecodeError::NoQuestion);
        }

        let (name, pos) = read_name(data, HEADER_LEN, false)?;
        let qtype = read_u16(data, pos)?;
        let qclass = read_u16(data, pos + 2)?;

        Ok(Self {
            id,
            flags,
            name,
            qtype,
            qclass,
            question_end: pos + 4,
        })
    }

    /// Whether the QR bit marks this message as a response.
    pub fn is_response(&self) -> bool {
        self.flags & FLAG_QR != 0
    }

    /// The raw question section of `message`, the buffer this query was parsed from.
    pub fn question_bytes<'a>(&self, message: &'a [u8]) -> &'a [u8] {
        message.get(HEADER_LEN..self.question_end).unwrap_or(&[])
    }
}

/// Read the header flags without decoding anything else.
pub fn peek_flags(data: &[u8]) -> Option<u16> {
    if data.len() < HEADER_LEN {
        return None;
    }
    Some(u16::from_be_bytes([data[2], data[3]]))
}

/// Whether the flags word carries the QR (response) bit.
pub fn is_response_flags(flags: u16) -> bool {
    flags & FLAG_QR != 0
}

/// An answer-section resource record, reduced to its owner name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsAnswerRecord {
    pub name: String,
}

/// Offset of the answer section, found by walking the question section's
/// layout only.
///
/// Label contents are not inspected, so a question that `DnsQuery::parse`
/// would reject still yields the answers behind it. Only a question that
/// runs past the buffer (or uses a reserved label type) is an error.
pub fn answers_start(data: &[u8]) -> Result<usize, DecodeError> {
    let qdcount = read_u16(data, 4)?;
    if data.len() < HEADER_LEN {
        return Err(DecodeError::Truncated { offset: data.len() });
    }

    let mut pos = HEADER_LEN;
    for _ in 0..qdcount {
        pos = skip_name(data, pos)? + 4;
        if pos > data.len() {
            return Err(DecodeError::Truncated { offset: data.len() });
        }
    }
    Ok(pos)
}

/// Offset just past the name at `pos`, without decoding it.
fn skip_name(data: &[u8], mut pos: usize) -> Result<usize, DecodeError> {
    loop {
        let len = *data.get(pos).ok_or(DecodeError::Truncated { offset: pos })?;
        match len & 0xC0 {
            0x00 if len == 0 => return Ok(pos + 1),
            0x00 => pos += 1 + len as usize,
            0xC0 => return Ok(pos + 2),
            _ => return Err(DecodeError::UnsupportedLabel { byte: len, offset: pos }),
        }
    }
}

/// Lazily decode the owner names of the answer section.
///
/// `question_end` is the offset where the answer section starts. The
/// iterator yields at most ANCOUNT records and stops quietly at the first
/// malformed one. Compression pointers are followed.
pub fn decode_answers(data: &[u8], question_end: usize) -> Answers<'_> {
    let remaining = read_u16(data, 6).unwrap_or(0);
    Answers {
        data,
        pos: question_end,
        remaining,
    }
}

/// Iterator returned by [`decode_answers`].
pub struct Answers<'a> {
    data: &'a [u8],
    pos: usize,
    remaining: u16,
}

impl Iterator for Answers<'_> {
    type Item = DnsAnswerRecord;

    fn next(&mut self) -> Option<DnsAnswerRecord> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        match skip_record(self.data, self.pos) {
            Ok((name, next)) => {
                self.pos = next;
                Some(DnsAnswerRecord { name })
            }
            Err(_) => {
                self.remaining = 0;
                None
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining as usize))
    }
}

/// Read one resource record's owner name and return the offset past its rdata.
fn skip_record(data: &[u8], pos: usize) -> Result<(String, usize), DecodeError> {
    let (name, pos) = read_name(data, pos, true)?;
    // TYPE (2) + CLASS (2) + TTL (4), then RDLENGTH
    let rdlength = read_u16(data, pos + 8)? as usize;
    let end = pos + 10 + rdlength;
    if end > data.len() {
        return Err(DecodeError::Truncated { offset: data.len() });
    }
    Ok((name, end))
}

/// Decode a name starting at `start`, returning it with the offset just past
/// its encoding in the message.
///
/// Pointers must point strictly backwards and are limited in number, so a
/// crafted message cannot make this loop forever.
fn read_name(
    data: &[u8],
    start: usize,
    follow_pointers: bool,
) -> Result<(String, usize), DecodeError> {
    let mut name = String::new();
    let mut pos = start;
    let mut end = None;
    let mut hops = 0;

    loop {
        let len = *data.get(pos).ok_or(DecodeError::Truncated { offset: pos })?;

        match len & 0xC0 {
            0x00 if len == 0 => return Ok((name, end.unwrap_or(pos + 1))),
            0x00 => {
                let label_start = pos + 1;
                let label_end = label_start + len as usize;
                let label = data
                    .get(label_start..label_end)
                    .ok_or(DecodeError::Truncated { offset: data.len() })?;
                push_label(&mut name, label, label_start)?;
                pos = label_end;
            }
            0xC0 if follow_pointers => {
                let low = *data.get(pos + 1).ok_or(DecodeError::Truncated { offset: pos + 1 })?;
                let target = ((len as usize & 0x3F) << 8) | low as usize;
                hops += 1;
                if hops > MAX_POINTER_HOPS || target >= pos {
                    return Err(DecodeError::BadPointer { offset: pos });
                }
                end.get_or_insert(pos + 2);
                pos = target;
            }
            _ => return Err(DecodeError::UnsupportedLabel { byte: len, offset: pos }),
        }
    }
}

fn push_label(name: &mut String, label: &[u8], offset: usize) -> Result<(), DecodeError> {
    if !label.is_ascii() {
        return Err(DecodeError::InvalidLabel { offset });
    }
    // Each dot stands in for the next label's length octet, so the wire
    // length is the dotted length plus the first length octet and the root.
    let dotted = if name.is_empty() {
        label.len()
    } else {
        name.len() + 1 + label.len()
    };
    if dotted + 2 > MAX_NAME_LEN {
        return Err(DecodeError::NameTooLong);
    }
    if !name.is_empty() {
        name.push('.');
    }
    name.extend(label.iter().map(|&b| b as char));
    Ok(())
}

fn read_u16(data: &[u8], pos: usize) -> Result<u16, DecodeError> {
    match data.get(pos..pos + 2) {
        Some(bytes) => Ok(u16::from_be_bytes([bytes[0], bytes[1]])),
        None => Err(DecodeError::Truncated { offset: data.len() }),
    }
}

/// A DNS response echoing a single question.
#[derive(Debug, Clone)]
pub struct DnsResponse<'a> {
    pub id: u16,
    pub flags: u16,
    /// Raw question section, copied verbatim into the response.
    pub question: &'a [u8],
    pub answers: Vec<DnsRecord>,
}

/// A resource record owned by the question name.
#[derive(Debug, Clone)]
pub struct DnsRecord {
    pub rtype: u16,
    pub class: u16,
    pub ttl: u32,
    pub rdata: Vec<u8>,
}

impl<'a> DnsResponse<'a> {
    /// An authoritative-style answer mapping the question name to `ip`.
    pub fn address(id: u16, question: &'a [u8], ip: Ipv4Addr) -> Self {
        Self {
            id,
            flags: FLAGS_RESPONSE,
            question,
            answers: vec![DnsRecord {
                rtype: TYPE_A,
                class: CLASS_IN,
                ttl: ANSWER_TTL,
                rdata: ip.octets().to_vec(),
            }],
        }
    }

    /// A name error response with no answers.
    pub fn nxdomain(id: u16, question: &'a [u8]) -> Self {
        Self {
            id,
            flags: FLAGS_NXDOMAIN,
            question,
            answers: Vec::new(),
        }
    }

    /// Encode the response to wire format bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(HEADER_LEN + self.question.len() + 16 * self.answers.len());

        write_header(&mut data, self.id, self.flags, 1, self.answers.len() as u16);
        data.extend_from_slice(self.question);

        for a in &self.answers {
            data.extend_from_slice(&[0xC0, 0x0C]); // Pointer to the question name
            data.extend_from_slice(&a.rtype.to_be_bytes());
            data.extend_from_slice(&a.class.to_be_bytes());
            data.extend_from_slice(&a.ttl.to_be_bytes());
            data.extend_from_slice(&(a.rdata.len() as u16).to_be_bytes());
            data.extend_from_slice(&a.rdata);
        }

        data
    }
}

/// Encode a single A/IN answer for the echoed question.
pub fn encode_response(id: u16, question: &[u8], ip: Ipv4Addr) -> Vec<u8> {
    DnsResponse::address(id, question, ip).to_bytes()
}

/// Encode an NXDOMAIN response for the echoed question.
pub fn encode_nxdomain(id: u16, question: &[u8]) -> Vec<u8> {
    DnsResponse::nxdomain(id, question).to_bytes()
}

/// Encode a standard recursive query for `name`.
///
/// A trailing dot is accepted and ignored. Labels longer than 63 bytes are
/// not representable and must not be passed.
pub fn encode_query(id: u16, name: &str, qtype: u16, qclass: u16) -> Vec<u8> {
    let mut data = Vec::with_capacity(HEADER_LEN + name.len() + 6);
    write_header(&mut data, id, FLAGS_QUERY, 1, 0);
    encode_name(&mut data, name);
    data.extend_from_slice(&qtype.to_be_bytes());
    data.extend_from_slice(&qclass.to_be_bytes());
    data
}

fn write_header(data: &mut Vec<u8>, id: u16, flags: u16, qdcount: u16, ancount: u16) {
    data.extend_from_slice(&id.to_be_bytes());
    data.extend_from_slice(&flags.to_be_bytes());
    data.extend_from_slice(&qdcount.to_be_bytes());
    data.extend_from_slice(&ancount.to_be_bytes());
    data.extend_from_slice(&[0x00, 0x00]); // NSCOUNT
    data.extend_from_slice(&[0x00, 0x00]); // ARCOUNT
}

fn encode_name(buf: &mut Vec<u8>, name: &str) {
    for label in name.split('.').filter(|label| !label.is_empty()) {
        buf.push(label.len() as u8);
        buf.extend_from_slice(label.as_bytes());
    }
    buf.push(0);
}

/// Canonical mnemonic for a query type, if it has a common one.
pub fn type_name(qtype: u16) -> Option<&'static str> {
    let name = match qtype {
        1 => "A",
        2 => "NS",
        5 => "CNAME",
        6 => "SOA",
        12 => "PTR",
        15 => "MX",
        16 => "TXT",
        28 => "AAAA",
        33 => "SRV",
        35 => "NAPTR",
        43 => "DS",
        46 => "RRSIG",
        48 => "DNSKEY",
        64 => "SVCB",
        65 => "HTTPS",
        255 => "ANY",
        257 => "CAA",
        _ => return None,
    };
    Some(name)
}

/// Human-oriented description used in logs and by the `qtype_desc` rule field.
pub fn type_description(qtype: u16) -> Cow<'static, str> {
    match qtype {
        1 => Cow::Borrowed("IPv4"),
        28 => Cow::Borrowed("IPv6"),
        2 => Cow::Borrowed("NS"),
        5 => Cow::Borrowed("CNAME"),
        15 => Cow::Borrowed("MX"),
        16 => Cow::Borrowed("TXT"),
        other => Cow::Owned(format!("type:{other}")),
    }
}
