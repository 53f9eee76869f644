//! NDEF message codec
//!
//! Binary record container exchanged over every link service. Records are
//! parsed with chunk reassembly and re-encoded unchunked, with short-record
//! form whenever the payload fits in a byte.

use alloc::{
    string::{String, ToString},
    vec::Vec,
};
use serde::{Deserialize, Serialize};

use crate::codec::ByteReader;
use crate::errors::DecodeError;

// ----------------------------------------------------------------------------
// Constants
// ----------------------------------------------------------------------------

const FLAG_MB: u8 = 0x80;
const FLAG_ME: u8 = 0x40;
const FLAG_CF: u8 = 0x20;
const FLAG_SR: u8 = 0x10;
const FLAG_IL: u8 = 0x08;
const TNF_MASK: u8 = 0x07;

/// Largest payload accepted from the wire
pub const MAX_PAYLOAD_SIZE: usize = 10 * 1024 * 1024;

/// Well-known record type names
pub const RTD_TEXT: &[u8] = b"T";
pub const RTD_URI: &[u8] = b"U";
pub const RTD_SMART_POSTER: &[u8] = b"Sp";
pub const RTD_HANDOVER_REQUEST: &[u8] = b"Hr";
pub const RTD_HANDOVER_SELECT: &[u8] = b"Hs";
pub const RTD_ALTERNATIVE_CARRIER: &[u8] = b"ac";
pub const RTD_COLLISION_RESOLUTION: &[u8] = b"cr";

/// External type naming an application package
pub const RTD_APPLICATION_RECORD: &[u8] = b"android.com:pkg";

/// URI identifier codes, indexed by the first payload byte of a `U` record
pub const URI_PREFIXES: [&str; 36] = [
    "",
    "http://www.",
    "https://www.",
    "http://",
    "https://",
    "tel:",
    "mailto:",
    "ftp://anonymous:anonymous@",
    "ftp://ftp.",
    "ftps://",
    "sftp://",
    "smb://",
    "nfs://",
    "ftp://",
    "dav://",
    "news:",
    "telnet://",
    "imap:",
    "rtsp://",
    "urn:",
    "pop:",
    "sip:",
    "sips:",
    "tftp:",
    "btspp://",
    "btl2cap://",
    "btgoep://",
    "tcpobex://",
    "irdaobex://",
    "file://",
    "urn:epc:id:",
    "urn:epc:tag:",
    "urn:epc:pat:",
    "urn:epc:raw:",
    "urn:epc:",
    "urn:nfc:",
];

// ----------------------------------------------------------------------------
// Record Types
// ----------------------------------------------------------------------------

/// Type name format of a record
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tnf {
    Empty = 0,
    WellKnown = 1,
    MimeMedia = 2,
    AbsoluteUri = 3,
    External = 4,
    Unknown = 5,
    Unchanged = 6,
}

impl Tnf {
    pub fn from_u8(value: u8) -> Result<Self, DecodeError> {
        match value {
            0 => Ok(Tnf::Empty),
            1 => Ok(Tnf::WellKnown),
            2 => Ok(Tnf::MimeMedia),
            3 => Ok(Tnf::AbsoluteUri),
            4 => Ok(Tnf::External),
            5 => Ok(Tnf::Unknown),
            6 => Ok(Tnf::Unchanged),
            _ => Err(DecodeError::malformed("reserved TNF")),
        }
    }
}

/// A single NDEF record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NdefRecord {
    pub tnf: Tnf,
    pub record_type: Vec<u8>,
    pub id: Vec<u8>,
    pub payload: Vec<u8>,
}

impl NdefRecord {
    pub fn new(tnf: Tnf, record_type: &[u8], id: &[u8], payload: Vec<u8>) -> Self {
        Self {
            tnf,
            record_type: record_type.to_vec(),
            id: id.to_vec(),
            payload,
        }
    }

    pub fn well_known(record_type: &[u8], payload: Vec<u8>) -> Self {
        Self::new(Tnf::WellKnown, record_type, &[], payload)
    }

    /// Media-type record; the type is stored lowercased
    pub fn mime(mime_type: &str, payload: Vec<u8>) -> Self {
        let mime_type = mime_type.trim().to_ascii_lowercase();
        Self::new(Tnf::MimeMedia, mime_type.as_bytes(), &[], payload)
    }

    /// External-type record (`domain:type`, lowercased)
    pub fn external(domain_type: &str, payload: Vec<u8>) -> Self {
        let domain_type = domain_type.trim().to_ascii_lowercase();
        Self::new(Tnf::External, domain_type.as_bytes(), &[], payload)
    }

    /// Application record naming the package that should handle the message
    pub fn application(package: &str) -> Self {
        Self::new(
            Tnf::External,
            RTD_APPLICATION_RECORD,
            &[],
            package.as_bytes().to_vec(),
        )
    }

    /// Well-known `U` record using the first table prefix that matches, in code order
    pub fn uri(uri: &str) -> Self {
        let (code, rest) = URI_PREFIXES
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, prefix)| uri.starts_with(*prefix))
            .map(|(code, prefix)| (code as u8, &uri[prefix.len()..]))
            .unwrap_or((0, uri));

        let mut payload = Vec::with_capacity(rest.len() + 1);
        payload.push(code);
        payload.extend_from_slice(rest.as_bytes());
        Self::well_known(RTD_URI, payload)
    }

    pub fn is_well_known(&self, record_type: &[u8]) -> bool {
        self.tnf == Tnf::WellKnown && self.record_type == record_type
    }

    pub fn is_mime(&self, mime_type: &str) -> bool {
        self.tnf == Tnf::MimeMedia && self.record_type.eq_ignore_ascii_case(mime_type.as_bytes())
    }

    pub fn is_external(&self, domain_type: &[u8]) -> bool {
        self.tnf == Tnf::External && self.record_type.eq_ignore_ascii_case(domain_type)
    }

    /// URI carried by the record, if any
    pub fn to_uri(&self) -> Option<String> {
        self.to_uri_inner(false)
    }

    fn to_uri_inner(&self, in_smart_poster: bool) -> Option<String> {
        match self.tnf {
            Tnf::WellKnown if self.record_type == RTD_URI => {
                let (&code, rest) = self.payload.split_first()?;
                let prefix = URI_PREFIXES.get(code as usize)?;
                let rest = core::str::from_utf8(rest).ok()?;
                let mut uri = String::with_capacity(prefix.len() + rest.len());
                uri.push_str(prefix);
                uri.push_str(rest);
                Some(uri)
            }
            Tnf::WellKnown if self.record_type == RTD_SMART_POSTER && !in_smart_poster => {
                let nested = NdefMessage::parse(&self.payload).ok()?;
                nested
                    .records()
                    .iter()
                    .find_map(|record| record.to_uri_inner(true))
            }
            Tnf::AbsoluteUri => core::str::from_utf8(&self.record_type)
                .ok()
                .map(ToString::to_string),
            Tnf::External if !in_smart_poster => {
                let ty = core::str::from_utf8(&self.record_type).ok()?;
                let mut uri = String::from("vnd.android.nfc://ext/");
                uri.push_str(ty);
                Some(uri)
            }
            _ => None,
        }
    }

    /// Normalized media type carried by the record, if any
    pub fn to_mime_type(&self) -> Option<String> {
        match self.tnf {
            Tnf::WellKnown if self.record_type == RTD_TEXT => Some(String::from("text/plain")),
            Tnf::MimeMedia => {
                let raw = core::str::from_utf8(&self.record_type).ok()?;
                let base = raw.split(';').next().unwrap_or("").trim();
                if base.is_empty() {
                    return None;
                }
                Some(base.to_ascii_lowercase())
            }
            _ => None,
        }
    }

    fn validate(&self) -> Result<(), DecodeError> {
        if self.record_type.len() > 255 {
            return Err(DecodeError::malformed("record type longer than 255 bytes"));
        }
        if self.id.len() > 255 {
            return Err(DecodeError::malformed("record id longer than 255 bytes"));
        }
        if self.tnf == Tnf::Empty
            && (!self.record_type.is_empty() || !self.id.is_empty() || !self.payload.is_empty())
        {
            return Err(DecodeError::malformed("empty record carries data"));
        }
        if self.tnf == Tnf::Unchanged {
            return Err(DecodeError::malformed("unchanged TNF outside a chunk"));
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Message
// ----------------------------------------------------------------------------

/// Ordered, non-empty list of records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "NdefMessageRepr")]
pub struct NdefMessage {
    records: Vec<NdefRecord>,
}

/// Unchecked serde shape, validated through `NdefMessage::new`
#[derive(Deserialize)]
struct NdefMessageRepr {
    records: Vec<NdefRecord>,
}

impl TryFrom<NdefMessageRepr> for NdefMessage {
    type Error = DecodeError;

    fn try_from(repr: NdefMessageRepr) -> Result<Self, Self::Error> {
        Self::new(repr.records)
    }
}

impl NdefMessage {
    pub fn new(records: Vec<NdefRecord>) -> Result<Self, DecodeError> {
        if records.is_empty() {
            return Err(DecodeError::malformed("message has no records"));
        }
        for record in &records {
            record.validate()?;
        }
        Ok(Self { records })
    }

    pub fn single(record: NdefRecord) -> Result<Self, DecodeError> {
        Self::new(alloc::vec![record])
    }

    /// Build from records the crate itself constructed
    pub(crate) fn from_records(records: Vec<NdefRecord>) -> Self {
        debug_assert!(!records.is_empty());
        Self { records }
    }

    pub fn records(&self) -> &[NdefRecord] {
        &self.records
    }

    pub fn first(&self) -> &NdefRecord {
        // non-empty by construction
        &self.records[0]
    }

    /// Packages named by application records, in message order
    pub fn application_packages(&self) -> Vec<String> {
        self.records
            .iter()
            .filter(|record| record.is_external(RTD_APPLICATION_RECORD))
            .filter_map(|record| core::str::from_utf8(&record.payload).ok())
            .map(ToString::to_string)
            .collect()
    }

    pub fn byte_len(&self) -> usize {
        self.to_bytes().len()
    }

    /// Encode to wire bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        let last = self.records.len() - 1;

        for (index, record) in self.records.iter().enumerate() {
            let short = record.payload.len() < 256;
            let mut header = record.tnf as u8;
            if index == 0 {
                header |= FLAG_MB;
            }
            if index == last {
                header |= FLAG_ME;
            }
            if short {
                header |= FLAG_SR;
            }
            if !record.id.is_empty() {
                header |= FLAG_IL;
            }

            out.push(header);
            out.push(record.record_type.len() as u8);
            if short {
                out.push(record.payload.len() as u8);
            } else {
                out.extend_from_slice(&(record.payload.len() as u32).to_be_bytes());
            }
            if !record.id.is_empty() {
                out.push(record.id.len() as u8);
            }
            out.extend_from_slice(&record.record_type);
            out.extend_from_slice(&record.id);
            out.extend_from_slice(&record.payload);
        }

        out
    }

    /// Decode wire bytes
    ///
    /// `Truncated` means the buffer ends inside a record and more bytes may
    /// complete it; `Malformed` means no amount of extra data will help.
    pub fn parse(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.is_empty() {
            return Err(DecodeError::truncated(1, 0));
        }

        let mut reader = ByteReader::new(bytes);
        let mut records = Vec::new();
        let mut chunk: Option<NdefRecord> = None;
        let mut first = true;

        loop {
            let header = reader.read_u8()?;
            let message_begin = header & FLAG_MB != 0;
            let message_end = header & FLAG_ME != 0;
            let chunked = header & FLAG_CF != 0;
            let short = header & FLAG_SR != 0;
            let has_id = header & FLAG_IL != 0;
            let tnf = Tnf::from_u8(header & TNF_MASK)?;

            if first && !message_begin {
                return Err(DecodeError::malformed("first record missing MB flag"));
            }
            if !first && message_begin {
                return Err(DecodeError::malformed("unexpected MB flag"));
            }
            first = false;

            let type_len = reader.read_u8()? as usize;
            let payload_len = if short {
                reader.read_u8()? as usize
            } else {
                reader.read_u32_be()? as usize
            };
            let id_len = if has_id { reader.read_u8()? as usize } else { 0 };

            if payload_len > MAX_PAYLOAD_SIZE {
                return Err(DecodeError::malformed("record payload too large"));
            }

            let record_type = reader.read_bytes(type_len)?;
            let id = reader.read_bytes(id_len)?;
            let payload = reader.read_bytes(payload_len)?;

            match chunk.as_mut() {
                Some(partial) => {
                    if tnf != Tnf::Unchanged || type_len != 0 {
                        return Err(DecodeError::malformed("bad middle or terminating chunk"));
                    }
                    if partial.payload.len() + payload.len() > MAX_PAYLOAD_SIZE {
                        return Err(DecodeError::malformed("chunked payload too large"));
                    }
                    partial.payload.extend_from_slice(payload);
                    if !chunked {
                        if let Some(done) = chunk.take() {
                            done.validate()?;
                            records.push(done);
                        }
                    }
                }
                None => {
                    if tnf == Tnf::Unchanged {
                        return Err(DecodeError::malformed("unchanged TNF on initial chunk"));
                    }
                    let record = NdefRecord::new(tnf, record_type, id, payload.to_vec());
                    if chunked {
                        chunk = Some(record);
                    } else {
                        record.validate()?;
                        records.push(record);
                    }
                }
            }

            if message_end {
                if chunk.is_some() {
                    return Err(DecodeError::malformed("message ends inside a chunk"));
                }
                break;
            }
        }

        if !reader.is_empty() {
            return Err(DecodeError::malformed("trailing bytes after message end"));
        }

        Ok(Self { records })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn test_deserialize_rejects_empty_message() {
        assert!(serde_json::from_str::<NdefMessage>(r#"{"records":[]}"#).is_err());

        let message = NdefMessage::single(NdefRecord::uri("tel:123")).unwrap();
        let json = serde_json::to_string(&message).unwrap();
        assert_eq!(serde_json::from_str::<NdefMessage>(&json).unwrap(), message);
    }

    #[test]
    fn test_uri_prefix_selection() {
        let record = NdefRecord::uri("https://www.example.com/a");
        assert_eq!(record.payload[0], 0x02);
        assert_eq!(&record.payload[1..], b"example.com/a");
        assert_eq!(record.to_uri().as_deref(), Some("https://www.example.com/a"));

        let raw = NdefRecord::uri("geo:1,2");
        assert_eq!(raw.payload[0], 0x00);
        assert_eq!(raw.to_uri().as_deref(), Some("geo:1,2"));
    }

    #[test]
    fn test_unknown_uri_code_has_no_uri() {
        let record = NdefRecord::well_known(RTD_URI, vec![0x40, b'x']);
        assert_eq!(record.to_uri(), None);
    }

    #[test]
    fn test_short_record_encoding() {
        let message = NdefMessage::single(NdefRecord::uri("http://a")).unwrap();
        let bytes = message.to_bytes();
        assert_eq!(bytes[0], FLAG_MB | FLAG_ME | FLAG_SR | 0x01);
        assert_eq!(bytes[1], 1);
        assert_eq!(bytes[2], 2);
        assert_eq!(&bytes[3..], &[b'U', 0x03, b'a']);
        assert_eq!(NdefMessage::parse(&bytes).unwrap(), message);
    }

    #[test]
    fn test_long_record_and_id() {
        let record = NdefRecord::new(Tnf::MimeMedia, b"a/b", b"id", vec![7u8; 300]);
        let message = NdefMessage::single(record).unwrap();
        let bytes = message.to_bytes();
        assert_eq!(bytes[0] & FLAG_SR, 0);
        assert_ne!(bytes[0] & FLAG_IL, 0);
        assert_eq!(&bytes[2..6], &300u32.to_be_bytes());
        assert_eq!(NdefMessage::parse(&bytes).unwrap(), message);
    }

    #[test]
    fn test_chunked_records_are_reassembled() {
        let bytes = vec![
            0x80 | FLAG_CF | FLAG_SR | 0x02, 3, 2, b'a', b'/', b'b', 1, 2,
            FLAG_CF | FLAG_SR | 0x06, 0, 1, 3,
            FLAG_ME | FLAG_SR | 0x06, 0, 2, 4, 5,
        ];
        let message = NdefMessage::parse(&bytes).unwrap();
        assert_eq!(message.records().len(), 1);
        assert_eq!(message.first().payload, vec![1, 2, 3, 4, 5]);
        assert!(message.first().is_mime("A/B"));
    }

    #[test]
    fn test_partial_input_is_truncated() {
        let bytes = NdefMessage::single(NdefRecord::uri("http://example.com"))
            .unwrap()
            .to_bytes();
        for cut in 0..bytes.len() {
            let err = NdefMessage::parse(&bytes[..cut]).unwrap_err();
            assert!(err.is_truncated(), "cut at {cut} gave {err:?}");
        }
    }

    #[test]
    fn test_structural_errors_are_malformed() {
        // missing MB
        assert!(!NdefMessage::parse(&[FLAG_ME | FLAG_SR | 0x01, 0, 0])
            .unwrap_err()
            .is_truncated());
        // trailing data
        assert!(!NdefMessage::parse(&[0xD0, 0, 0, 0xAA]).unwrap_err().is_truncated());
        // reserved TNF
        assert!(!NdefMessage::parse(&[0xD7, 0, 0]).unwrap_err().is_truncated());
    }

    #[test]
    fn test_mime_type_normalization() {
        let record = NdefRecord::new(Tnf::MimeMedia, b"Text/VCard; charset=utf-8", &[], vec![]);
        assert_eq!(record.to_mime_type().as_deref(), Some("text/vcard"));
        let text = NdefRecord::well_known(RTD_TEXT, vec![0x02, b'e', b'n', b'h', b'i']);
        assert_eq!(text.to_mime_type().as_deref(), Some("text/plain"));
    }

    #[test]
    fn test_smart_poster_uri_and_external_uri() {
        let inner = NdefMessage::single(NdefRecord::uri("tel:123")).unwrap();
        let poster = NdefRecord::well_known(RTD_SMART_POSTER, inner.to_bytes());
        assert_eq!(poster.to_uri().as_deref(), Some("tel:123"));

        let ext = NdefRecord::external("example.com:Thing", vec![]);
        assert_eq!(ext.to_uri().as_deref(), Some("vnd.android.nfc://ext/example.com:thing"));
    }

    #[test]
    fn test_application_packages() {
        let message = NdefMessage::new(vec![
            NdefRecord::uri("http://a"),
            NdefRecord::application("com.example.one"),
            NdefRecord::application("com.example.two"),
        ])
        .unwrap();
        assert_eq!(
            message.application_packages(),
            vec!["com.example.one".to_string(), "com.example.two".to_string()]
        );
    }
}
