//! Barcode tag URL decoding
//!
//! Barcode tags carry no NDEF; the URL lives in the tag id itself. Byte 1 is
//! a URI identifier code limited to the four web prefixes, the URL bytes
//! follow, and the final two bytes are a CRC. An optional 0xFE ends the URL
//! early.

use crate::ndef::{NdefMessage, NdefRecord, Tnf, RTD_URI};

const URI_PREFIX_HTTP_WWW: u8 = 0x01;
const URI_PREFIX_HTTPS_WWW: u8 = 0x02;
const URI_PREFIX_HTTP: u8 = 0x03;
const URI_PREFIX_HTTPS: u8 = 0x04;

const TERMINATOR: u8 = 0xFE;
const CRC_LEN: usize = 2;

/// Synthesize a single-URI message from a barcode tag id
pub fn decode_barcode_uri(tag_id: &[u8]) -> Option<NdefMessage> {
    if tag_id.len() < 4 {
        return None;
    }
    if !matches!(
        tag_id[1],
        URI_PREFIX_HTTP_WWW | URI_PREFIX_HTTPS_WWW | URI_PREFIX_HTTP | URI_PREFIX_HTTPS
    ) {
        return None;
    }

    let scan_end = tag_id.len() - CRC_LEN;
    let end = (2..scan_end)
        .find(|&index| tag_id[index] == TERMINATOR)
        .unwrap_or(scan_end);

    // byte 0 is the manufacturer id; the prefix code doubles as the URI code
    let payload = tag_id[1..end].to_vec();
    let record = NdefRecord::new(Tnf::WellKnown, RTD_URI, tag_id, payload);
    NdefMessage::single(record).ok()
}
