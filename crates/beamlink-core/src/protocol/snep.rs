//! Simple NDEF Exchange Protocol framing
//!
//! Every message starts with a six byte header: version, request/response
//! code and a big-endian u32 information length. GET requests carry a u32
//! acceptable response length ahead of the NDEF bytes, counted in the
//! information length.

use alloc::vec::Vec;
use serde::{Deserialize, Serialize};

use crate::codec::ByteReader;
use crate::errors::DecodeError;
use crate::ndef::NdefMessage;

// ----------------------------------------------------------------------------
// Constants
// ----------------------------------------------------------------------------

pub const VERSION_MAJOR: u8 = 0x1;
pub const VERSION_MINOR: u8 = 0x0;
pub const VERSION: u8 = (VERSION_MAJOR << 4) | VERSION_MINOR;

pub const HEADER_LEN: usize = 6;

/// Acceptable response length a client advertises by default
pub const DEFAULT_ACCEPTABLE_LENGTH: u32 = 100 * 1024;

// ----------------------------------------------------------------------------
// Codes
// ----------------------------------------------------------------------------

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnepRequest {
    Continue = 0x00,
    Get = 0x01,
    Put = 0x02,
    Reject = 0x7F,
}

impl SnepRequest {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(SnepRequest::Continue),
            0x01 => Some(SnepRequest::Get),
            0x02 => Some(SnepRequest::Put),
            0x7F => Some(SnepRequest::Reject),
            _ => None,
        }
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnepResponse {
    Continue = 0x80,
    Success = 0x81,
    NotFound = 0xC0,
    ExcessData = 0xC1,
    BadRequest = 0xC2,
    NotImplemented = 0xE0,
    UnsupportedVersion = 0xE1,
    Reject = 0xFF,
}

impl SnepResponse {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x80 => Some(SnepResponse::Continue),
            0x81 => Some(SnepResponse::Success),
            0xC0 => Some(SnepResponse::NotFound),
            0xC1 => Some(SnepResponse::ExcessData),
            0xC2 => Some(SnepResponse::BadRequest),
            0xE0 => Some(SnepResponse::NotImplemented),
            0xE1 => Some(SnepResponse::UnsupportedVersion),
            0xFF => Some(SnepResponse::Reject),
            _ => None,
        }
    }
}

// ----------------------------------------------------------------------------
// Message
// ----------------------------------------------------------------------------

/// A complete SNEP request or response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnepMessage {
    pub version: u8,
    /// Raw request or response code; unknown codes are kept for the server
    /// to reject
    pub field: u8,
    pub length: u32,
    pub acceptable_length: Option<u32>,
    pub message: Option<NdefMessage>,
}

impl SnepMessage {
    pub fn get_request(acceptable_length: u32, message: NdefMessage) -> Self {
        let length = (message.byte_len() + 4) as u32;
        Self {
            version: VERSION,
            field: SnepRequest::Get as u8,
            length,
            acceptable_length: Some(acceptable_length),
            message: Some(message),
        }
    }

    pub fn put_request(message: NdefMessage) -> Self {
        Self {
            version: VERSION,
            field: SnepRequest::Put as u8,
            length: message.byte_len() as u32,
            acceptable_length: None,
            message: Some(message),
        }
    }

    /// Header-only message carrying just a code
    pub fn control(field: u8) -> Self {
        Self {
            version: VERSION,
            field,
            length: 0,
            acceptable_length: None,
            message: None,
        }
    }

    pub fn response(response: SnepResponse) -> Self {
        Self::control(response as u8)
    }

    pub fn success(message: Option<NdefMessage>) -> Self {
        let length = message.as_ref().map(|m| m.byte_len() as u32).unwrap_or(0);
        Self {
            version: VERSION,
            field: SnepResponse::Success as u8,
            length,
            acceptable_length: None,
            message,
        }
    }

    pub fn request(&self) -> Option<SnepRequest> {
        SnepRequest::from_u8(self.field)
    }

    pub fn response_code(&self) -> Option<SnepResponse> {
        SnepResponse::from_u8(self.field)
    }

    pub fn major_version(&self) -> u8 {
        self.version >> 4
    }

    pub fn is_supported_version(&self) -> bool {
        self.major_version() == VERSION_MAJOR
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let body = self.message.as_ref().map(NdefMessage::to_bytes).unwrap_or_default();
        let mut out = Vec::with_capacity(HEADER_LEN + 4 + body.len());
        out.push(self.version);
        out.push(self.field);
        out.extend_from_slice(&self.length.to_be_bytes());
        if let Some(acceptable) = self.acceptable_length {
            out.extend_from_slice(&acceptable.to_be_bytes());
        }
        out.extend_from_slice(&body);
        out
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = ByteReader::new(bytes);
        let version = reader.read_u8()?;
        let field = reader.read_u8()?;
        let length = reader.read_u32_be()?;

        let (acceptable_length, ndef_len) = if field == SnepRequest::Get as u8 {
            let acceptable = reader.read_u32_be()?;
            let ndef_len = length
                .checked_sub(4)
                .ok_or_else(|| DecodeError::malformed("GET shorter than acceptable length"))?;
            (Some(acceptable), ndef_len as usize)
        } else {
            (None, length as usize)
        };

        let message = if ndef_len > 0 {
            Some(NdefMessage::parse(reader.read_bytes(ndef_len)?)?)
        } else {
            None
        };

        Ok(Self {
            version,
            field,
            length,
            acceptable_length,
            message,
        })
    }
}

/// Information length declared by a header fragment
pub fn declared_length(header: &[u8]) -> Option<u32> {
    let mut reader = ByteReader::new(header);
    reader.skip(2).ok()?;
    reader.read_u32_be().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ndef::NdefRecord;
    use alloc::vec;

    fn create_test_message() -> NdefMessage {
        NdefMessage::single(NdefRecord::uri("http://example.com")).unwrap()
    }

    #[test]
    fn test_put_request_framing() {
        let message = create_test_message();
        let bytes = SnepMessage::put_request(message.clone()).to_bytes();
        assert_eq!(bytes[0], 0x10);
        assert_eq!(bytes[1], 0x02);
        assert_eq!(declared_length(&bytes), Some(message.byte_len() as u32));
        assert_eq!(&bytes[HEADER_LEN..], message.to_bytes().as_slice());
    }

    #[test]
    fn test_get_request_counts_acceptable_length() {
        let message = create_test_message();
        let get = SnepMessage::get_request(DEFAULT_ACCEPTABLE_LENGTH, message.clone());
        let bytes = get.to_bytes();
        assert_eq!(declared_length(&bytes), Some(message.byte_len() as u32 + 4));
        assert_eq!(&bytes[6..10], &DEFAULT_ACCEPTABLE_LENGTH.to_be_bytes());

        let parsed = SnepMessage::parse(&bytes).unwrap();
        assert_eq!(parsed.request(), Some(SnepRequest::Get));
        assert_eq!(parsed.acceptable_length, Some(DEFAULT_ACCEPTABLE_LENGTH));
        assert_eq!(parsed.message, Some(message));
    }

    #[test]
    fn test_control_message_is_header_only() {
        let bytes = SnepMessage::response(SnepResponse::Continue).to_bytes();
        assert_eq!(bytes, vec![0x10, 0x80, 0, 0, 0, 0]);
        let parsed = SnepMessage::parse(&bytes).unwrap();
        assert_eq!(parsed.response_code(), Some(SnepResponse::Continue));
        assert!(parsed.message.is_none());
    }

    #[test]
    fn test_version_check() {
        let mut message = SnepMessage::response(SnepResponse::Success);
        assert!(message.is_supported_version());
        message.version = 0x20;
        assert!(!message.is_supported_version());
    }

    #[test]
    fn test_short_body_is_truncated() {
        let bytes = SnepMessage::put_request(create_test_message()).to_bytes();
        let err = SnepMessage::parse(&bytes[..bytes.len() - 1]).unwrap_err();
        assert!(err.is_truncated());
    }
}
