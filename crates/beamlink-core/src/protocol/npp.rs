//! Legacy NDEF push framing
//!
//! `version(1) | count(u32 BE) | { action(1) | length(u32 BE) | ndef }*`

use alloc::vec::Vec;

use crate::codec::ByteReader;
use crate::errors::DecodeError;
use crate::ndef::NdefMessage;

pub const NPP_VERSION: u8 = 0x01;

/// What the receiver should do with a pushed message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NppAction {
    Immediate,
    Background,
    Other(u8),
}

impl NppAction {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0x01 => NppAction::Immediate,
            0x02 => NppAction::Background,
            other => NppAction::Other(other),
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            NppAction::Immediate => 0x01,
            NppAction::Background => 0x02,
            NppAction::Other(value) => value,
        }
    }
}

/// A non-empty set of pushed messages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NppMessage {
    entries: Vec<(NppAction, NdefMessage)>,
}

impl NppMessage {
    /// Single message to be handled immediately
    pub fn immediate_push(message: NdefMessage) -> Self {
        Self {
            entries: alloc::vec![(NppAction::Immediate, message)],
        }
    }

    pub fn new(entries: Vec<(NppAction, NdefMessage)>) -> Result<Self, DecodeError> {
        if entries.is_empty() {
            return Err(DecodeError::malformed("push frame without messages"));
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[(NppAction, NdefMessage)] {
        &self.entries
    }

    /// First message flagged for immediate handling
    pub fn immediate(&self) -> Option<&NdefMessage> {
        self.entries
            .iter()
            .find(|(action, _)| *action == NppAction::Immediate)
            .map(|(_, message)| message)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.push(NPP_VERSION);
        out.extend_from_slice(&(self.entries.len() as u32).to_be_bytes());
        for (action, message) in &self.entries {
            let body = message.to_bytes();
            out.push(action.to_u8());
            out.extend_from_slice(&(body.len() as u32).to_be_bytes());
            out.extend_from_slice(&body);
        }
        out
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = ByteReader::new(bytes);
        let version = reader.read_u8()?;
        if version != NPP_VERSION {
            return Err(DecodeError::malformed("unsupported push protocol version"));
        }
        let count = reader.read_u32_be()?;
        if count == 0 {
            return Err(DecodeError::malformed("push frame without messages"));
        }

        let mut entries = Vec::new();
        for _ in 0..count {
            let action = NppAction::from_u8(reader.read_u8()?);
            let len = reader.read_u32_be()? as usize;
            let message = NdefMessage::parse(reader.read_bytes(len)?)?;
            entries.push((action, message));
        }

        Ok(Self { entries })
    }
}

/// NDEF length of the first entry, once its header has arrived
pub fn declared_length(frame: &[u8]) -> Option<u32> {
    let mut reader = ByteReader::new(frame);
    reader.skip(6).ok()?;
    reader.read_u32_be().ok()
}
