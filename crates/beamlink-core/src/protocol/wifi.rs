//! Network provisioning token
//!
//! A `application/vnd.wfa.wsc` record holds `id(u16) | size(u16) | value`
//! attributes. Only the credential attribute is interpreted.

use alloc::string::String;
use serde::{Deserialize, Serialize};

use crate::codec::ByteReader;
use crate::errors::DecodeError;
use crate::ndef::NdefMessage;

pub const TOKEN_MIME_TYPE: &str = "application/vnd.wfa.wsc";

const CREDENTIAL_FIELD_ID: u16 = 0x100E;
const SSID_FIELD_ID: u16 = 0x1045;
const NETWORK_KEY_FIELD_ID: u16 = 0x1027;
const AUTH_TYPE_FIELD_ID: u16 = 0x1003;

const AUTH_TYPE_EXPECTED_SIZE: usize = 2;
const MAX_NETWORK_KEY_SIZE: usize = 64;

/// Authentication scheme named by the token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkAuth {
    Open,
    WpaPsk,
    WpaEap,
    Wpa2Eap,
    Wpa2Psk,
    Other(u16),
}

impl NetworkAuth {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0x0000 => NetworkAuth::Open,
            0x0002 => NetworkAuth::WpaPsk,
            0x0008 => NetworkAuth::WpaEap,
            0x0010 => NetworkAuth::Wpa2Eap,
            0x0020 => NetworkAuth::Wpa2Psk,
            other => NetworkAuth::Other(other),
        }
    }

    pub fn is_pre_shared_key(&self) -> bool {
        matches!(self, NetworkAuth::WpaPsk | NetworkAuth::Wpa2Psk)
    }

    pub fn is_enterprise(&self) -> bool {
        matches!(self, NetworkAuth::WpaEap | NetworkAuth::Wpa2Eap)
    }
}

/// Credentials offered to the configuration prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkCredential {
    pub ssid: String,
    pub network_key: String,
    pub auth: Option<NetworkAuth>,
}

/// Find and parse the first provisioning token in a message
///
/// `Ok(None)` when no token record is present or the credential lacks an
/// SSID or key.
pub fn parse_token(message: &NdefMessage) -> Result<Option<NetworkCredential>, DecodeError> {
    for record in message.records() {
        if !record.is_mime(TOKEN_MIME_TYPE) {
            continue;
        }

        let mut reader = ByteReader::new(&record.payload);
        while !reader.is_empty() {
            let field_id = reader.read_u16_be()?;
            let size = reader.read_u16_be()? as usize;
            let value = reader.read_bytes(size)?;
            if field_id == CREDENTIAL_FIELD_ID {
                return parse_credential(value);
            }
        }
    }
    Ok(None)
}

fn parse_credential(credential: &[u8]) -> Result<Option<NetworkCredential>, DecodeError> {
    let mut reader = ByteReader::new(credential);
    let mut ssid = None;
    let mut network_key = None;
    let mut auth = None;

    while !reader.is_empty() {
        let field_id = reader.read_u16_be()?;
        let size = reader.read_u16_be()? as usize;
        if size > reader.remaining() {
            return Err(DecodeError::malformed("credential attribute overruns credential"));
        }
        let value = reader.read_bytes(size)?;

        match field_id {
            SSID_FIELD_ID => ssid = Some(String::from_utf8_lossy(value).into_owned()),
            NETWORK_KEY_FIELD_ID => {
                if size > MAX_NETWORK_KEY_SIZE {
                    return Err(DecodeError::malformed("network key too long"));
                }
                network_key = Some(String::from_utf8_lossy(value).into_owned());
            }
            AUTH_TYPE_FIELD_ID => {
                if size != AUTH_TYPE_EXPECTED_SIZE {
                    return Err(DecodeError::malformed("auth type must be two bytes"));
                }
                auth = Some(NetworkAuth::from_u16(u16::from_be_bytes([value[0], value[1]])));
            }
            _ => {}
        }
    }

    Ok(match (ssid, network_key) {
        (Some(ssid), Some(network_key)) => Some(NetworkCredential {
            ssid,
            network_key,
            auth,
        }),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ndef::NdefRecord;
    use alloc::vec::Vec;

    fn attribute(id: u16, value: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&id.to_be_bytes());
        out.extend_from_slice(&(value.len() as u16).to_be_bytes());
        out.extend_from_slice(value);
        out
    }

    fn create_test_token(credential: &[u8]) -> NdefMessage {
        let mut payload = attribute(0x104A, &[0x10]);
        payload.extend_from_slice(&attribute(CREDENTIAL_FIELD_ID, credential));
        NdefMessage::single(NdefRecord::mime(TOKEN_MIME_TYPE, payload)).unwrap()
    }

    #[test]
    fn test_full_credential() {
        let mut credential = attribute(SSID_FIELD_ID, b"home");
        credential.extend_from_slice(&attribute(AUTH_TYPE_FIELD_ID, &[0x00, 0x20]));
        credential.extend_from_slice(&attribute(0x1026, &[0x01]));
        credential.extend_from_slice(&attribute(NETWORK_KEY_FIELD_ID, b"secret"));

        let parsed = parse_token(&create_test_token(&credential)).unwrap().unwrap();
        assert_eq!(parsed.ssid, "home");
        assert_eq!(parsed.network_key, "secret");
        assert_eq!(parsed.auth, Some(NetworkAuth::Wpa2Psk));
        assert!(parsed.auth.unwrap().is_pre_shared_key());
    }

    #[test]
    fn test_missing_key_is_not_a_token() {
        let credential = attribute(SSID_FIELD_ID, b"home");
        assert_eq!(parse_token(&create_test_token(&credential)).unwrap(), None);
    }

    #[test]
    fn test_corrupt_credentials() {
        let mut bad_auth = attribute(SSID_FIELD_ID, b"home");
        bad_auth.extend_from_slice(&attribute(AUTH_TYPE_FIELD_ID, &[0x20]));
        assert!(parse_token(&create_test_token(&bad_auth)).is_err());

        let long_key = attribute(NETWORK_KEY_FIELD_ID, &[b'k'; 65]);
        assert!(parse_token(&create_test_token(&long_key)).is_err());
    }

    #[test]
    fn test_other_records_are_ignored() {
        let message = NdefMessage::single(NdefRecord::uri("http://a")).unwrap();
        assert_eq!(parse_token(&message).unwrap(), None);
    }
}
