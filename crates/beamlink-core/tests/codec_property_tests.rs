//! Property-based tests for the record codecs
//!
//! These tests verify that carrier descriptors survive encoding, that
//! truncated input never yields a record without an address, and that no input
//! makes a decoder panic.

use beamlink_core::{
    protocol::handover::{decode_ble_oob, decode_legacy_oob, encode_carrier_address},
    protocol::npp::NppMessage,
    protocol::snep::SnepMessage,
    BluetoothAddress, DecodeError, LeRole, NdefMessage, NdefRecord, Tnf,
};
use proptest::prelude::*;

/// Generate arbitrary carrier address
fn arb_address() -> impl Strategy<Value = BluetoothAddress> {
    any::<[u8; 6]>().prop_map(BluetoothAddress::new)
}

/// Generate arbitrary friendly name
fn arb_name() -> impl Strategy<Value = String> {
    prop::string::string_regex(r"[a-zA-Z0-9 ]{1,40}").unwrap()
}

/// Generate arbitrary record with a type that survives validation
fn arb_record() -> impl Strategy<Value = NdefRecord> {
    (
        prop_oneof![Just(Tnf::WellKnown), Just(Tnf::MimeMedia), Just(Tnf::External)],
        prop::collection::vec(any::<u8>(), 1..16),
        prop::collection::vec(any::<u8>(), 0..4),
        prop::collection::vec(any::<u8>(), 0..600),
    )
        .prop_map(|(tnf, record_type, id, payload)| NdefRecord::new(tnf, &record_type, &id, payload))
}

fn arb_message() -> impl Strategy<Value = NdefMessage> {
    prop::collection::vec(arb_record(), 1..5).prop_map(|records| NdefMessage::new(records).unwrap())
}

fn legacy_payload(address: &BluetoothAddress, name: &str) -> Vec<u8> {
    let mut payload = encode_carrier_address(address);
    payload.push(name.len() as u8 + 1);
    payload.push(0x08);
    payload.extend_from_slice(name.as_bytes());
    payload
}

proptest! {
    /// Property: the classic OOB address is byte-order symmetric
    #[test]
    fn carrier_address_round_trips(address in arb_address()) {
        let record = decode_legacy_oob(&encode_carrier_address(&address)).unwrap();
        prop_assert_eq!(record.address, Some(address));
        prop_assert!(record.valid);
        prop_assert_eq!(record.name, "");
    }

    /// Property: the short name sub-field is recovered intact
    #[test]
    fn legacy_name_is_recovered(address in arb_address(), name in arb_name()) {
        let record = decode_legacy_oob(&legacy_payload(&address, &name)).unwrap();
        prop_assert_eq!(record.address, Some(address));
        prop_assert_eq!(record.name, name);
    }

    /// Property: a legacy payload cut inside the address block is Truncated
    #[test]
    fn truncated_legacy_address_is_rejected(
        address in arb_address(),
        name in arb_name(),
        cut in 0usize..8,
    ) {
        let payload = legacy_payload(&address, &name);
        let result = decode_legacy_oob(&payload[..cut]);
        prop_assert!(matches!(result, Err(DecodeError::Truncated { .. })), "got {:?}", result);
    }

    /// Property: a legacy payload cut inside the name keeps the address and drops the name
    #[test]
    fn truncated_legacy_name_keeps_address(
        address in arb_address(),
        name in arb_name(),
        cut in 0usize..1000,
    ) {
        let payload = legacy_payload(&address, &name);
        let len = 8 + cut % (payload.len() - 8);
        let record = decode_legacy_oob(&payload[..len]).unwrap();
        prop_assert!(record.valid);
        prop_assert_eq!(record.address, Some(address));
        prop_assert_eq!(record.name, "");
    }

    /// Property: a central-only role makes the peer unusable wherever the role appears
    #[test]
    fn central_only_role_is_never_usable(
        address in arb_address(),
        name in arb_name(),
        role_first in any::<bool>(),
    ) {
        let mut address_field = vec![8u8, 0x1B];
        address_field.extend_from_slice(&address.to_reversed());
        address_field.push(0x00);
        let role_field = vec![2u8, 0x1C, 0x01];
        let mut name_field = vec![name.len() as u8 + 1, 0x09];
        name_field.extend_from_slice(name.as_bytes());

        let payload: Vec<u8> = if role_first {
            [role_field, address_field, name_field].concat()
        } else {
            [address_field, name_field, role_field].concat()
        };

        let record = decode_ble_oob(&payload).unwrap();
        prop_assert!(!record.valid);
        prop_assert!(!record.is_usable());
        prop_assert_eq!(record.role, Some(LeRole::CentralOnly));
    }

    /// Property: decoders reject garbage without panicking
    #[test]
    fn decoders_never_panic(bytes in prop::collection::vec(any::<u8>(), 0..300)) {
        let _ = decode_legacy_oob(&bytes);
        let _ = decode_ble_oob(&bytes);
        let _ = NdefMessage::parse(&bytes);
        let _ = SnepMessage::parse(&bytes);
        let _ = NppMessage::parse(&bytes);
    }

    /// Property: serialized messages parse back to the same records
    #[test]
    fn ndef_message_survives_serialization(message in arb_message()) {
        let bytes = message.to_bytes();
        prop_assert_eq!(NdefMessage::parse(&bytes).unwrap(), message);
    }

    /// Property: a serialized message cut short is rejected
    #[test]
    fn ndef_prefix_is_truncated(message in arb_message(), cut in 1usize..10_000) {
        let bytes = message.to_bytes();
        let len = cut % bytes.len();
        prop_assume!(len > 0);
        let result = NdefMessage::parse(&bytes[..len]);
        // a cut on a record boundary leaves a message without ME
        prop_assert!(result.is_err());
    }
}

#[test]
fn test_legacy_scenario_fixture() {
    // 02 00 <reversed address> 05 08 "Phone"
    let payload = hex::decode("0200ccbbaa221100050850686f6e65").unwrap();
    let record = decode_legacy_oob(&payload).unwrap();
    assert_eq!(record.address.unwrap().to_string(), "00:11:22:AA:BB:CC");
    assert!(record.is_usable());
    assert_eq!(record.name, "Phon");
}
