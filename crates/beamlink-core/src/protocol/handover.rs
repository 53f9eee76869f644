//! Connection handover records
//!
//! Encodes the request / select messages used to delegate a transfer to the
//! secondary radio, and decodes the three out-of-band carrier layouts seen
//! in the field: the classic fixed-prefix layout, the LE sub-field layout and
//! the Nokia headset layout.
//!
//! Sub-fields are `len, type, value[len - 1]`. Multi-byte integers inside
//! sub-fields are big-endian; the two-byte length that opens a classic OOB
//! payload is little-endian and never read back.

use alloc::{
    string::{String, ToString},
    vec::Vec,
};
use rand_core::RngCore;
use serde::{Deserialize, Serialize};

use crate::codec::ByteReader;
use crate::errors::DecodeError;
use crate::ndef::{
    NdefMessage, NdefRecord, Tnf, RTD_ALTERNATIVE_CARRIER, RTD_COLLISION_RESOLUTION,
    RTD_HANDOVER_REQUEST, RTD_HANDOVER_SELECT,
};
use crate::types::{BluetoothAddress, CarrierPowerState, LeRole, TransportKind};
use crate::{debug, trace};

// ----------------------------------------------------------------------------
// Constants
// ----------------------------------------------------------------------------

/// Classic out-of-band carrier record type
pub const TYPE_BT_OOB: &str = "application/vnd.bluetooth.ep.oob";

/// LE out-of-band carrier record type
pub const TYPE_BLE_OOB: &str = "application/vnd.bluetooth.le.oob";

/// External type used by Nokia BH-505 era headsets
pub const TYPE_NOKIA: &[u8] = b"nokia.com:bt";

/// Connection handover version 1.2
pub const HANDOVER_VERSION: u8 = 0x12;

/// Record id linking the alternate-carrier entry to the OOB record
pub const CARRIER_ID: &[u8] = b"b";

pub const EIR_SHORT_LOCAL_NAME: u8 = 0x08;
pub const EIR_LONG_LOCAL_NAME: u8 = 0x09;
pub const EIR_LE_ADDRESS: u8 = 0x1B;
pub const EIR_LE_ROLE: u8 = 0x1C;

const LE_ROLE_CENTRAL_ONLY: u8 = 0x01;
const CLASSIC_OOB_LEN: usize = 8;
const NOKIA_NAME_LEN_OFFSET: usize = 14;

// ----------------------------------------------------------------------------
// Types
// ----------------------------------------------------------------------------

/// Parsed out-of-band carrier descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoverRecord {
    pub address: Option<BluetoothAddress>,
    /// Friendly name, empty when the peer sent none
    pub name: String,
    pub transport: TransportKind,
    pub activating: bool,
    pub role: Option<LeRole>,
    pub valid: bool,
}

impl HandoverRecord {
    fn classic(address: BluetoothAddress, name: String) -> Self {
        Self {
            address: Some(address),
            name,
            transport: TransportKind::Classic,
            activating: false,
            role: None,
            valid: true,
        }
    }

    /// LE peer that can only act as central; never usable for handover
    fn central_only() -> Self {
        Self {
            address: None,
            name: String::new(),
            transport: TransportKind::LowEnergy,
            activating: false,
            role: Some(LeRole::CentralOnly),
            valid: false,
        }
    }

    /// Whether a transfer can be handed to this carrier
    pub fn is_usable(&self) -> bool {
        self.valid && self.address.is_some()
    }
}

/// This device's secondary radio
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalCarrier {
    pub address: BluetoothAddress,
    /// Radio currently powered on
    pub enabled: bool,
}

impl LocalCarrier {
    pub fn new(address: BluetoothAddress, enabled: bool) -> Self {
        Self { address, enabled }
    }
}

/// A handover request that this device can answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingHandover {
    /// Select message to send back
    pub select: NdefMessage,
    /// The requesting peer's carrier
    pub remote: HandoverRecord,
}

// ----------------------------------------------------------------------------
// Encoding
// ----------------------------------------------------------------------------

/// Classic OOB payload: LE length placeholder then the reversed address
pub fn encode_carrier_address(address: &BluetoothAddress) -> Vec<u8> {
    let mut payload = Vec::with_capacity(CLASSIC_OOB_LEN);
    payload.extend_from_slice(&(CLASSIC_OOB_LEN as u16).to_le_bytes());
    payload.extend_from_slice(&address.to_reversed());
    payload
}

/// Collision-resolution record carrying two random bytes
pub fn collision_record<R: RngCore>(rng: &mut R) -> NdefRecord {
    let mut random = [0u8; 2];
    rng.fill_bytes(&mut random);
    NdefRecord::well_known(RTD_COLLISION_RESOLUTION, random.to_vec())
}

/// Alternate-carrier record pointing at the OOB record with id `b`
pub fn alternate_carrier_record(activating: bool) -> NdefRecord {
    let power_state = if activating {
        CarrierPowerState::Activating
    } else {
        CarrierPowerState::Active
    };
    let payload = alloc::vec![power_state as u8, CARRIER_ID.len() as u8, CARRIER_ID[0], 0];
    NdefRecord::well_known(RTD_ALTERNATIVE_CARRIER, payload)
}

/// Classic OOB record describing the local radio
pub fn carrier_oob_record(local: &LocalCarrier) -> NdefRecord {
    NdefRecord::new(
        Tnf::MimeMedia,
        TYPE_BT_OOB.as_bytes(),
        CARRIER_ID,
        encode_carrier_address(&local.address),
    )
}

fn versioned_payload(nested: &NdefMessage) -> Vec<u8> {
    let nested = nested.to_bytes();
    let mut payload = Vec::with_capacity(nested.len() + 1);
    payload.push(HANDOVER_VERSION);
    payload.extend_from_slice(&nested);
    payload
}

/// `[Hr(version, [cr, ac(active)]), oob]`
pub fn build_handover_request<R: RngCore>(local: &LocalCarrier, rng: &mut R) -> NdefMessage {
    let nested = NdefMessage::from_records(alloc::vec![
        collision_record(rng),
        alternate_carrier_record(false),
    ]);
    let request = NdefRecord::well_known(RTD_HANDOVER_REQUEST, versioned_payload(&nested));
    NdefMessage::from_records(alloc::vec![request, carrier_oob_record(local)])
}

/// `[Hs(version, [ac]), oob]`
pub fn build_handover_select(local: &LocalCarrier, activating: bool) -> NdefMessage {
    let nested = NdefMessage::from_records(alloc::vec![alternate_carrier_record(activating)]);
    let select = NdefRecord::well_known(RTD_HANDOVER_SELECT, versioned_payload(&nested));
    NdefMessage::from_records(alloc::vec![select, carrier_oob_record(local)])
}

// ----------------------------------------------------------------------------
// Decoding
// ----------------------------------------------------------------------------

/// Next `(type, value)` sub-field; a zero length marks trailing padding
fn next_field<'a>(reader: &mut ByteReader<'a>) -> Result<Option<(u8, &'a [u8])>, DecodeError> {
    if reader.is_empty() {
        return Ok(None);
    }
    let len = reader.read_u8()? as usize;
    if len == 0 {
        return Ok(None);
    }
    let field = reader.read_bytes(len)?;
    Ok(Some((field[0], &field[1..])))
}

fn decode_name(value: &[u8]) -> String {
    String::from_utf8_lossy(value).into_owned()
}

/// Classic OOB payload
pub fn decode_legacy_oob(payload: &[u8]) -> Result<HandoverRecord, DecodeError> {
    let mut reader = ByteReader::new(payload);
    reader.skip(2)?;
    let address = BluetoothAddress::from_reversed(reader.read_array::<6>()?);

    let mut short_name = None;
    let mut long_name = None;
    // once the address is in, a sub-field cut short ends the walk and keeps what was read
    loop {
        let (field_type, value) = match next_field(&mut reader) {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(error) => {
                debug!("classic oob: trailing sub-field cut short: {:?}", error);
                break;
            }
        };
        match field_type {
            EIR_SHORT_LOCAL_NAME => short_name = Some(decode_name(value)),
            EIR_LONG_LOCAL_NAME => {
                if long_name.is_none() {
                    long_name = Some(decode_name(value));
                }
            }
            other => trace!("classic oob: skipping sub-field 0x{:02x}", other),
        }
    }

    let name = short_name.or(long_name).unwrap_or_default();
    Ok(HandoverRecord::classic(address, name))
}

/// LE OOB payload
pub fn decode_ble_oob(payload: &[u8]) -> Result<HandoverRecord, DecodeError> {
    let mut reader = ByteReader::new(payload);
    let mut address = None;
    let mut role = None;
    let mut name = None;

    while let Some((field_type, value)) = next_field(&mut reader)? {
        let mut field = ByteReader::new(value);
        match field_type {
            EIR_LE_ADDRESS => {
                let wire = field.read_array::<6>()?;
                // address type byte follows, not stored
                field.skip(1)?;
                address = Some(BluetoothAddress::from_reversed(wire));
            }
            EIR_LE_ROLE => {
                let raw = field.read_u8()?;
                if raw == LE_ROLE_CENTRAL_ONLY {
                    debug!("le oob: peer is central-only");
                    return Ok(HandoverRecord::central_only());
                }
                role = LeRole::from_u8(raw);
            }
            // only the complete name counts here; a shortened one is skipped
            EIR_LONG_LOCAL_NAME => name = Some(decode_name(value)),
            other => trace!("le oob: skipping sub-field 0x{:02x}", other),
        }
    }

    Ok(HandoverRecord {
        valid: address.is_some(),
        address,
        name: name.unwrap_or_default(),
        transport: TransportKind::LowEnergy,
        activating: false,
        role,
    })
}

/// Nokia external record: address at offset 1 (not reversed), name length at 14
pub fn decode_nokia_legacy(payload: &[u8]) -> Result<HandoverRecord, DecodeError> {
    let mut reader = ByteReader::new(payload);
    reader.skip(1)?;
    let address = BluetoothAddress::new(reader.read_array::<6>()?);
    reader.skip(NOKIA_NAME_LEN_OFFSET - reader.position())?;
    let name_len = reader.read_u8()? as usize;
    let name = decode_name(reader.read_bytes(name_len)?);
    Ok(HandoverRecord::classic(address, name))
}

// ----------------------------------------------------------------------------
// Message Interpretation
// ----------------------------------------------------------------------------

/// Whether the `ac` entry referencing `carrier_id` inside a select record is
/// activating. With no matching reference the carrier is assumed activating.
pub fn is_carrier_activating(handover_select: &NdefRecord, carrier_id: &[u8]) -> bool {
    let payload = &handover_select.payload;
    if payload.len() <= 1 {
        return false;
    }
    let nested = match NdefMessage::parse(&payload[1..]) {
        Ok(nested) => nested,
        Err(_) => return false,
    };

    for alternate in nested
        .records()
        .iter()
        .filter(|record| record.is_well_known(RTD_ALTERNATIVE_CARRIER))
    {
        let mut reader = ByteReader::new(&alternate.payload);
        let (Ok(power_state), Ok(reference_len)) = (reader.read_u8(), reader.read_u8()) else {
            return false;
        };
        if reference_len as usize != carrier_id.len() {
            return false;
        }
        let Ok(reference) = reader.read_bytes(reference_len as usize) else {
            return false;
        };
        if reference == carrier_id {
            return CarrierPowerState::from_bits(power_state) == CarrierPowerState::Activating;
        }
    }

    true
}

fn parse_handover_select(message: &NdefMessage) -> Result<Option<HandoverRecord>, DecodeError> {
    let select = message.first();
    for record in message.records() {
        if record.is_mime(TYPE_BT_OOB) {
            match decode_legacy_oob(&record.payload) {
                Ok(mut data) => {
                    if is_carrier_activating(select, &record.id) {
                        data.activating = true;
                    }
                    return Ok(Some(data));
                }
                Err(err) if err.is_truncated() => {
                    debug!("handover select: dropping truncated classic oob record");
                    continue;
                }
                Err(err) => return Err(err),
            }
        }
        if record.is_mime(TYPE_BLE_OOB) {
            match decode_ble_oob(&record.payload) {
                Ok(data) => return Ok(Some(data)),
                Err(err) if err.is_truncated() => {
                    debug!("handover select: dropping truncated le oob record");
                    continue;
                }
                Err(err) => return Err(err),
            }
        }
    }
    Ok(None)
}

/// Interpret a message as a carrier description, based on its first record
pub fn parse_bluetooth(message: &NdefMessage) -> Result<Option<HandoverRecord>, DecodeError> {
    let first = message.first();

    if first.is_mime(TYPE_BT_OOB) {
        return decode_legacy_oob(&first.payload).map(Some);
    }
    if first.is_mime(TYPE_BLE_OOB) {
        return decode_ble_oob(&first.payload).map(Some);
    }
    if first.is_well_known(RTD_HANDOVER_SELECT) {
        return parse_handover_select(message);
    }
    if first.is_external(TYPE_NOKIA) {
        return decode_nokia_legacy(&first.payload).map(Some);
    }
    Ok(None)
}

pub fn is_handover_request(message: &NdefMessage) -> bool {
    message.first().is_well_known(RTD_HANDOVER_REQUEST)
}

/// Answer an inbound handover request, if it names a usable classic carrier
pub fn incoming_handover(request: &NdefMessage, local: &LocalCarrier) -> Option<IncomingHandover> {
    if !is_handover_request(request) {
        return None;
    }

    let remote = request
        .records()
        .iter()
        .filter(|record| record.is_mime(TYPE_BT_OOB))
        .filter_map(|record| decode_legacy_oob(&record.payload).ok())
        .find(|data| data.valid)?;

    debug!(
        "incoming handover from {}",
        remote
            .address
            .map(|address| address.to_string())
            .unwrap_or_default()
    );

    Some(IncomingHandover {
        select: build_handover_select(local, !local.enabled),
        remote,
    })
}
