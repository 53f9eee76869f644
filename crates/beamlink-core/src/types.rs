//! Core types shared across the beamlink crates

use alloc::string::String;
use core::fmt;
use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::errors::BeamlinkError;

// ----------------------------------------------------------------------------
// Carrier Address
// ----------------------------------------------------------------------------

/// Six-byte secondary-radio address in canonical (textual) byte order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BluetoothAddress([u8; 6]);

impl BluetoothAddress {
    pub const LEN: usize = 6;

    pub fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }

    /// Bytes in the reversed order used on the wire
    pub fn to_reversed(&self) -> [u8; 6] {
        let mut bytes = self.0;
        bytes.reverse();
        bytes
    }

    /// Build an address from wire-order (reversed) bytes
    pub fn from_reversed(wire: [u8; 6]) -> Self {
        let mut bytes = wire;
        bytes.reverse();
        Self(bytes)
    }
}

impl fmt::Display for BluetoothAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

impl FromStr for BluetoothAddress {
    type Err = BeamlinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 6];
        let mut count = 0;
        for part in s.split(':') {
            if count == 6 || part.len() != 2 {
                return Err(BeamlinkError::invalid_address(s));
            }
            bytes[count] =
                u8::from_str_radix(part, 16).map_err(|_| BeamlinkError::invalid_address(s))?;
            count += 1;
        }
        if count != 6 {
            return Err(BeamlinkError::invalid_address(s));
        }
        Ok(Self(bytes))
    }
}

// ----------------------------------------------------------------------------
// Carrier Descriptors
// ----------------------------------------------------------------------------

/// Secondary transport flavor a handover record points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportKind {
    Classic,
    LowEnergy,
}

/// LE role advertised by a peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeRole {
    PeripheralOnly,
    CentralOnly,
    PeripheralPreferred,
    CentralPreferred,
}

impl LeRole {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(LeRole::PeripheralOnly),
            0x01 => Some(LeRole::CentralOnly),
            0x02 => Some(LeRole::PeripheralPreferred),
            0x03 => Some(LeRole::CentralPreferred),
            _ => None,
        }
    }
}

/// Carrier power state carried in alternate-carrier records (lower two bits)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CarrierPowerState {
    Inactive = 0,
    Active = 1,
    Activating = 2,
    Unknown = 3,
}

impl CarrierPowerState {
    pub fn from_bits(value: u8) -> Self {
        match value & 0x03 {
            0 => CarrierPowerState::Inactive,
            1 => CarrierPowerState::Active,
            2 => CarrierPowerState::Activating,
            _ => CarrierPowerState::Unknown,
        }
    }
}

// ----------------------------------------------------------------------------
// Link Services
// ----------------------------------------------------------------------------

/// The three outbound services a peer link can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkService {
    /// Connection handover negotiation
    Handover,
    /// Primary object exchange (SNEP)
    ObjectExchange,
    /// Legacy push (NPP)
    LegacyPush,
}

impl LinkService {
    pub fn service_name(&self) -> &'static str {
        match self {
            LinkService::Handover => "urn:nfc:sn:handover",
            LinkService::ObjectExchange => "urn:nfc:sn:snep",
            LinkService::LegacyPush => "com.android.npp",
        }
    }
}

impl fmt::Display for LinkService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.service_name())
    }
}

// ----------------------------------------------------------------------------
// Principals
// ----------------------------------------------------------------------------

/// Identifier of an application principal (a platform UID)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PrincipalId(pub u32);

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "uid:{}", self.0)
    }
}

/// Opaque identifier of a component able to handle dispatched content
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComponentId {
    pub package: String,
    pub name: String,
}

impl ComponentId {
    pub fn new(package: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.package, self.name)
    }
}

// ----------------------------------------------------------------------------
// Timestamp
// ----------------------------------------------------------------------------

/// Millisecond timestamp since Unix epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    pub fn new(millis: u64) -> Self {
        Self(millis)
    }

    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// Current wall-clock time
    pub fn now() -> Self {
        cfg_if::cfg_if! {
            if #[cfg(feature = "std")] {
                let millis = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .map(|d| d.as_millis() as u64)
                    .unwrap_or(0);
                Self(millis)
            } else {
                Self(0)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_parse_and_display() {
        let addr: BluetoothAddress = "00:11:22:AA:BB:CC".parse().unwrap();
        assert_eq!(addr.as_bytes(), &[0x00, 0x11, 0x22, 0xAA, 0xBB, 0xCC]);
        assert_eq!(addr.to_string(), "00:11:22:AA:BB:CC");
    }

    #[test]
    fn test_address_rejects_bad_input() {
        assert!("00:11:22:AA:BB".parse::<BluetoothAddress>().is_err());
        assert!("00:11:22:AA:BB:CC:DD".parse::<BluetoothAddress>().is_err());
        assert!("00:11:22:AA:BB:GG".parse::<BluetoothAddress>().is_err());
        assert!("0011:22:AA:BB:CC".parse::<BluetoothAddress>().is_err());
    }

    #[test]
    fn test_reversed_roundtrip() {
        let addr = BluetoothAddress::new([1, 2, 3, 4, 5, 6]);
        assert_eq!(addr.to_reversed(), [6, 5, 4, 3, 2, 1]);
        assert_eq!(BluetoothAddress::from_reversed(addr.to_reversed()), addr);
    }

    #[test]
    fn test_power_state_uses_low_bits() {
        assert_eq!(CarrierPowerState::from_bits(0x06), CarrierPowerState::Activating);
        assert_eq!(CarrierPowerState::from_bits(0x01), CarrierPowerState::Active);
    }
}
