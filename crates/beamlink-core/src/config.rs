//! Centralized Configuration Management
//!
//! Link timing, service addressing and dispatch policy. All structures are
//! serde-friendly so the CLI can load them from TOML.

use alloc::{
    string::{String, ToString},
    vec::Vec,
};
use core::time::Duration;
use serde::{Deserialize, Serialize};

use crate::errors::{BeamlinkError, Result};
use crate::link::SendState;
use crate::types::LinkService;

// ----------------------------------------------------------------------------
// Service Addressing
// ----------------------------------------------------------------------------

/// Name and service access point of one link service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceAddress {
    pub name: String,
    pub sap: u8,
}

impl ServiceAddress {
    pub fn new(name: &str, sap: u8) -> Self {
        Self {
            name: name.to_string(),
            sap,
        }
    }
}

// ----------------------------------------------------------------------------
// Debounce Configuration
// ----------------------------------------------------------------------------

/// Grace period after a link drop, keyed by what was being sent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebounceTimeouts {
    pub nothing_to_send: Duration,
    pub need_confirmation: Duration,
    pub sending: Duration,
    pub complete: Duration,
    pub canceled: Duration,
}

impl Default for DebounceTimeouts {
    fn default() -> Self {
        Self {
            nothing_to_send: Duration::from_millis(0),
            need_confirmation: Duration::from_millis(3000),
            sending: Duration::from_millis(5000),
            complete: Duration::from_millis(500),
            canceled: Duration::from_millis(250),
        }
    }
}

impl DebounceTimeouts {
    pub fn for_state(&self, state: SendState) -> Duration {
        match state {
            SendState::NothingToSend | SendState::Pending => self.nothing_to_send,
            SendState::NeedConfirmation => self.need_confirmation,
            SendState::Sending => self.sending,
            SendState::Complete => self.complete,
            SendState::Canceled => self.canceled,
        }
    }
}

// ----------------------------------------------------------------------------
// Link Configuration
// ----------------------------------------------------------------------------

/// Configuration for the peer link manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkConfig {
    pub debounce: DebounceTimeouts,
    /// How long a manual send waits for a link to come up
    pub wait_for_link: Duration,
    /// MIU requested when opening outbound channels
    pub miu: u16,
    pub receive_window: u8,
    pub buffer_len: usize,
    pub handover_service: ServiceAddress,
    pub snep_service: ServiceAddress,
    pub npp_service: ServiceAddress,
    /// Largest SNEP response this device accepts
    pub snep_acceptable_length: u32,
    pub send_enabled: bool,
    pub receive_enabled: bool,
    /// Number of state transitions kept for inspection
    pub audit_trail_len: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            debounce: DebounceTimeouts::default(),
            wait_for_link: Duration::from_millis(10_000),
            miu: 128,
            receive_window: 1,
            buffer_len: 1024,
            handover_service: ServiceAddress::new("urn:nfc:sn:handover", 0x14),
            snep_service: ServiceAddress::new("urn:nfc:sn:snep", 0x04),
            npp_service: ServiceAddress::new("com.android.npp", 0x10),
            snep_acceptable_length: 100 * 1024,
            send_enabled: true,
            receive_enabled: true,
            audit_trail_len: 256,
        }
    }
}

impl LinkConfig {
    /// Short timers for tests and simulations
    pub fn fast() -> Self {
        Self {
            debounce: DebounceTimeouts {
                nothing_to_send: Duration::from_millis(0),
                need_confirmation: Duration::from_millis(60),
                sending: Duration::from_millis(100),
                complete: Duration::from_millis(20),
                canceled: Duration::from_millis(10),
            },
            wait_for_link: Duration::from_millis(200),
            ..Self::default()
        }
    }

    pub fn with_debounce(mut self, debounce: DebounceTimeouts) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_wait_for_link(mut self, wait: Duration) -> Self {
        self.wait_for_link = wait;
        self
    }

    pub fn with_miu(mut self, miu: u16) -> Self {
        self.miu = miu;
        self
    }

    pub fn with_send_enabled(mut self, enabled: bool) -> Self {
        self.send_enabled = enabled;
        self
    }

    pub fn with_receive_enabled(mut self, enabled: bool) -> Self {
        self.receive_enabled = enabled;
        self
    }

    pub fn service_address(&self, service: LinkService) -> &ServiceAddress {
        match service {
            LinkService::Handover => &self.handover_service,
            LinkService::ObjectExchange => &self.snep_service,
            LinkService::LegacyPush => &self.npp_service,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.miu == 0 {
            return Err(BeamlinkError::invalid_configuration("miu must be non-zero"));
        }
        if self.buffer_len < self.miu as usize {
            return Err(BeamlinkError::invalid_configuration(
                "buffer_len must hold at least one miu",
            ));
        }
        if self.receive_window == 0 {
            return Err(BeamlinkError::invalid_configuration(
                "receive_window must be non-zero",
            ));
        }
        if self.audit_trail_len == 0 {
            return Err(BeamlinkError::invalid_configuration(
                "audit_trail_len must be non-zero",
            ));
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Dispatch Configuration
// ----------------------------------------------------------------------------

/// Policy for the inbound dispatcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Media types allowed through while in provisioning-only mode
    pub provisioning_mime_types: Vec<String>,
    /// Whether the device can pair with peripherals via handover tags
    pub peripheral_handover_supported: bool,
    /// Start in provisioning-only mode
    pub provisioning_only: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            provisioning_mime_types: alloc::vec![String::from(
                "application/com.android.managedprovisioning"
            )],
            peripheral_handover_supported: true,
            provisioning_only: false,
        }
    }
}

impl DispatchConfig {
    pub fn with_provisioning_only(mut self, enabled: bool) -> Self {
        self.provisioning_only = enabled;
        self
    }

    pub fn with_peripheral_handover(mut self, supported: bool) -> Self {
        self.peripheral_handover_supported = supported;
        self
    }

    pub fn is_provisioning_mime(&self, mime_type: &str) -> bool {
        self.provisioning_mime_types
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(mime_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debounce_by_send_state() {
        let debounce = DebounceTimeouts::default();
        assert_eq!(debounce.for_state(SendState::NothingToSend), Duration::ZERO);
        assert_eq!(debounce.for_state(SendState::NeedConfirmation), Duration::from_millis(3000));
        assert_eq!(debounce.for_state(SendState::Sending), Duration::from_millis(5000));
        assert_eq!(debounce.for_state(SendState::Complete), Duration::from_millis(500));
        assert_eq!(debounce.for_state(SendState::Canceled), Duration::from_millis(250));
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(LinkConfig::default().validate().is_ok());
        assert!(LinkConfig::fast().validate().is_ok());
        assert!(LinkConfig::default().with_miu(0).validate().is_err());
    }

    #[test]
    fn test_service_addresses() {
        let config = LinkConfig::default();
        assert_eq!(config.service_address(LinkService::ObjectExchange).sap, 4);
        assert_eq!(config.service_address(LinkService::LegacyPush).name, "com.android.npp");
    }
}
