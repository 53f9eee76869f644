//! Collaborator interfaces and produced notifications
//!
//! The host platform supplies foreground tracking, payload providers and the
//! out-of-band transfer machinery; the engine reports progress through
//! [`LinkEventListener`].

use alloc::{string::String, vec::Vec};
use core::time::Duration;

use crate::link::OutboundIntent;
use crate::ndef::NdefMessage;
use crate::protocol::handover::HandoverRecord;
use crate::types::PrincipalId;

// ----------------------------------------------------------------------------
// Outcomes
// ----------------------------------------------------------------------------

/// User-visible failure classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TransferFailure {
    /// Peer offered no usable handover carrier
    HandoverUnsupported,
    /// An out-of-band transfer is already running on either side
    RemoteBusy,
    Failed,
}

/// What arrived from the peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceivedPayload {
    /// Peer requested a handover; the transfer continues out of band
    Handover(HandoverRecord),
    /// Peer pushed a message directly
    Message(NdefMessage),
}

// ----------------------------------------------------------------------------
// Listener
// ----------------------------------------------------------------------------

/// Notifications produced by the link manager
///
/// All methods default to no-ops so implementors pick what they need.
pub trait LinkEventListener: Send + Sync {
    fn on_peer_in_range(&self) {}
    fn on_peer_out_of_range(&self) {}
    fn on_confirmation_required(&self) {}
    fn on_transfer_complete(&self, _elapsed: Duration) {}
    fn on_transfer_failed(&self, _reason: TransferFailure) {}
    fn on_tap_requested(&self) {}
    fn on_timeout_waiting_for_link(&self) {}
    fn on_send_debounce(&self) {}
    fn on_resume_send(&self) {}
    fn on_receive_complete(&self, _payload: ReceivedPayload) {}
}

// ----------------------------------------------------------------------------
// Platform Collaborators
// ----------------------------------------------------------------------------

/// Application-registered source of outbound payloads
pub trait ForegroundPayloadProvider: Send + Sync {
    fn outbound_intent(&self, peer_protocol_version: u8) -> Option<OutboundIntent>;
}

/// Which principals are currently in the foreground
pub trait ForegroundQuery: Send + Sync {
    fn is_frontmost(&self, principal: PrincipalId) -> bool;

    fn frontmost_principals(&self) -> Vec<PrincipalId>;

    /// Package installed under `principal`
    fn package_for(&self, _principal: PrincipalId) -> Option<String> {
        None
    }

    /// Package opted out of the default "share this app" payload
    fn default_sharing_disabled(&self, _package: &str) -> bool {
        false
    }

    /// Policy forbids outbound sharing for the user owning `principal`
    fn outbound_restricted(&self, _principal: PrincipalId) -> bool {
        false
    }
}

/// Out-of-band transfer machinery on the secondary radio
pub trait OobTransferInitiator: Send + Sync {
    fn is_transfer_in_progress(&self) -> bool;

    /// Start pushing `content` to `carrier`; false when busy
    fn start_send(&self, carrier: &HandoverRecord, content: &[String]) -> bool;

    /// Prepare to receive from `carrier`; false when busy
    fn start_receive(&self, carrier: &HandoverRecord) -> bool;
}
