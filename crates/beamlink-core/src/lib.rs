//! Beamlink Core
//!
//! Pure building blocks of the proximity exchange engine: the NDEF record
//! codec, handover / SNEP / NPP framing, the link lifecycle state machine and
//! the inbound dispatch pipeline. Nothing in this crate performs I/O; the
//! collaborator traits in [`transport`] and [`events`] are implemented by the
//! runtime and by the host platform.
//!
//! The crate is `no_std` compatible (with `alloc`) when the default `std`
//! feature is disabled.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod codec;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod events;
pub mod link;
pub mod ndef;
pub mod protocol;
pub mod transport;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use config::{DispatchConfig, LinkConfig, ServiceAddress};
pub use dispatch::{
    CapabilityResolver, ConfigurationPrompt, ContentFilter, Destination, DiscoveredTarget,
    DispatchAction, DispatchCandidate, DispatchIntent, DispatchOutcome, DispatchSink,
    InboundDispatcher, OverrideRegistration, StepOutcome, UnlockRegistry,
};
pub use errors::{BeamlinkError, DecodeError, Result, TransportError};
pub use events::{
    ForegroundPayloadProvider, ForegroundQuery, LinkEventListener, OobTransferInitiator,
    ReceivedPayload, TransferFailure,
};
pub use link::{
    default_outbound_intent, prepare_outbound_intent, AuditEntry, LinkEffect, LinkEvent,
    LinkMachine, LinkNotification, LinkState, LinkTransition, LinkTransitionError,
    OutboundIntent, PayloadRegistration, PeerLink, SendOutcome, SendState, ServiceState,
};
pub use ndef::{NdefMessage, NdefRecord, Tnf};
pub use protocol::handover::{HandoverRecord, IncomingHandover, LocalCarrier};
pub use transport::{BoxedChannel, ChannelParams, LinkChannel, LinkProvider};
pub use types::{
    BluetoothAddress, CarrierPowerState, ComponentId, LeRole, LinkService, PrincipalId,
    Timestamp, TransportKind,
};

// ----------------------------------------------------------------------------
// Logging
// ----------------------------------------------------------------------------

cfg_if::cfg_if! {
    if #[cfg(feature = "std")] {
        #[allow(unused_imports)]
        pub(crate) use tracing::{debug, info, trace, warn};
    } else {
        #[allow(unused_imports)]
        pub(crate) use log::{debug, info, trace, warn};
    }
}
