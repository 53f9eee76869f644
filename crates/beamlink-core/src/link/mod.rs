//! Peer link lifecycle
//!
//! [`LinkMachine`] is the pure `(link_state, send_state)` machine. It never
//! touches timers or sockets; instead every transition returns the
//! [`LinkEffect`]s its owner has to carry out.

pub mod intent;
pub mod state;

pub use intent::{default_outbound_intent, prepare_outbound_intent, PayloadRegistration};
pub use state::{
    AuditEntry, LinkEffect, LinkEvent, LinkMachine, LinkNotification, LinkState, LinkTransition,
    LinkTransitionError, OutboundIntent, PeerLink, SendOutcome, SendState, ServiceState,
};
