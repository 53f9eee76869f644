//! Wire protocols carried over a peer link
//!
//! - [`handover`]: connection handover records and out-of-band carrier data
//! - [`snep`]: simple NDEF exchange protocol framing
//! - [`npp`]: legacy NDEF push framing
//! - [`barcode`]: compact barcode tag URL decoding
//! - [`wifi`]: network provisioning token parsing

pub mod barcode;
pub mod handover;
pub mod npp;
pub mod snep;
pub mod wifi;

pub use handover::{HandoverRecord, IncomingHandover, LocalCarrier};
pub use npp::{NppAction, NppMessage};
pub use snep::{SnepMessage, SnepRequest, SnepResponse};
pub use wifi::{NetworkAuth, NetworkCredential};
