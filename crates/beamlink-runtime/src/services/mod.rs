//! Link services
//!
//! Client and server halves of the three services spoken over a peer link:
//! connection handover, SNEP and the legacy NPP push. Servers handle one
//! accepted channel each and report what they received through an
//! [`InboundReport`] channel; they never touch link state directly.

use beamlink_core::{
    errors::DecodeError, BoxedChannel, NdefMessage, ReceivedPayload, TransportError,
};
use tokio::sync::mpsc;
use tracing::trace;

pub mod handover;
pub mod npp;
pub mod snep;

pub use handover::{serve_handover, HandoverClient, HandoverServerContext};
pub use npp::{serve_npp, NppClient};
pub use snep::{serve_snep, SnepClient, SnepError, SnepMessenger, SnepServerContext};

// ----------------------------------------------------------------------------
// Inbound Reports
// ----------------------------------------------------------------------------

/// What an inbound service handler observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundReport {
    Received(ReceivedPayload),
    /// A handover request was refused because a transfer is running
    HandoverBusy,
}

pub type ReportSender = mpsc::UnboundedSender<InboundReport>;
pub type ReportReceiver = mpsc::UnboundedReceiver<InboundReport>;

pub fn report_channel() -> (ReportSender, ReportReceiver) {
    mpsc::unbounded_channel()
}

// ----------------------------------------------------------------------------
// Framing Helpers
// ----------------------------------------------------------------------------

/// Send `bytes` in fragments no larger than the peer's MIU
pub(crate) async fn send_fragmented(
    channel: &mut BoxedChannel,
    bytes: &[u8],
) -> Result<(), TransportError> {
    let miu = channel.remote_miu().max(1);
    for fragment in bytes.chunks(miu) {
        trace!("Sending {} byte fragment", fragment.len());
        channel.send(fragment).await?;
    }
    Ok(())
}

/// Accumulate frames until they form a complete NDEF message
///
/// `Ok(None)` when the peer closes first or the bytes can never parse.
pub(crate) async fn receive_ndef(
    channel: &mut BoxedChannel,
) -> Result<Option<NdefMessage>, TransportError> {
    let mut partial = vec![0u8; channel.local_miu().max(1)];
    let mut accumulated = Vec::new();

    loop {
        let size = channel.receive(&mut partial).await?;
        if size == 0 {
            return Ok(None);
        }
        accumulated.extend_from_slice(&partial[..size]);

        match NdefMessage::parse(&accumulated) {
            Ok(message) => return Ok(Some(message)),
            Err(DecodeError::Truncated { .. }) => continue,
            Err(err) => {
                trace!("Discarding unparsable message: {}", err);
                return Ok(None);
            }
        }
    }
}
