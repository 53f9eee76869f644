//! Background send workflow
//!
//! One pass over the pool's channels: handover for content refs, then the
//! message over SNEP or NPP. Nothing is retried; a failed tap is retried by
//! the user tapping again.

use beamlink_core::{
    protocol::handover::{build_handover_request, parse_bluetooth},
    protocol::snep::SnepResponse,
    LocalCarrier, NdefMessage, OobTransferInitiator, OutboundIntent, SendOutcome, TransferFailure,
};
use rand_core::RngCore;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::pool::LinkTransportPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandoverResult {
    Success,
    Failure,
    Unsupported,
    Busy,
}

/// Deliver `intent` over the channels in `pool`
///
/// Channels used up by the attempt are closed; the caller closes the pool
/// afterwards to release the rest.
pub async fn run_send<R: RngCore>(
    pool: &mut LinkTransportPool,
    intent: &OutboundIntent,
    local: Option<&LocalCarrier>,
    initiator: &dyn OobTransferInitiator,
    rng: &mut R,
) -> SendOutcome {
    let started = Instant::now();
    let mut failure = TransferFailure::Failed;
    let mut delivered = false;

    if intent.has_content_refs() {
        let result = match local {
            Some(local) => do_handover(pool, &intent.content_refs, local, initiator, rng).await,
            None => HandoverResult::Unsupported,
        };
        debug!("Handover result: {:?}", result);
        match result {
            HandoverResult::Success => delivered = true,
            HandoverResult::Failure => {}
            HandoverResult::Unsupported => failure = TransferFailure::HandoverUnsupported,
            HandoverResult::Busy => failure = TransferFailure::RemoteBusy,
        }
    }

    if !delivered {
        if let Some(message) = &intent.message {
            delivered = push_message(pool, message).await;
        }
    }

    if delivered {
        let elapsed = started.elapsed();
        info!("Transfer complete in {:?}", elapsed);
        SendOutcome::Complete { elapsed }
    } else {
        warn!("Transfer failed: {:?}", failure);
        SendOutcome::Failed(failure)
    }
}

async fn do_handover<R: RngCore>(
    pool: &mut LinkTransportPool,
    content_refs: &[String],
    local: &LocalCarrier,
    initiator: &dyn OobTransferInitiator,
    rng: &mut R,
) -> HandoverResult {
    if initiator.is_transfer_in_progress() {
        return HandoverResult::Busy;
    }

    let request = build_handover_request(local, rng);
    let mut response = None;
    if let Some(client) = pool.take_handover() {
        response = client.request(&request).await;
    }
    if response.is_none() {
        // peers without the handover service answer the request as a SNEP GET
        if let Some(snep) = pool.snep_mut() {
            match snep.get(request).await {
                Ok(reply) if reply.response_code() == Some(SnepResponse::Success) => {
                    response = reply.message;
                }
                Ok(reply) => debug!("SNEP GET answered with 0x{:02X}", reply.field),
                Err(err) => debug!("SNEP GET failed: {}", err),
            }
        }
    }
    let Some(response) = response else {
        return HandoverResult::Unsupported;
    };

    let carrier = match parse_bluetooth(&response) {
        Ok(Some(record)) if record.is_usable() => record,
        Ok(_) => {
            debug!("Handover select carries no usable carrier");
            return HandoverResult::Failure;
        }
        Err(err) => {
            debug!("Unparsable handover select: {}", err);
            return HandoverResult::Failure;
        }
    };

    if !initiator.start_send(&carrier, content_refs) {
        return HandoverResult::Busy;
    }
    HandoverResult::Success
}

async fn push_message(pool: &mut LinkTransportPool, message: &NdefMessage) -> bool {
    if let Some(snep) = pool.snep_mut() {
        match snep.put(message.clone()).await {
            Ok(()) => return true,
            Err(err) => debug!("SNEP PUT failed: {}", err),
        }
    }
    if let Some(npp) = pool.take_npp() {
        match npp.push(message.clone()).await {
            Ok(()) => return true,
            Err(err) => debug!("NPP push failed: {}", err),
        }
    }
    false
}
