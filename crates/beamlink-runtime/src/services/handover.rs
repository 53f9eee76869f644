//! Connection handover service

use std::sync::Arc;

use beamlink_core::{
    protocol::handover::incoming_handover, BoxedChannel, ChannelParams, LinkConfig, LinkProvider,
    LocalCarrier, NdefMessage, OobTransferInitiator, ReceivedPayload, TransportError,
};
use tracing::{debug, warn};

use super::{receive_ndef, send_fragmented, InboundReport, ReportSender};

// ----------------------------------------------------------------------------
// Client
// ----------------------------------------------------------------------------

/// Outbound handover channel; good for exactly one request
pub struct HandoverClient {
    channel: BoxedChannel,
}

impl HandoverClient {
    pub async fn connect(
        provider: &dyn LinkProvider,
        config: &LinkConfig,
    ) -> Result<Self, TransportError> {
        let params = ChannelParams::new(config.miu, config.receive_window, config.buffer_len);
        let channel = provider.open_channel(&config.handover_service, params).await?;
        debug!("Connected to {}", config.handover_service.name);
        Ok(Self { channel })
    }

    /// Send `request` and wait for the select; the channel is closed afterwards
    ///
    /// Any failure, an early close or an unparsable reply yields `None`.
    pub async fn request(mut self, request: &NdefMessage) -> Option<NdefMessage> {
        let result = exchange(&mut self.channel, request).await;
        self.channel.close().await;

        match result {
            Ok(response) => response,
            Err(err) => {
                debug!("Handover request failed: {}", err);
                None
            }
        }
    }

    pub async fn close(mut self) {
        self.channel.close().await;
    }
}

async fn exchange(
    channel: &mut BoxedChannel,
    request: &NdefMessage,
) -> Result<Option<NdefMessage>, TransportError> {
    send_fragmented(channel, &request.to_bytes()).await?;
    receive_ndef(channel).await
}

// ----------------------------------------------------------------------------
// Server
// ----------------------------------------------------------------------------

/// What the handover server needs to answer requests
#[derive(Clone)]
pub struct HandoverServerContext {
    pub local: LocalCarrier,
    pub initiator: Arc<dyn OobTransferInitiator>,
    pub reports: ReportSender,
}

/// Answer handover requests on one accepted channel until the peer closes
pub async fn serve_handover(mut channel: BoxedChannel, ctx: HandoverServerContext) {
    if let Err(err) = handle_requests(&mut channel, &ctx).await {
        debug!("Handover connection ended: {}", err);
    }
    channel.close().await;
}

async fn handle_requests(
    channel: &mut BoxedChannel,
    ctx: &HandoverServerContext,
) -> Result<(), TransportError> {
    while let Some(request) = receive_ndef(channel).await? {
        if ctx.initiator.is_transfer_in_progress() {
            debug!("Transfer in progress, refusing handover");
            let _ = ctx.reports.send(InboundReport::HandoverBusy);
            return Ok(());
        }

        let Some(incoming) = incoming_handover(&request, &ctx.local) else {
            warn!("Could not build a handover select");
            return Ok(());
        };

        send_fragmented(channel, &incoming.select.to_bytes()).await?;
        let _ = ctx
            .reports
            .send(InboundReport::Received(ReceivedPayload::Handover(incoming.remote.clone())));

        if !ctx.initiator.start_receive(&incoming.remote) {
            debug!("Transfer initiator busy");
            let _ = ctx.reports.send(InboundReport::HandoverBusy);
            return Ok(());
        }
    }
    Ok(())
}
