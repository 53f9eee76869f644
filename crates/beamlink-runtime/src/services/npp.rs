//! Legacy NDEF push service
//!
//! One message per connection: the client writes the framed push and closes,
//! the server reads until the close and then parses.

use beamlink_core::{
    ndef::MAX_PAYLOAD_SIZE,
    protocol::npp::{declared_length, NppMessage},
    BoxedChannel, ChannelParams, LinkConfig, LinkProvider,
    NdefMessage, ReceivedPayload, TransportError,
};
use tracing::{debug, trace, warn};

use super::{send_fragmented, InboundReport, ReportSender};

/// Largest push frame buffered from one connection
const MAX_PUSH_LEN: usize = MAX_PAYLOAD_SIZE;

pub struct NppClient {
    channel: BoxedChannel,
}

impl NppClient {
    pub async fn connect(
        provider: &dyn LinkProvider,
        config: &LinkConfig,
    ) -> Result<Self, TransportError> {
        let params = ChannelParams::new(config.miu, config.receive_window, config.buffer_len);
        let channel = provider.open_channel(&config.npp_service, params).await?;
        debug!("Connected to {}", config.npp_service.name);
        Ok(Self { channel })
    }

    /// Push `message` for immediate handling; the channel is closed afterwards
    pub async fn push(mut self, message: NdefMessage) -> Result<(), TransportError> {
        let frame = NppMessage::immediate_push(message).to_bytes();
        let result = send_fragmented(&mut self.channel, &frame).await;
        self.channel.close().await;
        result
    }

    pub async fn close(mut self) {
        self.channel.close().await;
    }
}

/// Read one push from an accepted channel and report its immediate message
pub async fn serve_npp(mut channel: BoxedChannel, reports: ReportSender) {
    match read_until_closed(&mut channel).await {
        Ok(bytes) => match NppMessage::parse(&bytes) {
            Ok(push) => match push.immediate() {
                Some(message) => {
                    debug!("NPP push with {} record(s)", message.records().len());
                    let _ = reports.send(InboundReport::Received(ReceivedPayload::Message(
                        message.clone(),
                    )));
                }
                None => debug!("NPP push without an immediate message"),
            },
            Err(err) => warn!("Discarding malformed NPP push: {}", err),
        },
        Err(err) => debug!("NPP connection failed: {}", err),
    }
    channel.close().await;
}

async fn read_until_closed(channel: &mut BoxedChannel) -> Result<Vec<u8>, TransportError> {
    let mut partial = vec![0u8; channel.local_miu().max(1)];
    let mut accumulated = Vec::new();
    loop {
        let size = channel.receive(&mut partial).await?;
        if size == 0 {
            return Ok(accumulated);
        }
        trace!("NPP fragment of {} bytes", size);
        accumulated.extend_from_slice(&partial[..size]);

        let declared = declared_length(&accumulated).unwrap_or(0) as usize;
        if accumulated.len() > MAX_PUSH_LEN || declared > MAX_PUSH_LEN {
            return Err(TransportError::protocol(format!(
                "NPP push exceeds {} bytes",
                MAX_PUSH_LEN
            )));
        }
    }
}
