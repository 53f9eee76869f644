//! SNEP client, server and fragment messenger

use beamlink_core::{
    protocol::handover::incoming_handover,
    protocol::snep::{
        declared_length, SnepMessage, SnepRequest, SnepResponse, HEADER_LEN, VERSION_MAJOR,
    },
    ndef::MAX_PAYLOAD_SIZE,
    BoxedChannel, ChannelParams, DecodeError, LinkConfig, LinkProvider, LocalCarrier, NdefMessage,
    ReceivedPayload, TransportError,
};
use thiserror::Error;
use tracing::{debug, trace, warn};

use super::{InboundReport, ReportSender};

/// Failure while exchanging one SNEP message
#[derive(Debug, Error)]
pub enum SnepError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The peer completed a message that does not parse
    #[error("Bad SNEP message: {0}")]
    BadMessage(#[from] DecodeError),
    /// The peer announced more than this side buffers; already answered
    #[error("SNEP message of {length} bytes exceeds limit of {limit}")]
    ExcessData { length: u32, limit: u32 },
}

impl From<SnepError> for TransportError {
    fn from(err: SnepError) -> Self {
        match err {
            SnepError::Transport(err) => err,
            SnepError::BadMessage(err) => err.into(),
            SnepError::ExcessData { .. } => TransportError::protocol(err.to_string()),
        }
    }
}

// ----------------------------------------------------------------------------
// Messenger
// ----------------------------------------------------------------------------

/// Fragments outgoing messages and reassembles incoming ones
///
/// A message larger than one fragment is sent in two phases: the first
/// fragment, then the remainder once the receiver answers with CONTINUE.
pub struct SnepMessenger {
    channel: BoxedChannel,
    fragment_len: usize,
    is_client: bool,
    /// Largest information length buffered from the peer
    max_length: u32,
}

impl SnepMessenger {
    pub fn new(channel: BoxedChannel, fragment_len: usize, is_client: bool) -> Self {
        Self {
            channel,
            fragment_len: fragment_len.max(HEADER_LEN),
            is_client,
            max_length: MAX_PAYLOAD_SIZE as u32,
        }
    }

    pub fn with_max_length(mut self, max_length: u32) -> Self {
        self.max_length = max_length;
        self
    }

    /// CONTINUE code this side expects from the peer
    fn remote_continue(&self) -> u8 {
        if self.is_client {
            SnepResponse::Continue as u8
        } else {
            SnepRequest::Continue as u8
        }
    }

    fn local_continue(&self) -> u8 {
        if self.is_client {
            SnepRequest::Continue as u8
        } else {
            SnepResponse::Continue as u8
        }
    }

    fn local_reject(&self) -> u8 {
        if self.is_client {
            SnepRequest::Reject as u8
        } else {
            SnepResponse::Reject as u8
        }
    }

    /// Answer to an oversized message: a server reports EXCESS_DATA, a client rejects
    fn local_excess(&self) -> u8 {
        if self.is_client {
            SnepRequest::Reject as u8
        } else {
            SnepResponse::ExcessData as u8
        }
    }

    pub async fn send_message(&mut self, message: &SnepMessage) -> Result<(), SnepError> {
        let bytes = message.to_bytes();
        let first = bytes.len().min(self.fragment_len);
        trace!("Sending first {} of {} bytes", first, bytes.len());
        self.channel.send(&bytes[..first]).await?;

        if first == bytes.len() {
            return Ok(());
        }

        let mut header = vec![0u8; HEADER_LEN.max(self.channel.local_miu())];
        let size = self.channel.receive(&mut header).await?;
        if size == 0 {
            return Err(TransportError::Closed.into());
        }
        let reply = SnepMessage::parse(&header[..size])?;
        if reply.field != self.remote_continue() {
            return Err(TransportError::protocol(format!(
                "expected CONTINUE, got 0x{:02X}",
                reply.field
            ))
            .into());
        }

        for fragment in bytes[first..].chunks(self.fragment_len) {
            self.channel.send(fragment).await?;
        }
        Ok(())
    }

    pub async fn get_message(&mut self) -> Result<SnepMessage, SnepError> {
        let mut partial = vec![0u8; self.fragment_len.max(self.channel.local_miu())];

        let size = self.channel.receive(&mut partial).await?;
        if size < HEADER_LEN {
            self.reject().await;
            return Err(if size == 0 {
                TransportError::Closed
            } else {
                TransportError::protocol("fragment shorter than SNEP header")
            }
            .into());
        }

        let version = partial[0];
        let field = partial[1];
        let length = declared_length(&partial[..size]).unwrap_or(0);
        if version >> 4 != VERSION_MAJOR {
            // Unsupported major version: hand the header back for the caller to answer
            return Ok(SnepMessage {
                version,
                field,
                length: 0,
                acceptable_length: None,
                message: None,
            });
        }

        if length > self.max_length {
            warn!("Refusing {} byte SNEP message, limit {}", length, self.max_length);
            let answer = SnepMessage::control(self.local_excess()).to_bytes();
            if let Err(err) = self.channel.send(&answer).await {
                trace!("Could not refuse oversized message: {}", err);
            }
            return Err(SnepError::ExcessData {
                length,
                limit: self.max_length,
            });
        }

        let mut accumulated = partial[..size].to_vec();
        let expected = HEADER_LEN + length as usize;
        if accumulated.len() < expected {
            trace!("Requesting continuation of {} byte message", length);
            self.channel.send(&SnepMessage::control(self.local_continue()).to_bytes()).await?;
        }

        while accumulated.len() < expected {
            let size = self.channel.receive(&mut partial).await?;
            if size == 0 {
                self.reject().await;
                return Err(TransportError::Closed.into());
            }
            accumulated.extend_from_slice(&partial[..size]);
        }

        Ok(SnepMessage::parse(&accumulated)?)
    }

    async fn reject(&mut self) {
        let reject = SnepMessage::control(self.local_reject()).to_bytes();
        if let Err(err) = self.channel.send(&reject).await {
            trace!("Could not send reject: {}", err);
        }
    }

    pub async fn close(mut self) {
        self.channel.close().await;
    }
}

// ----------------------------------------------------------------------------
// Client
// ----------------------------------------------------------------------------

pub struct SnepClient {
    messenger: SnepMessenger,
    acceptable_length: u32,
}

impl SnepClient {
    pub async fn connect(
        provider: &dyn LinkProvider,
        config: &LinkConfig,
    ) -> Result<Self, TransportError> {
        let params = ChannelParams::new(config.miu, config.receive_window, config.buffer_len);
        let channel = provider.open_channel(&config.snep_service, params).await?;
        let fragment_len = channel.remote_miu();
        debug!("Connected to {}", config.snep_service.name);
        Ok(Self {
            messenger: SnepMessenger::new(channel, fragment_len, true)
                .with_max_length(config.snep_acceptable_length),
            acceptable_length: config.snep_acceptable_length,
        })
    }

    /// Push `message`; succeeds only if the server answers SUCCESS
    pub async fn put(&mut self, message: NdefMessage) -> Result<(), TransportError> {
        self.messenger
            .send_message(&SnepMessage::put_request(message))
            .await?;
        let response = self.messenger.get_message().await?;
        match response.response_code() {
            Some(SnepResponse::Success) => Ok(()),
            _ => Err(TransportError::protocol(format!(
                "PUT answered with 0x{:02X}",
                response.field
            ))),
        }
    }

    /// Send a GET carrying `request` and return the raw response
    pub async fn get(&mut self, request: NdefMessage) -> Result<SnepMessage, TransportError> {
        self.messenger
            .send_message(&SnepMessage::get_request(self.acceptable_length, request))
            .await?;
        Ok(self.messenger.get_message().await?)
    }

    pub async fn close(self) {
        self.messenger.close().await;
    }
}

// ----------------------------------------------------------------------------
// Server
// ----------------------------------------------------------------------------

#[derive(Clone)]
pub struct SnepServerContext {
    /// Carrier offered to handover GETs; `None` answers them NOT_IMPLEMENTED
    pub local: Option<LocalCarrier>,
    pub reports: ReportSender,
}

/// Answer SNEP requests on one accepted channel until the peer closes
pub async fn serve_snep(channel: BoxedChannel, ctx: SnepServerContext) {
    let fragment_len = channel.remote_miu();
    let mut messenger = SnepMessenger::new(channel, fragment_len, false);

    loop {
        match handle_request(&mut messenger, &ctx).await {
            Ok(true) => continue,
            Ok(false) => break,
            Err(err) => {
                debug!("SNEP connection ended: {}", err);
                break;
            }
        }
    }
    messenger.close().await;
}

async fn handle_request(
    messenger: &mut SnepMessenger,
    ctx: &SnepServerContext,
) -> Result<bool, SnepError> {
    let request = match messenger.get_message().await {
        Ok(request) => request,
        Err(SnepError::BadMessage(err)) => {
            warn!("Bad SNEP message: {}", err);
            messenger
                .send_message(&SnepMessage::response(SnepResponse::BadRequest))
                .await?;
            return Ok(false);
        }
        Err(SnepError::ExcessData { .. }) => return Ok(false),
        Err(err) => return Err(err),
    };

    let response = if !request.is_supported_version() {
        SnepMessage::response(SnepResponse::UnsupportedVersion)
    } else {
        match request.request() {
            Some(SnepRequest::Put) => do_put(request.message, ctx),
            Some(SnepRequest::Get) => do_get(request.message.as_ref(), ctx),
            _ => SnepMessage::response(SnepResponse::BadRequest),
        }
    };

    messenger.send_message(&response).await?;
    Ok(true)
}

fn do_put(message: Option<NdefMessage>, ctx: &SnepServerContext) -> SnepMessage {
    if let Some(message) = message {
        debug!("SNEP PUT with {} record(s)", message.records().len());
        let _ = ctx
            .reports
            .send(InboundReport::Received(ReceivedPayload::Message(message)));
    }
    SnepMessage::success(None)
}

fn do_get(message: Option<&NdefMessage>, ctx: &SnepServerContext) -> SnepMessage {
    let incoming = match (message, ctx.local.as_ref()) {
        (Some(request), Some(local)) => incoming_handover(request, local),
        _ => None,
    };
    let Some(incoming) = incoming else {
        return SnepMessage::response(SnepResponse::NotImplemented);
    };

    debug!("Answering handover request received over SNEP");
    let _ = ctx
        .reports
        .send(InboundReport::Received(ReceivedPayload::Handover(incoming.remote)));
    SnepMessage::success(Some(incoming.select))
}
