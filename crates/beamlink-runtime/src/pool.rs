//! Outbound channel pool
//!
//! Holds the channels opened for one attempt cycle. The pool is moved as a
//! whole into the send worker, so no two workers ever share a channel.

use beamlink_core::{LinkConfig, LinkProvider, OutboundIntent, TransportError};
use tracing::debug;

use crate::services::{HandoverClient, NppClient, SnepClient};

// ----------------------------------------------------------------------------
// Transport Pool
// ----------------------------------------------------------------------------

/// Up to three outbound channels to the current peer
#[derive(Default)]
pub struct LinkTransportPool {
    handover: Option<HandoverClient>,
    snep: Option<SnepClient>,
    npp: Option<NppClient>,
}

impl LinkTransportPool {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Open the channels `intent` needs into this pool
    ///
    /// Content refs ask for a handover channel. A message, or a failed
    /// handover connect, asks for SNEP with NPP as the fallback when nothing
    /// else connected. Fails only if no channel at all could be opened.
    ///
    /// Channels land in the pool as they open, so a caller that stops
    /// awaiting part way can still close what was opened.
    pub async fn open(
        &mut self,
        provider: &dyn LinkProvider,
        config: &LinkConfig,
        intent: &OutboundIntent,
    ) -> Result<(), TransportError> {
        let needs_handover = intent.has_content_refs();
        let needs_ndef = intent.message.is_some();
        let mut last_error = None;

        if needs_handover {
            match HandoverClient::connect(provider, config).await {
                Ok(client) => self.handover = Some(client),
                Err(err) => {
                    debug!("Handover service unavailable: {}", err);
                    last_error = Some(err);
                }
            }
        }

        if needs_ndef || (needs_handover && self.handover.is_none()) {
            match SnepClient::connect(provider, config).await {
                Ok(client) => self.snep = Some(client),
                Err(err) => {
                    debug!("SNEP service unavailable: {}", err);
                    last_error = Some(err);
                }
            }

            if !self.is_connected() {
                match NppClient::connect(provider, config).await {
                    Ok(client) => self.npp = Some(client),
                    Err(err) => {
                        debug!("NPP service unavailable: {}", err);
                        last_error = Some(err);
                    }
                }
            }
        }

        if self.is_connected() {
            Ok(())
        } else {
            Err(last_error.unwrap_or_else(|| TransportError::protocol("nothing to connect")))
        }
    }

    pub fn is_connected(&self) -> bool {
        self.handover.is_some() || self.snep.is_some() || self.npp.is_some()
    }

    pub fn has_handover(&self) -> bool {
        self.handover.is_some()
    }

    pub fn has_snep(&self) -> bool {
        self.snep.is_some()
    }

    pub fn has_npp(&self) -> bool {
        self.npp.is_some()
    }

    pub fn take_handover(&mut self) -> Option<HandoverClient> {
        self.handover.take()
    }

    pub fn snep_mut(&mut self) -> Option<&mut SnepClient> {
        self.snep.as_mut()
    }

    pub fn take_npp(&mut self) -> Option<NppClient> {
        self.npp.take()
    }

    /// Close every channel still held
    pub async fn close(mut self) {
        if let Some(client) = self.handover.take() {
            client.close().await;
        }
        if let Some(client) = self.snep.take() {
            client.close().await;
        }
        if let Some(client) = self.npp.take() {
            client.close().await;
        }
    }
}

impl std::fmt::Debug for LinkTransportPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkTransportPool")
            .field("handover", &self.has_handover())
            .field("snep", &self.has_snep())
            .field("npp", &self.has_npp())
            .finish()
    }
}
