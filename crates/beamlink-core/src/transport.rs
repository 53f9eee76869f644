//! Raw link channel abstraction
//!
//! The radio controller exposes connection-oriented channels addressed by
//! service name. Everything above this trait is transport agnostic, which
//! lets the harness substitute in-memory loopback channels.

use alloc::boxed::Box;
use async_trait::async_trait;

use crate::config::ServiceAddress;
use crate::errors::TransportError;

// ----------------------------------------------------------------------------
// Channel Trait
// ----------------------------------------------------------------------------

/// One connection-oriented channel over the peer link
#[async_trait]
pub trait LinkChannel: Send {
    /// Send one frame of at most `remote_miu()` bytes
    async fn send(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Receive one frame into `buf`; `Ok(0)` once the peer has closed
    async fn receive(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Close the channel; further calls fail with `Closed`
    async fn close(&mut self);

    /// Largest frame the peer accepts
    fn remote_miu(&self) -> usize;

    /// Largest frame this side accepts
    fn local_miu(&self) -> usize;
}

pub type BoxedChannel = Box<dyn LinkChannel>;

// ----------------------------------------------------------------------------
// Channel Provider
// ----------------------------------------------------------------------------

/// Parameters requested when opening a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelParams {
    pub miu: u16,
    pub window: u8,
    pub buffer_len: usize,
}

impl ChannelParams {
    pub fn new(miu: u16, window: u8, buffer_len: usize) -> Self {
        Self {
            miu,
            window,
            buffer_len,
        }
    }
}

/// Opens outbound channels on the active link
#[async_trait]
pub trait LinkProvider: Send + Sync {
    async fn open_channel(
        &self,
        service: &ServiceAddress,
        params: ChannelParams,
    ) -> Result<BoxedChannel, TransportError>;
}
