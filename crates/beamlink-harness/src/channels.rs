//! In-memory link channels
//!
//! A loopback pair behaves like one connection-oriented channel seen from
//! both ends: frames arrive whole and in order, frames above the peer's MIU
//! are refused, and closing one end makes the other read `Ok(0)` once the
//! frames already in flight are drained.

use async_trait::async_trait;
use beamlink_core::{LinkChannel, TransportError};
use tokio::sync::mpsc;

pub struct LoopbackChannel {
    outgoing: Option<mpsc::UnboundedSender<Vec<u8>>>,
    incoming: mpsc::UnboundedReceiver<Vec<u8>>,
    /// Rest of a frame that did not fit the caller's buffer
    pending: Vec<u8>,
    local_miu: usize,
    remote_miu: usize,
    closed: bool,
}

/// Two connected channel ends with the given receive MIUs
pub fn loopback_pair(miu_a: usize, miu_b: usize) -> (LoopbackChannel, LoopbackChannel) {
    let (a_tx, b_rx) = mpsc::unbounded_channel();
    let (b_tx, a_rx) = mpsc::unbounded_channel();
    (
        LoopbackChannel::new(a_tx, a_rx, miu_a, miu_b),
        LoopbackChannel::new(b_tx, b_rx, miu_b, miu_a),
    )
}

impl LoopbackChannel {
    fn new(
        outgoing: mpsc::UnboundedSender<Vec<u8>>,
        incoming: mpsc::UnboundedReceiver<Vec<u8>>,
        local_miu: usize,
        remote_miu: usize,
    ) -> Self {
        Self {
            outgoing: Some(outgoing),
            incoming,
            pending: Vec::new(),
            local_miu,
            remote_miu,
            closed: false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn drain_pending(&mut self, buf: &mut [u8]) -> usize {
        let len = self.pending.len().min(buf.len());
        buf[..len].copy_from_slice(&self.pending[..len]);
        self.pending.drain(..len);
        len
    }
}

#[async_trait]
impl LinkChannel for LoopbackChannel {
    async fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        if data.len() > self.remote_miu {
            return Err(TransportError::send_failed(format!(
                "{} byte frame exceeds peer miu {}",
                data.len(),
                self.remote_miu
            )));
        }
        let Some(outgoing) = self.outgoing.as_ref() else {
            return Err(TransportError::Closed);
        };
        outgoing
            .send(data.to_vec())
            .map_err(|_| TransportError::send_failed("peer closed"))
    }

    async fn receive(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        if !self.pending.is_empty() {
            return Ok(self.drain_pending(buf));
        }
        match self.incoming.recv().await {
            Some(frame) => {
                self.pending = frame;
                Ok(self.drain_pending(buf))
            }
            None => Ok(0),
        }
    }

    async fn close(&mut self) {
        self.closed = true;
        self.outgoing = None;
        self.incoming.close();
    }

    fn remote_miu(&self) -> usize {
        self.remote_miu
    }

    fn local_miu(&self) -> usize {
        self.local_miu
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frames_cross_in_order() {
        let (mut a, mut b) = loopback_pair(16, 16);
        a.send(b"one").await.unwrap();
        a.send(b"two").await.unwrap();

        let mut buf = [0u8; 16];
        let n = b.receive(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"one");
        let n = b.receive(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"two");
    }

    #[tokio::test]
    async fn test_oversized_frame_is_refused() {
        let (mut a, _b) = loopback_pair(16, 4);
        assert!(a.send(b"too long").await.is_err());
    }

    #[tokio::test]
    async fn test_close_is_seen_after_drain() {
        let (mut a, mut b) = loopback_pair(16, 16);
        a.send(b"last").await.unwrap();
        a.close().await;

        let mut buf = [0u8; 16];
        assert_eq!(b.receive(&mut buf).await.unwrap(), 4);
        assert_eq!(b.receive(&mut buf).await.unwrap(), 0);
        assert!(b.send(b"late").await.is_err());
        assert!(a.is_closed());
    }

    #[tokio::test]
    async fn test_small_buffer_reads_frame_in_pieces() {
        let (mut a, mut b) = loopback_pair(16, 16);
        a.send(b"abcdef").await.unwrap();

        let mut buf = [0u8; 4];
        assert_eq!(b.receive(&mut buf).await.unwrap(), 4);
        assert_eq!(&buf, b"abcd");
        assert_eq!(b.receive(&mut buf).await.unwrap(), 2);
        assert_eq!(&buf[..2], b"ef");
    }
}
