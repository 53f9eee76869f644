//! Scripted link provider
//!
//! Every opened channel is one end of a loopback pair; the other end is handed
//! out on the inbound receiver, tagged with the service it was opened for, so
//! a test (or the CLI simulation) can pass it to the peer's manager.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use beamlink_core::{
    BoxedChannel, ChannelParams, LinkProvider, LinkService, ServiceAddress, TransportError,
};
use tokio::sync::mpsc;

use crate::channels::loopback_pair;

pub type InboundReceiver = mpsc::UnboundedReceiver<(LinkService, BoxedChannel)>;

pub struct MockLinkProvider {
    remote_miu: usize,
    inbound: mpsc::UnboundedSender<(LinkService, BoxedChannel)>,
    refused: Mutex<HashSet<LinkService>>,
    stalled: Mutex<HashSet<LinkService>>,
    opened: Mutex<Vec<LinkService>>,
}

impl MockLinkProvider {
    /// Provider whose peer accepts frames of up to `remote_miu` bytes
    pub fn new(remote_miu: usize) -> (Self, InboundReceiver) {
        let (inbound, receiver) = mpsc::unbounded_channel();
        (
            Self {
                remote_miu,
                inbound,
                refused: Mutex::new(HashSet::new()),
                stalled: Mutex::new(HashSet::new()),
                opened: Mutex::new(Vec::new()),
            },
            receiver,
        )
    }

    /// Make the peer refuse connections to `service`
    pub fn refuse(&self, service: LinkService) {
        if let Ok(mut refused) = self.refused.lock() {
            refused.insert(service);
        }
    }

    /// Make connects to `service` hang until the caller gives up
    pub fn stall(&self, service: LinkService) {
        if let Ok(mut stalled) = self.stalled.lock() {
            stalled.insert(service);
        }
    }

    /// Services successfully opened so far, in order
    pub fn opened(&self) -> Vec<LinkService> {
        self.opened.lock().map(|opened| opened.clone()).unwrap_or_default()
    }

    fn is_refused(&self, service: LinkService) -> bool {
        self.refused
            .lock()
            .map(|refused| refused.contains(&service))
            .unwrap_or(false)
    }

    fn is_stalled(&self, service: LinkService) -> bool {
        self.stalled
            .lock()
            .map(|stalled| stalled.contains(&service))
            .unwrap_or(false)
    }
}

fn service_for(address: &ServiceAddress) -> Option<LinkService> {
    [
        LinkService::Handover,
        LinkService::ObjectExchange,
        LinkService::LegacyPush,
    ]
    .into_iter()
    .find(|service| service.service_name() == address.name)
}

#[async_trait]
impl LinkProvider for MockLinkProvider {
    async fn open_channel(
        &self,
        address: &ServiceAddress,
        params: ChannelParams,
    ) -> Result<BoxedChannel, TransportError> {
        let Some(service) = service_for(address) else {
            return Err(TransportError::connect_failed(&address.name, "unknown service"));
        };
        if self.is_refused(service) {
            return Err(TransportError::connect_failed(&address.name, "refused by peer"));
        }
        if self.is_stalled(service) {
            tracing::debug!("Stalling connect to {}", service);
            return std::future::pending().await;
        }

        let (local, remote) = loopback_pair(params.miu as usize, self.remote_miu);
        self.inbound
            .send((service, Box::new(remote)))
            .map_err(|_| TransportError::connect_failed(&address.name, "no peer listening"))?;
        if let Ok(mut opened) = self.opened.lock() {
            opened.push(service);
        }
        tracing::debug!("Opened loopback channel to {}", service);
        Ok(Box::new(local))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beamlink_core::LinkConfig;

    #[tokio::test]
    async fn test_opened_channel_reaches_peer() {
        let (provider, mut inbound) = MockLinkProvider::new(64);
        let config = LinkConfig::default();
        let params = ChannelParams::new(config.miu, 1, 1024);

        let mut channel = provider.open_channel(&config.snep_service, params).await.unwrap();
        let (service, mut peer) = inbound.recv().await.unwrap();
        assert_eq!(service, LinkService::ObjectExchange);
        assert_eq!(channel.remote_miu(), 64);
        assert_eq!(peer.remote_miu(), config.miu as usize);

        channel.send(b"ping").await.unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(peer.receive(&mut buf).await.unwrap(), 4);
        assert_eq!(provider.opened(), vec![LinkService::ObjectExchange]);
    }

    #[tokio::test]
    async fn test_refused_service_fails_to_connect() {
        let (provider, _inbound) = MockLinkProvider::new(64);
        provider.refuse(LinkService::Handover);
        let config = LinkConfig::default();
        let params = ChannelParams::new(config.miu, 1, 1024);

        let result = provider.open_channel(&config.handover_service, params).await;
        assert!(matches!(result, Err(TransportError::ConnectFailed { .. })));
        assert!(provider.opened().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_service_never_connects() {
        let (provider, _inbound) = MockLinkProvider::new(64);
        provider.stall(LinkService::ObjectExchange);
        let config = LinkConfig::default();
        let params = ChannelParams::new(config.miu, 1, 1024);

        let result = tokio::time::timeout(
            std::time::Duration::from_secs(30),
            provider.open_channel(&config.snep_service, params),
        )
        .await;
        assert!(result.is_err());
        assert!(provider.opened().is_empty());
    }
}
