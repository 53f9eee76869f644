//! Stub host collaborators
//!
//! Each stub is configured up front and records what the engine asked of it,
//! so tests can assert on both sides of every callback.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use beamlink_core::{
    protocol::wifi::NetworkCredential, CapabilityResolver, ComponentId, ConfigurationPrompt,
    Destination, DiscoveredTarget, DispatchCandidate, DispatchIntent, DispatchOutcome,
    DispatchSink, ForegroundPayloadProvider, ForegroundQuery, HandoverRecord, LinkEventListener,
    OobTransferInitiator, OutboundIntent, PrincipalId, ReceivedPayload, TransferFailure,
    UnlockRegistry,
};
use tokio::sync::Notify;

// ----------------------------------------------------------------------------
// Event Listener
// ----------------------------------------------------------------------------

/// Listener callback as recorded; elapsed times are dropped so sequences compare
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedEvent {
    PeerInRange,
    PeerOutOfRange,
    ConfirmationRequired,
    TransferComplete,
    TransferFailed(TransferFailure),
    TapRequested,
    TimeoutWaitingForLink,
    SendDebounce,
    ResumeSend,
    ReceiveComplete(ReceivedPayload),
}

#[derive(Default)]
pub struct RecordingListener {
    events: Mutex<Vec<RecordedEvent>>,
    changed: Notify,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }

    pub fn contains(&self, event: &RecordedEvent) -> bool {
        self.events().contains(event)
    }

    /// Wait until `event` has been recorded; false after `timeout`
    pub async fn wait_for(&self, event: &RecordedEvent, timeout: Duration) -> bool {
        self.wait_until(timeout, |events| events.contains(event)).await
    }

    /// Wait until `done` holds for the recorded events; false after `timeout`
    pub async fn wait_until<F>(&self, timeout: Duration, done: F) -> bool
    where
        F: Fn(&[RecordedEvent]) -> bool,
    {
        tokio::time::timeout(timeout, async {
            loop {
                let notified = self.changed.notified();
                if done(&self.events()) {
                    return;
                }
                notified.await;
            }
        })
        .await
        .is_ok()
    }

    fn record(&self, event: RecordedEvent) {
        tracing::trace!("Listener saw {:?}", event);
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
        self.changed.notify_waiters();
    }
}

impl LinkEventListener for RecordingListener {
    fn on_peer_in_range(&self) {
        self.record(RecordedEvent::PeerInRange);
    }

    fn on_peer_out_of_range(&self) {
        self.record(RecordedEvent::PeerOutOfRange);
    }

    fn on_confirmation_required(&self) {
        self.record(RecordedEvent::ConfirmationRequired);
    }

    fn on_transfer_complete(&self, _elapsed: Duration) {
        self.record(RecordedEvent::TransferComplete);
    }

    fn on_transfer_failed(&self, reason: TransferFailure) {
        self.record(RecordedEvent::TransferFailed(reason));
    }

    fn on_tap_requested(&self) {
        self.record(RecordedEvent::TapRequested);
    }

    fn on_timeout_waiting_for_link(&self) {
        self.record(RecordedEvent::TimeoutWaitingForLink);
    }

    fn on_send_debounce(&self) {
        self.record(RecordedEvent::SendDebounce);
    }

    fn on_resume_send(&self) {
        self.record(RecordedEvent::ResumeSend);
    }

    fn on_receive_complete(&self, payload: ReceivedPayload) {
        self.record(RecordedEvent::ReceiveComplete(payload));
    }
}

// ----------------------------------------------------------------------------
// Foreground
// ----------------------------------------------------------------------------

/// Fixed foreground principal list
#[derive(Default)]
pub struct StubForeground {
    principals: Vec<PrincipalId>,
    packages: HashMap<PrincipalId, String>,
    sharing_disabled: bool,
}

impl StubForeground {
    /// Nothing in front
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(principal: PrincipalId, package: &str) -> Self {
        let mut packages = HashMap::new();
        packages.insert(principal, package.to_string());
        Self {
            principals: vec![principal],
            packages,
            sharing_disabled: false,
        }
    }

    pub fn with_sharing_disabled(mut self) -> Self {
        self.sharing_disabled = true;
        self
    }
}

impl ForegroundQuery for StubForeground {
    fn is_frontmost(&self, principal: PrincipalId) -> bool {
        self.principals.contains(&principal)
    }

    fn frontmost_principals(&self) -> Vec<PrincipalId> {
        self.principals.clone()
    }

    fn package_for(&self, principal: PrincipalId) -> Option<String> {
        self.packages.get(&principal).cloned()
    }

    fn default_sharing_disabled(&self, _package: &str) -> bool {
        self.sharing_disabled
    }
}

/// Provider handing out the same intent every time
pub struct StaticPayloadProvider {
    intent: Option<OutboundIntent>,
    requests: AtomicUsize,
}

impl StaticPayloadProvider {
    pub fn new(intent: Option<OutboundIntent>) -> Self {
        Self {
            intent,
            requests: AtomicUsize::new(0),
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl ForegroundPayloadProvider for StaticPayloadProvider {
    fn outbound_intent(&self, _peer_protocol_version: u8) -> Option<OutboundIntent> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.intent.clone()
    }
}

// ----------------------------------------------------------------------------
// Out-of-band Transfers
// ----------------------------------------------------------------------------

/// Transfer initiator that accepts (or refuses) every request and keeps them
pub struct StubTransferInitiator {
    in_progress: AtomicBool,
    accept: AtomicBool,
    sends: Mutex<Vec<(HandoverRecord, Vec<String>)>>,
    receives: Mutex<Vec<HandoverRecord>>,
}

impl Default for StubTransferInitiator {
    fn default() -> Self {
        Self {
            in_progress: AtomicBool::new(false),
            accept: AtomicBool::new(true),
            sends: Mutex::new(Vec::new()),
            receives: Mutex::new(Vec::new()),
        }
    }
}

impl StubTransferInitiator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_in_progress(&self, in_progress: bool) {
        self.in_progress.store(in_progress, Ordering::SeqCst);
    }

    pub fn set_accept(&self, accept: bool) {
        self.accept.store(accept, Ordering::SeqCst);
    }

    pub fn sends(&self) -> Vec<(HandoverRecord, Vec<String>)> {
        self.sends.lock().map(|sends| sends.clone()).unwrap_or_default()
    }

    pub fn receives(&self) -> Vec<HandoverRecord> {
        self.receives
            .lock()
            .map(|receives| receives.clone())
            .unwrap_or_default()
    }
}

impl OobTransferInitiator for StubTransferInitiator {
    fn is_transfer_in_progress(&self) -> bool {
        self.in_progress.load(Ordering::SeqCst)
    }

    fn start_send(&self, carrier: &HandoverRecord, content: &[String]) -> bool {
        if let Ok(mut sends) = self.sends.lock() {
            sends.push((carrier.clone(), content.to_vec()));
        }
        self.accept.load(Ordering::SeqCst)
    }

    fn start_receive(&self, carrier: &HandoverRecord) -> bool {
        if let Ok(mut receives) = self.receives.lock() {
            receives.push(carrier.clone());
        }
        self.accept.load(Ordering::SeqCst)
    }
}

// ----------------------------------------------------------------------------
// Dispatch
// ----------------------------------------------------------------------------

/// Resolver over a fixed registry
#[derive(Default)]
pub struct StubResolver {
    candidates: Vec<DispatchCandidate>,
    /// Handlers keyed by URI prefix or mime type
    content: Vec<(String, ComponentId)>,
    tag_handler: Option<ComponentId>,
    /// Packages with a launch entry point
    installed: Vec<String>,
}

impl StubResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_candidate(mut self, tags: &[&str], component: ComponentId) -> Self {
        self.candidates.push(DispatchCandidate::new(
            tags.iter().map(|tag| tag.to_string()).collect(),
            component,
        ));
        self
    }

    /// Handle content whose URI starts with, or whose mime type equals, `key`
    pub fn with_content_handler(mut self, key: &str, component: ComponentId) -> Self {
        self.content.push((key.to_string(), component));
        self
    }

    pub fn with_tag_handler(mut self, component: ComponentId) -> Self {
        self.tag_handler = Some(component);
        self
    }

    pub fn with_installed(mut self, package: &str) -> Self {
        self.installed.push(package.to_string());
        self
    }

    fn content_handler(&self, intent: &DispatchIntent) -> Option<&ComponentId> {
        self.content.iter().find_map(|(key, component)| {
            if intent.package.as_deref().is_some_and(|package| package != component.package) {
                return None;
            }
            let uri_match = intent.uri.as_deref().is_some_and(|uri| uri.starts_with(key.as_str()));
            let mime_match = intent.mime_type.as_deref() == Some(key.as_str());
            (uri_match || mime_match).then_some(component)
        })
    }
}

impl CapabilityResolver for StubResolver {
    fn resolve_candidates(&self, _capability_tags: &[String]) -> Vec<DispatchCandidate> {
        self.candidates.clone()
    }

    fn resolve_component_for_content(&self, intent: &DispatchIntent) -> Option<Destination> {
        let component = match intent.action {
            beamlink_core::DispatchAction::TagDiscovered => self.tag_handler.as_ref(),
            beamlink_core::DispatchAction::NdefDiscovered => self.content_handler(intent),
            beamlink_core::DispatchAction::TechDiscovered => None,
        }?;
        Some(Destination::Component {
            component: component.clone(),
            intent: intent.clone(),
        })
    }

    fn launch_destination(&self, package: &str) -> Option<Destination> {
        self.installed.iter().any(|installed| installed == package).then(|| Destination::ApplicationLaunch {
            package: package.to_string(),
        })
    }
}

/// Sink that records deliveries and outcomes
pub struct RecordingSink {
    delivered: Mutex<Vec<Destination>>,
    outcomes: Mutex<Vec<DispatchOutcome>>,
    accept: AtomicBool,
}

impl Default for RecordingSink {
    fn default() -> Self {
        Self {
            delivered: Mutex::new(Vec::new()),
            outcomes: Mutex::new(Vec::new()),
            accept: AtomicBool::new(true),
        }
    }
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every delivery fail
    pub fn refusing() -> Self {
        let sink = Self::default();
        sink.accept.store(false, Ordering::SeqCst);
        sink
    }

    pub fn delivered(&self) -> Vec<Destination> {
        self.delivered
            .lock()
            .map(|delivered| delivered.clone())
            .unwrap_or_default()
    }

    pub fn outcomes(&self) -> Vec<DispatchOutcome> {
        self.outcomes
            .lock()
            .map(|outcomes| outcomes.clone())
            .unwrap_or_default()
    }
}

impl DispatchSink for RecordingSink {
    fn deliver(&self, destination: &Destination) -> bool {
        if let Ok(mut delivered) = self.delivered.lock() {
            delivered.push(destination.clone());
        }
        self.accept.load(Ordering::SeqCst)
    }

    fn on_dispatch_result(&self, outcome: &DispatchOutcome) {
        if let Ok(mut outcomes) = self.outcomes.lock() {
            outcomes.push(outcome.clone());
        }
    }
}

#[derive(Default)]
pub struct StubPrompt {
    offered: Mutex<Vec<NetworkCredential>>,
}

impl StubPrompt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn offered(&self) -> Vec<NetworkCredential> {
        self.offered
            .lock()
            .map(|offered| offered.clone())
            .unwrap_or_default()
    }
}

impl ConfigurationPrompt for StubPrompt {
    fn offer_configuration(&self, credential: &NetworkCredential) {
        if let Ok(mut offered) = self.offered.lock() {
            offered.push(credential.clone());
        }
    }
}

/// Lock state with a fixed unlock answer
#[derive(Default)]
pub struct StubUnlock {
    pub locked: bool,
    pub accept: bool,
}

impl StubUnlock {
    pub fn unlocked() -> Self {
        Self::default()
    }

    pub fn locked(accept: bool) -> Self {
        Self {
            locked: true,
            accept,
        }
    }
}

impl UnlockRegistry for StubUnlock {
    fn is_locked(&self) -> bool {
        self.locked
    }

    fn try_unlock(&self, _target: &DiscoveredTarget) -> bool {
        self.accept
    }
}
