//! Link Lifecycle State Machine
//!
//! Tracks whether the peer link is down, up or debouncing after an apparent
//! drop, together with the state of the outbound payload. Transitions consume
//! the machine and hand back the next state plus the effects to run, in the
//! same way the connection state machine of the protocol layer does.
//!
//! Stale timer firings and worker results are rejected by comparing epochs
//! and attempt generations carried in the event against the machine's own.

use alloc::{
    format,
    string::{String, ToString},
    vec::Vec,
};
use core::fmt;
use core::time::Duration;
use serde::{Deserialize, Serialize};

use crate::config::{DebounceTimeouts, LinkConfig};
use crate::events::{LinkEventListener, ReceivedPayload, TransferFailure};
use crate::ndef::NdefMessage;
use crate::types::{PrincipalId, Timestamp};

// ----------------------------------------------------------------------------
// States
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkState {
    Down,
    Up,
    Debounce,
}

impl LinkState {
    pub fn name(&self) -> &'static str {
        match self {
            LinkState::Down => "Down",
            LinkState::Up => "Up",
            LinkState::Debounce => "Debounce",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SendState {
    NothingToSend,
    NeedConfirmation,
    /// Manual send requested before any link existed
    Pending,
    Sending,
    Complete,
    Canceled,
}

impl SendState {
    pub fn name(&self) -> &'static str {
        match self {
            SendState::NothingToSend => "NothingToSend",
            SendState::NeedConfirmation => "NeedConfirmation",
            SendState::Pending => "Pending",
            SendState::Sending => "Sending",
            SendState::Complete => "Complete",
            SendState::Canceled => "Canceled",
        }
    }
}

/// Outbound channel readiness for the current attempt cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceState {
    Disconnected,
    Connecting,
    Connected,
}

// ----------------------------------------------------------------------------
// Data
// ----------------------------------------------------------------------------

/// The payload a local application wants to transfer
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OutboundIntent {
    pub message: Option<NdefMessage>,
    /// Content locators handed to the out-of-band transfer
    pub content_refs: Vec<String>,
    pub owner: Option<PrincipalId>,
    pub skip_confirmation: bool,
}

impl OutboundIntent {
    pub fn message(message: NdefMessage) -> Self {
        Self {
            message: Some(message),
            ..Self::default()
        }
    }

    pub fn content(content_refs: Vec<String>) -> Self {
        Self {
            content_refs,
            ..Self::default()
        }
    }

    pub fn with_message(mut self, message: NdefMessage) -> Self {
        self.message = Some(message);
        self
    }

    pub fn with_owner(mut self, owner: PrincipalId) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn with_skip_confirmation(mut self, skip: bool) -> Self {
        self.skip_confirmation = skip;
        self
    }

    pub fn has_content_refs(&self) -> bool {
        !self.content_refs.is_empty()
    }

    /// Something this device can actually send
    pub fn is_usable(&self, handover_supported: bool) -> bool {
        self.message.is_some() || (self.has_content_refs() && handover_supported)
    }
}

/// The currently active or debouncing link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerLink {
    pub activated_at: Timestamp,
    pub peer_version: u8,
}

/// Result of one background send attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Complete { elapsed: Duration },
    Failed(TransferFailure),
}

// ----------------------------------------------------------------------------
// Events, Notifications and Effects
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Radio reports the peer link up; `intent` is the freshly prepared
    /// payload, consulted only when coming up from Down with nothing pending
    Activated {
        peer_version: u8,
        intent: Option<OutboundIntent>,
        at: Timestamp,
    },
    Deactivated,
    DebounceExpired { epoch: u64 },
    ManualInvoke { intent: OutboundIntent },
    WaitForLinkExpired { epoch: u64 },
    ServicesConnected { generation: u64 },
    ServicesFailed { generation: u64 },
    SendConfirmed,
    Canceled,
    SendFinished { generation: u64, outcome: SendOutcome },
    ReceiveComplete { payload: ReceivedPayload },
    /// An inbound handover was refused because a transfer is running
    InboundHandoverBusy,
}

impl LinkEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LinkEvent::Activated { .. } => "Activated",
            LinkEvent::Deactivated => "Deactivated",
            LinkEvent::DebounceExpired { .. } => "DebounceExpired",
            LinkEvent::ManualInvoke { .. } => "ManualInvoke",
            LinkEvent::WaitForLinkExpired { .. } => "WaitForLinkExpired",
            LinkEvent::ServicesConnected { .. } => "ServicesConnected",
            LinkEvent::ServicesFailed { .. } => "ServicesFailed",
            LinkEvent::SendConfirmed => "SendConfirmed",
            LinkEvent::Canceled => "Canceled",
            LinkEvent::SendFinished { .. } => "SendFinished",
            LinkEvent::ReceiveComplete { .. } => "ReceiveComplete",
            LinkEvent::InboundHandoverBusy => "InboundHandoverBusy",
        }
    }
}

/// Listener callbacks requested by a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkNotification {
    PeerInRange,
    PeerOutOfRange,
    ConfirmationRequired,
    TransferComplete { elapsed: Duration },
    TransferFailed(TransferFailure),
    TapRequested,
    TimeoutWaitingForLink,
    SendDebounce,
    ResumeSend,
    ReceiveComplete(ReceivedPayload),
}

impl LinkNotification {
    pub fn deliver(self, listener: &dyn LinkEventListener) {
        match self {
            LinkNotification::PeerInRange => listener.on_peer_in_range(),
            LinkNotification::PeerOutOfRange => listener.on_peer_out_of_range(),
            LinkNotification::ConfirmationRequired => listener.on_confirmation_required(),
            LinkNotification::TransferComplete { elapsed } => listener.on_transfer_complete(elapsed),
            LinkNotification::TransferFailed(reason) => listener.on_transfer_failed(reason),
            LinkNotification::TapRequested => listener.on_tap_requested(),
            LinkNotification::TimeoutWaitingForLink => listener.on_timeout_waiting_for_link(),
            LinkNotification::SendDebounce => listener.on_send_debounce(),
            LinkNotification::ResumeSend => listener.on_resume_send(),
            LinkNotification::ReceiveComplete(payload) => listener.on_receive_complete(payload),
        }
    }
}

/// Work the owner of the machine must carry out
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEffect {
    Notify(LinkNotification),
    /// (Re)arm the single-shot debounce timer
    ArmDebounce { timeout: Duration, epoch: u64 },
    CancelDebounce,
    ArmWaitForLink { timeout: Duration, epoch: u64 },
    CancelWaitForLink,
    /// Open outbound channels for a new attempt cycle
    ConnectServices { generation: u64 },
    /// Run the send workflow over the channels of `generation`
    StartSend { generation: u64 },
    CancelSend,
    /// Drop and close every outbound channel
    DisconnectServices,
}

// ----------------------------------------------------------------------------
// Transition Results
// ----------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct LinkTransition {
    pub new_state: LinkMachine,
    pub effects: Vec<LinkEffect>,
    pub audit_entry: AuditEntry,
}

/// Audit trail entry for state transitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: Timestamp,
    pub from_state: String,
    pub to_state: String,
    pub event: String,
    pub effects_count: usize,
}

/// Event not applicable in the current state; the owner keeps its state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkTransitionError {
    Ignored {
        state: String,
        event: &'static str,
        reason: &'static str,
    },
}

impl fmt::Display for LinkTransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkTransitionError::Ignored {
                state,
                event,
                reason,
            } => write!(f, "Ignored {} in {}: {}", event, state, reason),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for LinkTransitionError {}

// ----------------------------------------------------------------------------
// State Machine
// ----------------------------------------------------------------------------

/// Owned link and send state
#[derive(Debug, Clone)]
pub struct LinkMachine {
    link_state: LinkState,
    send_state: SendState,
    intent: Option<OutboundIntent>,
    peer: Option<PeerLink>,
    services: ServiceState,
    generation: u64,
    debounce_epoch: u64,
    wait_epoch: u64,
    debounce: DebounceTimeouts,
    wait_for_link: Duration,
    handover_supported: bool,
}

impl LinkMachine {
    pub fn new(config: &LinkConfig, handover_supported: bool) -> Self {
        Self {
            link_state: LinkState::Down,
            send_state: SendState::NothingToSend,
            intent: None,
            peer: None,
            services: ServiceState::Disconnected,
            generation: 0,
            debounce_epoch: 0,
            wait_epoch: 0,
            debounce: config.debounce.clone(),
            wait_for_link: config.wait_for_link,
            handover_supported,
        }
    }

    pub fn link_state(&self) -> LinkState {
        self.link_state
    }

    pub fn send_state(&self) -> SendState {
        self.send_state
    }

    pub fn intent(&self) -> Option<&OutboundIntent> {
        self.intent.as_ref()
    }

    pub fn peer(&self) -> Option<&PeerLink> {
        self.peer.as_ref()
    }

    pub fn services(&self) -> ServiceState {
        self.services
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn handover_supported(&self) -> bool {
        self.handover_supported
    }

    /// An activation from here will consult the payload provider
    pub fn wants_intent_on_activation(&self) -> bool {
        self.link_state == LinkState::Down && self.send_state != SendState::Pending
    }

    /// Current state name for logging/audit
    pub fn state_name(&self) -> String {
        format!("{}/{}", self.link_state.name(), self.send_state.name())
    }

    fn ignored(&self, event: &LinkEvent, reason: &'static str) -> LinkTransitionError {
        LinkTransitionError::Ignored {
            state: self.state_name(),
            event: event.name(),
            reason,
        }
    }

    fn begin_connect(&mut self, effects: &mut Vec<LinkEffect>) {
        self.generation += 1;
        self.services = ServiceState::Connecting;
        effects.push(LinkEffect::ConnectServices {
            generation: self.generation,
        });
    }

    fn arm_debounce(&mut self, timeout: Duration, effects: &mut Vec<LinkEffect>) {
        self.debounce_epoch += 1;
        effects.push(LinkEffect::ArmDebounce {
            timeout,
            epoch: self.debounce_epoch,
        });
    }

    fn cancel_send(&mut self, effects: &mut Vec<LinkEffect>) {
        // results of the canceled worker must not land
        self.generation += 1;
        self.services = ServiceState::Disconnected;
        effects.push(LinkEffect::CancelSend);
        effects.push(LinkEffect::DisconnectServices);
    }

    /// Process an event and transition to the next state (consumes self)
    pub fn transition(mut self, event: LinkEvent) -> Result<LinkTransition, LinkTransitionError> {
        let from_state = self.state_name();
        let event_name = event.name();
        let mut effects = Vec::new();

        match (self.link_state, &event) {
            // ---- activation -------------------------------------------------
            (
                LinkState::Down,
                LinkEvent::Activated {
                    peer_version,
                    intent,
                    at,
                },
            ) => {
                effects.push(LinkEffect::Notify(LinkNotification::PeerInRange));
                self.link_state = LinkState::Up;
                self.peer = Some(PeerLink {
                    activated_at: *at,
                    peer_version: *peer_version,
                });

                if self.send_state == SendState::Pending {
                    self.send_state = SendState::Sending;
                    self.wait_epoch += 1;
                    effects.push(LinkEffect::CancelWaitForLink);
                    self.begin_connect(&mut effects);
                } else {
                    self.send_state = SendState::NothingToSend;
                    self.intent = intent
                        .as_ref()
                        .filter(|i| i.is_usable(self.handover_supported))
                        .cloned();
                    if let Some(skip) = self.intent.as_ref().map(|i| i.skip_confirmation) {
                        self.begin_connect(&mut effects);
                        self.send_state = if skip {
                            SendState::Sending
                        } else {
                            SendState::NeedConfirmation
                        };
                    }
                }
            }
            (LinkState::Up, LinkEvent::Activated { .. }) => {
                return Err(self.ignored(&event, "duplicate activation"));
            }
            (LinkState::Debounce, LinkEvent::Activated { peer_version, at, .. }) => {
                self.link_state = LinkState::Up;
                self.peer = Some(PeerLink {
                    activated_at: *at,
                    peer_version: *peer_version,
                });
                if matches!(
                    self.send_state,
                    SendState::Sending | SendState::NeedConfirmation
                ) {
                    self.begin_connect(&mut effects);
                }
                self.debounce_epoch += 1;
                effects.push(LinkEffect::CancelDebounce);
            }

            // ---- deactivation -----------------------------------------------
            (LinkState::Up, LinkEvent::Deactivated) => {
                self.link_state = LinkState::Debounce;
                let timeout = self.debounce.for_state(self.send_state);
                self.arm_debounce(timeout, &mut effects);
                if self.send_state == SendState::Sending {
                    effects.push(LinkEffect::Notify(LinkNotification::SendDebounce));
                }
                self.cancel_send(&mut effects);
            }
            (_, LinkEvent::Deactivated) => {
                return Err(self.ignored(&event, "link not up"));
            }

            (LinkState::Debounce, LinkEvent::DebounceExpired { epoch }) => {
                if *epoch != self.debounce_epoch {
                    return Err(self.ignored(&event, "stale debounce timer"));
                }
                self.link_state = LinkState::Down;
                self.send_state = SendState::NothingToSend;
                self.intent = None;
                self.peer = None;
                effects.push(LinkEffect::Notify(LinkNotification::PeerOutOfRange));
            }
            (_, LinkEvent::DebounceExpired { .. }) => {
                return Err(self.ignored(&event, "not debouncing"));
            }

            // ---- manual invocation ------------------------------------------
            (LinkState::Down, LinkEvent::ManualInvoke { intent }) => {
                if !intent.is_usable(self.handover_supported) {
                    return Err(self.ignored(&event, "nothing to send"));
                }
                self.intent = Some(intent.clone());
                self.send_state = SendState::Pending;
                effects.push(LinkEffect::Notify(LinkNotification::TapRequested));
                self.wait_epoch += 1;
                effects.push(LinkEffect::ArmWaitForLink {
                    timeout: self.wait_for_link,
                    epoch: self.wait_epoch,
                });
            }
            (_, LinkEvent::ManualInvoke { .. }) => {
                return Err(self.ignored(&event, "link already present"));
            }

            (_, LinkEvent::WaitForLinkExpired { epoch }) => {
                if *epoch != self.wait_epoch || self.send_state != SendState::Pending {
                    return Err(self.ignored(&event, "stale wait-for-link timer"));
                }
                self.send_state = SendState::NothingToSend;
                self.intent = None;
                effects.push(LinkEffect::Notify(LinkNotification::TimeoutWaitingForLink));
            }

            // ---- background workers -----------------------------------------
            (LinkState::Up, LinkEvent::ServicesConnected { generation }) => {
                if *generation != self.generation {
                    return Err(self.ignored(&event, "stale connect result"));
                }
                self.services = ServiceState::Connected;
                match self.send_state {
                    SendState::NeedConfirmation => {
                        effects.push(LinkEffect::Notify(LinkNotification::ConfirmationRequired));
                    }
                    SendState::Sending => {
                        effects.push(LinkEffect::Notify(LinkNotification::ResumeSend));
                        effects.push(LinkEffect::StartSend {
                            generation: self.generation,
                        });
                    }
                    _ => {}
                }
            }
            (_, LinkEvent::ServicesConnected { .. }) => {
                return Err(self.ignored(&event, "link not up"));
            }

            (LinkState::Up, LinkEvent::ServicesFailed { generation }) => {
                if *generation != self.generation {
                    return Err(self.ignored(&event, "stale connect result"));
                }
                self.services = ServiceState::Disconnected;
                if self.send_state == SendState::Sending {
                    self.send_state = SendState::NothingToSend;
                    effects.push(LinkEffect::Notify(LinkNotification::TransferFailed(
                        TransferFailure::Failed,
                    )));
                }
            }
            (_, LinkEvent::ServicesFailed { .. }) => {
                return Err(self.ignored(&event, "link not up"));
            }

            (LinkState::Up, LinkEvent::SendFinished { generation, outcome }) => {
                if *generation != self.generation || self.send_state != SendState::Sending {
                    return Err(self.ignored(&event, "stale send result"));
                }
                match outcome {
                    SendOutcome::Complete { elapsed } => {
                        self.send_state = SendState::Complete;
                        effects.push(LinkEffect::Notify(LinkNotification::TransferComplete {
                            elapsed: *elapsed,
                        }));
                    }
                    SendOutcome::Failed(reason) => {
                        self.send_state = SendState::NothingToSend;
                        effects.push(LinkEffect::Notify(LinkNotification::TransferFailed(*reason)));
                    }
                }
            }
            (_, LinkEvent::SendFinished { .. }) => {
                return Err(self.ignored(&event, "link not up"));
            }

            // ---- user decisions ---------------------------------------------
            (LinkState::Down, LinkEvent::SendConfirmed) => {
                return Err(self.ignored(&event, "link down"));
            }
            (_, LinkEvent::SendConfirmed) => {
                if self.send_state != SendState::NeedConfirmation {
                    return Err(self.ignored(&event, "no confirmation outstanding"));
                }
                self.send_state = SendState::Sending;
                if self.link_state == LinkState::Up {
                    match self.services {
                        ServiceState::Connected => effects.push(LinkEffect::StartSend {
                            generation: self.generation,
                        }),
                        ServiceState::Disconnected => self.begin_connect(&mut effects),
                        // the send starts once the channels are up
                        ServiceState::Connecting => {}
                    }
                } else {
                    let timeout = self.debounce.sending;
                    self.arm_debounce(timeout, &mut effects);
                    effects.push(LinkEffect::Notify(LinkNotification::SendDebounce));
                }
            }

            (_, LinkEvent::Canceled) => {
                let was_sending = self.send_state == SendState::Sending;
                self.send_state = SendState::Canceled;
                match self.link_state {
                    LinkState::Down => {
                        self.wait_epoch += 1;
                        self.intent = None;
                        effects.push(LinkEffect::CancelWaitForLink);
                    }
                    LinkState::Debounce => {
                        let timeout = self.debounce.canceled;
                        self.arm_debounce(timeout, &mut effects);
                    }
                    LinkState::Up => {
                        if was_sending {
                            self.cancel_send(&mut effects);
                        }
                    }
                }
            }

            // ---- inbound ----------------------------------------------------
            (LinkState::Down, LinkEvent::ReceiveComplete { .. }) => {
                return Err(self.ignored(&event, "link down"));
            }
            (_, LinkEvent::ReceiveComplete { payload }) => {
                if self.send_state == SendState::Sending {
                    self.cancel_send(&mut effects);
                }
                self.send_state = SendState::NothingToSend;
                effects.push(LinkEffect::Notify(LinkNotification::ReceiveComplete(
                    payload.clone(),
                )));
            }

            (LinkState::Down, LinkEvent::InboundHandoverBusy) => {
                return Err(self.ignored(&event, "link down"));
            }
            (_, LinkEvent::InboundHandoverBusy) => {
                if self.send_state != SendState::Sending {
                    return Err(self.ignored(&event, "not sending"));
                }
                self.cancel_send(&mut effects);
                self.send_state = SendState::NothingToSend;
                effects.push(LinkEffect::Notify(LinkNotification::TransferFailed(
                    TransferFailure::RemoteBusy,
                )));
            }
        }

        let audit_entry = AuditEntry {
            timestamp: Timestamp::now(),
            from_state,
            to_state: self.state_name(),
            event: event_name.to_string(),
            effects_count: effects.len(),
        };

        Ok(LinkTransition {
            new_state: self,
            effects,
            audit_entry,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ndef::NdefRecord;
    use alloc::vec;

    fn create_test_machine() -> LinkMachine {
        LinkMachine::new(&LinkConfig::default(), true)
    }

    fn create_test_intent() -> OutboundIntent {
        OutboundIntent::message(NdefMessage::single(NdefRecord::uri("http://example.com")).unwrap())
    }

    fn activated(intent: Option<OutboundIntent>) -> LinkEvent {
        LinkEvent::Activated {
            peer_version: 0x11,
            intent,
            at: Timestamp::new(1),
        }
    }

    fn apply(machine: LinkMachine, event: LinkEvent) -> (LinkMachine, Vec<LinkEffect>) {
        let transition = machine.transition(event).unwrap();
        (transition.new_state, transition.effects)
    }

    fn debounce_epoch(effects: &[LinkEffect]) -> u64 {
        effects
            .iter()
            .find_map(|effect| match effect {
                LinkEffect::ArmDebounce { epoch, .. } => Some(*epoch),
                _ => None,
            })
            .unwrap()
    }

    #[test]
    fn test_activation_without_payload() {
        let (machine, effects) = apply(create_test_machine(), activated(None));
        assert_eq!(machine.link_state(), LinkState::Up);
        assert_eq!(machine.send_state(), SendState::NothingToSend);
        assert_eq!(effects, vec![LinkEffect::Notify(LinkNotification::PeerInRange)]);
    }

    #[test]
    fn test_activation_requires_confirmation() {
        let (machine, effects) = apply(create_test_machine(), activated(Some(create_test_intent())));
        assert_eq!(machine.send_state(), SendState::NeedConfirmation);
        assert!(effects.contains(&LinkEffect::ConnectServices { generation: 1 }));
    }

    #[test]
    fn test_skip_confirmation_goes_straight_to_sending() {
        let intent = create_test_intent().with_skip_confirmation(true);
        let (machine, _) = apply(create_test_machine(), activated(Some(intent)));
        assert_eq!(machine.send_state(), SendState::Sending);
    }

    #[test]
    fn test_content_refs_need_handover_support() {
        let intent = OutboundIntent::content(vec!["content://a".into()]);
        let machine = LinkMachine::new(&LinkConfig::default(), false);
        let (machine, effects) = apply(machine, activated(Some(intent)));
        assert_eq!(machine.send_state(), SendState::NothingToSend);
        assert!(machine.intent().is_none());
        assert_eq!(effects.len(), 1);
    }

    #[test]
    fn test_duplicate_activation_is_ignored() {
        let (machine, _) = apply(create_test_machine(), activated(None));
        let err = machine.transition(activated(None)).unwrap_err();
        assert!(matches!(err, LinkTransitionError::Ignored { event: "Activated", .. }));
    }

    #[test]
    fn test_deactivation_debounce_by_send_state() {
        let (machine, _) = apply(create_test_machine(), activated(Some(create_test_intent())));
        let (machine, effects) = apply(machine, LinkEvent::Deactivated);
        assert_eq!(machine.link_state(), LinkState::Debounce);
        assert!(effects.contains(&LinkEffect::ArmDebounce {
            timeout: Duration::from_millis(3000),
            epoch: 1
        }));
        assert!(effects.contains(&LinkEffect::CancelSend));
        assert!(effects.contains(&LinkEffect::DisconnectServices));
    }

    #[test]
    fn test_sending_deactivation_notifies_debounce() {
        let intent = create_test_intent().with_skip_confirmation(true);
        let (machine, _) = apply(create_test_machine(), activated(Some(intent)));
        let (_, effects) = apply(machine, LinkEvent::Deactivated);
        assert!(effects.contains(&LinkEffect::Notify(LinkNotification::SendDebounce)));
        assert!(effects.contains(&LinkEffect::ArmDebounce {
            timeout: Duration::from_millis(5000),
            epoch: 1
        }));
    }

    #[test]
    fn test_debounce_expiry_clears_intent() {
        let (machine, _) = apply(create_test_machine(), activated(Some(create_test_intent())));
        let (machine, effects) = apply(machine, LinkEvent::Deactivated);
        let epoch = debounce_epoch(&effects);
        let (machine, effects) = apply(machine, LinkEvent::DebounceExpired { epoch });
        assert_eq!(machine.link_state(), LinkState::Down);
        assert_eq!(machine.send_state(), SendState::NothingToSend);
        assert!(machine.intent().is_none());
        assert!(machine.peer().is_none());
        assert_eq!(effects, vec![LinkEffect::Notify(LinkNotification::PeerOutOfRange)]);
    }

    #[test]
    fn test_reactivation_during_debounce_keeps_intent() {
        let (machine, _) = apply(create_test_machine(), activated(Some(create_test_intent())));
        let (machine, effects) = apply(machine, LinkEvent::Deactivated);
        let stale = debounce_epoch(&effects);
        let (machine, effects) = apply(machine, activated(None));
        assert_eq!(machine.link_state(), LinkState::Up);
        assert_eq!(machine.send_state(), SendState::NeedConfirmation);
        assert!(machine.intent().is_some());
        assert!(effects.contains(&LinkEffect::CancelDebounce));
        assert!(effects.contains(&LinkEffect::ConnectServices { generation: 3 }));

        // the old timer can no longer tear the link down
        assert!(machine
            .transition(LinkEvent::DebounceExpired { epoch: stale })
            .is_err());
    }

    #[test]
    fn test_stale_connect_result_is_rejected() {
        let (machine, _) = apply(create_test_machine(), activated(Some(create_test_intent())));
        let (machine, _) = apply(machine, LinkEvent::Deactivated);
        let (machine, _) = apply(machine, activated(None));
        assert!(machine
            .clone()
            .transition(LinkEvent::ServicesConnected { generation: 1 })
            .is_err());
        let (machine, effects) = apply(machine, LinkEvent::ServicesConnected { generation: 3 });
        assert_eq!(machine.services(), ServiceState::Connected);
        assert_eq!(
            effects,
            vec![LinkEffect::Notify(LinkNotification::ConfirmationRequired)]
        );
    }

    #[test]
    fn test_confirm_then_send_complete() {
        let (machine, _) = apply(create_test_machine(), activated(Some(create_test_intent())));
        let (machine, _) = apply(machine, LinkEvent::ServicesConnected { generation: 1 });
        let (machine, effects) = apply(machine, LinkEvent::SendConfirmed);
        assert_eq!(machine.send_state(), SendState::Sending);
        assert_eq!(effects, vec![LinkEffect::StartSend { generation: 1 }]);

        let outcome = SendOutcome::Complete {
            elapsed: Duration::from_millis(40),
        };
        let (machine, effects) = apply(
            machine,
            LinkEvent::SendFinished {
                generation: 1,
                outcome,
            },
        );
        assert_eq!(machine.send_state(), SendState::Complete);
        assert_eq!(
            effects,
            vec![LinkEffect::Notify(LinkNotification::TransferComplete {
                elapsed: Duration::from_millis(40)
            })]
        );
    }

    #[test]
    fn test_confirm_during_debounce_rearms_timer() {
        let (machine, _) = apply(create_test_machine(), activated(Some(create_test_intent())));
        let (machine, _) = apply(machine, LinkEvent::Deactivated);
        let (machine, effects) = apply(machine, LinkEvent::SendConfirmed);
        assert_eq!(machine.send_state(), SendState::Sending);
        assert!(effects.contains(&LinkEffect::ArmDebounce {
            timeout: Duration::from_millis(5000),
            epoch: 2
        }));
        assert!(effects.contains(&LinkEffect::Notify(LinkNotification::SendDebounce)));
    }

    #[test]
    fn test_manual_invoke_and_wait_timeout() {
        let (machine, effects) = apply(
            create_test_machine(),
            LinkEvent::ManualInvoke {
                intent: create_test_intent(),
            },
        );
        assert_eq!(machine.send_state(), SendState::Pending);
        assert!(effects.contains(&LinkEffect::Notify(LinkNotification::TapRequested)));
        assert!(!machine.wants_intent_on_activation());

        let (machine, effects) = apply(machine, LinkEvent::WaitForLinkExpired { epoch: 1 });
        assert_eq!(machine.send_state(), SendState::NothingToSend);
        assert_eq!(
            effects,
            vec![LinkEffect::Notify(LinkNotification::TimeoutWaitingForLink)]
        );
    }

    #[test]
    fn test_pending_send_starts_on_link_up() {
        let (machine, _) = apply(
            create_test_machine(),
            LinkEvent::ManualInvoke {
                intent: create_test_intent(),
            },
        );
        let (machine, effects) = apply(machine, activated(None));
        assert_eq!(machine.send_state(), SendState::Sending);
        assert!(effects.contains(&LinkEffect::CancelWaitForLink));
        assert!(machine.intent().is_some());

        // the superseded wait timer is stale
        assert!(machine
            .transition(LinkEvent::WaitForLinkExpired { epoch: 1 })
            .is_err());
    }

    #[test]
    fn test_cancel_in_debounce_uses_shortest_timeout() {
        let (machine, _) = apply(create_test_machine(), activated(Some(create_test_intent())));
        let (machine, _) = apply(machine, LinkEvent::Deactivated);
        let (machine, effects) = apply(machine, LinkEvent::Canceled);
        assert_eq!(machine.send_state(), SendState::Canceled);
        assert_eq!(
            effects,
            vec![LinkEffect::ArmDebounce {
                timeout: Duration::from_millis(250),
                epoch: 2
            }]
        );
    }

    #[test]
    fn test_receive_cancels_in_flight_send() {
        let intent = create_test_intent().with_skip_confirmation(true);
        let (machine, _) = apply(create_test_machine(), activated(Some(intent)));
        let (machine, _) = apply(machine, LinkEvent::ServicesConnected { generation: 1 });
        let payload = ReceivedPayload::Message(
            NdefMessage::single(NdefRecord::uri("tel:1")).unwrap(),
        );
        let (machine, effects) = apply(
            machine,
            LinkEvent::ReceiveComplete {
                payload: payload.clone(),
            },
        );
        assert_eq!(machine.send_state(), SendState::NothingToSend);
        assert!(effects.contains(&LinkEffect::CancelSend));
        assert!(effects.contains(&LinkEffect::Notify(LinkNotification::ReceiveComplete(payload))));

        // the canceled worker's result is stale
        let outcome = SendOutcome::Complete {
            elapsed: Duration::ZERO,
        };
        assert!(machine
            .transition(LinkEvent::SendFinished {
                generation: 1,
                outcome
            })
            .is_err());
    }

    #[test]
    fn test_failed_send_reports_class() {
        let intent = create_test_intent().with_skip_confirmation(true);
        let (machine, _) = apply(create_test_machine(), activated(Some(intent)));
        let (machine, _) = apply(machine, LinkEvent::ServicesConnected { generation: 1 });
        let outcome = SendOutcome::Failed(TransferFailure::HandoverUnsupported);
        let (machine, effects) = apply(
            machine,
            LinkEvent::SendFinished {
                generation: 1,
                outcome,
            },
        );
        assert_eq!(machine.send_state(), SendState::NothingToSend);
        assert_eq!(
            effects,
            vec![LinkEffect::Notify(LinkNotification::TransferFailed(
                TransferFailure::HandoverUnsupported
            ))]
        );
    }

    #[test]
    fn test_audit_entry_records_states() {
        let transition = create_test_machine().transition(activated(None)).unwrap();
        assert_eq!(transition.audit_entry.from_state, "Down/NothingToSend");
        assert_eq!(transition.audit_entry.to_state, "Up/NothingToSend");
        assert_eq!(transition.audit_entry.event, "Activated");
        assert_eq!(transition.audit_entry.effects_count, 1);
    }
}
