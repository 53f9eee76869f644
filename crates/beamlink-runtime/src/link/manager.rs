//! Link manager actor
//!
//! A single task owns the [`LinkMachine`] and applies every radio event, user
//! decision and worker result to it in order. Timers and workers are spawned
//! tasks that report back over an internal channel tagged with the epoch or
//! generation they were started for, so results from a superseded cycle are
//! rejected by the machine instead of mutating send state.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use beamlink_core::{
    prepare_outbound_intent, AuditEntry, BeamlinkError, BoxedChannel, ForegroundQuery,
    LinkConfig, LinkEffect, LinkEvent, LinkEventListener, LinkMachine, LinkProvider, LinkService,
    LinkState, LocalCarrier, OobTransferInitiator, OutboundIntent, PayloadRegistration, PeerLink,
    Result, SendOutcome, SendState, ServiceState, Timestamp, TransferFailure, TransportError,
};
use rand_core::OsRng;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::link::workflow::run_send;
use crate::pool::LinkTransportPool;
use crate::services::{
    report_channel, serve_handover, serve_npp, serve_snep, HandoverServerContext, InboundReport,
    ReportReceiver, ReportSender, SnepServerContext,
};

// ----------------------------------------------------------------------------
// Commands
// ----------------------------------------------------------------------------

enum ManagerCommand {
    Activated { peer_version: u8 },
    Deactivated,
    InvokeSend { share: Option<OutboundIntent> },
    ConfirmSend,
    CancelSend,
    Enable { send: bool, receive: bool },
    SetPayloadProvider(Option<PayloadRegistration>),
    SetCarrierEnabled(bool),
    AcceptInbound {
        service: LinkService,
        channel: BoxedChannel,
    },
    Snapshot(oneshot::Sender<LinkSnapshot>),
    AuditTrail(oneshot::Sender<Vec<AuditEntry>>),
    Shutdown,
}

/// Results reported back by timers and workers
enum WorkerResult {
    DebounceExpired {
        epoch: u64,
    },
    WaitForLinkExpired {
        epoch: u64,
    },
    ConnectFinished {
        generation: u64,
        result: std::result::Result<LinkTransportPool, TransportError>,
    },
    SendFinished {
        generation: u64,
        outcome: SendOutcome,
    },
}

/// Point-in-time view of the manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSnapshot {
    pub link_state: LinkState,
    pub send_state: SendState,
    pub services: ServiceState,
    pub generation: u64,
    pub peer: Option<PeerLink>,
    pub send_enabled: bool,
    pub receive_enabled: bool,
}

// ----------------------------------------------------------------------------
// Builder
// ----------------------------------------------------------------------------

/// Wires a [`LinkManager`] to its collaborators
pub struct LinkManagerBuilder {
    config: LinkConfig,
    local: Option<LocalCarrier>,
    provider: Arc<dyn LinkProvider>,
    listener: Arc<dyn LinkEventListener>,
    foreground: Arc<dyn ForegroundQuery>,
    initiator: Arc<dyn OobTransferInitiator>,
}

impl LinkManagerBuilder {
    pub fn new(
        provider: Arc<dyn LinkProvider>,
        listener: Arc<dyn LinkEventListener>,
        foreground: Arc<dyn ForegroundQuery>,
        initiator: Arc<dyn OobTransferInitiator>,
    ) -> Self {
        Self {
            config: LinkConfig::default(),
            local: None,
            provider,
            listener,
            foreground,
            initiator,
        }
    }

    pub fn with_config(mut self, config: LinkConfig) -> Self {
        self.config = config;
        self
    }

    /// Secondary radio offered in handovers; without one, content refs are
    /// never sent and inbound handover requests go unanswered
    pub fn with_local_carrier(mut self, local: LocalCarrier) -> Self {
        self.local = Some(local);
        self
    }

    /// Validate the configuration and start the manager task
    pub fn spawn(self) -> Result<(LinkManager, JoinHandle<()>)> {
        self.config.validate()?;

        let (command_sender, command_receiver) = mpsc::unbounded_channel();
        let (worker_sender, worker_receiver) = mpsc::unbounded_channel();
        let (report_sender, report_receiver) = report_channel();

        let task = LinkManagerTask {
            machine: LinkMachine::new(&self.config, self.local.is_some()),
            send_enabled: self.config.send_enabled,
            receive_enabled: self.config.receive_enabled,
            audit_trail: VecDeque::with_capacity(self.config.audit_trail_len),
            config: self.config,
            local: self.local,
            provider: self.provider,
            listener: self.listener,
            foreground: self.foreground,
            initiator: self.initiator,
            registration: None,
            peer_version: 0,
            pool: None,
            debounce_timer: None,
            wait_timer: None,
            connect_worker: None,
            send_worker: None,
            inbound: Vec::new(),
            commands: command_receiver,
            worker_sender,
            worker_receiver,
            report_sender,
            report_receiver,
        };

        info!("Starting link manager");
        let handle = tokio::spawn(task.run());
        Ok((
            LinkManager {
                commands: command_sender,
            },
            handle,
        ))
    }
}

// ----------------------------------------------------------------------------
// Handle
// ----------------------------------------------------------------------------

/// Cloneable handle to the link manager task
///
/// Every method only enqueues; the effect is applied by the task in order.
#[derive(Clone)]
pub struct LinkManager {
    commands: mpsc::UnboundedSender<ManagerCommand>,
}

impl LinkManager {
    fn send(&self, command: ManagerCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| BeamlinkError::channel("link manager has stopped"))
    }

    /// The radio reports a peer link speaking `peer_version`
    pub fn on_link_activated(&self, peer_version: u8) -> Result<()> {
        self.send(ManagerCommand::Activated { peer_version })
    }

    pub fn on_link_deactivated(&self) -> Result<()> {
        self.send(ManagerCommand::Deactivated)
    }

    /// Manual send before any link exists; `share` is used when the
    /// foreground provider offers nothing
    pub fn invoke_send(&self, share: Option<OutboundIntent>) -> Result<()> {
        self.send(ManagerCommand::InvokeSend { share })
    }

    pub fn confirm_send(&self) -> Result<()> {
        self.send(ManagerCommand::ConfirmSend)
    }

    pub fn cancel_send(&self) -> Result<()> {
        self.send(ManagerCommand::CancelSend)
    }

    pub fn enable(&self, send: bool, receive: bool) -> Result<()> {
        self.send(ManagerCommand::Enable { send, receive })
    }

    pub fn set_payload_provider(&self, registration: Option<PayloadRegistration>) -> Result<()> {
        self.send(ManagerCommand::SetPayloadProvider(registration))
    }

    /// Whether the secondary radio is already on; decides Active vs
    /// Activating in handover selects
    pub fn set_carrier_enabled(&self, enabled: bool) -> Result<()> {
        self.send(ManagerCommand::SetCarrierEnabled(enabled))
    }

    /// Serve a channel the peer opened to one of our services
    pub fn accept_inbound(&self, service: LinkService, channel: BoxedChannel) -> Result<()> {
        self.send(ManagerCommand::AcceptInbound { service, channel })
    }

    pub async fn snapshot(&self) -> Result<LinkSnapshot> {
        let (reply, response) = oneshot::channel();
        self.send(ManagerCommand::Snapshot(reply))?;
        response
            .await
            .map_err(|_| BeamlinkError::channel("link manager dropped snapshot request"))
    }

    pub async fn audit_trail(&self) -> Result<Vec<AuditEntry>> {
        let (reply, response) = oneshot::channel();
        self.send(ManagerCommand::AuditTrail(reply))?;
        response
            .await
            .map_err(|_| BeamlinkError::channel("link manager dropped audit request"))
    }

    /// Stop the task, canceling every worker and closing every channel
    pub fn shutdown(&self) -> Result<()> {
        self.send(ManagerCommand::Shutdown)
    }
}

// ----------------------------------------------------------------------------
// Manager Task
// ----------------------------------------------------------------------------

/// Spawned connect or send, stopped through `cancel`
struct Worker {
    cancel: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl Worker {
    /// Ask the worker to stop; it closes its own channels
    fn stop(self) {
        let _ = self.cancel.send(());
    }

    async fn stop_and_wait(self) {
        let _ = self.cancel.send(());
        let _ = self.handle.await;
    }
}

struct LinkManagerTask {
    config: LinkConfig,
    machine: LinkMachine,
    local: Option<LocalCarrier>,
    provider: Arc<dyn LinkProvider>,
    listener: Arc<dyn LinkEventListener>,
    foreground: Arc<dyn ForegroundQuery>,
    initiator: Arc<dyn OobTransferInitiator>,
    registration: Option<PayloadRegistration>,
    send_enabled: bool,
    receive_enabled: bool,
    /// Last protocol version a peer announced
    peer_version: u8,
    /// Channels of the current cycle while no send is running
    pool: Option<LinkTransportPool>,
    debounce_timer: Option<JoinHandle<()>>,
    wait_timer: Option<JoinHandle<()>>,
    connect_worker: Option<Worker>,
    send_worker: Option<Worker>,
    inbound: Vec<JoinHandle<()>>,
    audit_trail: VecDeque<AuditEntry>,
    commands: mpsc::UnboundedReceiver<ManagerCommand>,
    worker_sender: mpsc::UnboundedSender<WorkerResult>,
    worker_receiver: mpsc::UnboundedReceiver<WorkerResult>,
    report_sender: ReportSender,
    report_receiver: ReportReceiver,
}

impl LinkManagerTask {
    async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(ManagerCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                Some(result) = self.worker_receiver.recv() => self.handle_worker_result(result),
                Some(report) = self.report_receiver.recv() => self.handle_report(report),
            }
        }
        self.teardown().await;
        info!("Link manager stopped");
    }

    fn handle_command(&mut self, command: ManagerCommand) {
        match command {
            ManagerCommand::Activated { peer_version } => {
                if !self.receive_enabled {
                    debug!("Ignoring link activation while receive is disabled");
                    return;
                }
                self.peer_version = peer_version;
                let intent = if self.machine.wants_intent_on_activation() {
                    prepare_outbound_intent(
                        self.send_enabled,
                        self.registration.as_ref(),
                        self.foreground.as_ref(),
                        peer_version,
                        true,
                    )
                } else {
                    None
                };
                self.apply(LinkEvent::Activated {
                    peer_version,
                    intent,
                    at: Timestamp::now(),
                });
            }
            ManagerCommand::Deactivated => self.apply(LinkEvent::Deactivated),
            ManagerCommand::InvokeSend { share } => {
                if !self.send_enabled {
                    debug!("Ignoring manual send while send is disabled");
                    return;
                }
                let intent = prepare_outbound_intent(
                    self.send_enabled,
                    self.registration.as_ref(),
                    self.foreground.as_ref(),
                    self.peer_version,
                    false,
                )
                .or(share);
                match intent {
                    Some(intent) => self.apply(LinkEvent::ManualInvoke { intent }),
                    None => debug!("Manual send with nothing to send"),
                }
            }
            ManagerCommand::ConfirmSend => self.apply(LinkEvent::SendConfirmed),
            ManagerCommand::CancelSend => self.apply(LinkEvent::Canceled),
            ManagerCommand::Enable { send, receive } => self.enable(send, receive),
            ManagerCommand::SetPayloadProvider(registration) => {
                debug!(
                    "Payload provider {}",
                    if registration.is_some() { "registered" } else { "cleared" }
                );
                self.registration = registration;
            }
            ManagerCommand::SetCarrierEnabled(enabled) => {
                if let Some(local) = self.local.as_mut() {
                    local.enabled = enabled;
                }
            }
            ManagerCommand::AcceptInbound { service, channel } => {
                self.accept_inbound(service, channel)
            }
            ManagerCommand::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            ManagerCommand::AuditTrail(reply) => {
                let _ = reply.send(self.audit_trail.iter().cloned().collect());
            }
            ManagerCommand::Shutdown => {}
        }
    }

    fn handle_worker_result(&mut self, result: WorkerResult) {
        match result {
            WorkerResult::DebounceExpired { epoch } => {
                self.debounce_timer = None;
                self.apply(LinkEvent::DebounceExpired { epoch });
            }
            WorkerResult::WaitForLinkExpired { epoch } => {
                self.wait_timer = None;
                self.apply(LinkEvent::WaitForLinkExpired { epoch });
            }
            WorkerResult::ConnectFinished { generation, result } => {
                if generation != self.machine.generation() {
                    trace!("Discarding channels of stale cycle {}", generation);
                    if let Ok(pool) = result {
                        tokio::spawn(pool.close());
                    }
                    return;
                }
                self.connect_worker = None;
                match result {
                    Ok(pool) => {
                        debug!("Services connected: {:?}", pool);
                        self.pool = Some(pool);
                        self.apply(LinkEvent::ServicesConnected { generation });
                        if self.machine.services() != ServiceState::Connected {
                            self.release_pool();
                        }
                    }
                    Err(err) => {
                        warn!("Could not connect required services: {}", err);
                        self.apply(LinkEvent::ServicesFailed { generation });
                    }
                }
            }
            WorkerResult::SendFinished { generation, outcome } => {
                self.send_worker = None;
                self.apply(LinkEvent::SendFinished {
                    generation,
                    outcome,
                });
            }
        }
    }

    fn handle_report(&mut self, report: InboundReport) {
        match report {
            InboundReport::Received(payload) => {
                self.apply(LinkEvent::ReceiveComplete { payload })
            }
            InboundReport::HandoverBusy => self.apply(LinkEvent::InboundHandoverBusy),
        }
    }

    fn enable(&mut self, send: bool, receive: bool) {
        info!("Link enable: send={} receive={}", send, receive);
        self.send_enabled = send;
        if self.receive_enabled && !receive {
            if self.machine.link_state() == LinkState::Up {
                self.apply(LinkEvent::Deactivated);
            }
            for handle in self.inbound.drain(..) {
                handle.abort();
            }
        }
        self.receive_enabled = receive;
    }

    fn snapshot(&self) -> LinkSnapshot {
        LinkSnapshot {
            link_state: self.machine.link_state(),
            send_state: self.machine.send_state(),
            services: self.machine.services(),
            generation: self.machine.generation(),
            peer: self.machine.peer().copied(),
            send_enabled: self.send_enabled,
            receive_enabled: self.receive_enabled,
        }
    }

    // ------------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------------

    fn apply(&mut self, event: LinkEvent) {
        match self.machine.clone().transition(event) {
            Ok(transition) => {
                let entry = &transition.audit_entry;
                debug!(
                    "{} -> {} on {} ({} effects)",
                    entry.from_state, entry.to_state, entry.event, entry.effects_count
                );
                self.record_audit(transition.audit_entry);
                self.machine = transition.new_state;
                for effect in transition.effects {
                    self.run_effect(effect);
                }
            }
            Err(err) => debug!("{}", err),
        }
    }

    fn record_audit(&mut self, entry: AuditEntry) {
        if self.audit_trail.len() >= self.config.audit_trail_len {
            self.audit_trail.pop_front();
        }
        self.audit_trail.push_back(entry);
    }

    fn run_effect(&mut self, effect: LinkEffect) {
        trace!("Effect: {:?}", effect);
        match effect {
            LinkEffect::Notify(notification) => notification.deliver(self.listener.as_ref()),
            LinkEffect::ArmDebounce { timeout, epoch } => {
                abort(self.debounce_timer.take());
                self.debounce_timer = Some(self.spawn_timer(
                    timeout,
                    WorkerResult::DebounceExpired { epoch },
                ));
            }
            LinkEffect::CancelDebounce => abort(self.debounce_timer.take()),
            LinkEffect::ArmWaitForLink { timeout, epoch } => {
                abort(self.wait_timer.take());
                self.wait_timer = Some(self.spawn_timer(
                    timeout,
                    WorkerResult::WaitForLinkExpired { epoch },
                ));
            }
            LinkEffect::CancelWaitForLink => abort(self.wait_timer.take()),
            LinkEffect::ConnectServices { generation } => self.spawn_connect(generation),
            LinkEffect::StartSend { generation } => self.spawn_send(generation),
            LinkEffect::CancelSend => {
                if let Some(worker) = self.send_worker.take() {
                    debug!("Canceling send worker");
                    worker.stop();
                }
                self.cancel_connect();
            }
            LinkEffect::DisconnectServices => {
                self.cancel_connect();
                self.release_pool();
            }
        }
    }

    // ------------------------------------------------------------------------
    // Timers and Workers
    // ------------------------------------------------------------------------

    fn spawn_timer(&self, timeout: Duration, result: WorkerResult) -> JoinHandle<()> {
        let sender = self.worker_sender.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = sender.send(result);
        })
    }

    fn spawn_connect(&mut self, generation: u64) {
        self.cancel_connect();
        self.release_pool();
        let Some(intent) = self.machine.intent().cloned() else {
            warn!("Connect requested without an intent");
            let _ = self.worker_sender.send(WorkerResult::ConnectFinished {
                generation,
                result: Err(TransportError::protocol("nothing to send")),
            });
            return;
        };

        let provider = self.provider.clone();
        let config = self.config.clone();
        let sender = self.worker_sender.clone();
        let (cancel, canceled) = oneshot::channel();

        let handle = tokio::spawn(async move {
            let mut pool = LinkTransportPool::empty();
            let opened = tokio::select! {
                result = pool.open(provider.as_ref(), &config, &intent) => Some(result),
                _ = canceled => None,
            };
            match opened {
                Some(Ok(())) => {
                    let _ = sender.send(WorkerResult::ConnectFinished {
                        generation,
                        result: Ok(pool),
                    });
                }
                Some(Err(err)) => {
                    pool.close().await;
                    let _ = sender.send(WorkerResult::ConnectFinished {
                        generation,
                        result: Err(err),
                    });
                }
                None => {
                    debug!("Connect worker for cycle {} canceled: {:?}", generation, pool);
                    pool.close().await;
                }
            }
        });
        self.connect_worker = Some(Worker { cancel, handle });
    }

    fn cancel_connect(&mut self) {
        if let Some(worker) = self.connect_worker.take() {
            debug!("Canceling connect worker");
            worker.stop();
        }
    }

    fn spawn_send(&mut self, generation: u64) {
        let (Some(mut pool), Some(intent)) = (self.pool.take(), self.machine.intent().cloned())
        else {
            warn!("Send requested without connected services");
            let _ = self.worker_sender.send(WorkerResult::SendFinished {
                generation,
                outcome: SendOutcome::Failed(TransferFailure::Failed),
            });
            return;
        };

        let local = self.local.clone();
        let initiator = self.initiator.clone();
        let sender = self.worker_sender.clone();
        let (cancel, canceled) = oneshot::channel();

        let handle = tokio::spawn(async move {
            let mut rng = OsRng;
            let outcome = tokio::select! {
                outcome = run_send(&mut pool, &intent, local.as_ref(), initiator.as_ref(), &mut rng) => {
                    Some(outcome)
                }
                _ = canceled => None,
            };
            pool.close().await;
            match outcome {
                Some(outcome) => {
                    let _ = sender.send(WorkerResult::SendFinished {
                        generation,
                        outcome,
                    });
                }
                None => debug!("Send worker for cycle {} canceled", generation),
            }
        });
        self.send_worker = Some(Worker { cancel, handle });
    }

    fn release_pool(&mut self) {
        if let Some(pool) = self.pool.take() {
            tokio::spawn(pool.close());
        }
    }

    fn accept_inbound(&mut self, service: LinkService, channel: BoxedChannel) {
        self.inbound.retain(|handle| !handle.is_finished());

        if !self.receive_enabled {
            debug!("Refusing inbound {} channel while receive is disabled", service);
            tokio::spawn(close_channel(channel));
            return;
        }

        trace!("Accepted inbound {} channel", service);
        let reports = self.report_sender.clone();
        let handle = match service {
            LinkService::Handover => match self.local.clone() {
                Some(local) => tokio::spawn(serve_handover(
                    channel,
                    HandoverServerContext {
                        local,
                        initiator: self.initiator.clone(),
                        reports,
                    },
                )),
                None => tokio::spawn(close_channel(channel)),
            },
            LinkService::ObjectExchange => tokio::spawn(serve_snep(
                channel,
                SnepServerContext {
                    local: self.local.clone(),
                    reports,
                },
            )),
            LinkService::LegacyPush => tokio::spawn(serve_npp(channel, reports)),
        };
        self.inbound.push(handle);
    }

    async fn teardown(&mut self) {
        abort(self.debounce_timer.take());
        abort(self.wait_timer.take());
        if let Some(worker) = self.connect_worker.take() {
            worker.stop_and_wait().await;
        }
        if let Some(worker) = self.send_worker.take() {
            worker.stop_and_wait().await;
        }
        if let Some(pool) = self.pool.take() {
            pool.close().await;
        }
        for handle in self.inbound.drain(..) {
            handle.abort();
        }
    }
}

fn abort(handle: Option<JoinHandle<()>>) {
    if let Some(handle) = handle {
        handle.abort();
    }
}

async fn close_channel(mut channel: BoxedChannel) {
    channel.close().await;
}
