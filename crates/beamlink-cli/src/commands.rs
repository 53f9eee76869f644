//! Command handlers for the beamlink CLI
//!
//! Every handler returns a serializable report; [`CommandDispatcher`] prints it
//! either as text or, with `--json`, as pretty JSON.

use std::sync::Arc;
use std::time::Duration;

use rand_core::OsRng;
use serde::Serialize;
use tracing::{debug, info, warn};

use beamlink_core::protocol::barcode::decode_barcode_uri;
use beamlink_core::protocol::handover::{
    build_handover_request, decode_ble_oob, decode_legacy_oob, decode_nokia_legacy,
    parse_bluetooth,
};
use beamlink_core::{
    BluetoothAddress, ComponentId, DiscoveredTarget, HandoverRecord, InboundDispatcher,
    LinkConfig, LocalCarrier, NdefMessage, NdefRecord, OutboundIntent, PayloadRegistration,
    PrincipalId, ReceivedPayload,
};
use beamlink_harness::{
    InboundReceiver, MockLinkProvider, RecordedEvent, RecordingListener, RecordingSink,
    StaticPayloadProvider, StubForeground, StubPrompt, StubResolver, StubTransferInitiator,
    StubUnlock,
};
use beamlink_runtime::{LinkManager, LinkManagerBuilder};

use crate::cli::{Cli, Commands};
use crate::config::AppConfig;
use crate::error::{CliError, Result};

const DEFAULT_SIMULATION_URI: &str = "https://example.com/beamlink";
const SENDER_APP: PrincipalId = PrincipalId(10_001);
const PEER_VERSION: u8 = 0x11;

// ----------------------------------------------------------------------------
// Reports
// ----------------------------------------------------------------------------

/// Plain-text rendering of a command result
pub trait Render {
    fn render(&self) -> String;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordSummary {
    pub tnf: String,
    pub record_type: String,
    pub id: String,
    pub payload: String,
    pub uri: Option<String>,
    pub mime_type: Option<String>,
}

impl From<&NdefRecord> for RecordSummary {
    fn from(record: &NdefRecord) -> Self {
        Self {
            tnf: format!("{:?}", record.tnf),
            record_type: String::from_utf8_lossy(&record.record_type).into_owned(),
            id: hex::encode(&record.id),
            payload: hex::encode(&record.payload),
            uri: record.to_uri(),
            mime_type: record.to_mime_type(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NdefReport {
    pub records: Vec<RecordSummary>,
    pub packages: Vec<String>,
    pub handover: Option<HandoverRecord>,
}

impl Render for NdefReport {
    fn render(&self) -> String {
        let mut out = String::new();
        for (index, record) in self.records.iter().enumerate() {
            out.push_str(&format!(
                "record {}: tnf={} type={:?} id={} payload={}\n",
                index, record.tnf, record.record_type, record.id, record.payload
            ));
            if let Some(uri) = &record.uri {
                out.push_str(&format!("  uri: {}\n", uri));
            }
            if let Some(mime) = &record.mime_type {
                out.push_str(&format!("  mime: {}\n", mime));
            }
        }
        if !self.packages.is_empty() {
            out.push_str(&format!("packages: {}\n", self.packages.join(", ")));
        }
        if let Some(handover) = &self.handover {
            out.push_str(&handover.render());
        }
        out
    }
}

impl Render for HandoverRecord {
    fn render(&self) -> String {
        let address = self
            .address
            .map(|address| address.to_string())
            .unwrap_or_else(|| "-".to_string());
        format!(
            "carrier: {:?} address={} name={:?} activating={} role={:?} usable={}\n",
            self.transport,
            address,
            self.name,
            self.activating,
            self.role,
            self.is_usable()
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BarcodeReport {
    pub uri: Option<String>,
}

impl Render for BarcodeReport {
    fn render(&self) -> String {
        match &self.uri {
            Some(uri) => format!("uri: {}\n", uri),
            None => "no uri encoded\n".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HandoverRequestReport {
    pub address: String,
    pub message: String,
}

impl Render for HandoverRequestReport {
    fn render(&self) -> String {
        format!("{}\n", self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationReport {
    pub sender_events: Vec<String>,
    pub receiver_events: Vec<String>,
    /// Carrier transfers the sender handed off
    pub handovers_started: usize,
    /// Where the receiver routed each received message
    pub dispatch: Vec<String>,
    pub completed: bool,
}

impl Render for SimulationReport {
    fn render(&self) -> String {
        let mut out = String::from("sender:\n");
        for event in &self.sender_events {
            out.push_str(&format!("  {}\n", event));
        }
        out.push_str("receiver:\n");
        for event in &self.receiver_events {
            out.push_str(&format!("  {}\n", event));
        }
        if self.handovers_started > 0 {
            out.push_str(&format!("handovers started: {}\n", self.handovers_started));
        }
        for outcome in &self.dispatch {
            out.push_str(&format!("dispatch: {}\n", outcome));
        }
        out.push_str(if self.completed {
            "transfer complete\n"
        } else {
            "transfer did not complete\n"
        });
        out
    }
}

// ----------------------------------------------------------------------------
// Command Dispatcher
// ----------------------------------------------------------------------------

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Execute a CLI command and print its report
    pub async fn execute(cli: Cli, config: AppConfig) -> Result<()> {
        let json = cli.json;
        match cli.command {
            Commands::DecodeNdef { hex } => Self::print(&decode_ndef(&hex)?, json),
            Commands::DecodeOob { hex, le, nokia } => {
                Self::print(&decode_oob(&hex, OobFormat::from_flags(le, nokia))?, json)
            }
            Commands::Barcode { hex } => Self::print(&decode_barcode(&hex)?, json),
            Commands::HandoverRequest { address } => {
                let address = match address {
                    Some(address) => address.parse()?,
                    None => config.local_address()?,
                };
                Self::print(&handover_request(address), json)
            }
            Commands::Simulate {
                uri,
                content,
                confirm,
                timeout,
            } => {
                let options = SimulationOptions {
                    uri,
                    content,
                    confirm,
                    timeout: Duration::from_secs(timeout),
                };
                let report = simulate(&config, options).await?;
                Self::print(&report, json)
            }
        }
    }

    fn print<T: Serialize + Render>(report: &T, json: bool) -> Result<()> {
        if json {
            println!("{}", serde_json::to_string_pretty(report)?);
        } else {
            print!("{}", report.render());
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Decoding Commands
// ----------------------------------------------------------------------------

pub fn decode_ndef(input: &str) -> Result<NdefReport> {
    let bytes = hex::decode(input.trim())?;
    let message = NdefMessage::parse(&bytes)?;
    debug!("Parsed {} record(s)", message.records().len());

    let handover = match parse_bluetooth(&message) {
        Ok(handover) => handover,
        Err(e) => {
            warn!("Carrier record present but not decodable: {}", e);
            None
        }
    };

    Ok(NdefReport {
        records: message.records().iter().map(RecordSummary::from).collect(),
        packages: message.application_packages(),
        handover,
    })
}

/// Layout of an out-of-band carrier payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OobFormat {
    Classic,
    LowEnergy,
    NokiaLegacy,
}

impl OobFormat {
    pub fn from_flags(le: bool, nokia: bool) -> Self {
        match (le, nokia) {
            (true, _) => OobFormat::LowEnergy,
            (false, true) => OobFormat::NokiaLegacy,
            (false, false) => OobFormat::Classic,
        }
    }
}

pub fn decode_oob(input: &str, format: OobFormat) -> Result<HandoverRecord> {
    let bytes = hex::decode(input.trim())?;
    let record = match format {
        OobFormat::Classic => decode_legacy_oob(&bytes)?,
        OobFormat::LowEnergy => decode_ble_oob(&bytes)?,
        OobFormat::NokiaLegacy => decode_nokia_legacy(&bytes)?,
    };
    Ok(record)
}

pub fn decode_barcode(input: &str) -> Result<BarcodeReport> {
    let tag_id = hex::decode(input.trim())?;
    let uri = decode_barcode_uri(&tag_id).and_then(|message| message.first().to_uri());
    Ok(BarcodeReport { uri })
}

pub fn handover_request(address: BluetoothAddress) -> HandoverRequestReport {
    let carrier = LocalCarrier::new(address, true);
    let message = build_handover_request(&carrier, &mut OsRng);
    HandoverRequestReport {
        address: address.to_string(),
        message: hex::encode(message.to_bytes()),
    }
}

// ----------------------------------------------------------------------------
// Simulation
// ----------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SimulationOptions {
    pub uri: Option<String>,
    pub content: Vec<String>,
    pub confirm: bool,
    pub timeout: Duration,
}

impl SimulationOptions {
    fn outbound_intent(&self) -> Result<OutboundIntent> {
        let uri = match (&self.uri, self.content.is_empty()) {
            (Some(uri), _) => Some(uri.as_str()),
            (None, true) => Some(DEFAULT_SIMULATION_URI),
            (None, false) => None,
        };
        let mut intent = OutboundIntent::content(self.content.clone());
        if let Some(uri) = uri {
            intent = intent.with_message(NdefMessage::single(NdefRecord::uri(uri))?);
        }
        Ok(intent.with_skip_confirmation(!self.confirm))
    }
}

struct SimulatedDevice {
    manager: LinkManager,
    listener: Arc<RecordingListener>,
    initiator: Arc<StubTransferInitiator>,
}

impl SimulatedDevice {
    /// Spawn a device; channels it opens come out of the returned receiver
    fn spawn(
        config: &LinkConfig,
        carrier: LocalCarrier,
        foreground: StubForeground,
    ) -> Result<(Self, InboundReceiver)> {
        let (provider, inbound) = MockLinkProvider::new(config.miu as usize);
        let listener = Arc::new(RecordingListener::new());
        let initiator = Arc::new(StubTransferInitiator::new());
        let (manager, _handle) = LinkManagerBuilder::new(
            Arc::new(provider),
            listener.clone(),
            Arc::new(foreground),
            initiator.clone(),
        )
        .with_config(config.clone())
        .with_local_carrier(carrier)
        .spawn()?;

        Ok((
            Self {
                manager,
                listener,
                initiator,
            },
            inbound,
        ))
    }

    fn events(&self) -> Vec<String> {
        self.listener
            .events()
            .iter()
            .map(|event| format!("{:?}", event))
            .collect()
    }
}

/// Hand every channel one device opens to the other device's services
fn route_inbound(mut inbound: InboundReceiver, peer: LinkManager) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some((service, channel)) = inbound.recv().await {
            if peer.accept_inbound(service, channel).is_err() {
                debug!("Peer manager gone, dropping {} channel", service);
                break;
            }
        }
    })
}

/// Address for the simulated peer: the local one with its last octet inverted
fn peer_address(local: &BluetoothAddress) -> BluetoothAddress {
    let mut bytes = *local.as_bytes();
    bytes[5] ^= 0xFF;
    BluetoothAddress::new(bytes)
}

fn is_finished(events: &[RecordedEvent]) -> bool {
    events.iter().any(|event| {
        matches!(
            event,
            RecordedEvent::TransferComplete | RecordedEvent::TransferFailed(_)
        )
    })
}

/// Run one tap between a sending and a receiving device
pub async fn simulate(config: &AppConfig, options: SimulationOptions) -> Result<SimulationReport> {
    let intent = options.outbound_intent()?;
    let local = config.local_carrier()?;
    let remote = LocalCarrier::new(peer_address(&local.address), true);
    info!("Simulating tap {} -> {}", local.address, remote.address);

    let (sender, sender_inbound) = SimulatedDevice::spawn(
        &config.link,
        local,
        StubForeground::new(SENDER_APP, "com.example.share"),
    )?;
    let (receiver, receiver_inbound) =
        SimulatedDevice::spawn(&config.link, remote, StubForeground::empty())?;
    sender.manager.set_payload_provider(Some(PayloadRegistration::new(
        SENDER_APP,
        Arc::new(StaticPayloadProvider::new(Some(intent))),
    )))?;

    let routes = [
        route_inbound(sender_inbound, receiver.manager.clone()),
        route_inbound(receiver_inbound, sender.manager.clone()),
    ];

    receiver.manager.on_link_activated(PEER_VERSION)?;
    sender.manager.on_link_activated(PEER_VERSION)?;

    if options.confirm {
        if !sender
            .listener
            .wait_for(&RecordedEvent::ConfirmationRequired, options.timeout)
            .await
        {
            return Err(CliError::Simulation(
                "sender never asked for confirmation".to_string(),
            ));
        }
        sender.manager.confirm_send()?;
    }

    let completed = sender.listener.wait_until(options.timeout, is_finished).await
        && sender.listener.contains(&RecordedEvent::TransferComplete);
    if !completed {
        warn!("Transfer did not complete within {:?}", options.timeout);
    }

    sender.manager.on_link_deactivated()?;
    receiver.manager.on_link_deactivated()?;
    for device in [&sender, &receiver] {
        if !device
            .listener
            .wait_for(&RecordedEvent::PeerOutOfRange, options.timeout)
            .await
        {
            warn!("Link did not settle within {:?}", options.timeout);
        }
    }

    let dispatch = dispatch_received(config, &receiver.listener.events());

    sender.manager.shutdown()?;
    receiver.manager.shutdown()?;
    for route in routes {
        route.abort();
    }

    Ok(SimulationReport {
        sender_events: sender.events(),
        receiver_events: receiver.events(),
        handovers_started: sender.initiator.sends().len(),
        dispatch,
        completed,
    })
}

/// Route each message the receiver got through a dispatcher with a browser installed
fn dispatch_received(config: &AppConfig, events: &[RecordedEvent]) -> Vec<String> {
    let resolver = StubResolver::new().with_content_handler(
        "http",
        ComponentId::new("com.example.browser", "BrowserActivity"),
    );
    let dispatcher = InboundDispatcher::new(
        config.dispatch.clone(),
        Arc::new(resolver),
        Arc::new(RecordingSink::new()),
        Arc::new(StubPrompt::new()),
        Arc::new(StubUnlock::unlocked()),
    );

    events
        .iter()
        .filter_map(|event| match event {
            RecordedEvent::ReceiveComplete(ReceivedPayload::Message(message)) => Some(message),
            _ => None,
        })
        .map(|message| {
            let target = DiscoveredTarget::new(vec![0x04, 0x00, 0x00, 0x01], vec!["Ndef".to_string()])
                .with_message(message.clone());
            format!("{:?}", dispatcher.dispatch(&target))
        })
        .collect()
}
