//! Priority-ordered dispatch pipeline
//!
//! Each step answers [`StepOutcome::Matched`] or [`StepOutcome::NoMatch`];
//! the pipeline stops at the first match. Order:
//!
//! 1. exclusive override (content, then technology, then bare target)
//! 2. peripheral handover record
//! 3. network provisioning token
//! 4. structured content (application records first, provisioning allow-list
//!    in provisioning-only mode)
//! 5. technology filters (skipped in provisioning-only mode)
//! 6. bare target (skipped in provisioning-only mode)
//!
//! A locked device hands the target to the unlock registry before any step.

use alloc::{string::String, sync::Arc, vec::Vec};

use super::{
    tech_list_matches, CapabilityResolver, ConfigurationPrompt, Destination, DiscoveredTarget,
    DispatchAction, DispatchIntent, DispatchOutcome, DispatchSink, OverrideRegistration,
    UnlockRegistry,
};
use crate::config::DispatchConfig;
use crate::ndef::NdefMessage;
use crate::protocol::{barcode, handover, wifi};
use crate::types::ComponentId;
use crate::{debug, info};

// ----------------------------------------------------------------------------
// Step Outcome
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Matched(Destination),
    NoMatch,
}

impl StepOutcome {
    /// Run `next` only if this step did not match
    pub fn or_else<F: FnOnce() -> StepOutcome>(self, next: F) -> StepOutcome {
        match self {
            StepOutcome::Matched(_) => self,
            StepOutcome::NoMatch => next(),
        }
    }

    pub fn into_outcome(self) -> DispatchOutcome {
        match self {
            StepOutcome::Matched(destination) => DispatchOutcome::Dispatched(destination),
            StepOutcome::NoMatch => DispatchOutcome::NoMatch,
        }
    }
}

/// Per-dispatch view of the target
struct DispatchContext<'a> {
    target: &'a DiscoveredTarget,
    /// Cached content, or the URL synthesized from a barcode id
    message: Option<NdefMessage>,
    sorted_techs: Vec<String>,
}

impl<'a> DispatchContext<'a> {
    fn new(target: &'a DiscoveredTarget) -> Self {
        let message = match &target.message {
            Some(message) => Some(message.clone()),
            None if target.barcode => barcode::decode_barcode_uri(&target.id),
            None => None,
        };
        Self {
            target,
            message,
            sorted_techs: target.sorted_technologies(),
        }
    }

    fn content_intent(&self) -> Option<DispatchIntent> {
        self.message.as_ref().and_then(DispatchIntent::for_message)
    }
}

// ----------------------------------------------------------------------------
// Dispatcher
// ----------------------------------------------------------------------------

pub struct InboundDispatcher {
    config: DispatchConfig,
    provisioning_only: bool,
    override_registration: Option<OverrideRegistration>,
    resolver: Arc<dyn CapabilityResolver>,
    sink: Arc<dyn DispatchSink>,
    prompt: Arc<dyn ConfigurationPrompt>,
    unlock: Arc<dyn UnlockRegistry>,
}

impl InboundDispatcher {
    pub fn new(
        config: DispatchConfig,
        resolver: Arc<dyn CapabilityResolver>,
        sink: Arc<dyn DispatchSink>,
        prompt: Arc<dyn ConfigurationPrompt>,
        unlock: Arc<dyn UnlockRegistry>,
    ) -> Self {
        Self {
            provisioning_only: config.provisioning_only,
            config,
            override_registration: None,
            resolver,
            sink,
            prompt,
            unlock,
        }
    }

    /// Install or clear the exclusive override
    pub fn set_override(&mut self, registration: Option<OverrideRegistration>) {
        debug!("Override registration set: {}", registration.is_some());
        self.override_registration = registration;
    }

    pub fn disable_provisioning_mode(&mut self) {
        self.provisioning_only = false;
    }

    pub fn is_provisioning_only(&self) -> bool {
        self.provisioning_only
    }

    /// Route `target`, report the outcome to the sink and return it
    pub fn dispatch(&self, target: &DiscoveredTarget) -> DispatchOutcome {
        let outcome = self.evaluate(target);
        info!("Dispatch result: {:?}", outcome);
        self.sink.on_dispatch_result(&outcome);
        outcome
    }

    fn evaluate(&self, target: &DiscoveredTarget) -> DispatchOutcome {
        if !self.provisioning_only && self.unlock.is_locked() {
            return if self.unlock.try_unlock(target) {
                DispatchOutcome::UnlockedViaTarget
            } else {
                DispatchOutcome::NoMatch
            };
        }

        let ctx = DispatchContext::new(target);
        let outcome = self
            .try_overrides(&ctx)
            .or_else(|| self.try_peripheral_handover(&ctx))
            .or_else(|| self.try_network_configuration(&ctx))
            .or_else(|| self.try_content(&ctx));

        if self.provisioning_only {
            // only structured content may match in provisioning mode
            return outcome.into_outcome();
        }

        outcome
            .or_else(|| self.try_technologies(&ctx))
            .or_else(|| self.try_bare_target())
            .into_outcome()
    }

    fn deliver(&self, destination: Destination) -> StepOutcome {
        if self.sink.deliver(&destination) {
            StepOutcome::Matched(destination)
        } else {
            StepOutcome::NoMatch
        }
    }

    fn try_start(&self, intent: &DispatchIntent) -> StepOutcome {
        match self.resolver.resolve_component_for_content(intent) {
            Some(destination) => self.deliver(destination),
            None => StepOutcome::NoMatch,
        }
    }

    // ------------------------------------------------------------------------
    // Steps
    // ------------------------------------------------------------------------

    fn try_overrides(&self, ctx: &DispatchContext<'_>) -> StepOutcome {
        let Some(registration) = &self.override_registration else {
            return StepOutcome::NoMatch;
        };
        let to_override = |intent: DispatchIntent| Destination::Override {
            component: registration.destination.clone(),
            intent,
        };

        // a failed delivery ends the override step
        if let Some(intent) = ctx.content_intent() {
            if registration.filter_matches(&intent) {
                debug!("Content override matched");
                return self.deliver(to_override(intent));
            }
        }

        if registration.tech_matches(&ctx.sorted_techs) {
            debug!("Technology override matched");
            return self.deliver(to_override(DispatchIntent::new(DispatchAction::TechDiscovered)));
        }

        let tag_intent = DispatchIntent::new(DispatchAction::TagDiscovered);
        if registration.filter_matches(&tag_intent) {
            debug!("Bare target override matched");
            return self.deliver(to_override(tag_intent));
        }

        StepOutcome::NoMatch
    }

    fn try_peripheral_handover(&self, ctx: &DispatchContext<'_>) -> StepOutcome {
        if !self.config.peripheral_handover_supported {
            return StepOutcome::NoMatch;
        }
        let Some(message) = &ctx.message else {
            return StepOutcome::NoMatch;
        };

        match handover::parse_bluetooth(message) {
            Ok(Some(record)) if record.valid => {
                debug!("Peripheral handover to {:?}", record.address);
                self.deliver(Destination::PeripheralHandover(record))
            }
            Ok(_) => StepOutcome::NoMatch,
            Err(err) => {
                debug!("Ignoring unreadable handover record: {:?}", err);
                StepOutcome::NoMatch
            }
        }
    }

    fn try_network_configuration(&self, ctx: &DispatchContext<'_>) -> StepOutcome {
        // tokens only come from real NDEF content
        let Some(message) = &ctx.target.message else {
            return StepOutcome::NoMatch;
        };

        match wifi::parse_token(message) {
            Ok(Some(credential)) => {
                debug!("Provisioning token for {}", credential.ssid);
                self.prompt.offer_configuration(&credential);
                StepOutcome::Matched(Destination::NetworkConfiguration(credential))
            }
            Ok(None) => StepOutcome::NoMatch,
            Err(err) => {
                debug!("Ignoring unreadable provisioning token: {:?}", err);
                StepOutcome::NoMatch
            }
        }
    }

    fn try_content(&self, ctx: &DispatchContext<'_>) -> StepOutcome {
        let Some(message) = &ctx.message else {
            return StepOutcome::NoMatch;
        };
        let Some(intent) = ctx.content_intent() else {
            return StepOutcome::NoMatch;
        };

        if self.provisioning_only {
            let allowed = intent
                .mime_type
                .as_deref()
                .is_some_and(|mime_type| self.config.is_provisioning_mime(mime_type));
            if !allowed {
                info!("Dropping content in provisioning mode");
                return StepOutcome::NoMatch;
            }
        }

        let packages = message.application_packages();
        for package in &packages {
            if let StepOutcome::Matched(destination) = self.try_start(&intent.clone().with_package(package)) {
                debug!("Application record matched {}", package);
                return StepOutcome::Matched(destination);
            }
        }

        if let Some(first) = packages.first() {
            let launched = match self.resolver.launch_destination(first) {
                Some(destination) => self.deliver(destination),
                None => StepOutcome::NoMatch,
            };
            let outcome = launched.or_else(|| {
                self.deliver(Destination::StoreSearch {
                    package: first.clone(),
                })
            });
            if let StepOutcome::Matched(_) = outcome {
                return outcome;
            }
        }

        self.try_start(&intent)
    }

    fn try_technologies(&self, ctx: &DispatchContext<'_>) -> StepOutcome {
        let mut matches: Vec<ComponentId> = Vec::new();
        for candidate in self.resolver.resolve_candidates(&ctx.sorted_techs) {
            if tech_list_matches(&ctx.sorted_techs, &candidate.capability_tags)
                && !matches.contains(&candidate.target_component)
            {
                matches.push(candidate.target_component);
            }
        }

        let intent = DispatchIntent::new(DispatchAction::TechDiscovered);
        match matches.len() {
            0 => StepOutcome::NoMatch,
            1 => {
                let component = matches.remove(0);
                debug!("Single technology match {}", component);
                self.deliver(Destination::Component { component, intent })
            }
            count => {
                debug!("{} technology matches, offering chooser", count);
                self.deliver(Destination::Chooser {
                    candidates: matches,
                    intent,
                })
            }
        }
    }

    fn try_bare_target(&self) -> StepOutcome {
        self.try_start(&DispatchIntent::new(DispatchAction::TagDiscovered))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{ContentFilter, DispatchCandidate};
    use crate::ndef::NdefRecord;
    use alloc::string::ToString;
    use alloc::vec;
    use std::sync::Mutex;

    #[derive(Default)]
    struct TestResolver {
        candidates: Vec<DispatchCandidate>,
        content_handler: Option<ComponentId>,
        tag_handler: Option<ComponentId>,
    }

    impl CapabilityResolver for TestResolver {
        fn resolve_candidates(&self, _capability_tags: &[String]) -> Vec<DispatchCandidate> {
            self.candidates.clone()
        }

        fn resolve_component_for_content(&self, intent: &DispatchIntent) -> Option<Destination> {
            let handler = match intent.action {
                DispatchAction::TagDiscovered => self.tag_handler.clone(),
                _ => self.content_handler.clone(),
            }?;
            Some(Destination::Component {
                component: handler,
                intent: intent.clone(),
            })
        }
    }

    #[derive(Default)]
    struct TestSink {
        delivered: Mutex<Vec<Destination>>,
        results: Mutex<Vec<DispatchOutcome>>,
        refuse: bool,
    }

    impl DispatchSink for TestSink {
        fn deliver(&self, destination: &Destination) -> bool {
            self.delivered.lock().unwrap().push(destination.clone());
            !self.refuse
        }

        fn on_dispatch_result(&self, outcome: &DispatchOutcome) {
            self.results.lock().unwrap().push(outcome.clone());
        }
    }

    struct NoPrompt;

    impl ConfigurationPrompt for NoPrompt {
        fn offer_configuration(&self, _credential: &wifi::NetworkCredential) {}
    }

    #[derive(Default)]
    struct RecordingPrompt {
        offered: Mutex<Vec<wifi::NetworkCredential>>,
    }

    impl ConfigurationPrompt for RecordingPrompt {
        fn offer_configuration(&self, credential: &wifi::NetworkCredential) {
            self.offered.lock().unwrap().push(credential.clone());
        }
    }

    struct Unlock {
        locked: bool,
        accept: bool,
    }

    impl UnlockRegistry for Unlock {
        fn is_locked(&self) -> bool {
            self.locked
        }

        fn try_unlock(&self, _target: &DiscoveredTarget) -> bool {
            self.accept
        }
    }

    fn create_test_dispatcher(resolver: TestResolver, sink: Arc<TestSink>) -> InboundDispatcher {
        InboundDispatcher::new(
            DispatchConfig::default(),
            Arc::new(resolver),
            sink,
            Arc::new(NoPrompt),
            Arc::new(Unlock {
                locked: false,
                accept: false,
            }),
        )
    }

    fn create_test_target() -> DiscoveredTarget {
        DiscoveredTarget::new(vec![1, 2, 3, 4], vec!["NfcA".to_string(), "MifareUltralight".to_string()])
    }

    fn component(name: &str) -> ComponentId {
        ComponentId::new("com.example", name)
    }

    fn create_carrier_target() -> DiscoveredTarget {
        let address = crate::types::BluetoothAddress::new([0x00, 0x11, 0x22, 0xAA, 0xBB, 0xCC]);
        let mut payload = handover::encode_carrier_address(&address);
        payload.extend_from_slice(&[0x05, handover::EIR_SHORT_LOCAL_NAME, b'B', b'e', b'a', b'm']);
        create_test_target()
            .with_message(NdefMessage::single(NdefRecord::mime(handover::TYPE_BT_OOB, payload)).unwrap())
    }

    fn attribute(id: u16, value: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&id.to_be_bytes());
        out.extend_from_slice(&(value.len() as u16).to_be_bytes());
        out.extend_from_slice(value);
        out
    }

    fn create_token_target(ssid: &str, key: &str) -> DiscoveredTarget {
        let mut credential = attribute(0x1045, ssid.as_bytes());
        credential.extend_from_slice(&attribute(0x1027, key.as_bytes()));
        let payload = attribute(0x100E, &credential);
        create_test_target()
            .with_message(NdefMessage::single(NdefRecord::mime(wifi::TOKEN_MIME_TYPE, payload)).unwrap())
    }

    #[test]
    fn test_single_tech_match_launches_directly() {
        let resolver = TestResolver {
            candidates: vec![
                DispatchCandidate::new(vec!["NfcA".into()], component("Reader")),
                DispatchCandidate::new(vec!["NfcB".into()], component("Other")),
            ],
            ..TestResolver::default()
        };
        let sink = Arc::new(TestSink::default());
        let outcome = create_test_dispatcher(resolver, sink.clone()).dispatch(&create_test_target());
        assert!(matches!(
            outcome,
            DispatchOutcome::Dispatched(Destination::Component { ref component, .. }) if component.name == "Reader"
        ));
        assert_eq!(sink.results.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_two_tech_matches_offer_chooser() {
        let resolver = TestResolver {
            candidates: vec![
                DispatchCandidate::new(vec!["NfcA".into()], component("Reader")),
                DispatchCandidate::new(vec!["MifareUltralight".into()], component("Wallet")),
                DispatchCandidate::new(vec!["NfcA".into()], component("Reader")),
            ],
            ..TestResolver::default()
        };
        let sink = Arc::new(TestSink::default());
        let outcome = create_test_dispatcher(resolver, sink).dispatch(&create_test_target());
        match outcome {
            DispatchOutcome::Dispatched(Destination::Chooser { candidates, .. }) => {
                assert_eq!(candidates, vec![component("Reader"), component("Wallet")]);
            }
            other => panic!("expected chooser, got {:?}", other),
        }
    }

    #[test]
    fn test_no_tech_match_falls_to_bare_target() {
        let resolver = TestResolver {
            tag_handler: Some(component("TagViewer")),
            ..TestResolver::default()
        };
        let sink = Arc::new(TestSink::default());
        let outcome = create_test_dispatcher(resolver, sink).dispatch(&create_test_target());
        assert!(matches!(
            outcome,
            DispatchOutcome::Dispatched(Destination::Component { ref intent, .. })
                if intent.action == DispatchAction::TagDiscovered
        ));
    }

    #[test]
    fn test_nothing_matches() {
        let sink = Arc::new(TestSink::default());
        let outcome = create_test_dispatcher(TestResolver::default(), sink.clone()).dispatch(&create_test_target());
        assert_eq!(outcome, DispatchOutcome::NoMatch);
        assert_eq!(*sink.results.lock().unwrap(), vec![DispatchOutcome::NoMatch]);
    }

    #[test]
    fn test_override_filters_content() {
        let sink = Arc::new(TestSink::default());
        let mut dispatcher = create_test_dispatcher(TestResolver::default(), sink);
        dispatcher.set_override(Some(
            OverrideRegistration::new(component("Foreground"))
                .with_filters(vec![ContentFilter::default().with_uri_prefix("https://")]),
        ));

        let target = create_test_target()
            .with_message(NdefMessage::single(NdefRecord::uri("https://example.com")).unwrap());
        let outcome = dispatcher.dispatch(&target);
        assert!(matches!(
            outcome,
            DispatchOutcome::Dispatched(Destination::Override { ref intent, .. })
                if intent.action == DispatchAction::NdefDiscovered
        ));

        let plain = dispatcher.dispatch(&create_test_target());
        assert_eq!(plain, DispatchOutcome::NoMatch);
    }

    #[test]
    fn test_override_wins_over_peripheral_handover() {
        let sink = Arc::new(TestSink::default());
        let mut dispatcher = create_test_dispatcher(TestResolver::default(), sink.clone());
        dispatcher.set_override(Some(
            OverrideRegistration::new(component("Foreground"))
                .with_filters(vec![ContentFilter::default().with_mime_type(handover::TYPE_BT_OOB)]),
        ));

        let outcome = dispatcher.dispatch(&create_carrier_target());
        match outcome {
            DispatchOutcome::Dispatched(Destination::Override { component: target, intent }) => {
                assert_eq!(target, component("Foreground"));
                assert_eq!(intent.mime_type.as_deref(), Some(handover::TYPE_BT_OOB));
            }
            other => panic!("expected override, got {:?}", other),
        }
        assert_eq!(sink.delivered.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_peripheral_handover_beats_content() {
        let resolver = TestResolver {
            content_handler: Some(component("Viewer")),
            ..TestResolver::default()
        };
        let outcome =
            create_test_dispatcher(resolver, Arc::new(TestSink::default())).dispatch(&create_carrier_target());
        match outcome {
            DispatchOutcome::Dispatched(Destination::PeripheralHandover(record)) => {
                assert!(record.valid);
                assert_eq!(record.address.unwrap().to_string(), "00:11:22:AA:BB:CC");
                assert_eq!(record.name, "Beam");
            }
            other => panic!("expected peripheral handover, got {:?}", other),
        }
    }

    #[test]
    fn test_peripheral_handover_disabled_falls_to_content() {
        let resolver = TestResolver {
            content_handler: Some(component("Viewer")),
            ..TestResolver::default()
        };
        let dispatcher = InboundDispatcher::new(
            DispatchConfig::default().with_peripheral_handover(false),
            Arc::new(resolver),
            Arc::new(TestSink::default()),
            Arc::new(NoPrompt),
            Arc::new(Unlock {
                locked: false,
                accept: false,
            }),
        );
        assert!(matches!(
            dispatcher.dispatch(&create_carrier_target()),
            DispatchOutcome::Dispatched(Destination::Component { ref component, .. }) if component.name == "Viewer"
        ));
    }

    #[test]
    fn test_network_token_offers_configuration() {
        let resolver = TestResolver {
            content_handler: Some(component("Viewer")),
            ..TestResolver::default()
        };
        let prompt = Arc::new(RecordingPrompt::default());
        let sink = Arc::new(TestSink::default());
        let dispatcher = InboundDispatcher::new(
            DispatchConfig::default(),
            Arc::new(resolver),
            sink.clone(),
            prompt.clone(),
            Arc::new(Unlock {
                locked: false,
                accept: false,
            }),
        );

        let outcome = dispatcher.dispatch(&create_token_target("home", "secret"));
        match outcome {
            DispatchOutcome::Dispatched(Destination::NetworkConfiguration(credential)) => {
                assert_eq!(credential.ssid, "home");
                assert_eq!(credential.network_key, "secret");
            }
            other => panic!("expected network configuration, got {:?}", other),
        }

        let offered = prompt.offered.lock().unwrap();
        assert_eq!(offered.len(), 1);
        assert_eq!(offered[0].ssid, "home");
        // the prompt takes the credential; nothing goes to the sink
        assert!(sink.delivered.lock().unwrap().is_empty());
    }

    #[test]
    fn test_refused_override_is_no_match_for_step() {
        let resolver = TestResolver {
            tag_handler: Some(component("TagViewer")),
            ..TestResolver::default()
        };
        let sink = Arc::new(TestSink {
            refuse: true,
            ..TestSink::default()
        });
        let mut dispatcher = create_test_dispatcher(resolver, sink.clone());
        dispatcher.set_override(Some(OverrideRegistration::new(component("Foreground"))));
        let outcome = dispatcher.dispatch(&create_test_target());
        assert_eq!(outcome, DispatchOutcome::NoMatch);
        // override attempt, then bare target
        assert_eq!(sink.delivered.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_application_record_falls_back_to_store() {
        let message = NdefMessage::new(vec![
            NdefRecord::uri("https://example.com"),
            NdefRecord::application("com.example.viewer"),
        ])
        .unwrap();
        let sink = Arc::new(TestSink::default());
        let outcome = create_test_dispatcher(TestResolver::default(), sink)
            .dispatch(&create_test_target().with_message(message));
        assert_eq!(
            outcome,
            DispatchOutcome::Dispatched(Destination::StoreSearch {
                package: "com.example.viewer".to_string()
            })
        );
    }

    #[test]
    fn test_provisioning_only_blocks_other_content() {
        let resolver = TestResolver {
            content_handler: Some(component("Browser")),
            tag_handler: Some(component("TagViewer")),
            ..TestResolver::default()
        };
        let sink = Arc::new(TestSink::default());
        let dispatcher = InboundDispatcher::new(
            DispatchConfig::default().with_provisioning_only(true),
            Arc::new(resolver),
            sink,
            Arc::new(NoPrompt),
            Arc::new(Unlock {
                locked: true,
                accept: false,
            }),
        );

        let web = create_test_target()
            .with_message(NdefMessage::single(NdefRecord::uri("https://example.com")).unwrap());
        assert_eq!(dispatcher.dispatch(&web), DispatchOutcome::NoMatch);

        let provisioning = create_test_target().with_message(
            NdefMessage::single(NdefRecord::mime("application/com.android.managedprovisioning", vec![1]))
                .unwrap(),
        );
        assert!(dispatcher.dispatch(&provisioning).is_dispatched());
    }

    #[test]
    fn test_locked_device_defers_to_unlock_registry() {
        let build = |accept| {
            InboundDispatcher::new(
                DispatchConfig::default(),
                Arc::new(TestResolver::default()),
                Arc::new(TestSink::default()),
                Arc::new(NoPrompt),
                Arc::new(Unlock { locked: true, accept }),
            )
        };
        assert_eq!(build(true).dispatch(&create_test_target()), DispatchOutcome::UnlockedViaTarget);
        assert_eq!(build(false).dispatch(&create_test_target()), DispatchOutcome::NoMatch);
    }

    #[test]
    fn test_barcode_target_dispatches_url() {
        let resolver = TestResolver {
            content_handler: Some(component("Browser")),
            ..TestResolver::default()
        };
        let mut id = vec![0x05, 0x03];
        id.extend_from_slice(b"a.co");
        id.extend_from_slice(&[0xFE, 0x00, 0xAA, 0xBB]);
        let target = DiscoveredTarget::new(id, vec!["NfcBarcode".into()]).with_barcode(true);

        let outcome = create_test_dispatcher(resolver, Arc::new(TestSink::default())).dispatch(&target);
        match outcome {
            DispatchOutcome::Dispatched(Destination::Component { intent, .. }) => {
                assert_eq!(intent.uri.as_deref(), Some("http://a.co"));
            }
            other => panic!("expected content dispatch, got {:?}", other),
        }
    }
}
