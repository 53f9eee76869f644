//! Inbound target dispatch
//!
//! Routes a discovered target (a passive tag or a pushed message) to exactly
//! one destination. Steps run in fixed priority order and the first match
//! wins; see [`InboundDispatcher::dispatch`].

use alloc::{string::String, vec::Vec};

use crate::ndef::NdefMessage;
use crate::protocol::handover::HandoverRecord;
use crate::protocol::wifi::NetworkCredential;
use crate::types::ComponentId;

pub mod dispatcher;
pub mod filter;

pub use dispatcher::{InboundDispatcher, StepOutcome};
pub use filter::{tech_list_matches, ContentFilter};

// ----------------------------------------------------------------------------
// Targets and Intents
// ----------------------------------------------------------------------------

/// A target presented by the radio
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DiscoveredTarget {
    pub id: Vec<u8>,
    /// Technology names the target supports, in any order
    pub technologies: Vec<String>,
    /// Cached NDEF content, if the target has any
    pub message: Option<NdefMessage>,
    /// Barcode-style target whose URL lives in the id
    pub barcode: bool,
}

impl DiscoveredTarget {
    pub fn new(id: Vec<u8>, technologies: Vec<String>) -> Self {
        Self {
            id,
            technologies,
            ..Self::default()
        }
    }

    pub fn with_message(mut self, message: NdefMessage) -> Self {
        self.message = Some(message);
        self
    }

    pub fn with_barcode(mut self, barcode: bool) -> Self {
        self.barcode = barcode;
        self
    }

    /// Technologies sorted and de-duplicated
    pub fn sorted_technologies(&self) -> Vec<String> {
        let mut techs = self.technologies.clone();
        techs.sort();
        techs.dedup();
        techs
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchAction {
    NdefDiscovered,
    TechDiscovered,
    TagDiscovered,
}

/// What is being asked of a handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchIntent {
    pub action: DispatchAction,
    pub uri: Option<String>,
    pub mime_type: Option<String>,
    /// Restrict resolution to one package
    pub package: Option<String>,
}

impl DispatchIntent {
    pub fn new(action: DispatchAction) -> Self {
        Self {
            action,
            uri: None,
            mime_type: None,
            package: None,
        }
    }

    /// Content intent from the first record's locator, else its media type
    pub fn for_message(message: &NdefMessage) -> Option<Self> {
        let first = message.first();
        let mut intent = Self::new(DispatchAction::NdefDiscovered);
        if let Some(uri) = first.to_uri() {
            intent.uri = Some(uri);
        } else if let Some(mime_type) = first.to_mime_type() {
            intent.mime_type = Some(mime_type);
        } else {
            return None;
        }
        Some(intent)
    }

    pub fn with_package(mut self, package: &str) -> Self {
        self.package = Some(String::from(package));
        self
    }
}

// ----------------------------------------------------------------------------
// Destinations and Outcomes
// ----------------------------------------------------------------------------

/// Where a target ends up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// The caller holding the exclusive override
    Override {
        component: ComponentId,
        intent: DispatchIntent,
    },
    Component {
        component: ComponentId,
        intent: DispatchIntent,
    },
    /// Let the user choose among several equally good handlers
    Chooser {
        candidates: Vec<ComponentId>,
        intent: DispatchIntent,
    },
    ApplicationLaunch { package: String },
    /// "Find this application" fallback
    StoreSearch { package: String },
    PeripheralHandover(HandoverRecord),
    NetworkConfiguration(NetworkCredential),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Dispatched(Destination),
    NoMatch,
    UnlockedViaTarget,
}

impl DispatchOutcome {
    pub fn is_dispatched(&self) -> bool {
        matches!(self, DispatchOutcome::Dispatched(_))
    }
}

/// A component registered for a technology set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchCandidate {
    pub capability_tags: Vec<String>,
    pub target_component: ComponentId,
}

impl DispatchCandidate {
    pub fn new(capability_tags: Vec<String>, target_component: ComponentId) -> Self {
        Self {
            capability_tags,
            target_component,
        }
    }
}

/// Exclusive foreground override
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverrideRegistration {
    pub destination: ComponentId,
    pub filters: Option<Vec<ContentFilter>>,
    pub tech_lists: Option<Vec<Vec<String>>>,
}

impl OverrideRegistration {
    /// Override that accepts everything
    pub fn new(destination: ComponentId) -> Self {
        Self {
            destination,
            filters: None,
            tech_lists: None,
        }
    }

    pub fn with_filters(mut self, filters: Vec<ContentFilter>) -> Self {
        self.filters = Some(filters);
        self
    }

    pub fn with_tech_lists(mut self, tech_lists: Vec<Vec<String>>) -> Self {
        self.tech_lists = Some(tech_lists);
        self
    }

    /// Any filter matches; with no filters and no tech lists, everything does
    pub fn filter_matches(&self, intent: &DispatchIntent) -> bool {
        match &self.filters {
            Some(filters) => filters.iter().any(|filter| filter.matches(intent)),
            None => self.tech_lists.is_none(),
        }
    }

    pub fn tech_matches(&self, sorted_techs: &[String]) -> bool {
        self.tech_lists
            .as_ref()
            .is_some_and(|lists| lists.iter().any(|list| tech_list_matches(sorted_techs, list)))
    }
}

// ----------------------------------------------------------------------------
// Collaborators
// ----------------------------------------------------------------------------

/// Looks up installed handlers
pub trait CapabilityResolver: Send + Sync {
    /// Components registered for technology sets overlapping `capability_tags`
    fn resolve_candidates(&self, capability_tags: &[String]) -> Vec<DispatchCandidate>;

    /// Handler for a content, technology or bare-target intent
    fn resolve_component_for_content(&self, intent: &DispatchIntent) -> Option<Destination>;

    /// Launch entry point of an installed package
    fn launch_destination(&self, _package: &str) -> Option<Destination> {
        None
    }
}

/// Starts resolved destinations and hears about every outcome
pub trait DispatchSink: Send + Sync {
    /// Start `destination`; false when it could not be started
    fn deliver(&self, destination: &Destination) -> bool;

    fn on_dispatch_result(&self, _outcome: &DispatchOutcome) {}
}

pub trait ConfigurationPrompt: Send + Sync {
    fn offer_configuration(&self, credential: &NetworkCredential);
}

pub trait UnlockRegistry: Send + Sync {
    fn is_locked(&self) -> bool;

    fn try_unlock(&self, target: &DiscoveredTarget) -> bool;
}
