//! Outbound payload selection
//!
//! Decides what (if anything) to offer when a link comes up: the registered
//! foreground application's own payload, or a default "get this app" link
//! for whatever application is in front.

use alloc::{format, sync::Arc, vec};

use super::state::OutboundIntent;
use crate::events::{ForegroundPayloadProvider, ForegroundQuery};
use crate::ndef::{NdefMessage, NdefRecord};
use crate::types::PrincipalId;
use crate::{debug, trace};

/// Store page used by the default payload
const STORE_URI_PREFIX: &str = "http://play.google.com/store/apps/details?id=";

/// The single payload provider registration
#[derive(Clone)]
pub struct PayloadRegistration {
    pub principal: PrincipalId,
    pub provider: Arc<dyn ForegroundPayloadProvider>,
}

impl PayloadRegistration {
    pub fn new(principal: PrincipalId, provider: Arc<dyn ForegroundPayloadProvider>) -> Self {
        Self {
            principal,
            provider,
        }
    }
}

impl core::fmt::Debug for PayloadRegistration {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PayloadRegistration")
            .field("principal", &self.principal)
            .finish_non_exhaustive()
    }
}

/// Store link plus application record for `package`
pub fn default_outbound_intent(package: &str) -> OutboundIntent {
    let uri = format!("{}{}&feature=beam", STORE_URI_PREFIX, package);
    let message = NdefMessage::from_records(vec![
        NdefRecord::uri(&uri),
        NdefRecord::application(package),
    ]);
    OutboundIntent::message(message)
}

/// Pick the payload to offer a peer speaking `peer_version`
///
/// A registered provider whose principal is in the foreground always decides;
/// returning `None` from it means nothing is offered. Without one, the default
/// payload for the foreground package is produced when `generate_default` is
/// set and the package has not opted out.
pub fn prepare_outbound_intent(
    send_enabled: bool,
    registration: Option<&PayloadRegistration>,
    foreground: &dyn ForegroundQuery,
    peer_version: u8,
    generate_default: bool,
) -> Option<OutboundIntent> {
    if !send_enabled {
        return None;
    }

    let principals = foreground.frontmost_principals();
    let first = *principals.first()?;
    if foreground.outbound_restricted(first) {
        debug!("Outbound sharing restricted for {}", first);
        return None;
    }

    if let Some(registration) = registration {
        if foreground.is_frontmost(registration.principal) {
            trace!("Asking {} for its payload", registration.principal);
            return registration.provider.outbound_intent(peer_version);
        }
    }

    if !generate_default {
        return None;
    }
    let package = foreground.package_for(first)?;
    if foreground.default_sharing_disabled(&package) {
        debug!("Default payload disabled for {}", package);
        return None;
    }
    Some(default_outbound_intent(&package))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::{String, ToString};
    use alloc::vec::Vec;

    struct TestForeground {
        principals: Vec<PrincipalId>,
        package: Option<String>,
        sharing_disabled: bool,
        restricted: bool,
    }

    impl ForegroundQuery for TestForeground {
        fn is_frontmost(&self, principal: PrincipalId) -> bool {
            self.principals.contains(&principal)
        }

        fn frontmost_principals(&self) -> Vec<PrincipalId> {
            self.principals.clone()
        }

        fn package_for(&self, _principal: PrincipalId) -> Option<String> {
            self.package.clone()
        }

        fn default_sharing_disabled(&self, _package: &str) -> bool {
            self.sharing_disabled
        }

        fn outbound_restricted(&self, _principal: PrincipalId) -> bool {
            self.restricted
        }
    }

    struct FixedProvider(Option<OutboundIntent>);

    impl ForegroundPayloadProvider for FixedProvider {
        fn outbound_intent(&self, _peer_protocol_version: u8) -> Option<OutboundIntent> {
            self.0.clone()
        }
    }

    fn create_test_foreground() -> TestForeground {
        TestForeground {
            principals: vec![PrincipalId(10_001)],
            package: Some("com.example.app".to_string()),
            sharing_disabled: false,
            restricted: false,
        }
    }

    #[test]
    fn test_default_payload_for_foreground_package() {
        let intent = prepare_outbound_intent(true, None, &create_test_foreground(), 0x11, true).unwrap();
        let message = intent.message.unwrap();
        assert_eq!(
            message.first().to_uri().unwrap(),
            "http://play.google.com/store/apps/details?id=com.example.app&feature=beam"
        );
        assert_eq!(message.application_packages(), vec!["com.example.app".to_string()]);
    }

    #[test]
    fn test_registered_provider_wins() {
        let custom = OutboundIntent::message(NdefMessage::single(NdefRecord::uri("tel:123")).unwrap());
        let registration =
            PayloadRegistration::new(PrincipalId(10_001), Arc::new(FixedProvider(Some(custom.clone()))));
        let intent =
            prepare_outbound_intent(true, Some(&registration), &create_test_foreground(), 0x11, true);
        assert_eq!(intent, Some(custom));
    }

    #[test]
    fn test_provider_declining_means_nothing() {
        let registration = PayloadRegistration::new(PrincipalId(10_001), Arc::new(FixedProvider(None)));
        let intent =
            prepare_outbound_intent(true, Some(&registration), &create_test_foreground(), 0x11, true);
        assert!(intent.is_none());
    }

    #[test]
    fn test_background_provider_falls_back_to_default() {
        let registration = PayloadRegistration::new(PrincipalId(42), Arc::new(FixedProvider(None)));
        let intent =
            prepare_outbound_intent(true, Some(&registration), &create_test_foreground(), 0x11, true);
        assert!(intent.is_some());
    }

    #[test]
    fn test_policy_blocks_payload() {
        let foreground = create_test_foreground();
        assert!(prepare_outbound_intent(false, None, &foreground, 0x11, true).is_none());
        assert!(prepare_outbound_intent(true, None, &foreground, 0x11, false).is_none());

        let restricted = TestForeground {
            restricted: true,
            ..create_test_foreground()
        };
        assert!(prepare_outbound_intent(true, None, &restricted, 0x11, true).is_none());

        let opted_out = TestForeground {
            sharing_disabled: true,
            ..create_test_foreground()
        };
        assert!(prepare_outbound_intent(true, None, &opted_out, 0x11, true).is_none());

        let empty = TestForeground {
            principals: Vec::new(),
            ..create_test_foreground()
        };
        assert!(prepare_outbound_intent(true, None, &empty, 0x11, true).is_none());
    }
}
