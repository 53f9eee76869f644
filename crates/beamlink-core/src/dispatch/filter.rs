//! Override filter predicates

use alloc::string::{String, ToString};

use super::{DispatchAction, DispatchIntent};

/// Content predicate of an override registration
///
/// A filter naming neither a media type nor a locator prefix only matches
/// intents that carry no content.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContentFilter {
    pub action: Option<DispatchAction>,
    /// `type/subtype`, `type/*` or `*/*`
    pub mime_type: Option<String>,
    pub uri_prefix: Option<String>,
}

impl ContentFilter {
    pub fn for_action(action: DispatchAction) -> Self {
        Self {
            action: Some(action),
            ..Self::default()
        }
    }

    pub fn with_mime_type(mut self, mime_type: &str) -> Self {
        self.mime_type = Some(mime_type.to_ascii_lowercase());
        self
    }

    pub fn with_uri_prefix(mut self, prefix: &str) -> Self {
        self.uri_prefix = Some(prefix.to_string());
        self
    }

    pub fn matches(&self, intent: &DispatchIntent) -> bool {
        if self.action.is_some_and(|action| action != intent.action) {
            return false;
        }

        if self.mime_type.is_none() && self.uri_prefix.is_none() {
            return intent.mime_type.is_none() && intent.uri.is_none();
        }

        let mime_ok = match (&self.mime_type, &intent.mime_type) {
            (None, _) => true,
            (Some(pattern), Some(mime_type)) => mime_matches(pattern, mime_type),
            (Some(_), None) => false,
        };
        let uri_ok = match (&self.uri_prefix, &intent.uri) {
            (None, _) => true,
            (Some(prefix), Some(uri)) => uri.starts_with(prefix.as_str()),
            (Some(_), None) => false,
        };
        mime_ok && uri_ok
    }
}

fn mime_matches(pattern: &str, mime_type: &str) -> bool {
    if pattern == "*/*" {
        return true;
    }
    match pattern.strip_suffix("/*") {
        Some(major) => mime_type
            .split_once('/')
            .is_some_and(|(ty, _)| ty.eq_ignore_ascii_case(major)),
        None => pattern.eq_ignore_ascii_case(mime_type),
    }
}

/// Every entry of a non-empty `required` list is present in `sorted_techs`
pub fn tech_list_matches(sorted_techs: &[String], required: &[String]) -> bool {
    !required.is_empty()
        && required
            .iter()
            .all(|tech| sorted_techs.binary_search(tech).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use alloc::vec::Vec;

    fn create_test_intent(uri: Option<&str>, mime_type: Option<&str>) -> DispatchIntent {
        DispatchIntent {
            action: DispatchAction::NdefDiscovered,
            uri: uri.map(ToString::to_string),
            mime_type: mime_type.map(ToString::to_string),
            package: None,
        }
    }

    #[test]
    fn test_mime_wildcards() {
        let intent = create_test_intent(None, Some("text/plain"));
        assert!(ContentFilter::default().with_mime_type("text/*").matches(&intent));
        assert!(ContentFilter::default().with_mime_type("*/*").matches(&intent));
        assert!(ContentFilter::default().with_mime_type("Text/Plain").matches(&intent));
        assert!(!ContentFilter::default().with_mime_type("image/*").matches(&intent));
    }

    #[test]
    fn test_uri_prefix_and_action() {
        let intent = create_test_intent(Some("https://example.com/a"), None);
        let filter = ContentFilter::for_action(DispatchAction::NdefDiscovered)
            .with_uri_prefix("https://example.com");
        assert!(filter.matches(&intent));

        let wrong_action =
            ContentFilter::for_action(DispatchAction::TagDiscovered).with_uri_prefix("https://");
        assert!(!wrong_action.matches(&intent));
    }

    #[test]
    fn test_empty_filter_matches_only_bare_intents() {
        let filter = ContentFilter::default();
        assert!(filter.matches(&DispatchIntent::new(DispatchAction::TagDiscovered)));
        assert!(!filter.matches(&create_test_intent(Some("tel:1"), None)));
    }

    #[test]
    fn test_tech_subset() {
        let techs: Vec<String> = vec!["IsoDep".into(), "NfcA".into(), "Ndef".into()];
        let mut sorted = techs.clone();
        sorted.sort();
        assert!(tech_list_matches(&sorted, &["NfcA".into(), "IsoDep".into()]));
        assert!(!tech_list_matches(&sorted, &["NfcB".into()]));
        assert!(!tech_list_matches(&sorted, &[]));
    }
}
