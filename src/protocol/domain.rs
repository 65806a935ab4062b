//! Protocol domains and their event categories.
//!
//! A domain groups related commands and events (`Network`, `Page`, ...).
//! Most domains only deliver events after `<Domain>.enable` was sent; the
//! connection decides which ones to enable by mapping each registered
//! [`EventCategory`] back to its domain.
//!
//! [`DOMAIN_EVENTS`] is the static table used to register a handler for a
//! whole domain at once.

// ============================================================================
// Imports
// ============================================================================

use std::borrow::Cow;
use std::fmt;

use super::event::EventCategory;

// ============================================================================
// Domain
// ============================================================================

/// A protocol domain such as `Network` or `Page`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Domain(Cow<'static, str>);

impl Domain {
    /// `Target` domain (always on by default).
    pub const TARGET: Self = Self(Cow::Borrowed("Target"));

    /// `Storage` domain (always on by default).
    pub const STORAGE: Self = Self(Cow::Borrowed("Storage"));

    /// `Page` domain.
    pub const PAGE: Self = Self(Cow::Borrowed("Page"));

    /// `Network` domain.
    pub const NETWORK: Self = Self(Cow::Borrowed("Network"));

    /// `Runtime` domain.
    pub const RUNTIME: Self = Self(Cow::Borrowed("Runtime"));

    /// `Fetch` domain.
    pub const FETCH: Self = Self(Cow::Borrowed("Fetch"));

    /// Creates a domain from its name.
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    /// Returns the domain name.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the method that enables this domain, e.g. `Network.enable`.
    #[inline]
    #[must_use]
    pub fn enable_method(&self) -> String {
        format!("{}.enable", self.0)
    }

    /// Returns every known event category of this domain.
    ///
    /// Empty for domains missing from [`DOMAIN_EVENTS`].
    #[must_use]
    pub fn event_categories(&self) -> Vec<EventCategory> {
        domain_events(self.as_str())
            .unwrap_or_default()
            .iter()
            .map(|name| EventCategory::new(format!("{}.{}", self.0, name)))
            .collect()
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for Domain {
    fn from(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }
}

impl From<String> for Domain {
    fn from(name: String) -> Self {
        Self(Cow::Owned(name))
    }
}

// ============================================================================
// Static Tables
// ============================================================================

/// Domains that deliver events without an explicit `enable`.
pub const DEFAULT_ALWAYS_ON: &[Domain] = &[Domain::TARGET, Domain::STORAGE];

/// Event names per domain.
pub const DOMAIN_EVENTS: &[(&str, &[&str])] = &[
    (
        "Browser",
        &["downloadProgress", "downloadWillBegin"],
    ),
    ("Console", &["messageAdded"]),
    (
        "DOM",
        &[
            "attributeModified",
            "attributeRemoved",
            "characterDataModified",
            "childNodeCountUpdated",
            "childNodeInserted",
            "childNodeRemoved",
            "distributedNodesUpdated",
            "documentUpdated",
            "inlineStyleInvalidated",
            "pseudoElementAdded",
            "pseudoElementRemoved",
            "setChildNodes",
            "shadowRootPopped",
            "shadowRootPushed",
            "topLayerElementsUpdated",
        ],
    ),
    (
        "Debugger",
        &[
            "breakpointResolved",
            "paused",
            "resumed",
            "scriptFailedToParse",
            "scriptParsed",
        ],
    ),
    ("Emulation", &["virtualTimeBudgetExpired"]),
    ("Fetch", &["authRequired", "requestPaused"]),
    (
        "Inspector",
        &["detached", "targetCrashed", "targetReloadedAfterCrash"],
    ),
    ("Log", &["entryAdded"]),
    (
        "Network",
        &[
            "dataReceived",
            "eventSourceMessageReceived",
            "loadingFailed",
            "loadingFinished",
            "policyUpdated",
            "reportingApiReportAdded",
            "requestServedFromCache",
            "requestWillBeSent",
            "requestWillBeSentExtraInfo",
            "resourceChangedPriority",
            "responseReceived",
            "responseReceivedExtraInfo",
            "signedExchangeReceived",
            "trustTokenOperationDone",
            "webSocketClosed",
            "webSocketCreated",
            "webSocketFrameError",
            "webSocketFrameReceived",
            "webSocketFrameSent",
            "webSocketHandshakeResponseReceived",
            "webSocketWillSendHandshakeRequest",
        ],
    ),
    (
        "Page",
        &[
            "backForwardCacheNotUsed",
            "compilationCacheProduced",
            "documentOpened",
            "domContentEventFired",
            "downloadProgress",
            "downloadWillBegin",
            "fileChooserOpened",
            "frameAttached",
            "frameDetached",
            "frameNavigated",
            "frameRequestedNavigation",
            "frameResized",
            "frameStartedLoading",
            "frameStoppedLoading",
            "interstitialHidden",
            "interstitialShown",
            "javascriptDialogClosed",
            "javascriptDialogOpening",
            "lifecycleEvent",
            "loadEventFired",
            "navigatedWithinDocument",
            "screencastFrame",
            "screencastVisibilityChanged",
            "windowOpen",
        ],
    ),
    (
        "Runtime",
        &[
            "bindingCalled",
            "consoleAPICalled",
            "exceptionRevoked",
            "exceptionThrown",
            "executionContextCreated",
            "executionContextDestroyed",
            "executionContextsCleared",
            "inspectRequested",
        ],
    ),
    (
        "Security",
        &[
            "certificateError",
            "securityStateChanged",
            "visibleSecurityStateChanged",
        ],
    ),
    (
        "Storage",
        &[
            "cacheStorageContentUpdated",
            "cacheStorageListUpdated",
            "indexedDBContentUpdated",
            "indexedDBListUpdated",
            "interestGroupAccessed",
            "sharedStorageAccessed",
            "storageBucketCreatedOrUpdated",
            "storageBucketDeleted",
        ],
    ),
    (
        "Target",
        &[
            "attachedToTarget",
            "detachedFromTarget",
            "receivedMessageFromTarget",
            "targetCrashed",
            "targetCreated",
            "targetDestroyed",
            "targetInfoChanged",
        ],
    ),
];

/// Looks up the event names of a domain.
#[must_use]
pub fn domain_events(domain: &str) -> Option<&'static [&'static str]> {
    DOMAIN_EVENTS
        .iter()
        .find(|(name, _)| *name == domain)
        .map(|(_, events)| *events)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enable_method() {
        assert_eq!(Domain::NETWORK.enable_method(), "Network.enable");
        assert_eq!(Domain::new("Animation").enable_method(), "Animation.enable");
    }

    #[test]
    fn test_event_categories_for_known_domain() {
        let categories = Domain::FETCH.event_categories();
        let names: Vec<_> = categories.iter().map(EventCategory::as_str).collect();
        assert_eq!(names, ["Fetch.authRequired", "Fetch.requestPaused"]);
        assert!(categories.iter().all(|c| c.domain() == Domain::FETCH));
    }

    #[test]
    fn test_event_categories_for_unknown_domain() {
        assert!(Domain::new("Nope").event_categories().is_empty());
    }

    #[test]
    fn test_owned_and_borrowed_domains_compare_equal() {
        assert_eq!(Domain::from(String::from("Page")), Domain::PAGE);
    }

    #[test]
    fn test_table_is_sorted_and_unique() {
        let names: Vec<_> = DOMAIN_EVENTS.iter().map(|(name, _)| *name).collect();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(names, sorted);
    }
}
