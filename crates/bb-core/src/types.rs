//! Core type definitions for the feed blocker
//!
//! These types are shared by the engine, the wire codec and the hosts
//! that drive it (native runtime and in-page wasm session).

use serde::{Deserialize, Serialize};

// =============================================================================
// Page Kinds
// =============================================================================

/// Page layout the engine is running on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageKind {
    /// A user's space page (toggle button only)
    Profile,
    /// Video detail page (recommendation sidebar)
    Video,
    /// Trending feed, entries expose video ids only
    Popular,
    /// Home feed
    Home,
}

impl PageKind {
    /// Detect the page kind from the current page URL.
    pub fn from_url(url: &str) -> Option<Self> {
        crate::url::page_kind(url)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Profile => "profile",
            Self::Video => "video",
            Self::Popular => "popular",
            Self::Home => "home",
        }
    }
}

// =============================================================================
// Identifier Kinds and Lookup Shapes
// =============================================================================

/// What an extracted identifier refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdKind {
    /// Blockable author id (`mid`)
    Subject,
    /// Content id (`BV...`) whose owner is resolved by the service
    Content,
}

/// How identifiers are sent to the verification service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LookupShape {
    /// One request per identifier
    Single,
    /// Comma-joined identifiers, positionally aligned response
    Batched,
}

// =============================================================================
// Verdicts
// =============================================================================

/// Blocklist verdict. "Unknown" is represented by `Option<Verdict>::None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verdict {
    Blocked,
    NotBlocked,
}

impl Verdict {
    /// Parse the service's `"True"` / `"False"` flags. Anything else is unresolved.
    pub fn from_flag(flag: &str) -> Option<Self> {
        match flag.trim() {
            "True" => Some(Self::Blocked),
            "False" => Some(Self::NotBlocked),
            _ => None,
        }
    }

    #[inline]
    pub fn is_blocked(self) -> bool {
        self == Self::Blocked
    }
}

// =============================================================================
// Entry Identity
// =============================================================================

/// Identifier and display name resolved from a rendered entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryIdentity {
    /// Subject id, or content id on content-identifier pages
    pub id: String,
    /// Author display name
    pub name: String,
}

impl EntryIdentity {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Result of verifying one identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lookup {
    /// The identifier as it was sent
    pub id: String,
    /// `None` when the service could not answer for this id yet
    pub verdict: Option<Verdict>,
    /// Owning subject, only reported for content ids
    pub owner: Option<String>,
}

impl Lookup {
    pub fn unresolved(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            verdict: None,
            owner: None,
        }
    }
}

// =============================================================================
// Notices
// =============================================================================

/// User-visible notices. These are the only failures surfaced to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Notice {
    /// Verification service went unreachable
    Offline,
    /// Service rejected the id (`ERR1`)
    InvalidIdentifier,
    /// Service failed to store the block (`ERR2` on `/block`)
    StorageFailure,
    /// Service failed to remove the block (`ERR2` on `/remove`)
    UnblockFailed,
    /// Any other mutation failure
    GenericError,
    /// Context menu could not resolve a subject id
    TargetNotFound,
}

impl Notice {
    pub fn message(&self) -> &'static str {
        match self {
            Self::Offline => "blocklist service is offline",
            Self::InvalidIdentifier => "invalid user id",
            Self::StorageFailure => "failed to store block",
            Self::UnblockFailed => "failed to remove block",
            Self::GenericError => "request failed",
            Self::TargetNotFound => "user id not found yet, please retry",
        }
    }
}

// =============================================================================
// Toggle State
// =============================================================================

/// Render state of the profile page block toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToggleState {
    /// Service has not answered yet; the button stays invisible
    Hidden,
    Blocked,
    NotBlocked,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_from_flag() {
        assert_eq!(Verdict::from_flag("True"), Some(Verdict::Blocked));
        assert_eq!(Verdict::from_flag("False\n"), Some(Verdict::NotBlocked));
        assert_eq!(Verdict::from_flag("ERR2"), None);
        assert_eq!(Verdict::from_flag("None"), None);
        assert_eq!(Verdict::from_flag("true"), None);
    }

    #[test]
    fn test_page_kind_serde_names() {
        let json = serde_json::to_string(&PageKind::Popular).unwrap();
        assert_eq!(json, "\"popular\"");
        assert_eq!(PageKind::Home.as_str(), "home");
    }
}
