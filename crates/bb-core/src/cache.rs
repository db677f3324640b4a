//! Verdict cache and content owner map
//!
//! The cache is cleared as a whole on a timer; there is no per-key expiry.
//! Each clear starts a new epoch.

use std::collections::HashMap;

use crate::types::Verdict;

/// Identifier -> verdict cache. Absence means unknown.
#[derive(Debug, Default)]
pub struct ResultCache {
    entries: HashMap<String, Verdict>,
    epoch: u64,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached verdict, or `None` if the id must be queried.
    #[inline]
    pub fn lookup(&self, id: &str) -> Option<Verdict> {
        self.entries.get(id).copied()
    }

    /// Record a verdict. Last write wins.
    pub fn record(&mut self, id: &str, verdict: Verdict) {
        self.entries.insert(id.to_string(), verdict);
    }

    /// Drop every entry and start a new epoch.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.epoch += 1;
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Content id -> owning subject id. Lives for the page session and
/// survives cache clears.
#[derive(Debug, Default)]
pub struct OwnerMap {
    owners: HashMap<String, String>,
}

impl OwnerMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, content_id: &str, owner: &str) {
        self.owners.insert(content_id.to_string(), owner.to_string());
    }

    pub fn owner_of(&self, content_id: &str) -> Option<&str> {
        self.owners.get(content_id).map(|s| s.as_str())
    }

    /// All content ids known to belong to `owner`.
    pub fn content_of<'a>(&'a self, owner: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.owners
            .iter()
            .filter(move |(_, o)| o.as_str() == owner)
            .map(|(content, _)| content.as_str())
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}
