//! In-memory page host
//!
//! Backs the CLI `replay` command and the engine tests. A page is a list of
//! fixture entries, each holding the attributes and texts its selectors
//! resolve to.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::host::{ContextClick, EntryView, PageHost};
use crate::types::{EntryIdentity, Notice, ToggleState};

/// One rendered entry of a fixture page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureEntry {
    /// Label used when reporting hidden entries
    #[serde(default)]
    pub label: String,
    /// selector -> attribute name -> value
    #[serde(default)]
    pub attrs: BTreeMap<String, BTreeMap<String, String>>,
    /// selector -> text
    #[serde(default)]
    pub texts: BTreeMap<String, String>,
}

impl FixtureEntry {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    pub fn with_attr(mut self, selector: &str, name: &str, value: &str) -> Self {
        self.attrs
            .entry(selector.to_string())
            .or_default()
            .insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_text(mut self, selector: &str, text: &str) -> Self {
        self.texts.insert(selector.to_string(), text.to_string());
        self
    }
}

/// A fixture page: document-level texts plus the rendered entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixturePage {
    #[serde(default)]
    pub texts: BTreeMap<String, String>,
    #[serde(default)]
    pub entries: Vec<FixtureEntry>,
}

/// Entry handle: position on the page plus a snapshot of its fields.
#[derive(Debug, Clone)]
pub struct MemoryEntry {
    pub index: usize,
    fields: FixtureEntry,
}

impl EntryView for MemoryEntry {
    fn attr(&self, selector: &str, name: &str) -> Option<String> {
        self.fields.attrs.get(selector)?.get(name).cloned()
    }

    fn text(&self, selector: &str) -> Option<String> {
        self.fields.texts.get(selector).cloned()
    }
}

#[derive(Debug, Default)]
pub struct MemoryHost {
    page: FixturePage,
    hidden: BTreeSet<usize>,
    annotations: HashMap<usize, EntryIdentity>,
    listeners: HashMap<usize, usize>,
    annotate_calls: usize,
    notices: Vec<Notice>,
    menus: Vec<(i32, i32, EntryIdentity)>,
    toggle: Option<ToggleState>,
}

impl MemoryHost {
    pub fn new(page: FixturePage) -> Self {
        Self {
            page,
            ..Self::default()
        }
    }

    pub fn from_entries(entries: Vec<FixtureEntry>) -> Self {
        Self::new(FixturePage {
            texts: BTreeMap::new(),
            entries,
        })
    }

    pub fn page_mut(&mut self) -> &mut FixturePage {
        &mut self.page
    }

    pub fn is_hidden(&self, index: usize) -> bool {
        self.hidden.contains(&index)
    }

    pub fn hidden(&self) -> impl Iterator<Item = usize> + '_ {
        self.hidden.iter().copied()
    }

    /// Labels of hidden entries, in page order.
    pub fn hidden_labels(&self) -> Vec<&str> {
        self.hidden
            .iter()
            .filter_map(|&i| self.page.entries.get(i))
            .map(|e| e.label.as_str())
            .collect()
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    pub fn menus(&self) -> &[(i32, i32, EntryIdentity)] {
        &self.menus
    }

    pub fn toggle(&self) -> Option<ToggleState> {
        self.toggle
    }

    /// Context-menu listeners bound on the entry.
    pub fn listener_count(&self, index: usize) -> usize {
        self.listeners.get(&index).copied().unwrap_or(0)
    }

    pub fn annotate_calls(&self) -> usize {
        self.annotate_calls
    }

    /// Simulate a right-click `depth` elements below the entry at `index`.
    ///
    /// Each bound listener delivers one click; an entry without a listener
    /// delivers none.
    pub fn right_click(&self, index: usize, depth: usize, x: i32, y: i32) -> Vec<ContextClick> {
        let mut ancestors = vec![None; depth];
        ancestors.push(self.annotations.get(&index).cloned());
        (0..self.listener_count(index))
            .map(|_| ContextClick {
                x,
                y,
                ancestors: ancestors.clone(),
            })
            .collect()
    }
}

impl PageHost for MemoryHost {
    type Entry = MemoryEntry;

    fn entries(&self, _selector: &str) -> Vec<MemoryEntry> {
        self.page
            .entries
            .iter()
            .enumerate()
            .map(|(index, fields)| MemoryEntry {
                index,
                fields: fields.clone(),
            })
            .collect()
    }

    fn page_text(&self, selector: &str) -> Option<String> {
        self.page.texts.get(selector).cloned()
    }

    fn hide(&mut self, entry: &MemoryEntry) {
        self.hidden.insert(entry.index);
    }

    fn annotation(&self, entry: &MemoryEntry) -> Option<EntryIdentity> {
        self.annotations.get(&entry.index).cloned()
    }

    fn annotate(&mut self, entry: &MemoryEntry, identity: &EntryIdentity) {
        self.annotate_calls += 1;
        self.annotations.insert(entry.index, identity.clone());
        self.listeners.entry(entry.index).or_insert(1);
    }

    fn notify(&mut self, notice: Notice) {
        self.notices.push(notice);
    }

    fn show_block_menu(&mut self, x: i32, y: i32, target: &EntryIdentity) {
        self.menus.push((x, y, target.clone()));
    }

    fn render_toggle(&mut self, state: ToggleState) {
        self.toggle = Some(state);
    }
}
