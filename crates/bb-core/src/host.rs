//! Host page abstraction
//!
//! The engine never touches markup directly. A host lists rendered entries,
//! reads fields inside them, hides them and presents notices. Hosts are
//! expected to keep entry handles stable across cycles so the same rendered
//! node is revisited rather than re-created.

use crate::types::{EntryIdentity, Notice, ToggleState};

/// Read access to one rendered entry.
pub trait EntryView {
    /// Attribute `name` of the first element matching `selector` inside the entry.
    fn attr(&self, selector: &str, name: &str) -> Option<String>;

    /// Text of the first element matching `selector` inside the entry.
    fn text(&self, selector: &str) -> Option<String>;
}

/// The rendering layer the engine runs against.
pub trait PageHost {
    /// Handle to a rendered entry.
    type Entry: EntryView + Clone;

    /// Entries currently rendered for `selector`, in document order.
    fn entries(&self, selector: &str) -> Vec<Self::Entry>;

    /// Text of the first element matching `selector` anywhere on the page.
    fn page_text(&self, selector: &str) -> Option<String>;

    fn hide(&mut self, entry: &Self::Entry);

    /// Identity stored on the entry by a previous [`PageHost::annotate`].
    fn annotation(&self, entry: &Self::Entry) -> Option<EntryIdentity>;

    /// Store `identity` on the entry and bind the context-menu listener.
    ///
    /// The listener must be bound at most once per entry; storing a new
    /// identity on an already bound entry only replaces the stored values.
    fn annotate(&mut self, entry: &Self::Entry, identity: &EntryIdentity);

    fn notify(&mut self, notice: Notice);

    /// Show the single-action block menu at a screen coordinate.
    fn show_block_menu(&mut self, x: i32, y: i32, target: &EntryIdentity);

    /// Render the profile page toggle. Hosts without a toggle ignore it.
    fn render_toggle(&mut self, _state: ToggleState) {}
}

/// A right-click on the page, as seen by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextClick {
    pub x: i32,
    pub y: i32,
    /// Annotations of the clicked node and its ancestors, nearest first
    pub ancestors: Vec<Option<EntryIdentity>>,
}
