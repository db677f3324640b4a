//! Block / unblock workflow
//!
//! Mutations are not gated by the availability monitor: they are user
//! initiated, and their failures surface as notices instead.

use std::time::Duration;

use crate::engine::{Dispatch, FilterEngine, Pending};
use crate::host::{ContextClick, EntryView, PageHost};
use crate::types::{EntryIdentity, IdKind, Notice, ToggleState, Verdict};
use crate::wire::{self, BlockReply, RemoveReply, ServiceError};

impl<E: EntryView + Clone> FilterEngine<E> {
    /// Request a block of `target`. Empty id or name is a no-op.
    pub fn block(&mut self, target: EntryIdentity) -> Option<Dispatch> {
        if target.id.is_empty() || target.name.is_empty() {
            log::debug!("ignoring block with empty id or name");
            return None;
        }
        let request = wire::block_request(&target.id, &target.name);
        Some(self.register(Pending::Block { target }, request))
    }

    /// Request removal of `subject` from the blocklist.
    pub fn unblock(&mut self, subject: &str) -> Option<Dispatch> {
        if subject.is_empty() {
            return None;
        }
        let request = wire::remove_request(subject);
        Some(self.register(
            Pending::Unblock {
                subject: subject.to_string(),
            },
            request,
        ))
    }

    /// Profile toggle pressed. Blocks or unblocks the viewed subject
    /// depending on the shown state.
    pub fn toggle_click<H: PageHost<Entry = E>>(&mut self, host: &H) -> Option<Dispatch> {
        let (subject, state) = {
            let toggle = self.toggle.as_ref()?;
            (toggle.subject().to_string(), toggle.state())
        };
        match state {
            ToggleState::Hidden => None,
            ToggleState::Blocked => self.unblock(&subject),
            ToggleState::NotBlocked => {
                let name = self
                    .strategy
                    .subject_name_selector()
                    .and_then(|selector| host.page_text(selector))
                    .map(|name| name.trim().to_string())
                    .unwrap_or_default();
                self.block(EntryIdentity::new(subject, name))
            }
        }
    }

    /// Find the block target for a right-click.
    ///
    /// Walks up to `context_search_depth` nodes, starting at the clicked one.
    /// Content ids are mapped to their owner; an unknown owner leaves the
    /// target unresolved.
    pub fn resolve_context_target(&self, click: &ContextClick) -> Option<EntryIdentity> {
        let found = click
            .ancestors
            .iter()
            .take(self.config.context_search_depth)
            .find_map(|a| a.as_ref())?;

        match self.strategy.id_kind() {
            IdKind::Subject => Some(found.clone()),
            IdKind::Content => {
                let owner = self.owners.owner_of(&found.id)?;
                Some(EntryIdentity::new(owner, found.name.clone()))
            }
        }
    }

    /// Handle a right-click: show the block menu for the resolved target,
    /// or tell the user to retry.
    pub fn context_menu<H: PageHost<Entry = E>>(
        &mut self,
        host: &mut H,
        click: &ContextClick,
    ) -> Option<EntryIdentity> {
        match self.resolve_context_target(click) {
            Some(target) => {
                host.show_block_menu(click.x, click.y, &target);
                Some(target)
            }
            None => {
                host.notify(Notice::TargetNotFound);
                None
            }
        }
    }

    pub(crate) fn finish_block<H: PageHost<Entry = E>>(
        &mut self,
        host: &mut H,
        target: EntryIdentity,
        result: Result<String, ServiceError>,
        now: Duration,
    ) {
        let reply = match result {
            Ok(body) => BlockReply::decode(&body),
            Err(e) => {
                log::warn!("block {} failed: {}", target.id, e);
                host.notify(Notice::GenericError);
                return;
            }
        };

        match reply {
            BlockReply::Ok => {
                log::info!("blocked {} ({})", target.id, target.name);
                self.cache.record(&target.id, Verdict::Blocked);
                let owned: Vec<String> = self.owners.content_of(&target.id).map(str::to_string).collect();
                for content in owned {
                    self.cache.record(&content, Verdict::Blocked);
                }
                self.update_toggle(host, &target.id, Verdict::Blocked);
                self.rescan_at = Some(now + self.config.rescan_delay());
            }
            BlockReply::InvalidIdentifier => host.notify(Notice::InvalidIdentifier),
            BlockReply::StorageFailure => host.notify(Notice::StorageFailure),
            BlockReply::Other(body) => {
                log::warn!("unexpected block reply for {}: {}", target.id, body);
                host.notify(Notice::GenericError);
            }
        }
    }

    pub(crate) fn finish_unblock<H: PageHost<Entry = E>>(
        &mut self,
        host: &mut H,
        subject: &str,
        result: Result<String, ServiceError>,
    ) {
        let reply = match result {
            Ok(body) => RemoveReply::decode(&body),
            Err(e) => {
                log::warn!("unblock {} failed: {}", subject, e);
                host.notify(Notice::GenericError);
                return;
            }
        };

        match reply {
            RemoveReply::Ok => {
                log::info!("unblocked {}", subject);
                self.cache.record(subject, Verdict::NotBlocked);
                self.update_toggle(host, subject, Verdict::NotBlocked);
            }
            RemoveReply::InvalidIdentifier => host.notify(Notice::InvalidIdentifier),
            RemoveReply::Failed => host.notify(Notice::UnblockFailed),
            RemoveReply::Other(body) => {
                log::warn!("unexpected remove reply for {}: {}", subject, body);
                host.notify(Notice::GenericError);
            }
        }
    }
}
