//! Filtering Engine
//!
//! One engine per page session. It owns the verdict cache, the content
//! owner map and the availability monitor, and runs one scan cycle at a
//! time against a [`PageHost`].
//!
//! The engine does no I/O. A scan returns the service requests to send;
//! the driver hands each response back through [`FilterEngine::complete`].
//! Responses may arrive in any order relative to later scans.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use serde::Serialize;

use crate::availability::{AvailabilityMonitor, Permit};
use crate::cache::{OwnerMap, ResultCache};
use crate::config::{EngineConfig, PageTimings};
use crate::host::{EntryView, PageHost};
use crate::strategy::PageStrategy;
use crate::toggle::SubjectToggle;
use crate::types::{EntryIdentity, Lookup, LookupShape, Notice, PageKind, ToggleState, Verdict};
use crate::wire::{self, Endpoint, ServiceError, ServiceRequest};

/// Correlates a dispatched request with its response.
pub type BatchId = u64;

/// A request the driver must send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dispatch {
    pub batch: BatchId,
    pub request: ServiceRequest,
}

/// Summary of one scan cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Entries with a resolvable identifier
    pub extracted: usize,
    /// Entries without one
    pub skipped: usize,
    /// Entries hidden from cache hits
    pub hidden: usize,
    /// Distinct identifiers that missed the cache
    pub queued: usize,
    pub dispatches: Vec<Dispatch>,
}

pub(crate) enum Pending<E> {
    Lookup {
        endpoint: Endpoint,
        ids: Vec<String>,
        entries: Vec<(String, E)>,
    },
    Block {
        target: EntryIdentity,
    },
    Unblock {
        subject: String,
    },
}

pub struct FilterEngine<E> {
    pub(crate) strategy: Box<dyn PageStrategy>,
    pub(crate) config: EngineConfig,
    pub(crate) cache: ResultCache,
    pub(crate) owners: OwnerMap,
    pub(crate) monitor: AvailabilityMonitor,
    pub(crate) toggle: Option<SubjectToggle>,
    pub(crate) pending: HashMap<BatchId, Pending<E>>,
    in_flight: HashSet<String>,
    next_batch: BatchId,
    pub(crate) rescan_at: Option<Duration>,
}

impl<E: EntryView + Clone> FilterEngine<E> {
    pub fn new(strategy: Box<dyn PageStrategy>, config: EngineConfig) -> Self {
        let toggle = strategy.current_subject().map(SubjectToggle::new);
        let monitor = AvailabilityMonitor::new(config.recovery);
        Self {
            strategy,
            config,
            cache: ResultCache::new(),
            owners: OwnerMap::new(),
            monitor,
            toggle,
            pending: HashMap::new(),
            in_flight: HashSet::new(),
            next_batch: 1,
            rescan_at: None,
        }
    }

    /// Engine for a page URL, or `None` if the page is not filtered.
    pub fn for_url(url: &str, config: EngineConfig) -> Option<Self> {
        crate::strategy::for_url(url).map(|strategy| Self::new(strategy, config))
    }

    pub fn kind(&self) -> PageKind {
        self.strategy.kind()
    }

    pub fn strategy(&self) -> &dyn PageStrategy {
        self.strategy.as_ref()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn timings(&self) -> &PageTimings {
        self.config.timings(self.strategy.kind())
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn owners(&self) -> &OwnerMap {
        &self.owners
    }

    pub fn monitor(&self) -> &AvailabilityMonitor {
        &self.monitor
    }

    pub fn toggle_state(&self) -> Option<ToggleState> {
        self.toggle.as_ref().map(|t| t.state())
    }

    /// Requests sent but not yet completed.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_in_flight(&self, id: &str) -> bool {
        self.in_flight.contains(id)
    }

    /// End the current cache epoch.
    pub fn clear_cache(&mut self) {
        self.cache.clear();
        log::debug!("cache cleared, epoch {}", self.cache.epoch());
    }

    /// When the extra scan requested by a successful block is due.
    pub fn rescan_at(&self) -> Option<Duration> {
        self.rescan_at
    }

    /// Consume a due rescan request.
    pub fn take_rescan(&mut self, now: Duration) -> bool {
        match self.rescan_at {
            Some(at) if at <= now => {
                self.rescan_at = None;
                true
            }
            _ => false,
        }
    }

    // =========================================================================
    // Scan Cycle
    // =========================================================================

    /// Run one scan cycle.
    ///
    /// Cache hits are applied immediately. Misses are chunked into lookup
    /// requests if the availability monitor permits; ids already in flight
    /// are not requested again.
    pub fn scan<H: PageHost<Entry = E>>(&mut self, host: &mut H, now: Duration) -> ScanReport {
        let mut report = ScanReport::default();
        let mut misses: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut miss_entries: Vec<(String, E)> = Vec::new();

        if let Some(selector) = self.strategy.entry_selector() {
            for entry in host.entries(selector) {
                let identity = match self.strategy.extract(&entry) {
                    Some(identity) => identity,
                    None => {
                        report.skipped += 1;
                        continue;
                    }
                };
                report.extracted += 1;

                if host.annotation(&entry).as_ref() != Some(&identity) {
                    host.annotate(&entry, &identity);
                }

                match self.cache.lookup(&identity.id) {
                    Some(Verdict::Blocked) => {
                        host.hide(&entry);
                        report.hidden += 1;
                    }
                    Some(Verdict::NotBlocked) => {}
                    None => {
                        if self.in_flight.contains(&identity.id) {
                            continue;
                        }
                        if seen.insert(identity.id.clone()) {
                            misses.push(identity.id.clone());
                        }
                        miss_entries.push((identity.id, entry));
                    }
                }
            }
        }

        if let Some(subject) = self.unresolved_toggle_subject() {
            match self.cache.lookup(&subject) {
                Some(verdict) => self.update_toggle(host, &subject, verdict),
                None => {
                    if !self.in_flight.contains(&subject) && seen.insert(subject.clone()) {
                        misses.push(subject);
                    }
                }
            }
        }

        report.queued = misses.len();
        report.dispatches = self.dispatch_lookups(misses, miss_entries, now);

        log::debug!(
            "scan: {} extracted, {} skipped, {} hidden, {} queued, {} requests",
            report.extracted,
            report.skipped,
            report.hidden,
            report.queued,
            report.dispatches.len()
        );
        report
    }

    fn unresolved_toggle_subject(&self) -> Option<String> {
        self.toggle
            .as_ref()
            .filter(|t| t.is_unresolved())
            .map(|t| t.subject().to_string())
    }

    fn dispatch_lookups(&mut self, ids: Vec<String>, entries: Vec<(String, E)>, now: Duration) -> Vec<Dispatch> {
        if ids.is_empty() {
            return Vec::new();
        }

        let limit = match self.strategy.shape() {
            LookupShape::Single => 1,
            LookupShape::Batched => self.config.batch_limit.max(1),
        };
        let chunk_count = match self.monitor.permit(now) {
            Permit::Allowed => usize::MAX,
            Permit::Probe => {
                log::debug!("service unreachable, sending one probe request");
                1
            }
            Permit::Denied => {
                log::debug!("service unreachable, skipping {} lookups", ids.len());
                return Vec::new();
            }
        };

        let kind = self.strategy.id_kind();
        let shape = self.strategy.shape();
        let mut dispatches = Vec::new();

        for chunk in ids.chunks(limit).take(chunk_count) {
            let chunk_ids: Vec<String> = chunk.to_vec();
            let chunk_entries: Vec<(String, E)> = entries
                .iter()
                .filter(|(id, _)| chunk_ids.contains(id))
                .cloned()
                .collect();
            let request = wire::lookup_request(kind, shape, &chunk_ids);
            self.in_flight.extend(chunk_ids.iter().cloned());
            let pending = Pending::Lookup {
                endpoint: request.endpoint,
                ids: chunk_ids,
                entries: chunk_entries,
            };
            dispatches.push(self.register(pending, request));
        }

        dispatches
    }

    pub(crate) fn register(&mut self, pending: Pending<E>, request: ServiceRequest) -> Dispatch {
        let batch = self.next_batch;
        self.next_batch += 1;
        self.pending.insert(batch, pending);
        Dispatch { batch, request }
    }

    // =========================================================================
    // Completion
    // =========================================================================

    /// Feed back the response for a dispatched request.
    ///
    /// `result` is the raw response body, or the transport error.
    pub fn complete<H: PageHost<Entry = E>>(
        &mut self,
        host: &mut H,
        batch: BatchId,
        result: Result<String, ServiceError>,
        now: Duration,
    ) {
        let pending = match self.pending.remove(&batch) {
            Some(pending) => pending,
            None => {
                log::debug!("response for unknown batch {}", batch);
                return;
            }
        };

        match pending {
            Pending::Lookup { endpoint, ids, entries } => {
                for id in &ids {
                    self.in_flight.remove(id);
                }
                let decoded = result.and_then(|body| {
                    wire::decode_lookups(endpoint, &ids, &body).map_err(ServiceError::from)
                });
                match decoded {
                    Ok(lookups) => {
                        self.monitor.report_success();
                        self.apply_lookups(host, lookups, &entries);
                    }
                    Err(e) => {
                        log::warn!("lookup batch {} discarded: {}", batch, e);
                        if self.monitor.report_failure(now) {
                            host.notify(Notice::Offline);
                        }
                    }
                }
            }
            Pending::Block { target } => self.finish_block(host, target, result, now),
            Pending::Unblock { subject } => self.finish_unblock(host, &subject, result),
        }
    }

    fn apply_lookups<H: PageHost<Entry = E>>(&mut self, host: &mut H, lookups: Vec<Lookup>, entries: &[(String, E)]) {
        for lookup in lookups {
            if let Some(owner) = &lookup.owner {
                self.owners.record(&lookup.id, owner);
            }
            let verdict = match lookup.verdict {
                Some(verdict) => verdict,
                None => {
                    // Any reply shows the service is up; an unanswered toggle is shown uncached
                    if self.toggle.as_ref().map_or(false, |t| t.is_unresolved()) {
                        self.update_toggle(host, &lookup.id, Verdict::NotBlocked);
                    }
                    continue;
                }
            };
            self.cache.record(&lookup.id, verdict);
            if verdict.is_blocked() {
                for (_, entry) in entries.iter().filter(|(id, _)| *id == lookup.id) {
                    host.hide(entry);
                }
            }
            self.update_toggle(host, &lookup.id, verdict);
        }
    }

    pub(crate) fn update_toggle<H: PageHost<Entry = E>>(&mut self, host: &mut H, id: &str, verdict: Verdict) {
        if let Some(toggle) = self.toggle.as_mut() {
            if toggle.apply(id, verdict) {
                host.render_toggle(toggle.state());
            }
        }
    }
}
