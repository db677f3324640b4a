//! Feed Blocker Core Library
//!
//! This crate provides the filtering engine for the feed blocker. The engine
//! scans rendered feed entries, verifies their authors against the local
//! blocklist service and hides the blocked ones.
//!
//! # Architecture
//!
//! The engine is sans-IO. Hosts implement [`host::PageHost`] to expose the
//! rendered page, drivers send the [`engine::Dispatch`] requests a scan
//! produces and feed the bodies back through [`FilterEngine::complete`].
//! The same engine runs in the browser (wasm) and natively (runtime, CLI).
//!
//! # Modules
//!
//! - `types`: Shared type definitions
//! - `url`: Page detection and link parsing
//! - `strategy`: Per-page identifier extraction
//! - `cache`: Verdict cache and content owner map
//! - `availability`: Service availability monitor
//! - `wire`: Request builders and response decoding
//! - `engine`: Scan cycle and response handling
//! - `mutation`: Block / unblock workflow
//! - `memory`: In-memory page host for fixtures and tests

pub mod availability;
pub mod cache;
pub mod config;
pub mod engine;
pub mod host;
pub mod memory;
mod mutation;
pub mod strategy;
pub mod toggle;
pub mod types;
pub mod url;
pub mod wire;

// Re-export commonly used types
pub use availability::{AvailabilityMonitor, RecoveryPolicy};
pub use config::{ConfigError, EngineConfig, PageTimings};
pub use engine::{BatchId, Dispatch, FilterEngine, ScanReport};
pub use host::{ContextClick, EntryView, PageHost};
pub use types::{EntryIdentity, IdKind, LookupShape, Notice, PageKind, ToggleState, Verdict};
pub use wire::{Method, ServiceError, ServiceRequest};
