//! Feed Blocker Native Runtime
//!
//! Runs the core engine outside the browser: a tokio scheduler loop and a
//! reqwest transport to the blocklist service. Used by the CLI.

pub mod scheduler;
pub mod transport;

pub use scheduler::{Command, Scheduler, SchedulerHandle};
pub use transport::{ping, HttpTransport, Transport, TransportError};
