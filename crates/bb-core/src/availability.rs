//! Service availability monitor
//!
//! Tracks whether the verification service is reachable. The first failure
//! of an outage raises the offline notice; later failures stay silent.
//! Time is passed in by the driver as elapsed session time.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// What to do after the service went unreachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum RecoveryPolicy {
    /// Stay unreachable for the rest of the page session
    Never,
    /// Allow one probe request after an exponentially growing delay
    Backoff { initial_ms: u64, max_ms: u64 },
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self::Backoff {
            initial_ms: 5_000,
            max_ms: 60_000,
        }
    }
}

/// Answer to "may I send a query now?".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permit {
    /// Service is reachable, send everything
    Allowed,
    /// Service is down but due for a retry; send a single request
    Probe,
    /// Skip querying this cycle
    Denied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Reachable,
    Unreachable {
        failures: u32,
        last_failure: Duration,
        probing: bool,
    },
}

#[derive(Debug)]
pub struct AvailabilityMonitor {
    policy: RecoveryPolicy,
    state: State,
    outages: u32,
}

impl AvailabilityMonitor {
    pub fn new(policy: RecoveryPolicy) -> Self {
        Self {
            policy,
            state: State::Reachable,
            outages: 0,
        }
    }

    #[inline]
    pub fn is_reachable(&self) -> bool {
        self.state == State::Reachable
    }

    /// Number of reachable -> unreachable transitions so far.
    pub fn outages(&self) -> u32 {
        self.outages
    }

    /// Decide whether a query may be dispatched at `now`.
    ///
    /// Granting a probe marks it in flight; no further probe is granted
    /// until it resolves.
    pub fn permit(&mut self, now: Duration) -> Permit {
        match (&mut self.state, self.policy) {
            (State::Reachable, _) => Permit::Allowed,
            (State::Unreachable { .. }, RecoveryPolicy::Never) => Permit::Denied,
            (
                State::Unreachable {
                    failures,
                    last_failure,
                    probing,
                },
                RecoveryPolicy::Backoff { initial_ms, max_ms },
            ) => {
                if *probing {
                    return Permit::Denied;
                }
                let wait = backoff_delay(*failures, initial_ms, max_ms);
                if now.saturating_sub(*last_failure) >= wait {
                    *probing = true;
                    Permit::Probe
                } else {
                    Permit::Denied
                }
            }
        }
    }

    /// Record a transport failure. Returns `true` when this failure started
    /// a new outage and the offline notice should be shown.
    pub fn report_failure(&mut self, now: Duration) -> bool {
        match &mut self.state {
            State::Reachable => {
                self.state = State::Unreachable {
                    failures: 1,
                    last_failure: now,
                    probing: false,
                };
                self.outages += 1;
                log::warn!("verification service unreachable");
                true
            }
            State::Unreachable {
                failures,
                last_failure,
                probing,
            } => {
                // Stragglers dispatched before the outage do not extend the backoff.
                if *probing {
                    *failures = failures.saturating_add(1);
                    *last_failure = now;
                    *probing = false;
                    log::debug!("probe failed, {} consecutive failures", failures);
                }
                false
            }
        }
    }

    /// Record a successful response.
    pub fn report_success(&mut self) {
        if let State::Unreachable { failures, .. } = self.state {
            log::info!("verification service reachable again after {} failures", failures);
            self.state = State::Reachable;
        }
    }
}

fn backoff_delay(failures: u32, initial_ms: u64, max_ms: u64) -> Duration {
    let shift = failures.saturating_sub(1).min(16);
    let ms = initial_ms.saturating_mul(1u64 << shift).min(max_ms);
    Duration::from_millis(ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_first_failure_notifies_once() {
        let mut monitor = AvailabilityMonitor::new(RecoveryPolicy::Never);
        assert!(monitor.is_reachable());
        assert_eq!(monitor.permit(ms(0)), Permit::Allowed);

        assert!(monitor.report_failure(ms(10)));
        assert!(!monitor.report_failure(ms(20)));
        assert!(!monitor.is_reachable());
        assert_eq!(monitor.outages(), 1);
    }

    #[test]
    fn test_never_policy_stays_down() {
        let mut monitor = AvailabilityMonitor::new(RecoveryPolicy::Never);
        monitor.report_failure(ms(0));
        assert_eq!(monitor.permit(ms(10_000_000)), Permit::Denied);
    }

    #[test]
    fn test_backoff_probe_and_recover() {
        let policy = RecoveryPolicy::Backoff {
            initial_ms: 1_000,
            max_ms: 4_000,
        };
        let mut monitor = AvailabilityMonitor::new(policy);
        monitor.report_failure(ms(0));

        assert_eq!(monitor.permit(ms(999)), Permit::Denied);
        assert_eq!(monitor.permit(ms(1_000)), Permit::Probe);
        // Only one probe at a time
        assert_eq!(monitor.permit(ms(1_500)), Permit::Denied);

        // Probe fails: delay doubles
        assert!(!monitor.report_failure(ms(2_000)));
        assert_eq!(monitor.permit(ms(3_999)), Permit::Denied);
        assert_eq!(monitor.permit(ms(4_000)), Permit::Probe);

        monitor.report_success();
        assert!(monitor.is_reachable());
        assert_eq!(monitor.permit(ms(4_001)), Permit::Allowed);

        // A new outage notifies again
        assert!(monitor.report_failure(ms(5_000)));
        assert_eq!(monitor.outages(), 2);
    }

    #[test]
    fn test_backoff_is_capped() {
        assert_eq!(backoff_delay(1, 1_000, 4_000), ms(1_000));
        assert_eq!(backoff_delay(2, 1_000, 4_000), ms(2_000));
        assert_eq!(backoff_delay(3, 1_000, 4_000), ms(4_000));
        assert_eq!(backoff_delay(30, 1_000, 4_000), ms(4_000));
    }

    #[test]
    fn test_straggler_failure_does_not_extend_backoff() {
        let policy = RecoveryPolicy::Backoff {
            initial_ms: 1_000,
            max_ms: 60_000,
        };
        let mut monitor = AvailabilityMonitor::new(policy);
        monitor.report_failure(ms(0));
        monitor.report_failure(ms(900));
        assert_eq!(monitor.permit(ms(1_000)), Permit::Probe);
    }
}
