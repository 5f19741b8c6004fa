// Copyright (c) 2026 DIVE25 Project
// SPDX-License-Identifier: AGPL-3.0

//! Per-KAS circuit breakers.
//!
//! One state machine per KAS identifier, owned by an explicit registry that
//! is injected into the selector and the decryptor. State is process-wide and
//! in-memory only; it resets on restart. Breaker state is a local
//! optimization, so independent replicas holding independent views is
//! acceptable.

use dashmap::DashMap;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures before the breaker opens.
    pub failure_threshold: u32,
    /// How long an open breaker waits before permitting a probe.
    pub recovery_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug)]
struct BreakerEntry {
    state: BreakerState,
    failure_count: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
    last_failure: Option<Instant>,
    last_success: Option<Instant>,
}

impl Default for BreakerEntry {
    fn default() -> Self {
        Self {
            state: BreakerState::Closed,
            failure_count: 0,
            opened_at: None,
            probe_in_flight: false,
            last_failure: None,
            last_success: None,
        }
    }
}

/// Point-in-time view of one breaker, for diagnostics and admin surfaces.
#[derive(Debug, Clone, Copy)]
pub struct BreakerSnapshot {
    pub state: BreakerState,
    pub failure_count: u32,
    pub last_failure: Option<Instant>,
    pub last_success: Option<Instant>,
}

/// Registry of per-KAS breaker state machines.
///
/// The selector scores against the read-only `is_available` view; the
/// decryptor reserves an actual attempt with `try_acquire`, which admits at
/// most one probe while a breaker is HALF_OPEN. Entry updates are atomic per
/// KAS id; no cross-entry coordination exists.
pub struct CircuitBreakerRegistry {
    entries: DashMap<String, BreakerEntry>,
    config: BreakerConfig,
}

impl CircuitBreakerRegistry {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(BreakerConfig::default())
    }

    /// Whether the KAS looks attemptable right now. Read-only health view
    /// used for scoring; does not reserve a probe slot.
    ///
    /// An open breaker whose recovery timeout has elapsed transitions to
    /// HALF_OPEN here, permitting one probe round: a failed probe re-opens
    /// the breaker with a fresh timer, a successful one closes it.
    pub fn is_available(&self, kas_id: &str) -> bool {
        let mut entry = self.entries.entry(kas_id.to_string()).or_default();
        match entry.state {
            BreakerState::Closed | BreakerState::HalfOpen => true,
            BreakerState::Open => self.half_open_if_elapsed(kas_id, &mut entry),
        }
    }

    /// Reserve an actual release attempt against the KAS.
    ///
    /// Behaves like `is_available`, except that a HALF_OPEN breaker admits
    /// exactly one caller: the slot is held until the probe's outcome is
    /// recorded, and every other caller is told to stand down.
    pub fn try_acquire(&self, kas_id: &str) -> bool {
        let mut entry = self.entries.entry(kas_id.to_string()).or_default();
        match entry.state {
            BreakerState::Closed => true,
            BreakerState::HalfOpen => {
                if entry.probe_in_flight {
                    false
                } else {
                    entry.probe_in_flight = true;
                    true
                }
            }
            BreakerState::Open => {
                if self.half_open_if_elapsed(kas_id, &mut entry) {
                    entry.probe_in_flight = true;
                    true
                } else {
                    false
                }
            }
        }
    }

    fn half_open_if_elapsed(&self, kas_id: &str, entry: &mut BreakerEntry) -> bool {
        let elapsed = entry
            .opened_at
            .map(|t| t.elapsed() >= self.config.recovery_timeout)
            .unwrap_or(true);
        if elapsed {
            entry.state = BreakerState::HalfOpen;
            entry.probe_in_flight = false;
            debug!(kas_id, "circuit breaker half-open, probe permitted");
            metrics::counter!("ztdf_breaker_transitions_total", "to" => "half_open").increment(1);
        }
        elapsed
    }

    /// Record a successful key release. Closes the breaker from any state and
    /// resets the consecutive-failure count.
    pub fn record_success(&self, kas_id: &str) {
        let mut entry = self.entries.entry(kas_id.to_string()).or_default();
        if entry.state != BreakerState::Closed {
            debug!(kas_id, "circuit breaker closed after successful release");
            metrics::counter!("ztdf_breaker_transitions_total", "to" => "closed").increment(1);
        }
        entry.state = BreakerState::Closed;
        entry.failure_count = 0;
        entry.opened_at = None;
        entry.probe_in_flight = false;
        entry.last_success = Some(Instant::now());
    }

    /// Give back a slot taken with `try_acquire` without recording an
    /// outcome. For attempts whose result says nothing about KAS health,
    /// such as a key that fails local authentication.
    pub fn release(&self, kas_id: &str) {
        if let Some(mut entry) = self.entries.get_mut(kas_id) {
            entry.probe_in_flight = false;
        }
    }

    /// Record a failed or denied key release.
    pub fn record_failure(&self, kas_id: &str) {
        let mut entry = self.entries.entry(kas_id.to_string()).or_default();
        entry.failure_count += 1;
        entry.probe_in_flight = false;
        entry.last_failure = Some(Instant::now());
        match entry.state {
            BreakerState::HalfOpen => {
                // Failed probe: re-open with a fresh timer.
                entry.state = BreakerState::Open;
                entry.opened_at = Some(Instant::now());
                warn!(kas_id, "circuit breaker re-opened after failed probe");
                metrics::counter!("ztdf_breaker_transitions_total", "to" => "open").increment(1);
            }
            BreakerState::Closed => {
                if entry.failure_count >= self.config.failure_threshold {
                    entry.state = BreakerState::Open;
                    entry.opened_at = Some(Instant::now());
                    warn!(
                        kas_id,
                        failures = entry.failure_count,
                        "circuit breaker opened"
                    );
                    metrics::counter!("ztdf_breaker_transitions_total", "to" => "open")
                        .increment(1);
                }
            }
            BreakerState::Open => {}
        }
    }

    /// Current state, `Closed` for KAS ids never seen.
    pub fn state(&self, kas_id: &str) -> BreakerState {
        self.entries
            .get(kas_id)
            .map(|e| e.state)
            .unwrap_or(BreakerState::Closed)
    }

    /// Full view of one breaker, `None` for KAS ids never seen.
    pub fn snapshot(&self, kas_id: &str) -> Option<BreakerSnapshot> {
        self.entries.get(kas_id).map(|e| BreakerSnapshot {
            state: e.state,
            failure_count: e.failure_count,
            last_failure: e.last_failure,
            last_success: e.last_success,
        })
    }

    /// Drop all recorded state. Test and administrative hook.
    pub fn reset(&self) {
        self.entries.clear();
    }
}
