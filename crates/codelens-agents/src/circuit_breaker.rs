// ABOUTME: Circuit breaker guarding whole orchestrations against cascading failures
// ABOUTME: Closed -> Open after N failures, Half-Open probes after the cool-down

use codelens_core::CircuitBreakerConfig;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    /// Normal operation - extractions allowed
    Closed,
    /// Cool-down elapsed - a limited number of probe extractions allowed
    HalfOpen,
    /// Failing - extractions rejected until the timeout elapses
    Open,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "Closed"),
            CircuitState::HalfOpen => write!(f, "Half-Open"),
            CircuitState::Open => write!(f, "Open"),
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    circuit: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    opened_at: Option<Instant>,
    probes_in_flight: u32,
}

impl BreakerState {
    fn closed() -> Self {
        Self {
            circuit: CircuitState::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            opened_at: None,
            probes_in_flight: 0,
        }
    }

    fn open(&mut self) {
        self.circuit = CircuitState::Open;
        self.opened_at = Some(Instant::now());
        self.consecutive_successes = 0;
        self.probes_in_flight = 0;
    }
}

/// Circuit breaker around the orchestration pipeline.
///
/// All counters live behind one lock so a transition is never observed half-applied.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: Mutex::new(BreakerState::closed()),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state.lock().circuit
    }

    fn open_timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }

    /// Admit one orchestration, or `None` while the circuit rejects traffic.
    ///
    /// In Half-Open the permit holds a probe slot. The slot is released when the
    /// permit records an outcome or is dropped without one.
    pub fn try_acquire(&self) -> Option<BreakerPermit<'_>> {
        let mut state = self.state.lock();
        let probe = match state.circuit {
            CircuitState::Closed => false,
            CircuitState::HalfOpen => {
                if !self.take_probe(&mut state) {
                    return None;
                }
                true
            }
            CircuitState::Open => {
                let cooled_down = state
                    .opened_at
                    .is_some_and(|opened| opened.elapsed() >= self.open_timeout());
                if !cooled_down {
                    debug!("Circuit open, rejecting extraction");
                    return None;
                }
                info!("Circuit breaker: Open -> Half-Open (probing)");
                state.circuit = CircuitState::HalfOpen;
                state.consecutive_successes = 0;
                state.probes_in_flight = 0;
                if !self.take_probe(&mut state) {
                    return None;
                }
                true
            }
        };
        Some(BreakerPermit {
            breaker: self,
            probe,
            settled: false,
        })
    }

    fn take_probe(&self, state: &mut BreakerState) -> bool {
        if state.probes_in_flight >= self.config.half_open_max_probes {
            debug!(
                probes = state.probes_in_flight,
                "Circuit half-open, probe limit reached"
            );
            return false;
        }
        state.probes_in_flight += 1;
        true
    }

    fn record_success(&self, probe: bool) {
        let mut state = self.state.lock();
        state.consecutive_failures = 0;
        state.consecutive_successes += 1;

        match state.circuit {
            CircuitState::HalfOpen => {
                if probe {
                    state.probes_in_flight = state.probes_in_flight.saturating_sub(1);
                }
                if state.consecutive_successes >= self.config.success_threshold {
                    info!("Circuit breaker: Half-Open -> Closed (recovered)");
                    *state = BreakerState::closed();
                }
            }
            CircuitState::Closed => {}
            CircuitState::Open => {
                // A request admitted before the circuit opened finished fine
                debug!("Success recorded while circuit open");
            }
        }
    }

    fn record_failure(&self) {
        let mut state = self.state.lock();
        state.consecutive_successes = 0;
        state.consecutive_failures += 1;

        match state.circuit {
            CircuitState::Closed => {
                if state.consecutive_failures >= self.config.failure_threshold {
                    warn!(
                        "Circuit breaker: Closed -> Open ({} consecutive failures)",
                        state.consecutive_failures
                    );
                    state.open();
                }
            }
            CircuitState::HalfOpen => {
                warn!("Circuit breaker: Half-Open -> Open (probe failed)");
                state.open();
            }
            CircuitState::Open => {
                debug!("Circuit already open, failure recorded");
            }
        }
    }

    fn release_probe(&self) {
        let mut state = self.state.lock();
        if state.circuit == CircuitState::HalfOpen {
            state.probes_in_flight = state.probes_in_flight.saturating_sub(1);
            debug!("Probe abandoned without an outcome, slot released");
        }
    }

    /// Reset the circuit breaker to initial state
    pub fn reset(&self) {
        *self.state.lock() = BreakerState::closed();
        info!("Circuit breaker reset to initial state");
    }
}

/// Admission ticket for one orchestration.
///
/// Dropping it without calling `record_success` or `record_failure` counts as
/// neither, but gives back a half-open probe slot.
#[must_use = "an unused permit admits nothing"]
pub struct BreakerPermit<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
    settled: bool,
}

impl BreakerPermit<'_> {
    pub fn record_success(mut self) {
        self.settled = true;
        self.breaker.record_success(self.probe);
    }

    pub fn record_failure(mut self) {
        self.settled = true;
        self.breaker.record_failure();
    }
}

impl Drop for BreakerPermit<'_> {
    fn drop(&mut self) {
        if self.probe && !self.settled {
            self.breaker.release_probe();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(failure_threshold: u32, timeout_secs: u64) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold,
            success_threshold: 2,
            timeout_secs,
            half_open_max_probes: 1,
        }
    }

    fn fail_once(breaker: &CircuitBreaker) {
        breaker.try_acquire().unwrap().record_failure();
    }

    #[test]
    fn opens_after_consecutive_failures() {
        let breaker = CircuitBreaker::new(config(3, 30));
        assert_eq!(breaker.state(), CircuitState::Closed);

        for _ in 0..3 {
            fail_once(&breaker);
        }

        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(breaker.try_acquire().is_none());
    }

    #[test]
    fn success_resets_failure_count() {
        let breaker = CircuitBreaker::new(config(2, 30));
        fail_once(&breaker);
        breaker.try_acquire().unwrap().record_success();
        fail_once(&breaker);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_limits_probes_and_recovers() {
        let breaker = CircuitBreaker::new(config(1, 0));
        fail_once(&breaker);
        assert_eq!(breaker.state(), CircuitState::Open);

        std::thread::sleep(Duration::from_millis(10));
        let probe = breaker.try_acquire().unwrap();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert!(breaker.try_acquire().is_none());

        probe.record_success();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        breaker.try_acquire().unwrap().record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn failed_probe_reopens() {
        let breaker = CircuitBreaker::new(config(1, 0));
        fail_once(&breaker);
        std::thread::sleep(Duration::from_millis(10));

        fail_once(&breaker);
        assert_eq!(breaker.state(), CircuitState::Open);

        breaker.reset();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.try_acquire().is_some());
    }

    #[test]
    fn dropped_probe_gives_its_slot_back() {
        let breaker = CircuitBreaker::new(config(1, 0));
        fail_once(&breaker);
        std::thread::sleep(Duration::from_millis(10));

        let abandoned = breaker.try_acquire().unwrap();
        assert!(breaker.try_acquire().is_none());
        drop(abandoned);

        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        let next = breaker.try_acquire();
        assert!(next.is_some());
    }

    #[test]
    fn dropping_a_closed_permit_changes_nothing() {
        let breaker = CircuitBreaker::new(config(1, 30));
        drop(breaker.try_acquire().unwrap());
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.try_acquire().is_some());
    }
}
