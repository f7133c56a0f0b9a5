//! Circuit breaker pattern implementation.
//!
//! One breaker per provider. Requests flow while the circuit is CLOSED;
//! crossing a failure threshold opens it, excluding the provider from
//! routing for a cooldown. After the cooldown the circuit admits exactly one
//! trial request (HALF_OPEN): success closes it, failure reopens it with
//! optional cooldown growth.

use broker_core::GatewayError;
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CircuitState {
    /// Circuit is closed, requests flow normally
    Closed = 0,
    /// Circuit is open, the provider is excluded from routing
    Open = 1,
    /// Circuit admits a single trial request
    HalfOpen = 2,
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::Open,
            2 => Self::HalfOpen,
            _ => Self::Closed,
        }
    }
}

/// Circuit breaker configuration.
///
/// Thresholds and cooldown are tunable configuration, not fixed constants.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit
    pub consecutive_failures: u32,
    /// Size of the rolling attempt window
    pub window_size: usize,
    /// Failure rate within the window that opens the circuit
    pub failure_rate_threshold: f64,
    /// Minimum attempts in the window before the rate applies
    pub min_requests: u32,
    /// Cooldown before the circuit admits a trial request
    pub cooldown: Duration,
    /// Cooldown growth factor applied on each reopen from HALF_OPEN
    /// (1.0 disables growth)
    pub backoff_multiplier: f64,
    /// Ceiling for grown cooldowns
    pub max_cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            consecutive_failures: 3,
            window_size: 5,
            failure_rate_threshold: 0.5,
            min_requests: 5,
            cooldown: Duration::from_secs(30),
            backoff_multiplier: 1.0,
            max_cooldown: Duration::from_secs(300),
        }
    }
}

/// Rolling window of recent attempt outcomes.
#[derive(Debug)]
struct AttemptWindow {
    outcomes: VecDeque<bool>,
    capacity: usize,
}

impl AttemptWindow {
    fn new(capacity: usize) -> Self {
        Self {
            outcomes: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, success: bool) {
        if self.outcomes.len() == self.capacity {
            self.outcomes.pop_front();
        }
        self.outcomes.push_back(success);
    }

    fn len(&self) -> usize {
        self.outcomes.len()
    }

    fn failure_rate(&self) -> f64 {
        if self.outcomes.is_empty() {
            return 0.0;
        }
        let failures = self.outcomes.iter().filter(|ok| !**ok).count();
        failures as f64 / self.outcomes.len() as f64
    }

    fn clear(&mut self) {
        self.outcomes.clear();
    }
}

/// Circuit breaker for a single provider.
pub struct CircuitBreaker {
    /// Provider identifier
    provider_id: String,
    /// Configuration
    config: CircuitBreakerConfig,
    /// Current state (atomic for lock-free reads)
    state: AtomicU8,
    /// Consecutive failure streak
    consecutive_failures: AtomicU32,
    /// Rolling window of recent outcomes
    window: Mutex<AttemptWindow>,
    /// Timestamp when circuit opened (milliseconds since epoch)
    opened_at: AtomicU64,
    /// Cooldown currently in effect (milliseconds), grows on reopen
    cooldown_ms: AtomicU64,
    /// Whether the single HALF_OPEN trial slot is taken
    trial_in_flight: AtomicBool,
    /// Lock for state transitions
    transition_lock: RwLock<()>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker.
    #[must_use]
    pub fn new(provider_id: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let cooldown_ms = config.cooldown.as_millis() as u64;
        Self {
            provider_id: provider_id.into(),
            window: Mutex::new(AttemptWindow::new(config.window_size)),
            config,
            state: AtomicU8::new(CircuitState::Closed as u8),
            consecutive_failures: AtomicU32::new(0),
            opened_at: AtomicU64::new(0),
            cooldown_ms: AtomicU64::new(cooldown_ms),
            trial_in_flight: AtomicBool::new(false),
            transition_lock: RwLock::new(()),
        }
    }

    /// Create with default configuration.
    #[must_use]
    pub fn with_defaults(provider_id: impl Into<String>) -> Self {
        Self::new(provider_id, CircuitBreakerConfig::default())
    }

    /// Get the provider ID.
    #[must_use]
    pub fn provider_id(&self) -> &str {
        &self.provider_id
    }

    /// Get the current state.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::Acquire))
    }

    /// Check whether a request may be dispatched to this provider.
    ///
    /// In HALF_OPEN, at most one caller acquires the trial slot; the slot is
    /// released by the next `record_success`/`record_failure`.
    ///
    /// # Errors
    /// Returns `GatewayError::ProviderUnavailable` while the circuit is open
    /// or the trial slot is taken.
    pub fn check(&self) -> Result<(), GatewayError> {
        match self.state() {
            CircuitState::Closed => Ok(()),
            CircuitState::HalfOpen => self.try_acquire_trial(),
            CircuitState::Open => {
                if self.cooldown_elapsed() {
                    self.transition_to_half_open();
                    self.try_acquire_trial()
                } else {
                    Err(GatewayError::unavailable(
                        &self.provider_id,
                        "circuit open",
                    ))
                }
            }
        }
    }

    /// Non-consuming eligibility check for routing. Unlike [`Self::check`],
    /// this never acquires the half-open trial slot; dispatchers must still
    /// call `check` immediately before the attempt.
    #[must_use]
    pub fn is_eligible(&self) -> bool {
        match self.state() {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => !self.trial_in_flight.load(Ordering::Acquire),
            CircuitState::Open => self.cooldown_elapsed(),
        }
    }

    fn try_acquire_trial(&self) -> Result<(), GatewayError> {
        if self
            .trial_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            Ok(())
        } else {
            Err(GatewayError::unavailable(
                &self.provider_id,
                "half-open trial already in flight",
            ))
        }
    }

    /// Record a successful request outcome.
    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
        self.window.lock().push(true);

        match self.state() {
            CircuitState::Closed | CircuitState::Open => {}
            CircuitState::HalfOpen => {
                debug!(provider = %self.provider_id, "Half-open trial succeeded");
                self.transition_to_closed();
            }
        }
    }

    /// Record a failed request outcome.
    pub fn record_failure(&self) {
        let streak = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        let (window_len, failure_rate) = {
            let mut window = self.window.lock();
            window.push(false);
            (window.len(), window.failure_rate())
        };

        match self.state() {
            CircuitState::Closed => {
                let streak_tripped = streak >= self.config.consecutive_failures;
                let rate_tripped = window_len as u32 >= self.config.min_requests
                    && failure_rate >= self.config.failure_rate_threshold;

                if streak_tripped || rate_tripped {
                    debug!(
                        provider = %self.provider_id,
                        streak = streak,
                        failure_rate = failure_rate,
                        "Circuit breaker failure threshold reached"
                    );
                    self.transition_to_open(false);
                }
            }
            CircuitState::HalfOpen => {
                debug!(provider = %self.provider_id, "Half-open trial failed, reopening");
                self.transition_to_open(true);
            }
            CircuitState::Open => {}
        }
    }

    fn cooldown_elapsed(&self) -> bool {
        let opened_at = self.opened_at.load(Ordering::Acquire);
        if opened_at == 0 {
            return false;
        }
        let elapsed = now_millis().saturating_sub(opened_at);
        elapsed >= self.cooldown_ms.load(Ordering::Acquire)
    }

    fn transition_to_open(&self, from_half_open: bool) {
        let _guard = self.transition_lock.write();

        let prev_state = self.state.swap(CircuitState::Open as u8, Ordering::Release);
        self.trial_in_flight.store(false, Ordering::Release);

        if prev_state != CircuitState::Open as u8 {
            self.opened_at.store(now_millis(), Ordering::Release);

            if from_half_open && self.config.backoff_multiplier > 1.0 {
                let current = self.cooldown_ms.load(Ordering::Acquire);
                let grown = ((current as f64) * self.config.backoff_multiplier)
                    .min(self.config.max_cooldown.as_millis() as f64)
                    as u64;
                self.cooldown_ms.store(grown, Ordering::Release);
            }

            warn!(
                provider = %self.provider_id,
                cooldown_ms = self.cooldown_ms.load(Ordering::Relaxed),
                "Circuit breaker opened"
            );
        }
    }

    fn transition_to_half_open(&self) {
        let _guard = self.transition_lock.write();

        let prev_state = self
            .state
            .swap(CircuitState::HalfOpen as u8, Ordering::Release);

        if prev_state == CircuitState::Open as u8 {
            self.trial_in_flight.store(false, Ordering::Release);
            info!(provider = %self.provider_id, "Circuit breaker half-open, admitting one trial");
        }
    }

    fn transition_to_closed(&self) {
        let _guard = self.transition_lock.write();

        self.state
            .store(CircuitState::Closed as u8, Ordering::Release);
        self.consecutive_failures.store(0, Ordering::Relaxed);
        self.window.lock().clear();
        self.opened_at.store(0, Ordering::Release);
        self.cooldown_ms
            .store(self.config.cooldown.as_millis() as u64, Ordering::Release);
        self.trial_in_flight.store(false, Ordering::Release);

        info!(provider = %self.provider_id, "Circuit breaker closed");
    }

    /// Reset the circuit breaker to the closed state.
    pub fn reset(&self) {
        self.transition_to_closed();
    }

    /// Force the circuit open (manual intervention).
    pub fn force_open(&self) {
        self.transition_to_open(false);
    }

    /// Get current statistics.
    #[must_use]
    pub fn stats(&self) -> CircuitBreakerStats {
        let window = self.window.lock();
        CircuitBreakerStats {
            state: self.state(),
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
            window_requests: window.len() as u32,
            failure_rate: window.failure_rate(),
            cooldown: Duration::from_millis(self.cooldown_ms.load(Ordering::Relaxed)),
        }
    }
}

/// Circuit breaker statistics.
#[derive(Debug, Clone)]
pub struct CircuitBreakerStats {
    /// Current state
    pub state: CircuitState,
    /// Current consecutive failure streak
    pub consecutive_failures: u32,
    /// Attempts currently in the rolling window
    pub window_requests: u32,
    /// Failure rate over the rolling window
    pub failure_rate: f64,
    /// Cooldown currently in effect
    pub cooldown: Duration,
}

fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            consecutive_failures: 3,
            cooldown: Duration::from_millis(10),
            // Rate path disabled: the 5-slot window never reaches 10 attempts.
            min_requests: 10,
            ..Default::default()
        }
    }

    #[test]
    fn test_initial_state() {
        let cb = CircuitBreaker::with_defaults("test-provider");
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.check().is_ok());
    }

    #[test]
    fn test_opens_after_consecutive_failures() {
        let cb = CircuitBreaker::new("test-provider", fast_config());

        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);

        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(cb.check().is_err());
    }

    #[test]
    fn test_success_resets_streak() {
        let cb = CircuitBreaker::new("test-provider", fast_config());

        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        cb.record_failure();
        cb.record_failure();

        // Streak was broken; only two consecutive failures since.
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_window_rate_opens_circuit() {
        let config = CircuitBreakerConfig {
            consecutive_failures: 100, // streak path disabled
            window_size: 5,
            failure_rate_threshold: 0.5,
            min_requests: 5,
            ..fast_config()
        };
        let cb = CircuitBreaker::new("test-provider", config);

        // Alternate so no streak forms, but the window rate crosses 50%.
        cb.record_failure();
        cb.record_success();
        cb.record_failure();
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn test_half_open_single_trial() {
        let cb = CircuitBreaker::new("test-provider", fast_config());
        for _ in 0..3 {
            cb.record_failure();
        }
        assert_eq!(cb.state(), CircuitState::Open);

        std::thread::sleep(Duration::from_millis(20));

        // First check acquires the only trial slot.
        assert!(cb.check().is_ok());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        // A concurrent second check is rejected.
        assert!(cb.check().is_err());

        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.check().is_ok());
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let cb = CircuitBreaker::new("test-provider", fast_config());
        for _ in 0..3 {
            cb.record_failure();
        }

        std::thread::sleep(Duration::from_millis(20));
        assert!(cb.check().is_ok());
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(cb.check().is_err());
    }

    #[test]
    fn test_backoff_growth_on_reopen() {
        let config = CircuitBreakerConfig {
            consecutive_failures: 1,
            cooldown: Duration::from_millis(10),
            backoff_multiplier: 2.0,
            max_cooldown: Duration::from_millis(25),
            ..Default::default()
        };
        let cb = CircuitBreaker::new("test-provider", config);

        cb.record_failure();
        assert_eq!(cb.stats().cooldown, Duration::from_millis(10));

        std::thread::sleep(Duration::from_millis(15));
        assert!(cb.check().is_ok());
        cb.record_failure(); // reopen from half-open, cooldown doubles
        assert_eq!(cb.stats().cooldown, Duration::from_millis(20));

        std::thread::sleep(Duration::from_millis(25));
        assert!(cb.check().is_ok());
        cb.record_failure(); // capped by max_cooldown
        assert_eq!(cb.stats().cooldown, Duration::from_millis(25));
    }

    #[test]
    fn test_closing_resets_cooldown() {
        let config = CircuitBreakerConfig {
            consecutive_failures: 1,
            cooldown: Duration::from_millis(10),
            backoff_multiplier: 2.0,
            max_cooldown: Duration::from_secs(1),
            ..Default::default()
        };
        let cb = CircuitBreaker::new("test-provider", config);

        cb.record_failure();
        std::thread::sleep(Duration::from_millis(15));
        assert!(cb.check().is_ok());
        cb.record_failure();
        assert_eq!(cb.stats().cooldown, Duration::from_millis(20));

        std::thread::sleep(Duration::from_millis(25));
        assert!(cb.check().is_ok());
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.stats().cooldown, Duration::from_millis(10));
    }

    #[test]
    fn test_reset() {
        let cb = CircuitBreaker::new("test-provider", fast_config());
        for _ in 0..3 {
            cb.record_failure();
        }
        assert_eq!(cb.state(), CircuitState::Open);

        cb.reset();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.check().is_ok());
    }

    #[test]
    fn test_stats() {
        let cb = CircuitBreaker::new(
            "test-provider",
            CircuitBreakerConfig {
                consecutive_failures: 10,
                ..Default::default()
            },
        );
        cb.record_success();
        cb.record_failure();
        cb.record_failure();

        let stats = cb.stats();
        assert_eq!(stats.window_requests, 3);
        assert_eq!(stats.consecutive_failures, 2);
        assert!((stats.failure_rate - 0.666).abs() < 0.01);
    }
}
