use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use shipsync_core::{CarrierClient, TrackingError, TrackingStatus};
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CircuitState {
    Closed,   // Normal operation
    Open,     // Carrier considered down, failing fast
    HalfOpen, // Letting a single trial call through
}

pub struct CircuitBreaker {
    pub name: String,
    state: RwLock<CircuitState>,
    failure_count: AtomicUsize,
    failure_threshold: usize,
    reset_timeout: Duration,
    last_failure: RwLock<Option<Instant>>,
    trial_in_flight: AtomicBool,
}

impl CircuitBreaker {
    pub fn new(name: &str, threshold: usize, timeout: Duration) -> Self {
        Self {
            name: name.to_string(),
            state: RwLock::new(CircuitState::Closed),
            failure_count: AtomicUsize::new(0),
            failure_threshold: threshold.max(1),
            reset_timeout: timeout,
            last_failure: RwLock::new(None),
            trial_in_flight: AtomicBool::new(false),
        }
    }

    pub async fn state(&self) -> CircuitState {
        *self.state.read().await
    }

    /// Admission for one call, or `None` while the circuit is open.
    ///
    /// In half-open state only one caller gets a trial permit. The permit
    /// frees the trial slot when dropped, so a cancelled trial call does not
    /// keep the circuit shut.
    pub async fn check(&self) -> Option<CallPermit<'_>> {
        let state = *self.state.read().await;
        match state {
            CircuitState::Closed => Some(CallPermit { trial: None }),
            CircuitState::Open => {
                let last_fail = *self.last_failure.read().await;
                let cooled_down =
                    last_fail.map_or(true, |instant| instant.elapsed() > self.reset_timeout);
                if !cooled_down {
                    return None;
                }
                let mut s = self.state.write().await;
                if *s == CircuitState::Open {
                    *s = CircuitState::HalfOpen;
                    tracing::info!("Circuit Breaker [{}] moving to Half-Open", self.name);
                }
                drop(s);
                self.try_claim_trial()
            }
            CircuitState::HalfOpen => self.try_claim_trial(),
        }
    }

    fn try_claim_trial(&self) -> Option<CallPermit<'_>> {
        self.trial_in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| CallPermit { trial: Some(&self.trial_in_flight) })
    }

    pub async fn record_success(&self) {
        let mut state = self.state.write().await;
        if *state == CircuitState::HalfOpen {
            *state = CircuitState::Closed;
            tracing::info!("Circuit Breaker [{}] recovered to Closed", self.name);
        }
        self.failure_count.store(0, Ordering::SeqCst);
    }

    pub async fn record_failure(&self) {
        let count = self.failure_count.fetch_add(1, Ordering::SeqCst) + 1;
        let mut state = self.state.write().await;

        if count >= self.failure_threshold || *state == CircuitState::HalfOpen {
            *state = CircuitState::Open;
            let mut last = self.last_failure.write().await;
            *last = Some(Instant::now());
            tracing::error!("Circuit Breaker [{}] TRIPPED to Open. Failures: {}", self.name, count);
        }
    }
}

/// Permission to make one call. Holds the half-open trial slot, if any.
pub struct CallPermit<'a> {
    trial: Option<&'a AtomicBool>,
}

impl CallPermit<'_> {
    pub fn is_trial(&self) -> bool {
        self.trial.is_some()
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if let Some(slot) = self.trial {
            slot.store(false, Ordering::SeqCst);
        }
    }
}

/// Carrier client behind a circuit breaker. Only carrier-side faults
/// (timeouts, transport errors, 5xx, 429) count as failures.
pub struct GuardedCarrier<C> {
    inner: C,
    breaker: CircuitBreaker,
}

impl<C> GuardedCarrier<C> {
    pub fn new(inner: C, breaker: CircuitBreaker) -> Self {
        Self { inner, breaker }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }
}

#[async_trait]
impl<C: CarrierClient> CarrierClient for GuardedCarrier<C> {
    async fn fetch_status(&self, tracking_number: &str) -> Result<TrackingStatus, TrackingError> {
        let Some(_permit) = self.breaker.check().await else {
            return Err(TrackingError::CircuitOpen(self.breaker.name.clone()));
        };

        let result = self.inner.fetch_status(tracking_number).await;
        match &result {
            Err(e) if e.is_carrier_fault() => self.breaker.record_failure().await,
            _ => self.breaker.record_success().await,
        }
        result
    }
}
