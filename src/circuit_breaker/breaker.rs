use super::types::{BreakerSnapshot, CircuitBreakerConfig, CircuitState};
use crate::error::ClientError;
use crate::metrics;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Circuit breaker guarding a single downstream dependency.
///
/// Transitions are evaluated lazily when a call arrives; there is no
/// background timer. The state lock is held only while counters are read or
/// updated, never across the wrapped operation, so calls run concurrently.
/// Every transition bumps a generation counter and outcomes from calls
/// admitted under an older generation are discarded.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: Mutex<State>,
    dependency: String,
}

#[derive(Debug, Default)]
struct State {
    circuit_state: CircuitState,
    /// Consecutive failures in closed state
    failure_count: u32,
    /// Successful probes in half-open state
    success_count: u32,
    /// Probes admitted in half-open state that have not finished yet
    in_flight_probes: u32,
    last_failure_time: Option<Instant>,
    generation: u64,
    stats: BreakerSnapshot,
}

/// Admission ticket for one call. Dropping it unsettled (the caller's future
/// was cancelled) returns a half-open probe slot without recording an outcome.
struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    probe: bool,
    settled: bool,
}

impl Permit<'_> {
    fn settle(mut self, success: bool) {
        self.settled = true;
        self.breaker.record(self.generation, self.probe, success);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if self.settled || !self.probe {
            return;
        }
        let mut state = self.breaker.lock();
        if state.generation == self.generation {
            state.in_flight_probes = state.in_flight_probes.saturating_sub(1);
            debug!(
                dependency = %self.breaker.dependency,
                "Half-open probe cancelled, releasing slot"
            );
        }
    }
}

impl CircuitBreaker {
    /// Create a new circuit breaker
    pub fn new(dependency: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let dependency = dependency.into();
        info!(
            dependency = %dependency,
            max_failures = config.max_failures,
            open_timeout_ms = config.open_timeout_ms,
            half_open_max_calls = config.half_open_max_calls,
            "Creating circuit breaker"
        );
        metrics::record_circuit_breaker_state(&dependency, CircuitState::Closed);

        Self {
            config,
            state: Mutex::new(State::default()),
            dependency,
        }
    }

    /// Run `operation` if the breaker permits it and record the outcome.
    ///
    /// Returns [`ClientError::CircuitOpen`] or
    /// [`ClientError::HalfOpenBudgetExceeded`] without invoking `operation`
    /// when the breaker refuses the call.
    pub async fn call<F, Fut, T>(&self, operation: F) -> Result<T, ClientError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let permit = self.admit()?;
        let result = operation().await;
        permit.settle(result.is_ok());
        result
    }

    /// Get current state
    pub fn state(&self) -> CircuitState {
        self.lock().circuit_state
    }

    /// Get current counters and lifetime statistics
    pub fn snapshot(&self) -> BreakerSnapshot {
        let state = self.lock();
        BreakerSnapshot {
            state: state.circuit_state,
            failure_count: state.failure_count,
            success_count: state.success_count,
            last_failure_time: state.last_failure_time,
            ..state.stats.clone()
        }
    }

    pub fn dependency(&self) -> &str {
        &self.dependency
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn admit(&self) -> Result<Permit<'_>, ClientError> {
        let mut state = self.lock();

        if state.circuit_state == CircuitState::Open {
            let timeout_elapsed = state
                .last_failure_time
                .map_or(true, |at| at.elapsed() > self.config.open_timeout());
            if timeout_elapsed {
                self.transition(&mut state, CircuitState::HalfOpen);
            }
        }

        match state.circuit_state {
            CircuitState::Closed => {
                state.stats.total_calls += 1;
                Ok(self.permit(&state, false))
            }
            CircuitState::Open => {
                state.stats.rejected_calls += 1;
                debug!(
                    dependency = %self.dependency,
                    state = %state.circuit_state,
                    "Circuit breaker open, rejecting call"
                );
                metrics::record_circuit_breaker_rejection(&self.dependency, CircuitState::Open);
                Err(ClientError::CircuitOpen)
            }
            CircuitState::HalfOpen => {
                if state.success_count + state.in_flight_probes >= self.config.half_open_max_calls {
                    state.stats.rejected_calls += 1;
                    debug!(
                        dependency = %self.dependency,
                        success_count = state.success_count,
                        in_flight = state.in_flight_probes,
                        max = self.config.half_open_max_calls,
                        "Half-open call budget exhausted, rejecting call"
                    );
                    metrics::record_circuit_breaker_rejection(
                        &self.dependency,
                        CircuitState::HalfOpen,
                    );
                    return Err(ClientError::HalfOpenBudgetExceeded);
                }

                state.stats.total_calls += 1;
                state.in_flight_probes += 1;
                debug!(
                    dependency = %self.dependency,
                    in_flight = state.in_flight_probes,
                    max = self.config.half_open_max_calls,
                    "Allowing half-open probe call"
                );
                Ok(self.permit(&state, true))
            }
        }
    }

    fn permit(&self, state: &State, probe: bool) -> Permit<'_> {
        Permit {
            breaker: self,
            generation: state.generation,
            probe,
            settled: false,
        }
    }

    fn record(&self, generation: u64, probe: bool, success: bool) {
        let mut state = self.lock();

        if success {
            state.stats.successful_calls += 1;
        } else {
            state.stats.failed_calls += 1;
        }

        if state.generation != generation {
            debug!(
                dependency = %self.dependency,
                state = %state.circuit_state,
                success,
                "Discarding outcome of call admitted before the last transition"
            );
            return;
        }

        if probe {
            state.in_flight_probes = state.in_flight_probes.saturating_sub(1);
        }

        if success {
            self.on_success(&mut state);
        } else {
            self.on_failure(&mut state);
        }
    }

    fn on_success(&self, state: &mut State) {
        state.failure_count = 0;

        match state.circuit_state {
            CircuitState::Closed => {}
            CircuitState::HalfOpen => {
                state.success_count += 1;
                debug!(
                    dependency = %self.dependency,
                    success_count = state.success_count,
                    threshold = self.config.half_open_max_calls,
                    "Half-open probe succeeded"
                );

                if state.success_count >= self.config.half_open_max_calls {
                    self.transition(state, CircuitState::Closed);
                }
            }
            CircuitState::Open => {
                warn!(dependency = %self.dependency, "Recording success in open state");
            }
        }
    }

    fn on_failure(&self, state: &mut State) {
        state.last_failure_time = Some(Instant::now());

        match state.circuit_state {
            CircuitState::Closed => {
                state.failure_count += 1;
                debug!(
                    dependency = %self.dependency,
                    failure_count = state.failure_count,
                    threshold = self.config.max_failures,
                    "Call failed in closed state"
                );

                if state.failure_count >= self.config.max_failures {
                    self.transition(state, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => {
                warn!(
                    dependency = %self.dependency,
                    "Half-open probe failed, reopening circuit"
                );
                self.transition(state, CircuitState::Open);
            }
            CircuitState::Open => {
                debug!(dependency = %self.dependency, "Recording failure in open state");
            }
        }
    }

    fn transition(&self, state: &mut State, to: CircuitState) {
        let from = state.circuit_state;

        state.circuit_state = to;
        state.generation += 1;
        state.in_flight_probes = 0;
        state.success_count = 0;

        match to {
            CircuitState::Open => state.stats.opened_count += 1,
            CircuitState::HalfOpen => {
                state.failure_count = 0;
                state.stats.half_opened_count += 1;
            }
            CircuitState::Closed => {
                state.failure_count = 0;
                state.stats.closed_count += 1;
            }
        }

        info!(
            dependency = %self.dependency,
            from = %from,
            to = %to,
            failure_count = state.failure_count,
            "Circuit breaker state transition"
        );
        metrics::record_circuit_breaker_transition(&self.dependency, from, to);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Semaphore;

    fn breaker(max_failures: u32, open_timeout_ms: u64, half_open_max_calls: u32) -> CircuitBreaker {
        CircuitBreaker::new(
            "test-api",
            CircuitBreakerConfig {
                max_failures,
                open_timeout_ms,
                half_open_max_calls,
            },
        )
    }

    async fn fail(cb: &CircuitBreaker) -> Result<(), ClientError> {
        cb.call(|| async {
            Err::<(), _>(ClientError::Http {
                status: 500,
                body: "boom".to_string(),
            })
        })
        .await
    }

    async fn succeed(cb: &CircuitBreaker) -> Result<(), ClientError> {
        cb.call(|| async { Ok::<_, ClientError>(()) }).await
    }

    #[tokio::test]
    async fn test_circuit_breaker_starts_closed() {
        let cb = CircuitBreaker::new("test-api", CircuitBreakerConfig::default());
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(succeed(&cb).await.is_ok());
    }

    #[tokio::test]
    async fn test_circuit_opens_after_threshold_failures() {
        let cb = breaker(3, 60_000, 3);

        for _ in 0..3 {
            assert!(fail(&cb).await.is_err());
        }

        assert_eq!(cb.state(), CircuitState::Open);
        assert!(matches!(succeed(&cb).await, Err(ClientError::CircuitOpen)));
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let cb = breaker(3, 60_000, 3);

        for _ in 0..2 {
            let _ = fail(&cb).await;
        }
        assert_eq!(cb.snapshot().failure_count, 2);

        succeed(&cb).await.unwrap();
        assert_eq!(cb.snapshot().failure_count, 0);
        assert_eq!(cb.state(), CircuitState::Closed);

        for _ in 0..2 {
            let _ = fail(&cb).await;
        }
        assert_eq!(cb.state(), CircuitState::Closed);
        let _ = fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_open_circuit_does_not_invoke_operation() {
        let cb = breaker(1, 60_000, 3);
        let _ = fail(&cb).await;

        let invocations = AtomicU32::new(0);
        for _ in 0..5 {
            let result = cb
                .call(|| async {
                    invocations.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, ClientError>(())
                })
                .await;
            assert!(matches!(result, Err(ClientError::CircuitOpen)));
        }

        assert_eq!(invocations.load(Ordering::SeqCst), 0);
        assert_eq!(cb.snapshot().rejected_calls, 5);
    }

    #[tokio::test]
    async fn test_half_open_budget_rejects_extra_probes() {
        let cb = Arc::new(breaker(1, 10, 2));
        let _ = fail(&cb).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Two slow probes occupy the whole budget
        let release = Arc::new(Semaphore::new(0));
        let mut probes = Vec::new();
        for _ in 0..2 {
            let cb = cb.clone();
            let release = release.clone();
            probes.push(tokio::spawn(async move {
                cb.call(|| async move {
                    let _permit = release.acquire().await;
                    Ok::<_, ClientError>(())
                })
                .await
            }));
        }
        while cb.snapshot().total_calls < 3 {
            tokio::task::yield_now().await;
        }
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        let invoked = AtomicU32::new(0);
        let result = cb
            .call(|| async {
                invoked.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ClientError>(())
            })
            .await;
        assert!(matches!(result, Err(ClientError::HalfOpenBudgetExceeded)));
        assert_eq!(invoked.load(Ordering::SeqCst), 0);

        release.add_permits(2);
        for probe in probes {
            probe.await.unwrap().unwrap();
        }
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_half_open_closes_on_success() {
        let cb = breaker(2, 10, 3);
        for _ in 0..2 {
            let _ = fail(&cb).await;
        }
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(20)).await;

        succeed(&cb).await.unwrap();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        succeed(&cb).await.unwrap();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        succeed(&cb).await.unwrap();

        let snapshot = cb.snapshot();
        assert_eq!(snapshot.state, CircuitState::Closed);
        assert_eq!(snapshot.failure_count, 0);
        assert_eq!(snapshot.closed_count, 1);
    }

    #[tokio::test]
    async fn test_half_open_reopens_on_failure() {
        let cb = breaker(2, 10, 3);
        for _ in 0..2 {
            let _ = fail(&cb).await;
        }
        let opened_at = cb.snapshot().last_failure_time.unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        succeed(&cb).await.unwrap();
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        let _ = fail(&cb).await;

        let snapshot = cb.snapshot();
        assert_eq!(snapshot.state, CircuitState::Open);
        assert!(snapshot.last_failure_time.unwrap() > opened_at);
        assert_eq!(snapshot.opened_count, 2);
    }

    #[tokio::test]
    async fn test_cancelled_probe_releases_budget() {
        let cb = breaker(1, 10, 1);
        let _ = fail(&cb).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let pending = cb.call(|| std::future::pending::<Result<(), ClientError>>());
        let timed_out = tokio::time::timeout(Duration::from_millis(10), pending).await;
        assert!(timed_out.is_err());
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        succeed(&cb).await.unwrap();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_stale_outcome_is_discarded() {
        let cb = Arc::new(breaker(1, 60_000, 1));

        let release = Arc::new(Semaphore::new(0));
        let slow = {
            let cb = cb.clone();
            let release = release.clone();
            tokio::spawn(async move {
                cb.call(|| async move {
                    let _permit = release.acquire().await;
                    Ok::<_, ClientError>(())
                })
                .await
            })
        };
        while cb.snapshot().total_calls < 1 {
            tokio::task::yield_now().await;
        }

        let _ = fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Open);

        release.add_permits(1);
        slow.await.unwrap().unwrap();

        // The success was admitted while closed and must not touch the open circuit
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.snapshot().successful_calls, 1);
    }

    #[tokio::test]
    async fn test_statistics_tracking() {
        let cb = breaker(2, 60_000, 3);

        succeed(&cb).await.unwrap();
        let _ = fail(&cb).await;
        let _ = fail(&cb).await;
        let _ = succeed(&cb).await;

        let snapshot = cb.snapshot();
        assert_eq!(snapshot.total_calls, 3);
        assert_eq!(snapshot.successful_calls, 1);
        assert_eq!(snapshot.failed_calls, 2);
        assert_eq!(snapshot.rejected_calls, 1);
        assert_eq!(snapshot.opened_count, 1);
    }
}
