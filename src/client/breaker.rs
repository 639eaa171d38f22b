//! Circuit breaker a tre stati del load client
//!
//! CLOSED -> OPEN dopo 10 fallimenti consecutivi; OPEN -> HALF_OPEN allo
//! scadere del timer (10s); HALF_OPEN -> CLOSED dopo 5 successi consecutivi,
//! -> OPEN al primo fallimento. `allow_request` è falso solo in OPEN prima
//! dello scadere del timer.

use std::sync::Mutex;
use std::time::{Duration, Instant};

const FAILURE_THRESHOLD: u32 = 10;
const SUCCESS_THRESHOLD: u32 = 5;
const OPEN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    failure_count: u32,
    success_count: u32,
    opened_at: Option<Instant>,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    inner: Mutex<Inner>,
    open_timeout: Duration,
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self::with_timeout(OPEN_TIMEOUT)
    }

    /// Timer configurabile, usato nei test per non aspettare 10 secondi.
    pub fn with_timeout(open_timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                failure_count: 0,
                success_count: 0,
                opened_at: None,
            }),
            open_timeout,
        }
    }

    /// `false` solo in OPEN con il timer non ancora scaduto; allo scadere
    /// passa in HALF_OPEN e lascia passare la richiesta di prova.
    pub fn allow_request(&self) -> bool {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        if inner.state == BreakerState::Open {
            let expired = inner
                .opened_at
                .map(|t| t.elapsed() >= self.open_timeout)
                .unwrap_or(true);
            if expired {
                inner.state = BreakerState::HalfOpen;
                inner.success_count = 0;
                return true;
            }
            return false;
        }
        true
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        match inner.state {
            BreakerState::HalfOpen => {
                inner.success_count += 1;
                if inner.success_count >= SUCCESS_THRESHOLD {
                    inner.state = BreakerState::Closed;
                    inner.failure_count = 0;
                }
            }
            BreakerState::Closed => inner.failure_count = 0,
            BreakerState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        inner.opened_at = Some(Instant::now());
        match inner.state {
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Open;
                inner.failure_count = 0;
            }
            BreakerState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= FAILURE_THRESHOLD {
                    inner.state = BreakerState::Open;
                }
            }
            BreakerState::Open => {}
        }
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().expect("breaker lock poisoned").state
    }

    pub fn is_open(&self) -> bool {
        self.state() == BreakerState::Open
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_allows_and_success_clears_failures() {
        let breaker = CircuitBreaker::new();
        assert!(breaker.allow_request());

        for _ in 0..FAILURE_THRESHOLD - 1 {
            breaker.record_failure();
        }
        breaker.record_success(); // azzera il conteggio
        for _ in 0..FAILURE_THRESHOLD - 1 {
            breaker.record_failure();
        }
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[test]
    fn test_ten_consecutive_failures_open_the_circuit() {
        let breaker = CircuitBreaker::new();
        for _ in 0..FAILURE_THRESHOLD {
            breaker.record_failure();
        }
        assert_eq!(breaker.state(), BreakerState::Open);
        // OPEN implica allow_request falso prima dello scadere del timer
        assert!(!breaker.allow_request());
        assert!(breaker.is_open());
    }

    #[test]
    fn test_open_transitions_to_half_open_after_timeout() {
        let breaker = CircuitBreaker::with_timeout(Duration::from_millis(20));
        for _ in 0..FAILURE_THRESHOLD {
            breaker.record_failure();
        }
        assert!(!breaker.allow_request());

        std::thread::sleep(Duration::from_millis(30));
        assert!(breaker.allow_request());
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
    }

    #[test]
    fn test_five_successes_close_from_half_open() {
        let breaker = CircuitBreaker::with_timeout(Duration::from_millis(10));
        for _ in 0..FAILURE_THRESHOLD {
            breaker.record_failure();
        }
        std::thread::sleep(Duration::from_millis(15));
        assert!(breaker.allow_request());

        for _ in 0..SUCCESS_THRESHOLD - 1 {
            breaker.record_success();
            assert_eq!(breaker.state(), BreakerState::HalfOpen);
        }
        breaker.record_success();
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[test]
    fn test_half_open_failure_reopens_and_restarts_timer() {
        let breaker = CircuitBreaker::with_timeout(Duration::from_millis(30));
        for _ in 0..FAILURE_THRESHOLD {
            breaker.record_failure();
        }
        std::thread::sleep(Duration::from_millis(40));
        assert!(breaker.allow_request());
        assert_eq!(breaker.state(), BreakerState::HalfOpen);

        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
        // timer appena riavviato: ancora chiuso al traffico
        assert!(!breaker.allow_request());
    }
}
