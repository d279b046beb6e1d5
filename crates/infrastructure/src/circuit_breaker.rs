//! 熔断器
//!
//! 基于滑动采样窗口的失败率熔断：
//! - Closed：窗口内调用数达到 `minimum_throughput` 且失败率 ≥ `failure_ratio` 时打开
//! - Open：快速失败 `break_duration`，之后进入 HalfOpen
//! - HalfOpen：只放行一个探测调用，其余调用在探测期间直接被拒绝；
//!   探测成功则关闭并清空统计，探测失败则重新打开并重新计时

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use metrics::counter;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use tracker_core::{ResilienceConfig, TrackerError, TrackerResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_ratio: f64,
    pub sampling_duration: Duration,
    pub minimum_throughput: usize,
    pub break_duration: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self::from(&ResilienceConfig::default())
    }
}

impl From<&ResilienceConfig> for CircuitBreakerConfig {
    fn from(config: &ResilienceConfig) -> Self {
        Self {
            failure_ratio: config.failure_ratio,
            sampling_duration: config.sampling_duration(),
            minimum_throughput: config.minimum_throughput as usize,
            break_duration: config.break_duration(),
        }
    }
}

/// 状态变化回调，参数为 `(from, to)`，只用于观测
pub type StateListener = Arc<dyn Fn(CircuitState, CircuitState) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct CircuitBreakerStats {
    pub state: CircuitState,
    pub window_calls: usize,
    pub window_failures: usize,
    pub total_calls: u64,
    pub failed_calls: u64,
    pub rejected_calls: u64,
}

struct BreakerState {
    state: CircuitState,
    /// 采样窗口内的调用结果，`true` 表示失败
    outcomes: VecDeque<(Instant, bool)>,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
    total_calls: u64,
    failed_calls: u64,
    rejected_calls: u64,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            outcomes: VecDeque::new(),
            opened_at: None,
            probe_in_flight: false,
            total_calls: 0,
            failed_calls: 0,
            rejected_calls: 0,
        }
    }

    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some((at, _)) = self.outcomes.front() {
            if now.duration_since(*at) >= window {
                self.outcomes.pop_front();
            } else {
                break;
            }
        }
    }

    fn window_failures(&self) -> usize {
        self.outcomes.iter().filter(|(_, failed)| *failed).count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Normal,
    Probe,
}

enum Outcome {
    Success,
    Failure,
    Ignored,
}

/// 熔断器，克隆后共享同一份状态
#[derive(Clone)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: Arc<Mutex<BreakerState>>,
    listener: Option<StateListener>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: Arc::new(Mutex::new(BreakerState::new())),
            listener: None,
        }
    }

    pub fn with_listener(mut self, listener: StateListener) -> Self {
        self.listener = Some(listener);
        self
    }

    /// 在熔断保护下执行操作
    ///
    /// 熔断打开时直接返回 `CircuitOpen`，操作不会被调用。
    pub async fn execute<F, Fut, T>(&self, operation: F) -> TrackerResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = TrackerResult<T>>,
    {
        let admission = self.admit()?;
        let mut guard = AdmissionGuard {
            breaker: self,
            admission,
            settled: false,
        };

        let result = operation().await;

        let outcome = match &result {
            Ok(_) => Outcome::Success,
            Err(e) if e.counts_as_breaker_failure() => Outcome::Failure,
            Err(_) => Outcome::Ignored,
        };
        guard.settle(outcome);

        result
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn stats(&self) -> CircuitBreakerStats {
        let mut inner = self.lock();
        inner.prune(Instant::now(), self.config.sampling_duration);
        CircuitBreakerStats {
            state: inner.state,
            window_calls: inner.outcomes.len(),
            window_failures: inner.window_failures(),
            total_calls: inner.total_calls,
            failed_calls: inner.failed_calls,
            rejected_calls: inner.rejected_calls,
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn admit(&self) -> TrackerResult<Admission> {
        let now = Instant::now();
        let mut transition = None;

        let admission = {
            let mut inner = self.lock();
            match inner.state {
                CircuitState::Closed => Ok(Admission::Normal),
                CircuitState::Open => {
                    let elapsed = inner
                        .opened_at
                        .map(|at| now.duration_since(at))
                        .unwrap_or_default();
                    if elapsed >= self.config.break_duration {
                        inner.state = CircuitState::HalfOpen;
                        inner.probe_in_flight = true;
                        transition = Some((CircuitState::Open, CircuitState::HalfOpen));
                        Ok(Admission::Probe)
                    } else {
                        inner.rejected_calls += 1;
                        Err(TrackerError::CircuitOpen)
                    }
                }
                CircuitState::HalfOpen => {
                    if inner.probe_in_flight {
                        inner.rejected_calls += 1;
                        Err(TrackerError::CircuitOpen)
                    } else {
                        inner.probe_in_flight = true;
                        Ok(Admission::Probe)
                    }
                }
            }
        };

        if let Some((from, to)) = transition {
            self.notify_transition(from, to);
        }
        if admission.is_err() {
            counter!("circuit_breaker_rejected_total").increment(1);
            debug!("熔断器 {} 已打开，拒绝调用", self.name);
        }
        admission
    }

    fn settle(&self, admission: Admission, outcome: Outcome) {
        let now = Instant::now();
        let mut transition = None;

        {
            let mut inner = self.lock();
            if !matches!(outcome, Outcome::Ignored) {
                inner.total_calls += 1;
            }
            if matches!(outcome, Outcome::Failure) {
                inner.failed_calls += 1;
            }

            match admission {
                Admission::Probe => {
                    inner.probe_in_flight = false;
                    match outcome {
                        Outcome::Success => {
                            inner.state = CircuitState::Closed;
                            inner.outcomes.clear();
                            inner.opened_at = None;
                            transition = Some((CircuitState::HalfOpen, CircuitState::Closed));
                        }
                        Outcome::Failure => {
                            inner.state = CircuitState::Open;
                            inner.opened_at = Some(now);
                            transition = Some((CircuitState::HalfOpen, CircuitState::Open));
                        }
                        Outcome::Ignored => {}
                    }
                }
                Admission::Normal => {
                    // 调用期间熔断器可能已被其他调用打开
                    if inner.state == CircuitState::Closed {
                        match outcome {
                            Outcome::Success => inner.outcomes.push_back((now, false)),
                            Outcome::Failure => inner.outcomes.push_back((now, true)),
                            Outcome::Ignored => {}
                        }
                        inner.prune(now, self.config.sampling_duration);

                        let calls = inner.outcomes.len();
                        let failures = inner.window_failures();
                        if calls > 0
                            && calls >= self.config.minimum_throughput
                            && failures as f64 / calls as f64 >= self.config.failure_ratio
                        {
                            inner.state = CircuitState::Open;
                            inner.opened_at = Some(now);
                            inner.outcomes.clear();
                            transition = Some((CircuitState::Closed, CircuitState::Open));
                        }
                    }
                }
            }
        }

        if let Some((from, to)) = transition {
            self.notify_transition(from, to);
        }
    }

    fn notify_transition(&self, from: CircuitState, to: CircuitState) {
        counter!("circuit_breaker_transitions_total", "to" => to.as_str()).increment(1);
        match to {
            CircuitState::Open => warn!("熔断器 {} 状态变化: {:?} -> {:?}", self.name, from, to),
            _ => info!("熔断器 {} 状态变化: {:?} -> {:?}", self.name, from, to),
        }
        if let Some(listener) = &self.listener {
            listener(from, to);
        }
    }
}

/// 调用被中途丢弃时释放探测名额，避免熔断器卡在 HalfOpen
struct AdmissionGuard<'a> {
    breaker: &'a CircuitBreaker,
    admission: Admission,
    settled: bool,
}

impl AdmissionGuard<'_> {
    fn settle(&mut self, outcome: Outcome) {
        self.settled = true;
        self.breaker.settle(self.admission, outcome);
    }
}

impl Drop for AdmissionGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.settle(self.admission, Outcome::Ignored);
        }
    }
}
