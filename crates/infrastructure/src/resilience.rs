//! 外部调用的容错管道
//!
//! 装饰器顺序固定，由外向内：熔断器 → 重试 → 单次尝试超时。
//! 熔断器只为一次 `execute` 记录一个结果；打开时操作和重试都不会执行。

use std::future::Future;

use tokio_util::sync::CancellationToken;
use tracing::instrument;

use tracker_core::{ExternalError, ResilienceConfig, TrackerResult};

use crate::circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, StateListener,
};
use crate::retry::{AttemptError, RetryPolicy};
use crate::timeout_handler::TimeoutHandler;

#[derive(Clone)]
pub struct ResiliencePipeline {
    breaker: CircuitBreaker,
    retry: RetryPolicy,
    timeout: TimeoutHandler,
}

impl ResiliencePipeline {
    pub fn new(breaker: CircuitBreaker, retry: RetryPolicy, timeout: TimeoutHandler) -> Self {
        Self {
            breaker,
            retry,
            timeout,
        }
    }

    pub fn from_config(name: &str, config: &ResilienceConfig) -> Self {
        Self::new(
            CircuitBreaker::new(name, CircuitBreakerConfig::from(config)),
            RetryPolicy::from_config(config),
            TimeoutHandler::new(config.timeout()),
        )
    }

    pub fn with_state_listener(mut self, listener: StateListener) -> Self {
        self.breaker = self.breaker.with_listener(listener);
        self
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn breaker_stats(&self) -> CircuitBreakerStats {
        self.breaker.stats()
    }

    /// 执行一次受保护的外部调用
    ///
    /// 返回值或以下错误之一：`Timeout`、`TransientFailure`、`PermanentFailure`、
    /// `CircuitOpen`、`Cancelled`。
    #[instrument(
        skip(self, operation, cancel),
        fields(breaker_state = self.breaker.state().as_str())
    )]
    pub async fn execute<F, Fut, T>(
        &self,
        operation_name: &str,
        mut operation: F,
        cancel: &CancellationToken,
    ) -> TrackerResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ExternalError>>,
    {
        let retry = &self.retry;
        let timeout = &self.timeout;

        self.breaker
            .execute(move || {
                retry.execute(
                    move |_attempt| {
                        let attempt = operation();
                        timeout.run(
                            async move { attempt.await.map_err(AttemptError::External) },
                            operation_name,
                        )
                    },
                    cancel,
                )
            })
            .await
    }
}
