use std::future::Future;
use std::time::Duration;

use metrics::counter;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use tracker_core::{ExternalError, ResilienceConfig, TrackerError, TrackerResult};

/// 单次尝试的失败原因
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AttemptError {
    #[error(transparent)]
    External(#[from] ExternalError),
    #[error("单次尝试超时: {0}")]
    Timeout(String),
    #[error("尝试已取消")]
    Cancelled,
}

impl AttemptError {
    /// 网络错误、5xx、响应格式错误和超时都可以重试
    pub fn is_transient(&self) -> bool {
        match self {
            AttemptError::External(e) => e.is_transient(),
            AttemptError::Timeout(_) => true,
            AttemptError::Cancelled => false,
        }
    }
}

impl From<AttemptError> for TrackerError {
    fn from(err: AttemptError) -> Self {
        match err {
            AttemptError::External(ExternalError::Transient(msg)) => {
                TrackerError::TransientFailure(msg)
            }
            AttemptError::External(ExternalError::MalformedResponse(msg)) => {
                TrackerError::PermanentFailure(format!("响应格式错误: {msg}"))
            }
            AttemptError::External(ExternalError::Permanent(msg)) => {
                TrackerError::PermanentFailure(msg)
            }
            AttemptError::Timeout(msg) => TrackerError::Timeout(msg),
            AttemptError::Cancelled => TrackerError::Cancelled,
        }
    }
}

/// 固定间隔重试策略
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retry_attempts: u32,
    delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retry_attempts: u32, delay: Duration) -> Self {
        Self {
            max_retry_attempts,
            delay,
        }
    }

    pub fn from_config(config: &ResilienceConfig) -> Self {
        Self::new(config.max_retry_attempts, config.retry_delay())
    }

    pub fn max_retry_attempts(&self) -> u32 {
        self.max_retry_attempts
    }

    /// 执行操作，可重试的失败最多再尝试 `max_retry_attempts` 次
    ///
    /// `operation` 的参数是从 0 开始的尝试序号。取消令牌同时中止进行中的尝试和重试等待。
    pub async fn execute<F, Fut, T>(
        &self,
        mut operation: F,
        cancel: &CancellationToken,
    ) -> TrackerResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, AttemptError>>,
    {
        let mut attempt = 0;

        loop {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(AttemptError::Cancelled),
                result = operation(attempt) => result,
            };

            match result {
                Ok(value) => {
                    if attempt > 0 {
                        debug!("第 {} 次重试成功", attempt);
                    }
                    return Ok(value);
                }
                Err(err) if err.is_transient() && attempt < self.max_retry_attempts => {
                    attempt += 1;
                    counter!("resilience_retries_total").increment(1);
                    warn!(
                        "外部调用失败，将在 {:?} 后进行第 {}/{} 次重试: {:?}",
                        self.delay, attempt, self.max_retry_attempts, err
                    );

                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(TrackerError::Cancelled),
                        _ = tokio::time::sleep(self.delay) => {}
                    }
                }
                Err(err) => {
                    if err.is_transient() {
                        warn!("重试次数已用尽: {:?}", err);
                    }
                    return Err(err.into());
                }
            }
        }
    }
}
