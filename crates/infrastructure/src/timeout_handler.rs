//! 单次尝试的超时控制

use std::future::Future;
use std::time::Duration;

use metrics::counter;
use tokio::time::timeout;
use tracing::error;

use crate::retry::AttemptError;

/// 为每次尝试设置超时；超时后丢弃进行中的尝试
#[derive(Debug, Clone)]
pub struct TimeoutHandler {
    timeout: Duration,
}

impl TimeoutHandler {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn run<F, T>(&self, operation: F, operation_name: &str) -> Result<T, AttemptError>
    where
        F: Future<Output = Result<T, AttemptError>>,
    {
        match timeout(self.timeout, operation).await {
            Ok(result) => result,
            Err(_) => {
                let error_msg = format!(
                    "操作 '{operation_name}' 超时 (超时时间: {:?})",
                    self.timeout
                );
                error!("{}", error_msg);
                counter!("resilience_timeouts_total").increment(1);
                Err(AttemptError::Timeout(error_msg))
            }
        }
    }
}
