use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 外部评分服务调用的容错配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    /// 单次尝试的超时时间（秒），重试的每一次尝试都单独计时
    pub timeout_seconds: u64,
    /// 首次尝试之外的最大重试次数
    pub max_retry_attempts: u32,
    /// 重试之间的固定间隔（毫秒）
    pub retry_delay_ms: u64,
    /// 熔断阈值：采样窗口内失败比例
    pub failure_ratio: f64,
    /// 采样窗口（秒）
    pub sampling_duration_seconds: u64,
    /// 允许熔断前采样窗口内的最小调用数
    pub minimum_throughput: u32,
    /// 熔断持续时间（秒）
    pub break_duration_seconds: u64,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            max_retry_attempts: 3,
            retry_delay_ms: 2000,
            failure_ratio: 0.5,
            sampling_duration_seconds: 60,
            minimum_throughput: 5,
            break_duration_seconds: 30,
        }
    }
}

impl ResilienceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn sampling_duration(&self) -> Duration {
        Duration::from_secs(self.sampling_duration_seconds)
    }

    pub fn break_duration(&self) -> Duration {
        Duration::from_secs(self.break_duration_seconds)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.timeout_seconds == 0 {
            return Err(anyhow::anyhow!("调用超时时间必须大于0"));
        }

        if !(self.failure_ratio > 0.0 && self.failure_ratio <= 1.0) {
            return Err(anyhow::anyhow!(
                "熔断失败比例必须在 (0, 1] 区间内: {}",
                self.failure_ratio
            ));
        }

        if self.sampling_duration_seconds == 0 {
            return Err(anyhow::anyhow!("采样窗口必须大于0"));
        }

        if self.minimum_throughput == 0 {
            return Err(anyhow::anyhow!("最小吞吐量必须大于0"));
        }

        if self.break_duration_seconds == 0 {
            return Err(anyhow::anyhow!("熔断持续时间必须大于0"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resilience_config_default() {
        let config = ResilienceConfig::default();
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.max_retry_attempts, 3);
        assert_eq!(config.retry_delay(), Duration::from_secs(2));
        assert_eq!(config.break_duration(), Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_resilience_config_rejects_bad_ratio() {
        let config = ResilienceConfig {
            failure_ratio: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ResilienceConfig {
            failure_ratio: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
