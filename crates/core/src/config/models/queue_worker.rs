use serde::{Deserialize, Serialize};

/// 命令队列与Worker池配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// 队列容量，队列满时提交方阻塞等待
    pub capacity: usize,
    /// 并发消费队列的Worker数量
    pub worker_count: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            worker_count: 4,
        }
    }
}

impl QueueConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.capacity == 0 {
            return Err(anyhow::anyhow!("队列容量必须大于0"));
        }

        if self.worker_count == 0 {
            return Err(anyhow::anyhow!("Worker数量必须大于0"));
        }

        Ok(())
    }
}
