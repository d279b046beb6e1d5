use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{models::Command, TrackerResult};

/// 命令提交接口
#[async_trait]
pub trait CommandSink: Send + Sync {
    /// 队列满时阻塞等待空位；`cancel` 触发时返回 `Cancelled`，队列关闭时返回 `QueueClosed`
    async fn submit(&self, command: Command, cancel: &CancellationToken) -> TrackerResult<()>;

    /// 不等待的提交，队列满时立即返回 `QueueFull`
    ///
    /// Worker 内部产生的后续命令走这条路径：消费者自己等待自己的队列会卡死整个池。
    fn try_submit(&self, command: Command) -> TrackerResult<()>;
}
