use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// 优雅关闭管理器
///
/// 持有根取消令牌；各组件通过 [`ShutdownManager::subscribe`] 拿到子令牌。
#[derive(Debug, Clone, Default)]
pub struct ShutdownManager {
    token: CancellationToken,
}

impl ShutdownManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 订阅关闭信号
    pub fn subscribe(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// 触发关闭，重复调用无副作用
    pub fn shutdown(&self) {
        if self.token.is_cancelled() {
            debug!("关闭管理器已经触发过关闭");
            return;
        }
        info!("触发系统关闭");
        self.token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    /// 等待关闭信号
    pub async fn wait(&self) {
        self.token.cancelled().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_subscribers_observe_shutdown() {
        let manager = ShutdownManager::new();
        let first = manager.subscribe();
        let second = manager.clone().subscribe();
        assert!(!manager.is_shutdown());

        manager.shutdown();
        manager.shutdown();

        assert!(manager.is_shutdown());
        tokio::time::timeout(Duration::from_secs(1), first.cancelled())
            .await
            .unwrap();
        assert!(second.is_cancelled());
    }

    #[tokio::test]
    async fn test_late_subscriber_is_already_cancelled() {
        let manager = ShutdownManager::new();
        manager.shutdown();

        assert!(manager.subscribe().is_cancelled());
        manager.wait().await;
    }
}
