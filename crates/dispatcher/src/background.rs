use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// 后台定时任务句柄
///
/// 持有任务自己的取消令牌与 `JoinHandle`，由应用的启动/关闭流程显式启停。
pub struct BackgroundTask {
    name: &'static str,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl BackgroundTask {
    pub(crate) fn spawn<F, Fut>(name: &'static str, parent: &CancellationToken, run: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = parent.child_token();
        let handle = tokio::spawn(run(cancel.clone()));
        info!("后台任务 {} 已启动", name);
        Self {
            name,
            cancel,
            handle,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// 取消任务并等待其退出，最多等待 `timeout`
    pub async fn stop(self, timeout: Duration) {
        self.cancel.cancel();
        match tokio::time::timeout(timeout, self.handle).await {
            Ok(Ok(())) => info!("后台任务 {} 已停止", self.name),
            Ok(Err(e)) => error!("后台任务 {} 异常退出: {}", self.name, e),
            Err(_) => warn!("等待后台任务 {} 退出超时 ({:?})", self.name, timeout),
        }
    }
}
