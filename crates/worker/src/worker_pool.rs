//! Worker池
//!
//! 固定数量的 Tokio 任务从同一个命令队列竞争取命令，经处理器注册表分发。
//! 处理器返回错误或发生 panic 都只影响当前命令：记录日志后 Worker 继续循环。

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use metrics::{counter, histogram};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use tracker_core::CommandEnvelope;
use tracker_infrastructure::CommandQueue;

use crate::handler_registry::{HandlerContext, HandlerRegistry};

#[derive(Debug, Default)]
struct PoolCounters {
    dispatched: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    panicked: AtomicU64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerPoolStats {
    pub submitted: u64,
    pub dispatched: u64,
    pub succeeded: u64,
    /// 含 panic
    pub failed: u64,
    pub panicked: u64,
    pub discarded: u64,
}

pub struct WorkerPool {
    queue: Arc<CommandQueue>,
    registry: Arc<HandlerRegistry>,
    worker_count: usize,
    counters: Arc<PoolCounters>,
    cancel: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(
        queue: Arc<CommandQueue>,
        registry: Arc<HandlerRegistry>,
        worker_count: usize,
    ) -> Self {
        Self {
            queue,
            registry,
            worker_count: worker_count.max(1),
            counters: Arc::default(),
            cancel: CancellationToken::new(),
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn queue(&self) -> &Arc<CommandQueue> {
        &self.queue
    }

    /// 启动全部 Worker；重复调用不会创建额外的 Worker
    pub async fn start(&self) {
        let mut handles = self.handles.lock().await;
        if !handles.is_empty() {
            warn!("Worker池已经启动");
            return;
        }

        for worker_id in 0..self.worker_count {
            let queue = self.queue.clone();
            let registry = self.registry.clone();
            let counters = self.counters.clone();
            let cancel = self.cancel.clone();
            handles.push(tokio::spawn(async move {
                worker_loop(worker_id, queue, registry, counters, cancel).await;
            }));
        }
        info!("Worker池已启动，Worker数量: {}", self.worker_count);
    }

    /// 停止 Worker 池
    ///
    /// 关闭队列（丢弃缓冲中的命令）、取消进行中的外部调用，
    /// 等待各 Worker 处理完手头的命令后退出，最多等待 `timeout`。
    pub async fn shutdown(&self, timeout: Duration) {
        let discarded = self.queue.close().await;
        self.cancel.cancel();

        let handles: Vec<JoinHandle<()>> = self.handles.lock().await.drain(..).collect();
        let join_all = futures::future::join_all(handles);
        match tokio::time::timeout(timeout, join_all).await {
            Ok(results) => {
                for result in results {
                    if let Err(e) = result {
                        error!("Worker任务异常退出: {}", e);
                    }
                }
                info!("Worker池已停止，丢弃命令数: {}", discarded);
            }
            Err(_) => warn!("等待Worker退出超时 ({:?})", timeout),
        }
    }

    pub fn stats(&self) -> WorkerPoolStats {
        let queue = self.queue.stats();
        WorkerPoolStats {
            submitted: queue.submitted,
            dispatched: self.counters.dispatched.load(Ordering::Relaxed),
            succeeded: self.counters.succeeded.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            panicked: self.counters.panicked.load(Ordering::Relaxed),
            discarded: queue.discarded,
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    queue: Arc<CommandQueue>,
    registry: Arc<HandlerRegistry>,
    counters: Arc<PoolCounters>,
    cancel: CancellationToken,
) {
    debug!("Worker {} 开始运行", worker_id);

    while let Some(envelope) = queue.dequeue(&cancel).await {
        process(worker_id, envelope, &registry, &counters, &cancel).await;
    }

    debug!("Worker {} 已退出", worker_id);
}

async fn process(
    worker_id: usize,
    envelope: CommandEnvelope,
    registry: &HandlerRegistry,
    counters: &PoolCounters,
    cancel: &CancellationToken,
) {
    let kind = envelope.kind();
    let ctx = HandlerContext::new(envelope.id, cancel.child_token());
    counters.dispatched.fetch_add(1, Ordering::Relaxed);
    debug!("Worker {} 开始处理命令 {} ({})", worker_id, kind, envelope.id);

    let started = std::time::Instant::now();
    let outcome = AssertUnwindSafe(registry.dispatch(envelope.command, &ctx))
        .catch_unwind()
        .await;
    histogram!("worker_command_duration_ms", "kind" => kind.as_str())
        .record(started.elapsed().as_millis() as f64);

    match outcome {
        Ok(Ok(())) => {
            counters.succeeded.fetch_add(1, Ordering::Relaxed);
            counter!("worker_commands_total", "kind" => kind.as_str(), "outcome" => "success")
                .increment(1);
        }
        Ok(Err(e)) => {
            counters.failed.fetch_add(1, Ordering::Relaxed);
            counter!("worker_commands_total", "kind" => kind.as_str(), "outcome" => "failure")
                .increment(1);
            error!(
                command_id = %envelope.id,
                "Worker {} 处理命令 {} 失败: {}",
                worker_id, kind, e
            );
        }
        Err(panic) => {
            counters.failed.fetch_add(1, Ordering::Relaxed);
            counters.panicked.fetch_add(1, Ordering::Relaxed);
            counter!("worker_commands_total", "kind" => kind.as_str(), "outcome" => "panic")
                .increment(1);
            error!(
                command_id = %envelope.id,
                "Worker {} 处理命令 {} 时发生panic: {}",
                worker_id,
                kind,
                panic_message(panic.as_ref())
            );
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
