use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use metrics::{counter, gauge};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tracker_core::{
    Command, CommandEnvelope, CommandKind, CommandSink, TrackerError, TrackerResult,
};

/// 有界命令队列
///
/// 使用 Tokio 有界 channel 实现，多个 Worker 通过共享的接收端竞争消费，
/// 每条命令只会交给一个 Worker。队列满时 `submit` 等待空位，不会丢弃命令。
#[derive(Debug)]
pub struct CommandQueue {
    sender: mpsc::Sender<CommandEnvelope>,
    /// 使用 Arc 包装接收端，支持多个消费者
    receiver: Arc<Mutex<mpsc::Receiver<CommandEnvelope>>>,
    closed: CancellationToken,
    capacity: usize,
    submitted: AtomicU64,
    dequeued: AtomicU64,
    discarded: AtomicU64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub capacity: usize,
    pub len: usize,
    pub submitted: u64,
    pub dequeued: u64,
    pub discarded: u64,
    pub closed: bool,
}

impl CommandQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        info!("创建命令队列，容量: {}", capacity);
        Self {
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
            closed: CancellationToken::new(),
            capacity,
            submitted: AtomicU64::new(0),
            dequeued: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
        }
    }

    /// 提交命令；队列满时等待空位
    pub async fn submit(&self, command: Command, cancel: &CancellationToken) -> TrackerResult<()> {
        if self.closed.is_cancelled() {
            return Err(TrackerError::QueueClosed);
        }

        let envelope = CommandEnvelope::new(command);
        let (id, kind) = (envelope.id, envelope.kind());

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TrackerError::Cancelled),
            _ = self.closed.cancelled() => Err(TrackerError::QueueClosed),
            sent = self.sender.send(envelope) => match sent {
                Ok(()) => {
                    self.record_submitted(kind);
                    debug!("命令已入队: {} ({})", kind, id);
                    Ok(())
                }
                Err(_) => Err(TrackerError::QueueClosed),
            },
        }
    }

    /// 立即提交；队列满时返回 `QueueFull`，不等待
    pub fn try_submit(&self, command: Command) -> TrackerResult<()> {
        if self.closed.is_cancelled() {
            return Err(TrackerError::QueueClosed);
        }

        let envelope = CommandEnvelope::new(command);
        let (id, kind) = (envelope.id, envelope.kind());

        match self.sender.try_send(envelope) {
            Ok(()) => {
                self.record_submitted(kind);
                debug!("命令已入队: {} ({})", kind, id);
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                counter!("command_queue_full_total", "kind" => kind.as_str()).increment(1);
                Err(TrackerError::QueueFull)
            }
            Err(TrySendError::Closed(_)) => Err(TrackerError::QueueClosed),
        }
    }

    fn record_submitted(&self, kind: CommandKind) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
        counter!("command_queue_submitted_total", "kind" => kind.as_str()).increment(1);
        gauge!("command_queue_depth").set(self.len() as f64);
    }

    /// 取出下一条命令；队列关闭或 `cancel` 触发时返回 `None`
    pub async fn dequeue(&self, cancel: &CancellationToken) -> Option<CommandEnvelope> {
        let mut receiver = tokio::select! {
            biased;
            _ = self.closed.cancelled() => return None,
            _ = cancel.cancelled() => return None,
            guard = self.receiver.lock() => guard,
        };

        let envelope = tokio::select! {
            biased;
            _ = self.closed.cancelled() => None,
            _ = cancel.cancelled() => None,
            envelope = receiver.recv() => envelope,
        }?;

        self.dequeued.fetch_add(1, Ordering::Relaxed);
        gauge!("command_queue_depth").set(self.len() as f64);
        Some(envelope)
    }

    /// 关闭队列：拒绝新的提交，唤醒等待中的消费者，丢弃缓冲中的命令
    ///
    /// 返回被丢弃的命令数量。重复调用是安全的。
    pub async fn close(&self) -> usize {
        self.closed.cancel();

        let mut receiver = self.receiver.lock().await;
        receiver.close();

        let mut discarded = 0;
        while receiver.try_recv().is_ok() {
            discarded += 1;
        }

        if discarded > 0 {
            self.discarded.fetch_add(discarded as u64, Ordering::Relaxed);
            counter!("command_queue_discarded_total").increment(discarded as u64);
            warn!("命令队列已关闭，丢弃 {} 条未处理的命令", discarded);
        } else {
            info!("命令队列已关闭");
        }
        discarded
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.capacity.saturating_sub(self.sender.capacity())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            capacity: self.capacity,
            len: self.len(),
            submitted: self.submitted.load(Ordering::Relaxed),
            dequeued: self.dequeued.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            closed: self.is_closed(),
        }
    }
}

#[async_trait]
impl CommandSink for CommandQueue {
    async fn submit(&self, command: Command, cancel: &CancellationToken) -> TrackerResult<()> {
        CommandQueue::submit(self, command, cancel).await
    }

    fn try_submit(&self, command: Command) -> TrackerResult<()> {
        CommandQueue::try_submit(self, command)
    }
}
