use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use tracker_core::{Command, CommandKind, TrackerError, TrackerResult};

/// 单条命令的执行上下文
#[derive(Debug, Clone)]
pub struct HandlerContext {
    /// 关联日志用的信封ID
    pub command_id: Uuid,
    /// 关闭时触发，用于中止外部调用和后续命令提交
    pub cancel: CancellationToken,
}

impl HandlerContext {
    pub fn new(command_id: Uuid, cancel: CancellationToken) -> Self {
        Self { command_id, cancel }
    }
}

/// 命令处理器
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// 该处理器负责的命令类型
    fn kind(&self) -> CommandKind;

    async fn handle(&self, command: Command, ctx: &HandlerContext) -> TrackerResult<()>;
}

/// 命令类型到处理器的映射，启动前构建完成，运行期只读
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<CommandKind, Arc<dyn CommandHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: Arc<dyn CommandHandler>) -> &mut Self {
        let kind = handler.kind();
        if self.handlers.insert(kind, handler).is_some() {
            warn!("命令处理器 {} 被重复注册，已覆盖", kind);
        } else {
            debug!("注册命令处理器: {}", kind);
        }
        self
    }

    pub fn get(&self, kind: CommandKind) -> Option<Arc<dyn CommandHandler>> {
        self.handlers.get(&kind).cloned()
    }

    pub fn contains(&self, kind: CommandKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    pub fn kinds(&self) -> Vec<CommandKind> {
        let mut kinds: Vec<CommandKind> = self.handlers.keys().copied().collect();
        kinds.sort_by_key(|k| k.as_str());
        kinds
    }

    /// 按命令类型找到处理器并执行
    pub async fn dispatch(&self, command: Command, ctx: &HandlerContext) -> TrackerResult<()> {
        let kind = command.kind();
        let handler = self
            .get(kind)
            .ok_or(TrackerError::HandlerNotFound { kind })?;
        handler.handle(command, ctx).await
    }
}

/// 处理器收到与自身类型不符的命令
pub(crate) fn unexpected_command(expected: CommandKind, command: &Command) -> TrackerError {
    TrackerError::Internal(format!(
        "处理器 {} 收到了 {} 命令",
        expected,
        command.kind()
    ))
}
