use thiserror::Error;

use crate::models::CommandKind;

/// 日报跟踪系统错误类型定义
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("外部服务暂时不可用: {0}")]
    TransientFailure(String),

    #[error("外部服务调用失败: {0}")]
    PermanentFailure(String),

    #[error("操作超时: {0}")]
    Timeout(String),

    #[error("熔断器已打开，调用被拒绝")]
    CircuitOpen,

    #[error("命令队列已关闭")]
    QueueClosed,

    #[error("命令队列已满")]
    QueueFull,

    #[error("操作已取消")]
    Cancelled,

    #[error("持久化错误: {0}")]
    Persistence(String),

    #[error("并发冲突: 报告 {report_id} 已被其他操作修改")]
    ConcurrencyConflict { report_id: i64 },

    #[error("报告未找到: {id}")]
    ReportNotFound { id: i64 },

    #[error("无效的报告状态: {0}")]
    InvalidState(String),

    #[error("未注册的命令处理器: {kind}")]
    HandlerNotFound { kind: CommandKind },

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 统一的Result类型
pub type TrackerResult<T> = std::result::Result<T, TrackerError>;

impl TrackerError {
    pub fn persistence<S: Into<String>>(msg: S) -> Self {
        Self::Persistence(msg.into())
    }
    pub fn invalid_state<S: Into<String>>(msg: S) -> Self {
        Self::InvalidState(msg.into())
    }
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        Self::Timeout(msg.into())
    }
    pub fn report_not_found(id: i64) -> Self {
        Self::ReportNotFound { id }
    }

    /// 该错误是否应计入熔断器的失败统计
    ///
    /// 取消和熔断本身的快速失败都不反映下游服务的健康状况。
    pub fn counts_as_breaker_failure(&self) -> bool {
        !matches!(self, TrackerError::Cancelled | TrackerError::CircuitOpen)
    }

    /// 发给员工的错误说明，不暴露内部细节
    pub fn user_message(&self) -> &'static str {
        match self {
            TrackerError::CircuitOpen | TrackerError::TransientFailure(_) => {
                "评分服务暂时不可用，请稍后重试"
            }
            TrackerError::PermanentFailure(_) => "评分服务调用失败，请稍后重新提交",
            TrackerError::Timeout(_) => "操作超时，请稍后重试",
            TrackerError::ReportNotFound { .. } => "请求的报告不存在",
            TrackerError::InvalidState(_) => "报告当前状态不允许该操作",
            TrackerError::QueueClosed | TrackerError::Cancelled => "系统正在关闭，请稍后重试",
            _ => "系统繁忙，请稍后重试",
        }
    }
}

impl From<serde_json::Error> for TrackerError {
    fn from(err: serde_json::Error) -> Self {
        TrackerError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for TrackerError {
    fn from(err: anyhow::Error) -> Self {
        TrackerError::Internal(err.to_string())
    }
}

/// 外部评分服务调用失败的分类
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExternalError {
    /// 网络故障或服务端 5xx
    #[error("网络或服务端错误: {0}")]
    Transient(String),

    /// 响应无法通过结构校验
    #[error("响应格式无效: {0}")]
    MalformedResponse(String),

    #[error("不可重试的错误: {0}")]
    Permanent(String),
}

impl ExternalError {
    /// 是否允许在重试预算内重试
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ExternalError::Transient(_) | ExternalError::MalformedResponse(_)
        )
    }
}
