use async_trait::async_trait;

use crate::{
    errors::ExternalError,
    models::{ReportPeriod, ReportScore},
};

/// 外部评分服务客户端
///
/// 单次调用，返回结构化评分或已分类的错误；超时、重试与熔断由调用方的容错管道负责。
#[async_trait]
pub trait ReportAnalyzer: Send + Sync {
    async fn analyze(&self, period: ReportPeriod, text: &str) -> Result<ReportScore, ExternalError>;
}
