use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use tracker_core::{
    Command, CommandKind, ReportId, ReportPeriod, ReportScore, TrackerError, TrackerResult,
};

use super::HandlerDeps;
use crate::handler_registry::{unexpected_command, CommandHandler, HandlerContext};

/// 通过容错管道调用评分服务并回写评分
pub struct AnalyzeReportHandler {
    deps: HandlerDeps,
}

impl AnalyzeReportHandler {
    pub fn new(deps: HandlerDeps) -> Self {
        Self { deps }
    }

    /// 回写评分；期间报告被重新提交则放弃本次结果
    async fn store_score(
        &self,
        report_id: ReportId,
        period: ReportPeriod,
        submitted_at: DateTime<Utc>,
        score: &ReportScore,
    ) -> TrackerResult<bool> {
        for attempt in 0..2 {
            let mut uow = self.deps.store.begin().await?;
            let mut report = uow
                .get_report(report_id)
                .await?
                .ok_or(TrackerError::ReportNotFound { id: report_id })?;

            match report.half_mut(period) {
                Some(half) if half.submitted_at == submitted_at => {
                    half.score = Some(score.clone());
                }
                _ => {
                    debug!("报告 {} 已被重新提交，丢弃旧的评分结果", report_id);
                    return Ok(false);
                }
            }

            uow.update_report(report);
            match uow.save().await {
                Ok(_) => return Ok(true),
                Err(TrackerError::ConcurrencyConflict { .. }) if attempt == 0 => {
                    debug!("回写评分时发生并发冲突，重新加载报告 {}", report_id);
                }
                Err(e) => return Err(e),
            }
        }
        Err(TrackerError::ConcurrencyConflict { report_id })
    }
}

#[async_trait]
impl CommandHandler for AnalyzeReportHandler {
    fn kind(&self) -> CommandKind {
        CommandKind::AnalyzeReport
    }

    #[instrument(skip_all, fields(command_id = %ctx.command_id))]
    async fn handle(&self, command: Command, ctx: &HandlerContext) -> TrackerResult<()> {
        let (report_id, period) = match command {
            Command::AnalyzeReport { report_id, period } => (report_id, period),
            other => return Err(unexpected_command(self.kind(), &other)),
        };

        let report = {
            let mut uow = self.deps.store.begin().await?;
            uow.get_report(report_id)
                .await?
                .ok_or(TrackerError::ReportNotFound { id: report_id })?
        };
        let half = report
            .half(period)
            .ok_or_else(|| TrackerError::invalid_state(format!("报告 {report_id} 尚未提交{period}")))?;
        let (text, submitted_at) = (half.data.clone(), half.submitted_at);

        let analyzer = self.deps.analyzer.clone();
        let result = self
            .deps
            .pipeline
            .execute("analyze_report", || analyzer.analyze(period, &text), &ctx.cancel)
            .await;

        match result {
            Ok(score) => {
                if self.store_score(report_id, period, submitted_at, &score).await? {
                    info!(report_id, %period, score = score.score, "报告评分完成");
                    self.deps
                        .notifier
                        .notify_report_scored(report.user_id, report_id, period, &score)
                        .await?;
                }
                Ok(())
            }
            Err(TrackerError::Cancelled) => Err(TrackerError::Cancelled),
            Err(e) => {
                warn!(report_id, %period, "评分服务不可用: {}", e);
                if let Err(notify_err) = self
                    .deps
                    .notifier
                    .notify_scoring_unavailable(
                        report.user_id,
                        report_id,
                        period,
                        e.user_message(),
                    )
                    .await
                {
                    warn!("发送评分不可用通知失败: {}", notify_err);
                }
                Err(e)
            }
        }
    }
}
