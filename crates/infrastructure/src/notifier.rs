use async_trait::async_trait;
use chrono::NaiveDate;
use metrics::counter;
use tracing::info;

use tracker_core::{Notifier, ReportId, ReportPeriod, ReportScore, TrackerResult, UserId};

/// 只写结构化日志的通知实现
///
/// 聊天协议适配器接入前的默认实现，也便于本地运行时观察事件流。
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingNotifier;

impl LoggingNotifier {
    fn record(event: &'static str) {
        counter!("notifications_sent_total", "event" => event).increment(1);
    }
}

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn notify_report_due(&self, period: ReportPeriod) -> TrackerResult<()> {
        Self::record("report_due");
        info!(%period, "通知: 请提交{}报告", period);
        Ok(())
    }

    async fn notify_deadline_approaching(&self, period: ReportPeriod) -> TrackerResult<()> {
        Self::record("deadline_approaching");
        info!(%period, "通知: {}报告即将截止", period);
        Ok(())
    }

    async fn notify_deadline_missed(&self, period: ReportPeriod) -> TrackerResult<()> {
        Self::record("deadline_missed");
        info!(%period, "通知: {}报告已截止", period);
        Ok(())
    }

    async fn notify_missing_reports(
        &self,
        date: NaiveDate,
        period: ReportPeriod,
        users: &[UserId],
    ) -> TrackerResult<()> {
        Self::record("missing_reports");
        info!(%date, %period, missing = users.len(), "通知管理员: 未提交名单 {:?}", users);
        Ok(())
    }

    async fn notify_report_scored(
        &self,
        user_id: UserId,
        report_id: ReportId,
        period: ReportPeriod,
        score: &ReportScore,
    ) -> TrackerResult<()> {
        Self::record("report_scored");
        info!(user_id, report_id, %period, score = score.score, "通知: 报告评分完成");
        Ok(())
    }

    async fn notify_scoring_unavailable(
        &self,
        user_id: UserId,
        report_id: ReportId,
        period: ReportPeriod,
        message: &str,
    ) -> TrackerResult<()> {
        Self::record("scoring_unavailable");
        info!(user_id, report_id, %period, detail = message, "通知: 评分服务暂不可用");
        Ok(())
    }

    async fn notify_report_approved(
        &self,
        user_id: UserId,
        report_id: ReportId,
        period: ReportPeriod,
    ) -> TrackerResult<()> {
        Self::record("report_approved");
        info!(user_id, report_id, %period, "通知: 报告已审批");
        Ok(())
    }

    async fn notify_report_rejected(
        &self,
        user_id: UserId,
        report_id: ReportId,
        period: ReportPeriod,
        reason: &str,
    ) -> TrackerResult<()> {
        Self::record("report_rejected");
        info!(user_id, report_id, %period, reason, "通知: 报告被驳回");
        Ok(())
    }

    async fn notify_auto_approved(
        &self,
        user_id: UserId,
        report_id: ReportId,
        period: ReportPeriod,
    ) -> TrackerResult<()> {
        Self::record("auto_approved");
        info!(user_id, report_id, %period, "通知: 报告已自动审批");
        Ok(())
    }
}
