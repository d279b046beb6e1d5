use async_trait::async_trait;
use chrono::NaiveDate;

use crate::{
    models::{ReportId, ReportPeriod, ReportScore, UserId},
    TrackerResult,
};

/// 通知发送接口，每种事件一个操作
///
/// 实际的聊天协议适配由外部实现，这里只约定语义。
#[async_trait]
pub trait Notifier: Send + Sync {
    /// 提醒全体员工开始提交该时段的报告
    async fn notify_report_due(&self, period: ReportPeriod) -> TrackerResult<()>;

    /// 提醒截止时间即将到达
    async fn notify_deadline_approaching(&self, period: ReportPeriod) -> TrackerResult<()>;

    /// 通知截止时间已过
    async fn notify_deadline_missed(&self, period: ReportPeriod) -> TrackerResult<()>;

    /// 向管理员汇总未按时提交的员工
    async fn notify_missing_reports(
        &self,
        date: NaiveDate,
        period: ReportPeriod,
        users: &[UserId],
    ) -> TrackerResult<()>;

    async fn notify_report_scored(
        &self,
        user_id: UserId,
        report_id: ReportId,
        period: ReportPeriod,
        score: &ReportScore,
    ) -> TrackerResult<()>;

    /// `message` 是面向员工的失败说明
    async fn notify_scoring_unavailable(
        &self,
        user_id: UserId,
        report_id: ReportId,
        period: ReportPeriod,
        message: &str,
    ) -> TrackerResult<()>;

    async fn notify_report_approved(
        &self,
        user_id: UserId,
        report_id: ReportId,
        period: ReportPeriod,
    ) -> TrackerResult<()>;

    async fn notify_report_rejected(
        &self,
        user_id: UserId,
        report_id: ReportId,
        period: ReportPeriod,
        reason: &str,
    ) -> TrackerResult<()>;

    async fn notify_auto_approved(
        &self,
        user_id: UserId,
        report_id: ReportId,
        period: ReportPeriod,
    ) -> TrackerResult<()>;
}
