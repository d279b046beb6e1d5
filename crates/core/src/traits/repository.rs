use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::{
    models::{Report, ReportId, ReportPeriod, UserId},
    TrackerResult,
};

/// 存储工作单元
///
/// 每条命令或每批自动审批使用一个短生命周期的工作单元：读取是即时的，
/// `add_report` / `update_report` 只做暂存，`save` 原子提交全部暂存变更。
/// 提交时按 `Report::version` 做乐观并发校验，任何一条冲突则整批不生效并返回
/// `TrackerError::ConcurrencyConflict`。
#[async_trait]
pub trait UnitOfWork: Send {
    /// 根据ID获取报告
    async fn get_report(&mut self, id: ReportId) -> TrackerResult<Option<Report>>;

    /// 根据 `(user_id, date)` 查找报告
    async fn find_report(&mut self, user_id: UserId, date: NaiveDate)
        -> TrackerResult<Option<Report>>;

    /// 查询指定日期、指定时段中等待自动审批的报告
    ///
    /// 只返回该时段已提交、`submitted_at <= cutoff` 且尚未被任何一方审批的报告。
    async fn pending_approval(
        &mut self,
        date: NaiveDate,
        period: ReportPeriod,
        cutoff: DateTime<Utc>,
    ) -> TrackerResult<Vec<Report>>;

    /// 获取需要提交日报的员工列表
    async fn active_users(&mut self) -> TrackerResult<Vec<UserId>>;

    /// 暂存新报告
    fn add_report(&mut self, report: Report);

    /// 暂存对已有报告的修改
    fn update_report(&mut self, report: Report);

    /// 提交全部暂存变更，返回已持久化的报告（含分配的ID与新版本号）
    async fn save(&mut self) -> TrackerResult<Vec<Report>>;
}

/// 工作单元工厂
#[async_trait]
pub trait UnitOfWorkFactory: Send + Sync {
    async fn begin(&self) -> TrackerResult<Box<dyn UnitOfWork>>;
}
