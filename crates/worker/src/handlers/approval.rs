use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use tracker_core::{
    Command, CommandKind, ReportId, ReportPeriod, TrackerError, TrackerResult, UserId,
};

use super::HandlerDeps;
use crate::handler_registry::{unexpected_command, CommandHandler, HandlerContext};

/// 管理员审批
///
/// 已审批（无论由谁审批）的时段不做任何操作，也不发送通知。
/// 保存时与自动审批发生冲突则重新加载一次。
pub struct ApproveReportHandler {
    deps: HandlerDeps,
}

impl ApproveReportHandler {
    pub fn new(deps: HandlerDeps) -> Self {
        Self { deps }
    }

    /// 返回被审批报告的作者；已审批时返回 `None`
    async fn approve(
        &self,
        report_id: ReportId,
        period: ReportPeriod,
    ) -> TrackerResult<Option<UserId>> {
        for attempt in 0..2 {
            let mut uow = self.deps.store.begin().await?;
            let mut report = uow
                .get_report(report_id)
                .await?
                .ok_or(TrackerError::ReportNotFound { id: report_id })?;
            let user_id = report.user_id;

            let half = report.half_mut(period).ok_or_else(|| {
                TrackerError::invalid_state(format!("报告 {report_id} 尚未提交{period}"))
            })?;
            if !half.approve() {
                return Ok(None);
            }

            uow.update_report(report);
            match uow.save().await {
                Ok(_) => return Ok(Some(user_id)),
                Err(TrackerError::ConcurrencyConflict { .. }) if attempt == 0 => {
                    debug!("审批报告 {} 时发生并发冲突，重新加载", report_id);
                }
                Err(e) => return Err(e),
            }
        }
        Err(TrackerError::ConcurrencyConflict { report_id })
    }
}

#[async_trait]
impl CommandHandler for ApproveReportHandler {
    fn kind(&self) -> CommandKind {
        CommandKind::ApproveReport
    }

    #[instrument(skip_all, fields(command_id = %ctx.command_id))]
    async fn handle(&self, command: Command, ctx: &HandlerContext) -> TrackerResult<()> {
        let (report_id, period, admin_id) = match command {
            Command::ApproveReport {
                report_id,
                period,
                admin_id,
            } => (report_id, period, admin_id),
            other => return Err(unexpected_command(self.kind(), &other)),
        };

        match self.approve(report_id, period).await? {
            Some(user_id) => {
                info!(report_id, %period, admin_id, "报告已审批");
                self.deps
                    .notifier
                    .notify_report_approved(user_id, report_id, period)
                    .await
            }
            None => {
                info!(report_id, %period, admin_id, "报告已审批过，忽略");
                Ok(())
            }
        }
    }
}

/// 管理员驳回；已审批的时段不能驳回
pub struct RejectReportHandler {
    deps: HandlerDeps,
}

impl RejectReportHandler {
    pub fn new(deps: HandlerDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl CommandHandler for RejectReportHandler {
    fn kind(&self) -> CommandKind {
        CommandKind::RejectReport
    }

    #[instrument(skip_all, fields(command_id = %ctx.command_id))]
    async fn handle(&self, command: Command, ctx: &HandlerContext) -> TrackerResult<()> {
        let (report_id, period, admin_id, reason) = match command {
            Command::RejectReport {
                report_id,
                period,
                admin_id,
                reason,
            } => (report_id, period, admin_id, reason),
            other => return Err(unexpected_command(self.kind(), &other)),
        };

        let mut uow = self.deps.store.begin().await?;
        let report = uow
            .get_report(report_id)
            .await?
            .ok_or(TrackerError::ReportNotFound { id: report_id })?;
        let half = report.half(period).ok_or_else(|| {
            TrackerError::invalid_state(format!("报告 {report_id} 尚未提交{period}"))
        })?;

        if half.is_approved() {
            warn!(report_id, %period, admin_id, "尝试驳回已审批的报告");
            return Err(TrackerError::invalid_state("已审批的报告不能驳回"));
        }

        info!(report_id, %period, admin_id, "报告被驳回");
        self.deps
            .notifier
            .notify_report_rejected(report.user_id, report_id, period, &reason)
            .await
    }
}
