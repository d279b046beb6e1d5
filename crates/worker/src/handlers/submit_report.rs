use async_trait::async_trait;
use tracing::{info, instrument};

use tracker_core::{
    Command, CommandKind, Report, ReportHalf, ReportPeriod, TrackerError, TrackerResult,
};

use super::HandlerDeps;
use crate::handler_registry::{unexpected_command, CommandHandler, HandlerContext};

/// 提交或重新提交早报/晚报，保存后追加评分命令
pub struct SubmitReportHandler {
    deps: HandlerDeps,
}

impl SubmitReportHandler {
    pub fn new(deps: HandlerDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl CommandHandler for SubmitReportHandler {
    fn kind(&self) -> CommandKind {
        CommandKind::SubmitReport
    }

    #[instrument(skip_all, fields(command_id = %ctx.command_id))]
    async fn handle(&self, command: Command, ctx: &HandlerContext) -> TrackerResult<()> {
        let (user_id, date, period, text) = match command {
            Command::SubmitReport {
                user_id,
                date,
                period,
                text,
            } => (user_id, date, period, text),
            other => return Err(unexpected_command(self.kind(), &other)),
        };

        let now = self.deps.clock.now();
        let deadline = self.deps.deadline(date, period);

        let mut uow = self.deps.store.begin().await?;
        let existing = uow.find_report(user_id, date).await?;

        match (period, existing) {
            (ReportPeriod::Morning, None) => {
                uow.add_report(Report::new(
                    user_id,
                    date,
                    ReportHalf::new(text, now, deadline),
                ));
            }
            (ReportPeriod::Morning, Some(mut report)) => {
                report.morning.resubmit(text, now, deadline)?;
                uow.update_report(report);
            }
            (ReportPeriod::Evening, None) => {
                return Err(TrackerError::invalid_state("提交晚报前需要先提交早报"));
            }
            (ReportPeriod::Evening, Some(mut report)) => {
                match report.evening.as_mut() {
                    Some(half) => half.resubmit(text, now, deadline)?,
                    None => report.evening = Some(ReportHalf::new(text, now, deadline)),
                }
                uow.update_report(report);
            }
        }

        let report = uow
            .save()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| TrackerError::Internal("保存后未返回报告".to_string()))?;

        let overdue = report.half(period).and_then(|h| h.overdue);
        info!(
            user_id,
            report_id = report.id,
            %period,
            overdue_minutes = overdue.map(|d| d.num_minutes()),
            "报告已提交"
        );

        let follow_up = Command::AnalyzeReport {
            report_id: report.id,
            period,
        };
        self.deps.enqueue_follow_up(follow_up, &ctx.cancel);

        Ok(())
    }
}
