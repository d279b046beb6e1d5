use async_trait::async_trait;
use tracing::{debug, info, instrument};

use tracker_core::{Command, CommandKind, TrackerResult, UserId};

use super::HandlerDeps;
use crate::handler_registry::{unexpected_command, CommandHandler, HandlerContext};

/// 自动审批之后通知作者
pub struct NotifyAutoApprovedHandler {
    deps: HandlerDeps,
}

impl NotifyAutoApprovedHandler {
    pub fn new(deps: HandlerDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl CommandHandler for NotifyAutoApprovedHandler {
    fn kind(&self) -> CommandKind {
        CommandKind::NotifyAutoApproved
    }

    async fn handle(&self, command: Command, _ctx: &HandlerContext) -> TrackerResult<()> {
        match command {
            Command::NotifyAutoApproved {
                report_id,
                user_id,
                period,
            } => {
                self.deps
                    .notifier
                    .notify_auto_approved(user_id, report_id, period)
                    .await
            }
            other => Err(unexpected_command(self.kind(), &other)),
        }
    }
}

/// 截止后向管理员汇总未提交该时段报告的员工
pub struct ReportMissedHandler {
    deps: HandlerDeps,
}

impl ReportMissedHandler {
    pub fn new(deps: HandlerDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl CommandHandler for ReportMissedHandler {
    fn kind(&self) -> CommandKind {
        CommandKind::ReportMissed
    }

    #[instrument(skip_all, fields(command_id = %ctx.command_id))]
    async fn handle(&self, command: Command, ctx: &HandlerContext) -> TrackerResult<()> {
        let (date, period) = match command {
            Command::ReportMissed { date, period } => (date, period),
            other => return Err(unexpected_command(self.kind(), &other)),
        };

        let mut uow = self.deps.store.begin().await?;
        let mut missing: Vec<UserId> = Vec::new();
        for user_id in uow.active_users().await? {
            let submitted = uow
                .find_report(user_id, date)
                .await?
                .is_some_and(|report| report.half(period).is_some());
            if !submitted {
                missing.push(user_id);
            }
        }

        if missing.is_empty() {
            debug!(%date, %period, "所有员工均已提交");
            return Ok(());
        }

        info!(%date, %period, missing = missing.len(), "存在未提交报告的员工");
        self.deps
            .notifier
            .notify_missing_reports(date, period, &missing)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::*;
    use tracker_core::{Report, ReportHalf, ReportPeriod, UnitOfWorkFactory};
    use tracker_testing_utils::{NotificationEvent, ScriptedAnalyzer};

    fn missed(period: ReportPeriod) -> Command {
        Command::ReportMissed {
            date: day(),
            period,
        }
    }

    #[tokio::test]
    async fn test_lists_users_without_half() {
        let fixture = Fixture::new(ScriptedAnalyzer::new(vec![]));
        let mut uow = fixture.store.begin().await.unwrap();
        uow.add_report(Report::new(
            2,
            day(),
            ReportHalf::new("plan", fixture.at(9, 0), fixture.at(10, 0)),
        ));
        uow.save().await.unwrap();

        let handler = ReportMissedHandler::new(fixture.deps.clone());
        handler.handle(missed(ReportPeriod::Morning), &ctx()).await.unwrap();
        handler.handle(missed(ReportPeriod::Evening), &ctx()).await.unwrap();

        assert_eq!(
            fixture.notifier.events(),
            vec![
                NotificationEvent::MissingReports {
                    date: day(),
                    period: ReportPeriod::Morning,
                    users: vec![1, 3]
                },
                NotificationEvent::MissingReports {
                    date: day(),
                    period: ReportPeriod::Evening,
                    users: vec![1, 2, 3]
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_skips_notification_when_nobody_missing() {
        let fixture = Fixture::new(ScriptedAnalyzer::new(vec![]));
        let mut uow = fixture.store.begin().await.unwrap();
        for user_id in [1, 2, 3] {
            uow.add_report(Report::new(
                user_id,
                day(),
                ReportHalf::new("plan", fixture.at(9, 0), fixture.at(10, 0)),
            ));
        }
        uow.save().await.unwrap();

        ReportMissedHandler::new(fixture.deps.clone())
            .handle(missed(ReportPeriod::Morning), &ctx())
            .await
            .unwrap();
        assert!(fixture.notifier.events().is_empty());
    }

    #[tokio::test]
    async fn test_auto_approved_forwarded() {
        let fixture = Fixture::new(ScriptedAnalyzer::new(vec![]));
        NotifyAutoApprovedHandler::new(fixture.deps.clone())
            .handle(
                Command::NotifyAutoApproved {
                    report_id: 5,
                    user_id: 2,
                    period: ReportPeriod::Evening,
                },
                &ctx(),
            )
            .await
            .unwrap();
        assert_eq!(
            fixture.notifier.events(),
            vec![NotificationEvent::AutoApproved {
                user_id: 2,
                report_id: 5,
                period: ReportPeriod::Evening
            }]
        );
    }
}
