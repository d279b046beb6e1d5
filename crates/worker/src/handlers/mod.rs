//! 命令处理器
//!
//! 每条命令使用一个独立的短生命周期工作单元。

mod analyze_report;
mod approval;
mod notifications;
mod submit_report;

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use tracker_core::{
    config::local_to_utc, Clock, Command, CommandSink, Notifier, ReportAnalyzer, ReportPeriod,
    ScheduleConfig, TrackerError, UnitOfWorkFactory,
};
use tracker_infrastructure::ResiliencePipeline;

pub use analyze_report::AnalyzeReportHandler;
pub use approval::{ApproveReportHandler, RejectReportHandler};
pub use notifications::{NotifyAutoApprovedHandler, ReportMissedHandler};
pub use submit_report::SubmitReportHandler;

use crate::handler_registry::HandlerRegistry;

/// 处理器共享的协作对象
#[derive(Clone)]
pub struct HandlerDeps {
    pub store: Arc<dyn UnitOfWorkFactory>,
    pub notifier: Arc<dyn Notifier>,
    pub sink: Arc<dyn CommandSink>,
    pub analyzer: Arc<dyn ReportAnalyzer>,
    pub pipeline: Arc<ResiliencePipeline>,
    pub clock: Arc<dyn Clock>,
    pub schedule: Arc<ScheduleConfig>,
    pub tz: Tz,
}

impl HandlerDeps {
    /// 某日某时段的截止时间（UTC）
    ///
    /// 截止时刻落在夏令时跳过的区间时，顺延一小时。
    pub fn deadline(&self, date: NaiveDate, period: ReportPeriod) -> DateTime<Utc> {
        let time = self.schedule.deadlines(period).deadline_at;
        local_to_utc(&self.tz, date, time)
            .or_else(|| local_to_utc(&self.tz, date, time + Duration::hours(1)))
            .unwrap_or_else(|| date.and_time(time).and_utc())
    }

    /// 提交处理器产生的后续命令，当前 Worker 不等待队列空位
    ///
    /// 队列满时改由独立任务阻塞提交，该任务随 `cancel` 或队列关闭结束。
    pub fn enqueue_follow_up(&self, command: Command, cancel: &CancellationToken) {
        let kind = command.kind();
        match self.sink.try_submit(command.clone()) {
            Ok(()) => {}
            Err(TrackerError::QueueFull) => {
                debug!("命令队列已满，后台等待提交 {}", kind);
                let sink = self.sink.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    if let Err(e) = sink.submit(command, &cancel).await {
                        warn!("后续命令 {} 入队失败: {}", kind, e);
                    }
                });
            }
            Err(e) => warn!("后续命令 {} 入队失败: {}", kind, e),
        }
    }
}

/// 构建包含全部命令处理器的注册表
pub fn build_registry(deps: HandlerDeps) -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry
        .register(Arc::new(SubmitReportHandler::new(deps.clone())))
        .register(Arc::new(AnalyzeReportHandler::new(deps.clone())))
        .register(Arc::new(ApproveReportHandler::new(deps.clone())))
        .register(Arc::new(RejectReportHandler::new(deps.clone())))
        .register(Arc::new(NotifyAutoApprovedHandler::new(deps.clone())))
        .register(Arc::new(ReportMissedHandler::new(deps)));
    registry
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use tracker_core::CommandKind;
    use tracker_testing_utils::ScriptedAnalyzer;

    #[test]
    fn test_registry_covers_every_kind() {
        let fixture = Fixture::new(ScriptedAnalyzer::new(vec![]));
        let registry = build_registry(fixture.deps.clone());
        for kind in CommandKind::ALL {
            assert!(registry.contains(kind), "missing handler for {kind}");
        }
    }

    #[test]
    fn test_deadline_in_configured_timezone() {
        let fixture = Fixture::new(ScriptedAnalyzer::new(vec![]));
        assert_eq!(
            fixture.deps.deadline(day(), ReportPeriod::Morning),
            fixture.at(10, 0)
        );
    }
}
