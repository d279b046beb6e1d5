//! 自动审批扫描
//!
//! 按墙上时钟的整间隔边界（例如 :00 与 :30）触发。每次扫描在一个工作单元内
//! 把超过宽限时间仍无人审批的报告标记为系统审批，保存成功后再逐条提交
//! `NotifyAutoApproved` 跟进命令。保存失败时没有任何标志被修改；
//! 跟进命令提交失败只记录日志，审批结果保留。

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveTime, Timelike, Utc};
use chrono_tz::Tz;
use metrics::counter;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use tracker_core::{
    config::local_to_utc, Clock, Command, CommandSink, Report, ReportId, ReportPeriod,
    SweeperConfig, TrackerError, TrackerResult, UnitOfWorkFactory,
};

use crate::background::BackgroundTask;

const MINUTES_PER_DAY: u32 = 24 * 60;

/// 一次扫描的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepOutcome {
    /// 扫描所处的时段，工作时段之外为 `None`
    pub period: Option<ReportPeriod>,
    pub approved: Vec<ReportId>,
    /// 成功提交的跟进命令数
    pub follow_ups: usize,
}

pub struct AutoApprovalSweeper {
    config: SweeperConfig,
    tz: Tz,
    store: Arc<dyn UnitOfWorkFactory>,
    sink: Arc<dyn CommandSink>,
    clock: Arc<dyn Clock>,
}

impl AutoApprovalSweeper {
    pub fn new(
        config: SweeperConfig,
        tz: Tz,
        store: Arc<dyn UnitOfWorkFactory>,
        sink: Arc<dyn CommandSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            tz,
            store,
            sink,
            clock,
        }
    }

    /// 严格晚于 `after` 的下一个扫描边界，边界从本地零点起按间隔对齐
    pub fn next_tick(&self, after: DateTime<Utc>) -> DateTime<Utc> {
        let interval = self.config.interval_minutes.clamp(1, MINUTES_PER_DAY);
        let local = after.with_timezone(&self.tz);
        let mut day = local.date_naive();
        let mut slot = (local.hour() * 60 + local.minute()) / interval + 1;

        // 最多查看两天的边界，夏令时跳过的边界直接略过
        for _ in 0..(2 * MINUTES_PER_DAY / interval + 2) {
            if slot * interval >= MINUTES_PER_DAY {
                day = match day.succ_opt() {
                    Some(next) => next,
                    None => break,
                };
                slot = 0;
            }
            let minutes = slot * interval;
            if let Some(at) = NaiveTime::from_hms_opt(minutes / 60, minutes % 60, 0)
                .and_then(|time| local_to_utc(&self.tz, day, time))
            {
                if at > after {
                    return at;
                }
            }
            slot += 1;
        }
        after + self.config.interval()
    }

    /// 执行一次扫描
    pub async fn sweep(
        &self,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> TrackerResult<SweepOutcome> {
        let local = now.with_timezone(&self.tz);
        let Some(period) = self.config.active_period(local.time()) else {
            debug!("{} 不在工作时段内，跳过自动审批", local.time());
            return Ok(SweepOutcome::default());
        };

        let date = local.date_naive();
        let cutoff = now - self.config.grace_window(period);

        let approved = match self.approve_pending(date, period, cutoff).await {
            Err(TrackerError::ConcurrencyConflict { report_id }) => {
                // 人工审批先一步保存，重新查询时已审批的报告会被排除
                warn!("自动审批与报告 {} 的其他修改冲突，重新扫描一次", report_id);
                self.approve_pending(date, period, cutoff).await?
            }
            other => other?,
        };

        let mut outcome = SweepOutcome {
            period: Some(period),
            approved: approved.iter().map(|r| r.id).collect(),
            follow_ups: 0,
        };
        if approved.is_empty() {
            return Ok(outcome);
        }

        counter!("auto_approved_reports_total", "period" => period.as_str())
            .increment(approved.len() as u64);
        info!("自动审批 {} 份{}报告 ({})", approved.len(), period, date);

        for report in &approved {
            let command = Command::NotifyAutoApproved {
                report_id: report.id,
                user_id: report.user_id,
                period,
            };
            match self.sink.submit(command, cancel).await {
                Ok(()) => outcome.follow_ups += 1,
                Err(e) => warn!("报告 {} 的自动审批通知提交失败: {}", report.id, e),
            }
        }

        Ok(outcome)
    }

    /// 单个工作单元内完成查询、标记与保存
    async fn approve_pending(
        &self,
        date: NaiveDate,
        period: ReportPeriod,
        cutoff: DateTime<Utc>,
    ) -> TrackerResult<Vec<Report>> {
        let mut uow = self.store.begin().await?;
        let pending = uow.pending_approval(date, period, cutoff).await?;
        if pending.is_empty() {
            return Ok(Vec::new());
        }

        for mut report in pending {
            if let Some(half) = report.half_mut(period) {
                half.approve_by_system();
            }
            uow.update_report(report);
        }
        uow.save().await
    }

    async fn run(self: Arc<Self>, cancel: CancellationToken) {
        loop {
            let next_at = self.next_tick(self.clock.now());
            let wait = (next_at - self.clock.now())
                .to_std()
                .unwrap_or(Duration::ZERO);
            debug!("下一次自动审批扫描: {}", next_at);

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }

            if let Err(e) = self.sweep(self.clock.now(), &cancel).await {
                error!("自动审批扫描失败: {}", e);
            }
        }

        debug!("自动审批扫描循环退出");
    }

    pub fn start(self: Arc<Self>, parent: &CancellationToken) -> BackgroundTask {
        BackgroundTask::spawn("auto-approval-sweeper", parent, move |cancel| self.run(cancel))
    }
}
