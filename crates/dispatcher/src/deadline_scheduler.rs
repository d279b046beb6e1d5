//! 截止时间调度器
//!
//! 一个循环持有全部条目，按下一次触发时间排序；睡眠到最早的条目，
//! 醒来后触发所有已到期的条目，再把它们各自重新排到严格晚于本次触发的下一次。

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use metrics::counter;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use tracker_core::{
    config::local_to_utc, Clock, Command, CommandSink, Notifier, ReportPeriod, ScheduleConfig,
    WorkCalendar,
};

use crate::background::BackgroundTask;

/// 向后查找可用日期的上限；夏令时跳变最多让某个时刻缺失一天
const MAX_LOOKAHEAD_DAYS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeadlineEventKind {
    /// 开始提交
    Due,
    /// 截止前提醒
    DeadlineApproaching,
    /// 已过截止时间
    Missed,
}

impl DeadlineEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeadlineEventKind::Due => "due",
            DeadlineEventKind::DeadlineApproaching => "deadline_approaching",
            DeadlineEventKind::Missed => "missed",
        }
    }
}

impl fmt::Display for DeadlineEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeadlineEvent {
    pub period: ReportPeriod,
    pub kind: DeadlineEventKind,
}

/// 每天固定本地时刻触发的事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleEntry {
    pub time: NaiveTime,
    pub event: DeadlineEvent,
}

/// 已排定下一次触发时间的条目
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArmedEntry {
    pub at: DateTime<Utc>,
    pub entry: ScheduleEntry,
}

/// 由配置生成早报、晚报各三个条目
pub fn entries_from_config(schedule: &ScheduleConfig) -> Vec<ScheduleEntry> {
    let mut entries = Vec::with_capacity(6);
    for period in [ReportPeriod::Morning, ReportPeriod::Evening] {
        let deadlines = schedule.deadlines(period);
        for (time, kind) in [
            (deadlines.due_at, DeadlineEventKind::Due),
            (deadlines.reminder_at, DeadlineEventKind::DeadlineApproaching),
            (deadlines.deadline_at, DeadlineEventKind::Missed),
        ] {
            entries.push(ScheduleEntry {
                time,
                event: DeadlineEvent { period, kind },
            });
        }
    }
    entries
}

/// 本地时刻 `time` 严格晚于 `after` 的下一次出现
///
/// 当天因夏令时跳变不存在该时刻时顺延到下一天。
pub fn next_occurrence(tz: &Tz, time: NaiveTime, after: DateTime<Utc>) -> DateTime<Utc> {
    let mut day = after.with_timezone(tz).date_naive();
    for _ in 0..MAX_LOOKAHEAD_DAYS {
        if let Some(at) = local_to_utc(tz, day, time) {
            if at > after {
                return at;
            }
        }
        day = match day.succ_opt() {
            Some(next) => next,
            None => break,
        };
    }
    after + chrono::Duration::days(1)
}

pub struct DeadlineScheduler {
    entries: Vec<ScheduleEntry>,
    tz: Tz,
    notifier: Arc<dyn Notifier>,
    sink: Arc<dyn CommandSink>,
    calendar: Arc<dyn WorkCalendar>,
    clock: Arc<dyn Clock>,
}

impl DeadlineScheduler {
    pub fn new(
        schedule: &ScheduleConfig,
        tz: Tz,
        notifier: Arc<dyn Notifier>,
        sink: Arc<dyn CommandSink>,
        calendar: Arc<dyn WorkCalendar>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            entries: entries_from_config(schedule),
            tz,
            notifier,
            sink,
            calendar,
            clock,
        }
    }

    pub fn entries(&self) -> &[ScheduleEntry] {
        &self.entries
    }

    /// 为每个条目排定严格晚于 `now` 的下一次触发，已经过去的事件不会补发
    pub fn arm(&self, now: DateTime<Utc>) -> Vec<ArmedEntry> {
        let mut armed: Vec<ArmedEntry> = self
            .entries
            .iter()
            .map(|entry| ArmedEntry {
                at: next_occurrence(&self.tz, entry.time, now),
                entry: *entry,
            })
            .collect();
        armed.sort_by_key(|a| a.at);
        armed
    }

    /// 触发所有 `at <= now` 的条目并重新排定，返回触发的条目数
    pub async fn tick(
        &self,
        armed: &mut [ArmedEntry],
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> usize {
        let mut fired = 0;
        for slot in armed.iter_mut().filter(|a| a.at <= now) {
            self.fire(slot.entry.event, slot.at, cancel).await;
            slot.at = next_occurrence(&self.tz, slot.entry.time, now.max(slot.at));
            fired += 1;
        }
        armed.sort_by_key(|a| a.at);
        fired
    }

    async fn fire(&self, event: DeadlineEvent, at: DateTime<Utc>, cancel: &CancellationToken) {
        let DeadlineEvent { period, kind } = event;
        let date = at.with_timezone(&self.tz).date_naive();

        if self.calendar.is_excluded(date) {
            debug!("{} 为非工作日，跳过 {} {} 事件", date, period, kind);
            return;
        }

        info!("触发 {} {} 事件 ({})", period, kind, date);
        counter!("deadline_events_total", "period" => period.as_str(), "kind" => kind.as_str())
            .increment(1);

        let result = match kind {
            DeadlineEventKind::Due => self.notifier.notify_report_due(period).await,
            DeadlineEventKind::DeadlineApproaching => {
                self.notifier.notify_deadline_approaching(period).await
            }
            DeadlineEventKind::Missed => self.notifier.notify_deadline_missed(period).await,
        };
        if let Err(e) = result {
            error!("发送 {} {} 通知失败: {}", period, kind, e);
        }

        if kind == DeadlineEventKind::Missed {
            let command = Command::ReportMissed { date, period };
            if let Err(e) = self.sink.submit(command, cancel).await {
                warn!("提交缺交汇总命令失败 ({} {}): {}", date, period, e);
            }
        }
    }

    async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut armed = self.arm(self.clock.now());

        loop {
            let Some(next_at) = armed.first().map(|a| a.at) else {
                warn!("没有可调度的截止时间条目");
                return;
            };
            let wait = (next_at - self.clock.now())
                .to_std()
                .unwrap_or(Duration::ZERO);
            debug!("截止时间调度器将在 {} 醒来", next_at);

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }

            let now = self.clock.now();
            self.tick(&mut armed, now, &cancel).await;
        }

        debug!("截止时间调度器循环退出");
    }

    pub fn start(self: Arc<Self>, parent: &CancellationToken) -> BackgroundTask {
        BackgroundTask::spawn("deadline-scheduler", parent, move |cancel| self.run(cancel))
    }
}
