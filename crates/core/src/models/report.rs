use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{TrackerError, TrackerResult};

pub type UserId = i64;
pub type ReportId = i64;

/// 日报的时段：早报或晚报
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportPeriod {
    Morning,
    Evening,
}

impl ReportPeriod {
    pub const ALL: [ReportPeriod; 2] = [ReportPeriod::Morning, ReportPeriod::Evening];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportPeriod::Morning => "morning",
            ReportPeriod::Evening => "evening",
        }
    }
}

impl fmt::Display for ReportPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 外部评分服务给出的结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportScore {
    pub score: u8,
    pub feedback: String,
}

/// 计算逾期时长
///
/// 截止时间之前（含截止时刻本身）返回 `None`，之后返回 `now - deadline`，永不为负。
pub fn compute_overdue(now: DateTime<Utc>, deadline: DateTime<Utc>) -> Option<Duration> {
    if now > deadline {
        Some(now - deadline)
    } else {
        None
    }
}

/// 早报或晚报部分
#[derive(Debug, Clone, PartialEq)]
pub struct ReportHalf {
    pub data: String,
    pub submitted_at: DateTime<Utc>,
    pub overdue: Option<Duration>,
    /// 仅由管理员显式审批设置
    pub approved: bool,
    /// 仅由自动审批扫描设置
    pub approved_by_system: bool,
    pub score: Option<ReportScore>,
}

impl ReportHalf {
    pub fn new(
        data: impl Into<String>,
        submitted_at: DateTime<Utc>,
        deadline: DateTime<Utc>,
    ) -> Self {
        Self {
            data: data.into(),
            submitted_at,
            overdue: compute_overdue(submitted_at, deadline),
            approved: false,
            approved_by_system: false,
            score: None,
        }
    }

    pub fn is_approved(&self) -> bool {
        self.approved || self.approved_by_system
    }

    /// 管理员审批，返回状态是否发生变化
    pub fn approve(&mut self) -> bool {
        if self.is_approved() {
            return false;
        }
        self.approved = true;
        true
    }

    /// 系统自动审批，返回状态是否发生变化
    pub fn approve_by_system(&mut self) -> bool {
        if self.is_approved() {
            return false;
        }
        self.approved_by_system = true;
        true
    }

    /// 重新提交内容。已审批的部分不允许覆盖。
    pub fn resubmit(
        &mut self,
        data: impl Into<String>,
        submitted_at: DateTime<Utc>,
        deadline: DateTime<Utc>,
    ) -> TrackerResult<()> {
        if self.is_approved() {
            return Err(TrackerError::invalid_state("已审批的报告不能重新提交"));
        }
        self.data = data.into();
        self.submitted_at = submitted_at;
        self.overdue = compute_overdue(submitted_at, deadline);
        self.score = None;
        Ok(())
    }
}

/// 日报聚合，以 `(user_id, date)` 唯一标识
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    /// 由存储分配，未保存前为 0
    pub id: ReportId,
    pub user_id: UserId,
    pub date: NaiveDate,
    pub morning: ReportHalf,
    pub evening: Option<ReportHalf>,
    /// 乐观并发版本号，每次成功保存后递增
    pub version: u64,
}

impl Report {
    pub fn new(user_id: UserId, date: NaiveDate, morning: ReportHalf) -> Self {
        Self {
            id: 0,
            user_id,
            date,
            morning,
            evening: None,
            version: 0,
        }
    }

    pub fn half(&self, period: ReportPeriod) -> Option<&ReportHalf> {
        match period {
            ReportPeriod::Morning => Some(&self.morning),
            ReportPeriod::Evening => self.evening.as_ref(),
        }
    }

    pub fn half_mut(&mut self, period: ReportPeriod) -> Option<&mut ReportHalf> {
        match period {
            ReportPeriod::Morning => Some(&mut self.morning),
            ReportPeriod::Evening => self.evening.as_mut(),
        }
    }

    pub fn is_approved(&self, period: ReportPeriod) -> bool {
        self.half(period).is_some_and(ReportHalf::is_approved)
    }

    /// 自动审批的匹配谓词：该时段已提交、提交时间不晚于截止点、且尚未被任何一方审批
    pub fn awaits_auto_approval(&self, period: ReportPeriod, cutoff: DateTime<Utc>) -> bool {
        self.half(period)
            .is_some_and(|half| !half.is_approved() && half.submitted_at <= cutoff)
    }
}
