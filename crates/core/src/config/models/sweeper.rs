use chrono::{Duration, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::config::time_serde::time_of_day;
use crate::models::ReportPeriod;

const MINUTES_PER_DAY: u32 = 24 * 60;
/// 宽限时间上限（分钟）
pub const MAX_GRACE_MINUTES: i64 = MINUTES_PER_DAY as i64;

/// 自动审批扫描配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweeperConfig {
    pub enabled: bool,
    /// 扫描间隔（分钟），按墙上时钟边界对齐，必须整除一天
    pub interval_minutes: u32,
    /// 工作时段开始，早报时段为 [work_start, evening_start)
    #[serde(with = "time_of_day")]
    pub work_start: NaiveTime,
    /// 晚报时段为 [evening_start, work_end)
    #[serde(with = "time_of_day")]
    pub evening_start: NaiveTime,
    #[serde(with = "time_of_day")]
    pub work_end: NaiveTime,
    /// 早报提交后多久无人审批即自动审批（分钟）
    pub morning_grace_minutes: i64,
    pub evening_grace_minutes: i64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_minutes: 30,
            work_start: NaiveTime::from_hms_opt(8, 0, 0).unwrap_or(NaiveTime::MIN),
            evening_start: NaiveTime::from_hms_opt(14, 0, 0).unwrap_or(NaiveTime::MIN),
            work_end: NaiveTime::from_hms_opt(23, 0, 0).unwrap_or(NaiveTime::MIN),
            morning_grace_minutes: 60,
            evening_grace_minutes: 60,
        }
    }
}

impl SweeperConfig {
    pub fn interval(&self) -> Duration {
        Duration::minutes(i64::from(self.interval_minutes))
    }

    /// 超出 [0, MAX_GRACE_MINUTES] 的配置值会被截断，`validate` 负责拒绝它们
    pub fn grace_window(&self, period: ReportPeriod) -> Duration {
        let minutes = match period {
            ReportPeriod::Morning => self.morning_grace_minutes,
            ReportPeriod::Evening => self.evening_grace_minutes,
        };
        Duration::minutes(minutes.clamp(0, MAX_GRACE_MINUTES))
    }

    /// 本地时刻所处的时段，工作时段之外返回 `None`
    pub fn active_period(&self, time: NaiveTime) -> Option<ReportPeriod> {
        if time >= self.work_start && time < self.evening_start {
            Some(ReportPeriod::Morning)
        } else if time >= self.evening_start && time < self.work_end {
            Some(ReportPeriod::Evening)
        } else {
            None
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.interval_minutes == 0 || MINUTES_PER_DAY % self.interval_minutes != 0 {
            return Err(anyhow::anyhow!(
                "扫描间隔必须大于0且能整除一天的分钟数: {}",
                self.interval_minutes
            ));
        }

        if !(self.work_start < self.evening_start && self.evening_start < self.work_end) {
            return Err(anyhow::anyhow!(
                "工作时段必须满足 work_start < evening_start < work_end"
            ));
        }

        for (name, minutes) in [
            ("morning_grace_minutes", self.morning_grace_minutes),
            ("evening_grace_minutes", self.evening_grace_minutes),
        ] {
            if !(0..=MAX_GRACE_MINUTES).contains(&minutes) {
                return Err(anyhow::anyhow!(
                    "{} 必须在 0 到 {} 分钟之间: {}",
                    name,
                    MAX_GRACE_MINUTES,
                    minutes
                ));
            }
        }

        Ok(())
    }
}
