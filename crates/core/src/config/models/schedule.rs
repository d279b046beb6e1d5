use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::config::time_serde::time_of_day;
use crate::models::ReportPeriod;

/// 单个时段的三个时间点
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeriodDeadlines {
    /// 开始提交提醒
    #[serde(with = "time_of_day")]
    pub due_at: NaiveTime,
    /// 截止前提醒
    #[serde(with = "time_of_day")]
    pub reminder_at: NaiveTime,
    /// 截止时间，逾期时长以此为基准
    #[serde(with = "time_of_day")]
    pub deadline_at: NaiveTime,
}

impl PeriodDeadlines {
    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap_or(NaiveTime::MIN)
    }

    pub fn morning_default() -> Self {
        Self {
            due_at: Self::hm(9, 0),
            reminder_at: Self::hm(9, 45),
            deadline_at: Self::hm(10, 0),
        }
    }

    pub fn evening_default() -> Self {
        Self {
            due_at: Self::hm(18, 0),
            reminder_at: Self::hm(18, 45),
            deadline_at: Self::hm(19, 0),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !(self.due_at <= self.reminder_at && self.reminder_at <= self.deadline_at) {
            return Err(anyhow::anyhow!(
                "时间点顺序必须为 due_at <= reminder_at <= deadline_at"
            ));
        }
        Ok(())
    }
}

/// 截止时间调度配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// IANA 时区名，所有时刻都按该时区解释
    pub timezone: String,
    pub morning: PeriodDeadlines,
    pub evening: PeriodDeadlines,
    /// 每周固定的非工作日
    pub excluded_weekdays: Vec<Weekday>,
    /// 额外的节假日
    pub holidays: Vec<NaiveDate>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            timezone: "Asia/Shanghai".to_string(),
            morning: PeriodDeadlines::morning_default(),
            evening: PeriodDeadlines::evening_default(),
            excluded_weekdays: vec![Weekday::Sat, Weekday::Sun],
            holidays: Vec::new(),
        }
    }
}

impl ScheduleConfig {
    pub fn tz(&self) -> anyhow::Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| anyhow::anyhow!("无效的时区 {}: {}", self.timezone, e))
    }

    pub fn deadlines(&self, period: ReportPeriod) -> &PeriodDeadlines {
        match period {
            ReportPeriod::Morning => &self.morning,
            ReportPeriod::Evening => &self.evening,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.tz()?;
        self.morning.validate()?;
        self.evening.validate()?;

        if self.morning.deadline_at > self.evening.due_at {
            return Err(anyhow::anyhow!("早报截止时间不能晚于晚报开始时间"));
        }

        Ok(())
    }
}

/// 将某时区下的本地日期与时刻换算为 UTC
///
/// 夏令时跳过的本地时刻不存在，返回 `None`；重复的本地时刻取较早的一个。
pub fn local_to_utc(tz: &Tz, date: NaiveDate, time: NaiveTime) -> Option<DateTime<Utc>> {
    tz.from_local_datetime(&date.and_time(time))
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_config_default() {
        let config = ScheduleConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tz().unwrap(), chrono_tz::Asia::Shanghai);
        assert_eq!(
            config.deadlines(ReportPeriod::Morning).deadline_at,
            NaiveTime::from_hms_opt(10, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_invalid_timezone_rejected() {
        let config = ScheduleConfig {
            timezone: "Mars/Olympus".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unordered_deadlines_rejected() {
        let mut config = ScheduleConfig::default();
        config.morning.reminder_at = NaiveTime::from_hms_opt(10, 30, 0).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_local_to_utc() {
        let tz = chrono_tz::Asia::Shanghai;
        let date = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        let utc = local_to_utc(&tz, date, NaiveTime::from_hms_opt(10, 0, 0).unwrap()).unwrap();
        assert_eq!(utc, Utc.with_ymd_and_hms(2024, 3, 4, 2, 0, 0).unwrap());
    }

    #[test]
    fn test_local_to_utc_skips_dst_gap() {
        let tz = chrono_tz::Europe::Berlin;
        let date = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
        assert!(local_to_utc(&tz, date, NaiveTime::from_hms_opt(2, 30, 0).unwrap()).is_none());
    }
}
