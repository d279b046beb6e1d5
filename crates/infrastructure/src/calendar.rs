use std::collections::HashSet;

use chrono::{Datelike, NaiveDate, Weekday};

use tracker_core::{ScheduleConfig, WorkCalendar};

/// 按固定休息日和节假日列表判断非工作日
#[derive(Debug, Clone, Default)]
pub struct WeekendCalendar {
    excluded_weekdays: HashSet<Weekday>,
    holidays: HashSet<NaiveDate>,
}

impl WeekendCalendar {
    pub fn new(
        excluded_weekdays: impl IntoIterator<Item = Weekday>,
        holidays: impl IntoIterator<Item = NaiveDate>,
    ) -> Self {
        Self {
            excluded_weekdays: excluded_weekdays.into_iter().collect(),
            holidays: holidays.into_iter().collect(),
        }
    }

    pub fn from_config(config: &ScheduleConfig) -> Self {
        Self::new(
            config.excluded_weekdays.iter().copied(),
            config.holidays.iter().copied(),
        )
    }
}

impl WorkCalendar for WeekendCalendar {
    fn is_excluded(&self, date: NaiveDate) -> bool {
        self.excluded_weekdays.contains(&date.weekday()) || self.holidays.contains(&date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weekends_and_holidays_excluded() {
        let holiday = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let calendar = WeekendCalendar::new([Weekday::Sat, Weekday::Sun], [holiday]);

        assert!(calendar.is_excluded(NaiveDate::from_ymd_opt(2024, 3, 2).unwrap()));
        assert!(calendar.is_excluded(NaiveDate::from_ymd_opt(2024, 3, 3).unwrap()));
        assert!(!calendar.is_excluded(NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()));
        assert!(calendar.is_excluded(holiday));
    }

    #[test]
    fn test_from_default_config() {
        let calendar = WeekendCalendar::from_config(&ScheduleConfig::default());
        assert!(calendar.is_excluded(NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()));
        assert!(!calendar.is_excluded(NaiveDate::from_ymd_opt(2024, 3, 8).unwrap()));
    }
}
