use chrono::NaiveDate;

/// 工作日历：判断某天是否为非工作日
pub trait WorkCalendar: Send + Sync {
    fn is_excluded(&self, date: NaiveDate) -> bool;
}
