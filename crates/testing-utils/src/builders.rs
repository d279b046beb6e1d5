//! 测试数据构造器

use chrono::{DateTime, Duration, NaiveDate, Utc};

use tracker_core::{Report, ReportHalf, ReportId, ReportPeriod, ReportScore, UserId};

/// 报告构造器；默认早报在截止前提交
pub struct ReportBuilder {
    report: Report,
}

impl ReportBuilder {
    pub fn new(user_id: UserId, date: NaiveDate, submitted_at: DateTime<Utc>) -> Self {
        let deadline = submitted_at + Duration::hours(1);
        Self {
            report: Report::new(
                user_id,
                date,
                ReportHalf::new(format!("user {user_id} morning"), submitted_at, deadline),
            ),
        }
    }

    pub fn with_id(mut self, id: ReportId) -> Self {
        self.report.id = id;
        self
    }

    pub fn with_morning(
        mut self,
        text: &str,
        submitted_at: DateTime<Utc>,
        deadline: DateTime<Utc>,
    ) -> Self {
        self.report.morning = ReportHalf::new(text, submitted_at, deadline);
        self
    }

    pub fn with_evening(
        mut self,
        text: &str,
        submitted_at: DateTime<Utc>,
        deadline: DateTime<Utc>,
    ) -> Self {
        self.report.evening = Some(ReportHalf::new(text, submitted_at, deadline));
        self
    }

    pub fn approved(mut self, period: ReportPeriod) -> Self {
        if let Some(half) = self.report.half_mut(period) {
            half.approve();
        }
        self
    }

    pub fn approved_by_system(mut self, period: ReportPeriod) -> Self {
        if let Some(half) = self.report.half_mut(period) {
            half.approve_by_system();
        }
        self
    }

    pub fn scored(mut self, period: ReportPeriod, score: u8) -> Self {
        if let Some(half) = self.report.half_mut(period) {
            half.score = Some(ReportScore {
                score,
                feedback: String::new(),
            });
        }
        self
    }

    pub fn build(self) -> Report {
        self.report
    }
}
