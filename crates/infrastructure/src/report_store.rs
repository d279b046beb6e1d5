//! 内存报告存储
//!
//! 实现工作单元语义：读取即时返回快照，写入先暂存，`save` 在一把写锁内
//! 先校验全部暂存项的版本号，再整体应用。

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use tracker_core::{
    Report, ReportId, ReportPeriod, TrackerError, TrackerResult, UnitOfWork, UnitOfWorkFactory,
    UserId,
};

#[derive(Debug, Default)]
struct StoreState {
    reports: HashMap<ReportId, Report>,
    by_key: HashMap<(UserId, NaiveDate), ReportId>,
    users: BTreeSet<UserId>,
    next_id: ReportId,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryReportStore {
    state: Arc<RwLock<StoreState>>,
}

impl InMemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users(users: impl IntoIterator<Item = UserId>) -> Self {
        let state = StoreState {
            users: users.into_iter().collect(),
            ..Default::default()
        };
        Self {
            state: Arc::new(RwLock::new(state)),
        }
    }

    /// 登记需要提交日报的员工
    pub async fn register_user(&self, user_id: UserId) {
        self.state.write().await.users.insert(user_id);
    }

    pub async fn report(&self, id: ReportId) -> Option<Report> {
        self.state.read().await.reports.get(&id).cloned()
    }

    pub async fn reports(&self) -> Vec<Report> {
        let state = self.state.read().await;
        let mut reports: Vec<Report> = state.reports.values().cloned().collect();
        reports.sort_by_key(|r| r.id);
        reports
    }
}

#[async_trait]
impl UnitOfWorkFactory for InMemoryReportStore {
    async fn begin(&self) -> TrackerResult<Box<dyn UnitOfWork>> {
        Ok(Box::new(InMemoryUnitOfWork {
            state: self.state.clone(),
            staged: Vec::new(),
        }))
    }
}

#[derive(Debug)]
enum Staged {
    Add(Report),
    Update(Report),
}

pub struct InMemoryUnitOfWork {
    state: Arc<RwLock<StoreState>>,
    staged: Vec<Staged>,
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn get_report(&mut self, id: ReportId) -> TrackerResult<Option<Report>> {
        Ok(self.state.read().await.reports.get(&id).cloned())
    }

    async fn find_report(
        &mut self,
        user_id: UserId,
        date: NaiveDate,
    ) -> TrackerResult<Option<Report>> {
        let state = self.state.read().await;
        Ok(state
            .by_key
            .get(&(user_id, date))
            .and_then(|id| state.reports.get(id))
            .cloned())
    }

    async fn pending_approval(
        &mut self,
        date: NaiveDate,
        period: ReportPeriod,
        cutoff: DateTime<Utc>,
    ) -> TrackerResult<Vec<Report>> {
        let state = self.state.read().await;
        let mut pending: Vec<Report> = state
            .reports
            .values()
            .filter(|r| r.date == date && r.awaits_auto_approval(period, cutoff))
            .cloned()
            .collect();
        pending.sort_by_key(|r| r.id);
        Ok(pending)
    }

    async fn active_users(&mut self) -> TrackerResult<Vec<UserId>> {
        Ok(self.state.read().await.users.iter().copied().collect())
    }

    fn add_report(&mut self, report: Report) {
        self.staged.push(Staged::Add(report));
    }

    fn update_report(&mut self, report: Report) {
        self.staged.push(Staged::Update(report));
    }

    async fn save(&mut self) -> TrackerResult<Vec<Report>> {
        let staged = std::mem::take(&mut self.staged);
        let mut state = self.state.write().await;

        for item in &staged {
            match item {
                Staged::Add(report) => {
                    if let Some(existing) = state.by_key.get(&(report.user_id, report.date)) {
                        return Err(TrackerError::ConcurrencyConflict {
                            report_id: *existing,
                        });
                    }
                }
                Staged::Update(report) => match state.reports.get(&report.id) {
                    None => return Err(TrackerError::report_not_found(report.id)),
                    Some(current) if current.version != report.version => {
                        return Err(TrackerError::ConcurrencyConflict {
                            report_id: report.id,
                        });
                    }
                    Some(_) => {}
                },
            }
        }

        let mut saved = Vec::with_capacity(staged.len());
        for item in staged {
            let report = match item {
                Staged::Add(mut report) => {
                    state.next_id += 1;
                    report.id = state.next_id;
                    report.version = 1;
                    state.by_key.insert((report.user_id, report.date), report.id);
                    state.users.insert(report.user_id);
                    report
                }
                Staged::Update(mut report) => {
                    report.version += 1;
                    report
                }
            };
            state.reports.insert(report.id, report.clone());
            saved.push(report);
        }

        debug!("工作单元提交完成，写入 {} 条报告", saved.len());
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tracker_core::ReportHalf;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, h, m, 0).unwrap()
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()
    }

    async fn seed(store: &InMemoryReportStore, user_id: UserId) -> Report {
        let mut uow = store.begin().await.unwrap();
        uow.add_report(Report::new(
            user_id,
            date(),
            ReportHalf::new("m", at(9, 0), at(10, 0)),
        ));
        uow.save().await.unwrap().remove(0)
    }

    #[tokio::test]
    async fn test_add_assigns_id_and_version() {
        let store = InMemoryReportStore::new();
        let report = seed(&store, 7).await;
        assert_eq!(report.id, 1);
        assert_eq!(report.version, 1);

        let mut uow = store.begin().await.unwrap();
        let found = uow.find_report(7, date()).await.unwrap().unwrap();
        assert_eq!(found, report);
        assert_eq!(uow.active_users().await.unwrap(), vec![7]);
    }

    #[tokio::test]
    async fn test_unsaved_changes_are_invisible() {
        let store = InMemoryReportStore::new();
        let report = seed(&store, 7).await;

        let mut uow = store.begin().await.unwrap();
        let mut changed = report.clone();
        changed.morning.approve();
        uow.update_report(changed);
        drop(uow);

        assert!(!store.report(report.id).await.unwrap().is_approved(ReportPeriod::Morning));
    }

    #[tokio::test]
    async fn test_stale_update_conflicts_and_applies_nothing() {
        let store = InMemoryReportStore::new();
        let first = seed(&store, 1).await;
        let second = seed(&store, 2).await;

        let mut winner = store.begin().await.unwrap();
        let mut loser = store.begin().await.unwrap();

        let mut a = winner.get_report(first.id).await.unwrap().unwrap();
        a.morning.approve();
        winner.update_report(a);

        let mut b1 = loser.get_report(first.id).await.unwrap().unwrap();
        let mut b2 = loser.get_report(second.id).await.unwrap().unwrap();
        b1.morning.approve_by_system();
        b2.morning.approve_by_system();
        loser.update_report(b2);
        loser.update_report(b1);

        winner.save().await.unwrap();
        let err = loser.save().await.unwrap_err();
        assert!(matches!(err, TrackerError::ConcurrencyConflict { report_id } if report_id == first.id));

        let untouched = store.report(second.id).await.unwrap();
        assert!(!untouched.is_approved(ReportPeriod::Morning));
        assert_eq!(untouched.version, 1);
    }

    #[tokio::test]
    async fn test_duplicate_add_conflicts() {
        let store = InMemoryReportStore::new();
        let existing = seed(&store, 7).await;

        let mut uow = store.begin().await.unwrap();
        uow.add_report(Report::new(7, date(), ReportHalf::new("again", at(9, 5), at(10, 0))));
        let err = uow.save().await.unwrap_err();
        assert!(matches!(err, TrackerError::ConcurrencyConflict { report_id } if report_id == existing.id));
    }

    #[tokio::test]
    async fn test_pending_approval_filters() {
        let store = InMemoryReportStore::with_users([1, 2, 3]);
        let early = seed(&store, 1).await;

        let mut uow = store.begin().await.unwrap();
        uow.add_report(Report::new(2, date(), ReportHalf::new("late", at(9, 30), at(10, 0))));
        uow.save().await.unwrap();

        let pending = uow
            .pending_approval(date(), ReportPeriod::Morning, at(9, 5))
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, early.id);

        let evening = uow
            .pending_approval(date(), ReportPeriod::Evening, at(23, 0))
            .await
            .unwrap();
        assert!(evening.is_empty());
        assert_eq!(uow.active_users().await.unwrap(), vec![1, 2, 3]);
    }
}
