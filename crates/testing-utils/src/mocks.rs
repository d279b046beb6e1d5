//! 协作接口的测试替身
//!
//! 全部基于 `Arc<Mutex<..>>` 的内存实现，克隆后共享记录，便于在被测对象持有一份、
//! 测试代码持有另一份时断言调用情况。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use tracker_core::{
    Command, CommandSink, ExternalError, Notifier, Report, ReportAnalyzer, ReportId, ReportPeriod,
    ReportScore, TrackerError, TrackerResult, UnitOfWork, UnitOfWorkFactory, UserId,
};

/// 通知事件记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationEvent {
    ReportDue(ReportPeriod),
    DeadlineApproaching(ReportPeriod),
    DeadlineMissed(ReportPeriod),
    MissingReports {
        date: NaiveDate,
        period: ReportPeriod,
        users: Vec<UserId>,
    },
    ReportScored {
        user_id: UserId,
        report_id: ReportId,
        period: ReportPeriod,
        score: u8,
    },
    ScoringUnavailable {
        user_id: UserId,
        report_id: ReportId,
        period: ReportPeriod,
        message: String,
    },
    ReportApproved {
        user_id: UserId,
        report_id: ReportId,
        period: ReportPeriod,
    },
    ReportRejected {
        user_id: UserId,
        report_id: ReportId,
        period: ReportPeriod,
        reason: String,
    },
    AutoApproved {
        user_id: UserId,
        report_id: ReportId,
        period: ReportPeriod,
    },
}

/// 记录所有通知的 Notifier；`failing()` 版本照常记录但返回错误
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    events: Arc<Mutex<Vec<NotificationEvent>>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            events: Arc::default(),
            fail: true,
        }
    }

    pub fn events(&self) -> Vec<NotificationEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }

    fn record(&self, event: NotificationEvent) -> TrackerResult<()> {
        self.events.lock().unwrap().push(event);
        if self.fail {
            Err(TrackerError::Internal("notifier unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_report_due(&self, period: ReportPeriod) -> TrackerResult<()> {
        self.record(NotificationEvent::ReportDue(period))
    }

    async fn notify_deadline_approaching(&self, period: ReportPeriod) -> TrackerResult<()> {
        self.record(NotificationEvent::DeadlineApproaching(period))
    }

    async fn notify_deadline_missed(&self, period: ReportPeriod) -> TrackerResult<()> {
        self.record(NotificationEvent::DeadlineMissed(period))
    }

    async fn notify_missing_reports(
        &self,
        date: NaiveDate,
        period: ReportPeriod,
        users: &[UserId],
    ) -> TrackerResult<()> {
        self.record(NotificationEvent::MissingReports {
            date,
            period,
            users: users.to_vec(),
        })
    }

    async fn notify_report_scored(
        &self,
        user_id: UserId,
        report_id: ReportId,
        period: ReportPeriod,
        score: &ReportScore,
    ) -> TrackerResult<()> {
        self.record(NotificationEvent::ReportScored {
            user_id,
            report_id,
            period,
            score: score.score,
        })
    }

    async fn notify_scoring_unavailable(
        &self,
        user_id: UserId,
        report_id: ReportId,
        period: ReportPeriod,
        message: &str,
    ) -> TrackerResult<()> {
        self.record(NotificationEvent::ScoringUnavailable {
            user_id,
            report_id,
            period,
            message: message.to_string(),
        })
    }

    async fn notify_report_approved(
        &self,
        user_id: UserId,
        report_id: ReportId,
        period: ReportPeriod,
    ) -> TrackerResult<()> {
        self.record(NotificationEvent::ReportApproved {
            user_id,
            report_id,
            period,
        })
    }

    async fn notify_report_rejected(
        &self,
        user_id: UserId,
        report_id: ReportId,
        period: ReportPeriod,
        reason: &str,
    ) -> TrackerResult<()> {
        self.record(NotificationEvent::ReportRejected {
            user_id,
            report_id,
            period,
            reason: reason.to_string(),
        })
    }

    async fn notify_auto_approved(
        &self,
        user_id: UserId,
        report_id: ReportId,
        period: ReportPeriod,
    ) -> TrackerResult<()> {
        self.record(NotificationEvent::AutoApproved {
            user_id,
            report_id,
            period,
        })
    }
}

/// 按脚本依次返回结果的评分服务，脚本用完后返回 `fallback`
#[derive(Debug, Clone)]
pub struct ScriptedAnalyzer {
    script: Arc<Mutex<VecDeque<Result<ReportScore, ExternalError>>>>,
    fallback: Result<ReportScore, ExternalError>,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedAnalyzer {
    pub fn new(script: Vec<Result<ReportScore, ExternalError>>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into())),
            fallback: Ok(Self::score(5)),
            delay: None,
            calls: Arc::default(),
        }
    }

    pub fn always(result: Result<ReportScore, ExternalError>) -> Self {
        let mut analyzer = Self::new(Vec::new());
        analyzer.fallback = result;
        analyzer
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn score(score: u8) -> ReportScore {
        ReportScore {
            score,
            feedback: format!("score {score}"),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReportAnalyzer for ScriptedAnalyzer {
    async fn analyze(
        &self,
        _period: ReportPeriod,
        _text: &str,
    ) -> Result<ReportScore, ExternalError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }
}

/// 记录提交命令的 CommandSink；`closed()` 版本总是返回 `QueueClosed`
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    commands: Arc<Mutex<Vec<Command>>>,
    closed: bool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn closed() -> Self {
        Self {
            commands: Arc::default(),
            closed: true,
        }
    }

    pub fn commands(&self) -> Vec<Command> {
        self.commands.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandSink for RecordingSink {
    async fn submit(&self, command: Command, cancel: &CancellationToken) -> TrackerResult<()> {
        if cancel.is_cancelled() {
            return Err(TrackerError::Cancelled);
        }
        if self.closed {
            return Err(TrackerError::QueueClosed);
        }
        self.commands.lock().unwrap().push(command);
        Ok(())
    }

    fn try_submit(&self, command: Command) -> TrackerResult<()> {
        if self.closed {
            return Err(TrackerError::QueueClosed);
        }
        self.commands.lock().unwrap().push(command);
        Ok(())
    }
}

/// 注入到 `save` 的故障
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveFault {
    Persistence,
    Conflict,
}

type SaveHook = BoxFuture<'static, ()>;

/// 包装真实存储，可在下一次 `save` 前插入任意异步动作或注入故障
#[derive(Clone)]
pub struct FaultyStore {
    inner: Arc<dyn UnitOfWorkFactory>,
    faults: Arc<Mutex<VecDeque<SaveFault>>>,
    hook: Arc<Mutex<Option<SaveHook>>>,
    saves: Arc<AtomicUsize>,
}

impl FaultyStore {
    pub fn new(inner: Arc<dyn UnitOfWorkFactory>) -> Self {
        Self {
            inner,
            faults: Arc::default(),
            hook: Arc::default(),
            saves: Arc::default(),
        }
    }

    pub fn fail_next_save(&self, fault: SaveFault) {
        self.faults.lock().unwrap().push_back(fault);
    }

    /// 下一次 `save` 执行前先运行 `hook`，用于构造并发交错
    pub fn before_next_save(&self, hook: impl std::future::Future<Output = ()> + Send + 'static) {
        *self.hook.lock().unwrap() = Some(Box::pin(hook));
    }

    /// 调用 `save` 的次数（含失败）
    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UnitOfWorkFactory for FaultyStore {
    async fn begin(&self) -> TrackerResult<Box<dyn UnitOfWork>> {
        Ok(Box::new(FaultyUnitOfWork {
            inner: self.inner.begin().await?,
            store: self.clone(),
        }))
    }
}

struct FaultyUnitOfWork {
    inner: Box<dyn UnitOfWork>,
    store: FaultyStore,
}

#[async_trait]
impl UnitOfWork for FaultyUnitOfWork {
    async fn get_report(&mut self, id: ReportId) -> TrackerResult<Option<Report>> {
        self.inner.get_report(id).await
    }

    async fn find_report(
        &mut self,
        user_id: UserId,
        date: NaiveDate,
    ) -> TrackerResult<Option<Report>> {
        self.inner.find_report(user_id, date).await
    }

    async fn pending_approval(
        &mut self,
        date: NaiveDate,
        period: ReportPeriod,
        cutoff: DateTime<Utc>,
    ) -> TrackerResult<Vec<Report>> {
        self.inner.pending_approval(date, period, cutoff).await
    }

    async fn active_users(&mut self) -> TrackerResult<Vec<UserId>> {
        self.inner.active_users().await
    }

    fn add_report(&mut self, report: Report) {
        self.inner.add_report(report);
    }

    fn update_report(&mut self, report: Report) {
        self.inner.update_report(report);
    }

    async fn save(&mut self) -> TrackerResult<Vec<Report>> {
        self.store.saves.fetch_add(1, Ordering::SeqCst);

        let hook = self.store.hook.lock().unwrap().take();
        if let Some(hook) = hook {
            hook.await;
        }

        let fault = self.store.faults.lock().unwrap().pop_front();
        match fault {
            Some(SaveFault::Persistence) => {
                Err(TrackerError::persistence("injected persistence failure"))
            }
            Some(SaveFault::Conflict) => Err(TrackerError::ConcurrencyConflict { report_id: 0 }),
            None => self.inner.save().await,
        }
    }
}
