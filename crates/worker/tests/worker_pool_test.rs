use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use tracker_core::{
    Command, CommandKind, CommandSink, ReportPeriod, ResilienceConfig, ScheduleConfig,
    TrackerError, TrackerResult,
};
use tracker_infrastructure::{CommandQueue, InMemoryReportStore, ResiliencePipeline};
use tracker_testing_utils::{
    date, local, ManualClock, RecordingNotifier, ScriptedAnalyzer, TestEnv,
};
use tracker_worker::{
    build_registry, CommandHandler, HandlerContext, HandlerDeps, HandlerRegistry, WorkerPool,
};

/// 记录收到的 report_id；遇到指定ID时 panic 或返回错误
#[derive(Default)]
struct RecordingHandler {
    seen: Arc<Mutex<Vec<i64>>>,
    panic_on: Option<i64>,
    fail_on: Option<i64>,
    delay: Option<Duration>,
}

#[async_trait]
impl CommandHandler for RecordingHandler {
    fn kind(&self) -> CommandKind {
        CommandKind::NotifyAutoApproved
    }

    async fn handle(&self, command: Command, _ctx: &HandlerContext) -> TrackerResult<()> {
        let id = command.report_id().unwrap_or_default();
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.panic_on == Some(id) {
            panic!("handler exploded on {id}");
        }
        self.seen.lock().unwrap().push(id);
        if self.fail_on == Some(id) {
            return Err(TrackerError::Internal("boom".into()));
        }
        Ok(())
    }
}

fn notify(report_id: i64) -> Command {
    Command::NotifyAutoApproved {
        report_id,
        user_id: 1,
        period: ReportPeriod::Morning,
    }
}

fn pool_with(handler: RecordingHandler, capacity: usize, workers: usize) -> WorkerPool {
    let mut registry = HandlerRegistry::new();
    registry.register(Arc::new(handler));
    WorkerPool::new(Arc::new(CommandQueue::new(capacity)), Arc::new(registry), workers)
}

#[tokio::test]
async fn test_each_command_dispatched_exactly_once() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let pool = pool_with(
        RecordingHandler {
            seen: seen.clone(),
            ..Default::default()
        },
        8,
        4,
    );
    pool.start().await;

    let cancel = CancellationToken::new();
    for id in 0..50 {
        pool.queue().submit(notify(id), &cancel).await.unwrap();
    }

    assert!(TestEnv::wait_for(|| seen.lock().unwrap().len() == 50, Duration::from_secs(5)).await);
    let mut ids = seen.lock().unwrap().clone();
    ids.sort_unstable();
    assert_eq!(ids, (0..50).collect::<Vec<_>>());

    let stats = pool.stats();
    assert_eq!(stats.submitted, 50);
    assert_eq!(stats.dispatched, 50);
    assert_eq!(stats.succeeded, 50);
    pool.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test(start_paused = true)]
async fn test_full_queue_blocks_third_submitter_without_dropping() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let pool = Arc::new(pool_with(
        RecordingHandler {
            seen: seen.clone(),
            ..Default::default()
        },
        2,
        1,
    ));

    let submitters: Vec<_> = (0..3)
        .map(|id| {
            let pool = pool.clone();
            tokio::spawn(async move { pool.queue().submit(notify(id), &CancellationToken::new()).await })
        })
        .collect();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(pool.queue().len(), 2);
    assert_eq!(submitters.iter().filter(|h| h.is_finished()).count(), 2);

    pool.start().await;
    for handle in submitters {
        handle.await.unwrap().unwrap();
    }

    assert!(TestEnv::wait_for(|| seen.lock().unwrap().len() == 3, Duration::from_secs(1)).await);
    let mut ids = seen.lock().unwrap().clone();
    ids.sort_unstable();
    assert_eq!(ids, vec![0, 1, 2]);
    pool.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_panic_and_error_isolated_to_single_command() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let pool = pool_with(
        RecordingHandler {
            seen: seen.clone(),
            panic_on: Some(3),
            fail_on: Some(5),
            ..Default::default()
        },
        16,
        2,
    );
    pool.start().await;

    let cancel = CancellationToken::new();
    for id in 0..10 {
        pool.queue().submit(notify(id), &cancel).await.unwrap();
    }

    assert!(TestEnv::wait_for(|| pool.stats().dispatched == 10, Duration::from_secs(5)).await);
    assert!(TestEnv::wait_for(|| seen.lock().unwrap().len() == 9, Duration::from_secs(5)).await);

    let stats = pool.stats();
    assert_eq!(stats.panicked, 1);
    assert_eq!(stats.failed, 2);
    assert_eq!(stats.succeeded, 8);

    // Worker 仍在运行
    pool.queue().submit(notify(100), &cancel).await.unwrap();
    assert!(TestEnv::wait_for(|| seen.lock().unwrap().contains(&100), Duration::from_secs(5)).await);
    pool.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_unregistered_kind_counted_as_failure() {
    let pool = pool_with(RecordingHandler::default(), 4, 1);
    pool.start().await;

    let command = Command::RejectReport {
        report_id: 1,
        period: ReportPeriod::Morning,
        admin_id: 2,
        reason: "x".into(),
    };
    pool.queue().submit(command, &CancellationToken::new()).await.unwrap();

    assert!(TestEnv::wait_for(|| pool.stats().failed == 1, Duration::from_secs(5)).await);
    assert_eq!(pool.stats().succeeded, 0);
    pool.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_finishes_current_and_discards_buffered() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let pool = pool_with(
        RecordingHandler {
            seen: seen.clone(),
            delay: Some(Duration::from_millis(100)),
            ..Default::default()
        },
        8,
        1,
    );
    pool.start().await;

    let cancel = CancellationToken::new();
    for id in 0..4 {
        pool.queue().submit(notify(id), &cancel).await.unwrap();
    }
    assert!(TestEnv::wait_for(|| pool.stats().dispatched == 1, Duration::from_secs(1)).await);

    pool.shutdown(Duration::from_secs(5)).await;

    assert_eq!(*seen.lock().unwrap(), vec![0]);
    let stats = pool.stats();
    assert_eq!(stats.discarded, 3);
    assert!(matches!(
        pool.queue().submit(notify(9), &cancel).await,
        Err(TrackerError::QueueClosed)
    ));
}

fn submit(user_id: i64) -> Command {
    Command::SubmitReport {
        user_id,
        date: date(2024, 3, 4),
        period: ReportPeriod::Morning,
        text: format!("plan of {user_id}"),
    }
}

#[tokio::test]
async fn test_follow_up_commands_do_not_stall_full_queue() {
    // 单个 Worker、容量为 1：处理器产生的评分命令不能在自己的队列上等待
    let queue = Arc::new(CommandQueue::new(1));
    let store = Arc::new(InMemoryReportStore::with_users([1, 2, 3]));
    let notifier = RecordingNotifier::new();
    let schedule = ScheduleConfig::default();
    let tz = schedule.tz().unwrap();
    let deps = HandlerDeps {
        store: store.clone(),
        notifier: Arc::new(notifier.clone()),
        sink: queue.clone() as Arc<dyn CommandSink>,
        analyzer: Arc::new(ScriptedAnalyzer::always(Ok(ScriptedAnalyzer::score(8)))),
        pipeline: Arc::new(ResiliencePipeline::from_config(
            "analyzer",
            &ResilienceConfig::default(),
        )),
        clock: Arc::new(ManualClock::new(local(tz, date(2024, 3, 4), 9, 0))),
        schedule: Arc::new(schedule),
        tz,
    };
    let pool = WorkerPool::new(queue.clone(), Arc::new(build_registry(deps)), 1);

    let cancel = CancellationToken::new();
    queue.submit(submit(1), &cancel).await.unwrap();
    pool.start().await;

    let producer = {
        let queue = queue.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            queue.submit(submit(2), &cancel).await?;
            queue.submit(submit(3), &cancel).await
        })
    };

    // 三条提交加三条评分
    assert!(
        TestEnv::wait_for(|| pool.stats().succeeded == 6, Duration::from_secs(5)).await,
        "worker pool stopped making progress: {:?}",
        pool.stats()
    );
    producer.await.unwrap().unwrap();

    let reports = store.reports().await;
    assert_eq!(reports.len(), 3);
    assert!(reports.iter().all(|r| r.morning.score.is_some()));
    assert_eq!(pool.stats().failed, 0);
    pool.shutdown(Duration::from_secs(1)).await;
}
