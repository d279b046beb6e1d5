use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use tracker_core::{
    AppConfig, Clock, Command, CommandSink, Notifier, ReportAnalyzer, SystemClock, TrackerResult,
};
use tracker_dispatcher::{AutoApprovalSweeper, BackgroundTask, DeadlineScheduler};
use tracker_infrastructure::{
    CircuitState, CommandQueue, HttpReportAnalyzer, InMemoryReportStore, LoggingNotifier,
    ResiliencePipeline, WeekendCalendar,
};
use tracker_worker::{build_registry, HandlerDeps, WorkerPool, WorkerPoolStats};

const PRODUCER_STOP_TIMEOUT: Duration = Duration::from_secs(5);
const WORKER_STOP_TIMEOUT: Duration = Duration::from_secs(20);

/// 应用依赖的外部协作对象
pub struct Collaborators {
    pub store: Arc<InMemoryReportStore>,
    pub notifier: Arc<dyn Notifier>,
    pub analyzer: Arc<dyn ReportAnalyzer>,
    pub clock: Arc<dyn Clock>,
}

/// 主应用程序：组装队列、Worker池、截止时间调度器与自动审批扫描
pub struct Application {
    queue: Arc<CommandQueue>,
    pool: WorkerPool,
    pipeline: Arc<ResiliencePipeline>,
    store: Arc<InMemoryReportStore>,
    scheduler: Arc<DeadlineScheduler>,
    sweeper: Option<Arc<AutoApprovalSweeper>>,
}

impl Application {
    /// 使用生产环境协作对象创建应用
    pub fn new(config: AppConfig) -> Result<Self> {
        let analyzer =
            HttpReportAnalyzer::new(&config.analyzer).context("创建评分服务客户端失败")?;
        Self::with_collaborators(
            config,
            Collaborators {
                store: Arc::new(InMemoryReportStore::new()),
                notifier: Arc::new(LoggingNotifier),
                analyzer: Arc::new(analyzer),
                clock: Arc::new(SystemClock),
            },
        )
    }

    pub fn with_collaborators(config: AppConfig, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;
        let tz = config.schedule.tz()?;
        info!(
            "初始化应用程序，时区: {}，队列容量: {}，Worker数量: {}",
            tz, config.queue.capacity, config.queue.worker_count
        );

        let Collaborators {
            store,
            notifier,
            analyzer,
            clock,
        } = collaborators;

        let queue = Arc::new(CommandQueue::new(config.queue.capacity));
        let pipeline = Arc::new(
            ResiliencePipeline::from_config("report-analyzer", &config.resilience)
                .with_state_listener(Arc::new(|from: CircuitState, to: CircuitState| {
                    warn!("评分服务熔断器状态变化: {} -> {}", from.as_str(), to.as_str());
                })),
        );
        let sink: Arc<dyn CommandSink> = queue.clone();
        let calendar = Arc::new(WeekendCalendar::from_config(&config.schedule));

        let deps = HandlerDeps {
            store: store.clone(),
            notifier: notifier.clone(),
            sink: sink.clone(),
            analyzer,
            pipeline: pipeline.clone(),
            clock: clock.clone(),
            schedule: Arc::new(config.schedule.clone()),
            tz,
        };
        let registry = Arc::new(build_registry(deps));
        let pool = WorkerPool::new(queue.clone(), registry, config.queue.worker_count);

        let scheduler = Arc::new(DeadlineScheduler::new(
            &config.schedule,
            tz,
            notifier,
            sink.clone(),
            calendar,
            clock.clone(),
        ));

        let sweeper = if config.sweeper.enabled {
            Some(Arc::new(AutoApprovalSweeper::new(
                config.sweeper.clone(),
                tz,
                store.clone(),
                sink,
                clock,
            )))
        } else {
            info!("自动审批扫描已禁用");
            None
        };

        Ok(Self {
            queue,
            pool,
            pipeline,
            store,
            scheduler,
            sweeper,
        })
    }

    /// 外部生产者（例如聊天机器人适配层）提交命令的入口
    pub async fn submit(&self, command: Command, cancel: &CancellationToken) -> TrackerResult<()> {
        self.queue.submit(command, cancel).await
    }

    pub fn store(&self) -> &Arc<InMemoryReportStore> {
        &self.store
    }

    pub fn pipeline(&self) -> &Arc<ResiliencePipeline> {
        &self.pipeline
    }

    pub fn stats(&self) -> WorkerPoolStats {
        self.pool.stats()
    }

    /// 运行直到 `shutdown` 被取消
    ///
    /// 关闭顺序：先停止定时生产者，再关闭队列并等待 Worker 处理完手头的命令。
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        self.pool.start().await;

        let mut producers: Vec<BackgroundTask> = vec![self.scheduler.clone().start(&shutdown)];
        if let Some(sweeper) = &self.sweeper {
            producers.push(sweeper.clone().start(&shutdown));
        }
        info!("日报跟踪服务已启动");

        shutdown.cancelled().await;
        info!("开始关闭日报跟踪服务");

        for task in producers {
            task.stop(PRODUCER_STOP_TIMEOUT).await;
        }
        self.pool.shutdown(WORKER_STOP_TIMEOUT).await;

        let stats = self.pool.stats();
        info!(
            "日报跟踪服务已停止，处理命令 {} 条（成功 {}，失败 {}），丢弃 {} 条",
            stats.dispatched, stats.succeeded, stats.failed, stats.discarded
        );
        Ok(())
    }
}
