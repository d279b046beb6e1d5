#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::NaiveDate;
    use chrono_tz::Tz;
    use tokio_util::sync::CancellationToken;

    use tracker_core::{
        Command, Report, ReportPeriod, SweeperConfig, TrackerError, UnitOfWorkFactory,
    };
    use tracker_dispatcher::{AutoApprovalSweeper, SweepOutcome};
    use tracker_infrastructure::InMemoryReportStore;
    use tracker_testing_utils::{
        date, local, FaultyStore, ManualClock, RecordingSink, ReportBuilder, SaveFault,
    };

    const TZ: Tz = chrono_tz::Asia::Shanghai;

    fn day() -> NaiveDate {
        date(2024, 3, 4)
    }

    struct Setup {
        store: InMemoryReportStore,
        faulty: FaultyStore,
        sink: RecordingSink,
        clock: ManualClock,
        sweeper: Arc<AutoApprovalSweeper>,
    }

    fn setup_with_sink(sink: RecordingSink) -> Setup {
        let store = InMemoryReportStore::with_users([1, 2, 3]);
        let faulty = FaultyStore::new(Arc::new(store.clone()));
        let clock = ManualClock::new(local(TZ, day(), 10, 5));
        let sweeper = Arc::new(AutoApprovalSweeper::new(
            SweeperConfig::default(),
            TZ,
            Arc::new(faulty.clone()),
            Arc::new(sink.clone()),
            Arc::new(clock.clone()),
        ));
        Setup {
            store,
            faulty,
            sink,
            clock,
            sweeper,
        }
    }

    fn setup() -> Setup {
        setup_with_sink(RecordingSink::new())
    }

    async fn seed(store: &InMemoryReportStore, report: Report) -> Report {
        let mut uow = store.begin().await.unwrap();
        uow.add_report(report);
        uow.save().await.unwrap().remove(0)
    }

    async fn seed_morning(store: &InMemoryReportStore, user_id: i64, h: u32, m: u32) -> Report {
        seed(store, ReportBuilder::new(user_id, day(), local(TZ, day(), h, m)).build()).await
    }

    #[tokio::test]
    async fn test_sweep_approves_report_after_grace_window() {
        let s = setup();
        let cancel = CancellationToken::new();
        let report = seed_morning(&s.store, 1, 9, 0).await;

        let outcome = s
            .sweeper
            .sweep(local(TZ, day(), 10, 5), &cancel)
            .await
            .unwrap();
        assert_eq!(outcome.period, Some(ReportPeriod::Morning));
        assert_eq!(outcome.approved, vec![report.id]);
        assert_eq!(outcome.follow_ups, 1);

        let stored = s.store.report(report.id).await.unwrap();
        assert!(stored.morning.approved_by_system);
        assert!(!stored.morning.approved);
        assert_eq!(stored.version, report.version + 1);
        assert_eq!(
            s.sink.commands(),
            vec![Command::NotifyAutoApproved {
                report_id: report.id,
                user_id: 1,
                period: ReportPeriod::Morning,
            }]
        );

        // 第二次扫描没有任何变化
        let outcome = s
            .sweeper
            .sweep(local(TZ, day(), 10, 35), &cancel)
            .await
            .unwrap();
        assert!(outcome.approved.is_empty());
        assert_eq!(s.sink.commands().len(), 1);
        assert_eq!(s.store.report(report.id).await.unwrap().version, stored.version);
    }

    #[tokio::test]
    async fn test_sweep_skips_recent_and_already_approved_reports() {
        let s = setup();
        let cancel = CancellationToken::new();
        let due = seed_morning(&s.store, 1, 9, 0).await;
        let recent = seed_morning(&s.store, 2, 9, 30).await;
        let approved = seed(
            &s.store,
            ReportBuilder::new(3, day(), local(TZ, day(), 8, 50))
                .approved(ReportPeriod::Morning)
                .build(),
        )
        .await;

        let outcome = s
            .sweeper
            .sweep(local(TZ, day(), 10, 5), &cancel)
            .await
            .unwrap();
        assert_eq!(outcome.approved, vec![due.id]);

        let recent = s.store.report(recent.id).await.unwrap();
        assert!(!recent.is_approved(ReportPeriod::Morning));
        let approved = s.store.report(approved.id).await.unwrap();
        assert!(!approved.morning.approved_by_system);
    }

    #[tokio::test]
    async fn test_sweep_outside_working_hours_is_noop() {
        let s = setup();
        let cancel = CancellationToken::new();
        let report = seed_morning(&s.store, 1, 9, 0).await;

        for (h, m) in [(7, 30), (23, 0), (23, 30)] {
            let outcome = s
                .sweeper
                .sweep(local(TZ, day(), h, m), &cancel)
                .await
                .unwrap();
            assert_eq!(outcome, SweepOutcome::default());
        }
        assert!(!s
            .store
            .report(report.id)
            .await
            .unwrap()
            .is_approved(ReportPeriod::Morning));
        assert_eq!(s.faulty.saves(), 0);
    }

    #[tokio::test]
    async fn test_evening_sweep_only_touches_evening_half() {
        let s = setup();
        let cancel = CancellationToken::new();
        let report = seed(
            &s.store,
            ReportBuilder::new(1, day(), local(TZ, day(), 9, 0))
                .with_evening(
                    "evening",
                    local(TZ, day(), 18, 0),
                    local(TZ, day(), 19, 0),
                )
                .build(),
        )
        .await;

        let outcome = s
            .sweeper
            .sweep(local(TZ, day(), 19, 5), &cancel)
            .await
            .unwrap();
        assert_eq!(outcome.period, Some(ReportPeriod::Evening));
        assert_eq!(outcome.approved, vec![report.id]);

        let stored = s.store.report(report.id).await.unwrap();
        assert!(stored.evening.as_ref().unwrap().approved_by_system);
        assert!(!stored.morning.approved_by_system);
    }

    #[tokio::test]
    async fn test_enqueue_failure_keeps_approval() {
        let s = setup_with_sink(RecordingSink::closed());
        let cancel = CancellationToken::new();
        let report = seed_morning(&s.store, 1, 9, 0).await;

        let outcome = s
            .sweeper
            .sweep(local(TZ, day(), 10, 5), &cancel)
            .await
            .unwrap();
        assert_eq!(outcome.approved, vec![report.id]);
        assert_eq!(outcome.follow_ups, 0);
        assert!(s
            .store
            .report(report.id)
            .await
            .unwrap()
            .morning
            .approved_by_system);
    }

    #[tokio::test]
    async fn test_persistence_failure_flips_nothing() {
        let s = setup();
        let cancel = CancellationToken::new();
        let report = seed_morning(&s.store, 1, 9, 0).await;
        s.faulty.fail_next_save(SaveFault::Persistence);

        let result = s.sweeper.sweep(local(TZ, day(), 10, 5), &cancel).await;
        assert!(matches!(result, Err(TrackerError::Persistence(_))));

        let stored = s.store.report(report.id).await.unwrap();
        assert!(!stored.morning.approved_by_system);
        assert_eq!(stored.version, report.version);
        assert!(s.sink.commands().is_empty());
    }

    #[tokio::test]
    async fn test_conflict_reruns_sweep_once() {
        let s = setup();
        let cancel = CancellationToken::new();
        let report = seed_morning(&s.store, 1, 9, 0).await;
        s.faulty.fail_next_save(SaveFault::Conflict);

        let outcome = s
            .sweeper
            .sweep(local(TZ, day(), 10, 5), &cancel)
            .await
            .unwrap();
        assert_eq!(outcome.approved, vec![report.id]);
        assert_eq!(s.faulty.saves(), 2);
    }

    #[tokio::test]
    async fn test_manual_approval_saved_first_wins() {
        let s = setup();
        let cancel = CancellationToken::new();
        let report = seed_morning(&s.store, 1, 9, 0).await;

        let store = s.store.clone();
        let id = report.id;
        s.faulty.before_next_save(async move {
            let mut uow = store.begin().await.unwrap();
            let mut report = uow.get_report(id).await.unwrap().unwrap();
            report.morning.approve();
            uow.update_report(report);
            uow.save().await.unwrap();
        });

        let outcome = s
            .sweeper
            .sweep(local(TZ, day(), 10, 5), &cancel)
            .await
            .unwrap();
        assert!(outcome.approved.is_empty());
        assert!(s.sink.commands().is_empty());

        let stored = s.store.report(id).await.unwrap();
        assert!(stored.is_approved(ReportPeriod::Morning));
        assert!(stored.morning.approved);
        assert!(!stored.morning.approved_by_system);
    }

    #[tokio::test(start_paused = true)]
    async fn test_started_sweeper_runs_on_boundaries() {
        let s = setup();
        let report = seed_morning(&s.store, 1, 9, 0).await;
        let root = CancellationToken::new();
        let task = s.sweeper.clone().start(&root);
        tokio::time::sleep(Duration::from_secs(1)).await;

        // 10:05 启动，下一个边界是 10:30
        s.clock.set(local(TZ, day(), 10, 30));
        tokio::time::sleep(Duration::from_secs(30 * 60)).await;

        assert_eq!(s.sink.commands().len(), 1);
        assert!(s
            .store
            .report(report.id)
            .await
            .unwrap()
            .morning
            .approved_by_system);

        root.cancel();
        task.stop(Duration::from_secs(1)).await;
    }
}
