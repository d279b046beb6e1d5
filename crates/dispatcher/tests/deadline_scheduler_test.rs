#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::{NaiveDate, Weekday};
    use chrono_tz::Tz;
    use tokio_util::sync::CancellationToken;

    use tracker_core::{Command, ReportPeriod, ScheduleConfig};
    use tracker_dispatcher::{DeadlineEventKind, DeadlineScheduler};
    use tracker_infrastructure::WeekendCalendar;
    use tracker_testing_utils::{
        date, local, ManualClock, NotificationEvent, RecordingNotifier, RecordingSink,
    };

    const TZ: Tz = chrono_tz::Asia::Shanghai;

    struct Setup {
        notifier: RecordingNotifier,
        sink: RecordingSink,
        clock: ManualClock,
        scheduler: Arc<DeadlineScheduler>,
    }

    fn monday() -> NaiveDate {
        date(2024, 3, 4)
    }

    fn setup_with(notifier: RecordingNotifier, start_day: NaiveDate) -> Setup {
        let sink = RecordingSink::new();
        let clock = ManualClock::new(local(TZ, start_day, 8, 0));
        let calendar = WeekendCalendar::new([Weekday::Sat, Weekday::Sun], [date(2024, 3, 6)]);
        let scheduler = Arc::new(DeadlineScheduler::new(
            &ScheduleConfig::default(),
            TZ,
            Arc::new(notifier.clone()),
            Arc::new(sink.clone()),
            Arc::new(calendar),
            Arc::new(clock.clone()),
        ));
        Setup {
            notifier,
            sink,
            clock,
            scheduler,
        }
    }

    fn setup() -> Setup {
        setup_with(RecordingNotifier::new(), monday())
    }

    #[tokio::test]
    async fn test_events_fire_in_order_through_the_day() {
        let s = setup();
        let cancel = CancellationToken::new();
        let mut armed = s.scheduler.arm(local(TZ, monday(), 8, 0));
        assert_eq!(armed.len(), 6);
        assert_eq!(armed[0].at, local(TZ, monday(), 9, 0));
        assert_eq!(armed[0].entry.event.kind, DeadlineEventKind::Due);

        let fired = s
            .scheduler
            .tick(&mut armed, local(TZ, monday(), 9, 0), &cancel)
            .await;
        assert_eq!(fired, 1);
        assert_eq!(
            s.notifier.events(),
            vec![NotificationEvent::ReportDue(ReportPeriod::Morning)]
        );

        let fired = s
            .scheduler
            .tick(&mut armed, local(TZ, monday(), 10, 0), &cancel)
            .await;
        assert_eq!(fired, 2);
        assert_eq!(
            s.notifier.events()[1..],
            [
                NotificationEvent::DeadlineApproaching(ReportPeriod::Morning),
                NotificationEvent::DeadlineMissed(ReportPeriod::Morning),
            ]
        );
        assert_eq!(
            s.sink.commands(),
            vec![Command::ReportMissed {
                date: monday(),
                period: ReportPeriod::Morning,
            }]
        );

        // 同一时刻再次检查不会重复触发
        let fired = s
            .scheduler
            .tick(&mut armed, local(TZ, monday(), 10, 0), &cancel)
            .await;
        assert_eq!(fired, 0);
        assert_eq!(s.notifier.count(), 3);

        assert_eq!(armed[0].at, local(TZ, monday(), 18, 0));
        assert!(armed
            .iter()
            .filter(|a| a.entry.event.period == ReportPeriod::Morning)
            .all(|a| a.at > local(TZ, date(2024, 3, 5), 8, 0)));
    }

    #[tokio::test]
    async fn test_past_events_are_not_replayed_at_start() {
        let s = setup();
        let armed = s.scheduler.arm(local(TZ, monday(), 9, 30));

        assert_eq!(armed[0].at, local(TZ, monday(), 9, 45));
        assert_eq!(
            armed[0].entry.event.kind,
            DeadlineEventKind::DeadlineApproaching
        );
        let due = armed
            .iter()
            .find(|a| {
                a.entry.event.period == ReportPeriod::Morning
                    && a.entry.event.kind == DeadlineEventKind::Due
            })
            .unwrap();
        assert_eq!(due.at, local(TZ, date(2024, 3, 5), 9, 0));
    }

    #[tokio::test]
    async fn test_excluded_days_are_silent() {
        let saturday = date(2024, 3, 9);
        let s = setup_with(RecordingNotifier::new(), saturday);
        let cancel = CancellationToken::new();
        let mut armed = s.scheduler.arm(local(TZ, saturday, 8, 0));

        s.scheduler
            .tick(&mut armed, local(TZ, saturday, 19, 0), &cancel)
            .await;
        assert_eq!(s.notifier.count(), 0);
        assert!(s.sink.commands().is_empty());

        // 节假日同样跳过
        let holiday = date(2024, 3, 6);
        let mut armed = s.scheduler.arm(local(TZ, holiday, 8, 0));
        s.scheduler
            .tick(&mut armed, local(TZ, holiday, 10, 0), &cancel)
            .await;
        assert_eq!(s.notifier.count(), 0);
    }

    #[tokio::test]
    async fn test_notifier_failure_does_not_stop_firing() {
        let s = setup_with(RecordingNotifier::failing(), monday());
        let cancel = CancellationToken::new();
        let mut armed = s.scheduler.arm(local(TZ, monday(), 8, 0));

        s.scheduler
            .tick(&mut armed, local(TZ, monday(), 10, 0), &cancel)
            .await;
        assert_eq!(s.notifier.count(), 3);
        assert_eq!(s.sink.commands().len(), 1);

        s.scheduler
            .tick(&mut armed, local(TZ, monday(), 19, 0), &cancel)
            .await;
        assert_eq!(s.notifier.count(), 6);
        assert_eq!(
            s.sink.commands()[1],
            Command::ReportMissed {
                date: monday(),
                period: ReportPeriod::Evening,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_started_scheduler_fires_and_stops() {
        let s = setup();
        let root = CancellationToken::new();
        let task = s.scheduler.clone().start(&root);
        // 让调度循环先按 08:00 排定条目
        tokio::time::sleep(Duration::from_secs(1)).await;

        s.clock.set(local(TZ, monday(), 9, 0));
        tokio::time::sleep(Duration::from_secs(2 * 3600)).await;

        assert_eq!(
            s.notifier.events(),
            vec![NotificationEvent::ReportDue(ReportPeriod::Morning)]
        );

        assert!(!task.is_finished());
        task.stop(Duration::from_secs(1)).await;
    }
}
