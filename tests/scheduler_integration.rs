//! Scheduler and event system working together

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cfmirror::events::{Event, EventError, EventKind, EventSystem, Listener};
use cfmirror::scheduler::{Task, WaitOutcome, Waiter};

fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

#[tokio::test(start_paused = true)]
async fn test_publisher_task_drives_event_task() {
    let events = Arc::new(EventSystem::new());
    let received = counter();

    let sink = received.clone();
    let consumer = Task::builder("consumer")
        .waiter(Waiter::for_event(events.clone(), EventKind::ContestListRefresh))
        .build(move |arg| {
            let sink = sink.clone();
            async move {
                if let Some(WaitOutcome::Event(Event::ContestListRefresh { .. })) = arg {
                    sink.fetch_add(1, Ordering::SeqCst);
                }
                Ok(())
            }
        });

    let publisher_events = events.clone();
    let publisher = Task::builder("publisher")
        .waiter(Waiter::fixed_delay(Duration::from_secs(10)))
        .build(move |_| {
            let events = publisher_events.clone();
            async move {
                events.dispatch(Event::contest_list_refresh(Vec::new()));
                Ok(())
            }
        });

    consumer.start().unwrap();
    publisher.start().unwrap();
    tokio::time::sleep(Duration::from_secs(25)).await;

    publisher.stop().await;
    consumer.stop().await;
    assert_eq!(received.load(Ordering::SeqCst), 3);
    assert_eq!(events.pending_waiters(EventKind::ContestListRefresh), 0);
}

#[tokio::test]
async fn test_stop_cancels_blocked_event_wait() {
    let events = Arc::new(EventSystem::new());
    let runs = counter();
    let body_runs = runs.clone();

    let task = Task::builder("blocked")
        .waiter(Waiter::for_event(events.clone(), EventKind::RatingChangesUpdate))
        .build(move |_| {
            let body_runs = body_runs.clone();
            async move {
                body_runs.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

    task.start().unwrap();
    assert_eq!(events.pending_waiters(EventKind::RatingChangesUpdate), 1);

    task.stop().await;
    assert!(!task.running());
    assert_eq!(events.pending_waiters(EventKind::RatingChangesUpdate), 0);
    assert_eq!(runs.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_timeout_leaves_no_waiter() {
    let events = EventSystem::new();

    let err = events
        .wait_for(EventKind::ContestListRefresh, Some(Duration::from_millis(100)))
        .await
        .unwrap_err();

    assert!(matches!(err, EventError::Timeout { .. }));
    assert!(err.is_recoverable());
    assert_eq!(events.pending_waiters(EventKind::ContestListRefresh), 0);
}

#[tokio::test(start_paused = true)]
async fn test_locked_listener_runs_one_at_a_time() {
    let events = EventSystem::new();
    let active = counter();
    let max_active = counter();
    let finished = counter();

    let (a, m, f) = (active.clone(), max_active.clone(), finished.clone());
    let listener = Listener::new("serial", EventKind::ContestListRefresh, move |_| {
        let (active, max_active, finished) = (a.clone(), m.clone(), f.clone());
        async move {
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            max_active.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            active.fetch_sub(1, Ordering::SeqCst);
            finished.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    })
    .with_lock();
    events.add_listener(listener.clone());

    for _ in 0..3 {
        events.dispatch(Event::contest_list_refresh(Vec::new()));
    }
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(finished.load(Ordering::SeqCst), 3);
    assert_eq!(max_active.load(Ordering::SeqCst), 1);

    events.remove_listener(&listener).unwrap();
    assert_eq!(events.listener_count(EventKind::ContestListRefresh), 0);
    assert!(matches!(
        events.remove_listener(&listener),
        Err(EventError::ListenerNotRegistered { .. })
    ));
}

#[tokio::test]
async fn test_manual_trigger_reports_errors_to_handler() {
    let handled = counter();
    let handler_calls = handled.clone();

    let task = Task::builder("manual")
        .waiter(Waiter::fixed_delay(Duration::from_secs(3600)))
        .exception_handler(move |err| {
            let handler_calls = handler_calls.clone();
            async move {
                assert!(err.to_string().contains("boom"));
                handler_calls.fetch_add(1, Ordering::SeqCst);
            }
        })
        .build(|_| async { Err(anyhow::anyhow!("boom")) });

    task.manual_trigger(None).await;
    task.manual_trigger(None).await;

    assert_eq!(handled.load(Ordering::SeqCst), 2);
    assert!(!task.running());
}
