use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveTime;
use models::{ScheduleRow, TaskState};
use scheduler::{Scheduler, SchedulerError};
use storage::MemStorage;
use uuid::Uuid;

const STARTUP: i16 = 4;
const INTERVAL: i16 = 2;
const MANUAL: i16 = 3;

fn harness() -> (Arc<MemStorage>, Scheduler) {
    let mem = Arc::new(MemStorage::new());
    let scheduler = Scheduler::new(mem.clone());
    (mem, scheduler)
}

fn row(
    schedule_type: i16,
    process: &str,
    interval_seconds: Option<u32>,
    exclusive: bool,
) -> ScheduleRow {
    ScheduleRow {
        id: Uuid::new_v4(),
        schedule_name: format!("{process}-schedule"),
        process_name: process.to_string(),
        schedule_type,
        schedule_time: None,
        schedule_day: None,
        schedule_interval: interval_seconds
            .and_then(|s| NaiveTime::from_num_seconds_from_midnight_opt(s, 0)),
        repeat: None,
        exclusive,
    }
}

/// stop() is retryable by design; tests use this to wait out task exits.
async fn stop_with_retries(scheduler: &Scheduler) {
    for _ in 0..50 {
        match scheduler.stop().await {
            Ok(()) => return,
            Err(SchedulerError::TasksStillRunning) => {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            Err(err) => panic!("stop failed: {err}"),
        }
    }
    panic!("scheduler did not stop");
}

#[tokio::test]
async fn startup_task_completes_without_a_task_row() {
    let (mem, scheduler) = harness();
    mem.add_process("report", &["true"]).await;
    let schedule = row(STARTUP, "report", None, false);
    let id = schedule.id;
    mem.add_schedule(schedule).await;

    scheduler.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(1_500)).await;

    assert!(mem.tasks().await.is_empty());
    assert_eq!(scheduler.active_task_count(), 0);
    // A one-shot schedule's execution goes away entirely after completion.
    assert!(scheduler.execution_status(id).await.is_none());
}

#[tokio::test]
async fn starting_twice_is_an_error() {
    let (_, scheduler) = harness();
    scheduler.start().await.unwrap();
    assert!(matches!(
        scheduler.start().await,
        Err(SchedulerError::AlreadyStarted)
    ));
}

#[tokio::test]
async fn interval_schedule_persists_completed_task_rows() {
    let (mem, scheduler) = harness();
    mem.add_process("tick", &["true"]).await;
    mem.add_schedule(row(INTERVAL, "tick", Some(1), false))
        .await;

    scheduler.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(2_500)).await;
    stop_with_retries(&scheduler).await;

    let tasks = mem.tasks().await;
    assert!(!tasks.is_empty(), "no task fired within the window");

    let done = tasks
        .iter()
        .find(|t| t.state == TaskState::Complete)
        .expect("no task completed within the window");
    assert_eq!(done.process_name, "tick");
    assert_eq!(done.exit_code, Some(0));
    assert!(done.end_time.is_some());
    assert!(done.pid > 0);
}

#[tokio::test]
async fn exclusive_schedule_runs_at_most_one_task() {
    let (mem, scheduler) = harness();
    mem.add_process("slow", &["sleep", "2"]).await;
    let schedule = row(INTERVAL, "slow", Some(1), true);
    let id = schedule.id;
    mem.add_schedule(schedule).await;

    scheduler.start().await.unwrap();

    // The schedule becomes due every second while its task runs for two;
    // sample the execution over a few periods.
    for _ in 0..12 {
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(scheduler.active_task_count() <= 1);
        if let Some(status) = scheduler.execution_status(id).await {
            assert!(status.running_tasks.len() <= 1);
        }
    }
    stop_with_retries(&scheduler).await;
}

#[tokio::test]
async fn stop_reports_running_tasks_then_succeeds_on_retry() {
    let (mem, scheduler) = harness();
    mem.add_process("stubborn", &["sh", "-c", "trap '' TERM; sleep 2"])
        .await;
    mem.add_schedule(row(STARTUP, "stubborn", None, false)).await;

    scheduler.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(scheduler.active_task_count(), 1);

    // The task shrugs off SIGTERM, so the first stop() times out and the
    // scheduler stays paused.
    let err = scheduler.stop().await.unwrap_err();
    assert!(matches!(err, SchedulerError::TasksStillRunning), "{err}");
    assert!(scheduler.is_paused());
    assert!(scheduler.is_running().await);

    // Once the task runs out on its own, a retry succeeds.
    stop_with_retries(&scheduler).await;
    assert_eq!(scheduler.active_task_count(), 0);
    assert!(!scheduler.is_running().await);
}

#[tokio::test]
async fn spawn_failure_leaves_no_task_row_and_no_active_count() {
    let (mem, scheduler) = harness();
    mem.add_process("ghost", &["/nonexistent-binary-for-test"])
        .await;
    mem.add_schedule(row(STARTUP, "ghost", None, false)).await;

    scheduler.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(scheduler.active_task_count(), 0);
    assert!(mem.tasks().await.is_empty());
}

#[tokio::test]
async fn manual_schedules_never_fire_on_their_own() {
    let (mem, scheduler) = harness();
    mem.add_process("manual", &["true"]).await;
    let schedule = row(MANUAL, "manual", None, false);
    let id = schedule.id;
    mem.add_schedule(schedule).await;

    scheduler.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(800)).await;

    let status = scheduler.execution_status(id).await.unwrap();
    assert_eq!(status.next_start_time, None);
    assert!(status.running_tasks.is_empty());
    assert!(mem.tasks().await.is_empty());
}
