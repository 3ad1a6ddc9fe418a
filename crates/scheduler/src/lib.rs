//! Task scheduler: launches and supervises subprocesses according to
//! persistently stored schedules.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use chrono::Local;
use models::{Schedule, ScheduleType, Task, TaskState};
use storage::Storage;
use tokio::sync::{Mutex, Notify};
use uuid::Uuid;

mod error;
pub mod fire_times;
mod process;

pub use error::SchedulerError;
pub use process::Child;

/// Sleep applied by the main loop when no schedule has an upcoming fire.
const MAX_SLEEP_SECONDS: i64 = 999_999;

/// How long `stop()` waits for terminated tasks to exit before reporting
/// that tasks are still running.
const STOP_GRACE: std::time::Duration = std::time::Duration::from_millis(100);

/// ExecutionStatus is a point-in-time snapshot of one schedule's execution.
/// Startup tasks surface only here; they have no `tasks` row.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionStatus {
    pub next_start_time: Option<i64>,
    pub running_tasks: Vec<Uuid>,
}

/// Scheduler launches tasks for due schedules and tracks them to completion.
///
/// Cloning yields another handle onto the same scheduler. One main-loop task
/// alternates a scan of due schedules with a cancelable sleep until the
/// earliest upcoming fire; task completions and `stop()` poke it awake.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

struct Inner {
    storage: Arc<dyn Storage>,
    state: Mutex<State>,
    wakeup: Notify,
    paused: AtomicBool,
    active_tasks: AtomicU32,
}

#[derive(Default)]
struct State {
    start_time: Option<i64>,
    schedules: HashMap<Uuid, Schedule>,
    processes: HashMap<String, Vec<String>>,
    executions: HashMap<Uuid, Execution>,
}

#[derive(Default)]
struct Execution {
    next_start_time: Option<i64>,
    task_processes: HashMap<Uuid, Child>,
}

fn now_epoch() -> i64 {
    chrono::Utc::now().timestamp()
}

impl Scheduler {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            inner: Arc::new(Inner {
                storage,
                state: Mutex::new(State::default()),
                wakeup: Notify::new(),
                paused: AtomicBool::new(false),
                active_tasks: AtomicU32::new(0),
            }),
        }
    }

    /// Loads scheduled processes and schedules from storage, seeds each
    /// schedule's first fire time, and spawns the main loop.
    pub async fn start(&self) -> Result<(), SchedulerError> {
        let mut state = self.inner.state.lock().await;
        if state.start_time.is_some() {
            return Err(SchedulerError::AlreadyStarted);
        }
        let start_time = now_epoch();
        state.start_time = Some(start_time);
        self.inner.paused.store(false, Ordering::SeqCst);

        state.schedules.clear();
        state.processes.clear();
        state.executions.clear();

        for process in self.inner.storage.read_scheduled_processes().await? {
            state.processes.insert(process.name, process.script);
        }
        for row in self.inner.storage.read_schedules().await? {
            let schedule = Schedule::try_from(row)?;
            state.executions.insert(
                schedule.id,
                Execution {
                    next_start_time: fire_times::first_fire(&Local, &schedule, start_time),
                    task_processes: HashMap::new(),
                },
            );
            state.schedules.insert(schedule.id, schedule);
        }
        tracing::info!(
            schedules = state.schedules.len(),
            processes = state.processes.len(),
            "scheduler starting"
        );
        drop(state);

        let scheduler = self.clone();
        tokio::spawn(async move { scheduler.main_loop().await });
        Ok(())
    }

    /// Attempts to stop the scheduler.
    ///
    /// Pauses scheduling, sends SIGTERM to every running task (best-effort)
    /// and gives them a short grace period. Errors with
    /// [`SchedulerError::TasksStillRunning`] if any task survives it; the
    /// scheduler stays paused, and callers may retry.
    pub async fn stop(&self) -> Result<(), SchedulerError> {
        tracing::info!("scheduler stop requested");
        self.inner.paused.store(true, Ordering::SeqCst);
        self.inner.wakeup.notify_one();

        {
            let state = self.inner.state.lock().await;
            for (schedule_id, execution) in state.executions.iter() {
                let name = state
                    .schedules
                    .get(schedule_id)
                    .map(|s| s.name.as_str())
                    .unwrap_or("<unknown>");
                for (task_id, child) in execution.task_processes.iter() {
                    tracing::info!(
                        schedule = name,
                        %task_id,
                        pid = child.pid(),
                        "terminating task"
                    );
                    if let Err(err) = child.terminate() {
                        tracing::debug!(%task_id, error = %err, "process already exited");
                    }
                }
            }
        }

        tokio::time::sleep(STOP_GRACE).await;

        if self.inner.active_tasks.load(Ordering::SeqCst) > 0 {
            return Err(SchedulerError::TasksStillRunning);
        }
        self.inner.state.lock().await.start_time = None;
        Ok(())
    }

    pub fn is_paused(&self) -> bool {
        self.inner.paused.load(Ordering::SeqCst)
    }

    pub async fn is_running(&self) -> bool {
        self.inner.state.lock().await.start_time.is_some()
    }

    pub fn active_task_count(&self) -> u32 {
        self.inner.active_tasks.load(Ordering::SeqCst)
    }

    pub async fn execution_status(&self, schedule_id: Uuid) -> Option<ExecutionStatus> {
        self.inner
            .state
            .lock()
            .await
            .executions
            .get(&schedule_id)
            .map(|execution| ExecutionStatus {
                next_start_time: execution.next_start_time,
                running_tasks: execution.task_processes.keys().copied().collect(),
            })
    }

    async fn main_loop(&self) {
        loop {
            let least = self.check_schedules().await;

            if self.inner.paused.load(Ordering::SeqCst) {
                break;
            }

            let sleep_seconds = match least {
                Some(next) => (next - now_epoch()).max(0),
                None => MAX_SLEEP_SECONDS,
            };
            tracing::debug!(sleep_seconds, "scheduler sleeping");

            tokio::select! {
                () = tokio::time::sleep(std::time::Duration::from_secs(sleep_seconds as u64)) => (),
                () = self.inner.wakeup.notified() => {
                    tracing::debug!("scheduler awakened");
                }
            }
        }
        tracing::info!("scheduler main loop exited");
    }

    /// Starts tasks for every due schedule and returns the least upcoming
    /// fire time, or `None` when nothing is scheduled (or a pause was
    /// observed mid-scan).
    async fn check_schedules(&self) -> Option<i64> {
        let mut least: Option<i64> = None;
        let mut state = self.inner.state.lock().await;
        let ids: Vec<Uuid> = state.executions.keys().copied().collect();

        for id in ids {
            if self.inner.paused.load(Ordering::SeqCst) {
                return None;
            }
            let Some(schedule) = state.schedules.get(&id).cloned() else {
                continue;
            };
            let Some(execution) = state.executions.get(&id) else {
                continue;
            };
            if schedule.exclusive && !execution.task_processes.is_empty() {
                continue;
            }
            let Some(next_start) = execution.next_start_time else {
                continue;
            };

            let mut upcoming = Some(next_start);
            if now_epoch() >= next_start {
                // Increment before any await: a concurrent stop() must
                // observe this task before its process is spawned and
                // tracked.
                self.inner.active_tasks.fetch_add(1, Ordering::SeqCst);

                if schedule.exclusive {
                    // Exclusive schedules advance only on completion.
                    upcoming = None;
                } else {
                    upcoming =
                        fire_times::next_fire(&Local, &schedule, next_start, now_epoch(), false);
                    if let Some(execution) = state.executions.get_mut(&id) {
                        execution.next_start_time = upcoming;
                    }
                }

                self.start_task(&mut state, &schedule).await;
            }

            least = match (least, upcoming) {
                (Some(l), Some(u)) => Some(l.min(u)),
                (l, u) => l.or(u),
            };
        }
        least
    }

    /// Launches one task for `schedule` and spawns its completion handler.
    /// Startup tasks are not persisted; regular tasks get a RUNNING row
    /// before the handler may observe their exit.
    async fn start_task(&self, state: &mut State, schedule: &Schedule) {
        let task_id = Uuid::new_v4();
        let argv = state
            .processes
            .get(&schedule.process_name)
            .cloned()
            .unwrap_or_default();

        let child = if argv.is_empty() {
            tracing::error!(
                schedule = %schedule.name,
                process = %schedule.process_name,
                "scheduled process has no command line"
            );
            None
        } else {
            let mut cmd = std::process::Command::new(&argv[0]);
            cmd.args(&argv[1..]);
            match Child::spawn(&mut cmd) {
                Ok(child) => Some(child),
                Err(err) => {
                    tracing::error!(
                        schedule = %schedule.name,
                        %task_id,
                        ?argv,
                        error = %err,
                        "unable to start task"
                    );
                    None
                }
            }
        };
        let Some(child) = child else {
            // Undo the eager increment; a spawn which never happened leaves
            // no task row behind.
            self.decrement_active_tasks();
            return;
        };

        tracing::info!(
            schedule = %schedule.name,
            %task_id,
            pid = child.pid(),
            ?argv,
            "started task"
        );
        if let Some(execution) = state.executions.get_mut(&schedule.id) {
            execution.task_processes.insert(task_id, child.clone());
        }

        if schedule.schedule_type == ScheduleType::Startup {
            // Startup tasks are not tracked in the tasks table.
            let scheduler = self.clone();
            let schedule = schedule.clone();
            tokio::spawn(async move {
                let _ = child.wait().await;
                scheduler.on_task_completion(&schedule, task_id).await;
            });
            return;
        }

        // The task row must exist before the completion handler runs.
        let task = Task {
            id: task_id,
            process_name: schedule.process_name.clone(),
            state: TaskState::Running,
            start_time: chrono::Utc::now(),
            end_time: None,
            pid: child.pid() as i32,
            exit_code: None,
            reason: None,
        };
        if let Err(err) = self.inner.storage.insert_task(&task).await {
            tracing::error!(%task_id, error = %err, "failed to persist task row");
        }

        let scheduler = self.clone();
        let schedule = schedule.clone();
        tokio::spawn(async move {
            let status = child.wait().await;
            scheduler.on_task_completion(&schedule, task_id).await;

            let exit_code = status.as_ref().ok().and_then(|s| s.code());
            if let Err(err) = scheduler
                .inner
                .storage
                .complete_task(task_id, TaskState::Complete, exit_code, chrono::Utc::now())
                .await
            {
                tracing::error!(%task_id, error = %err, "failed to record task completion");
            }
        });
    }

    /// Bookkeeping after a task exits: the active count drops, exclusive
    /// schedules compute their next fire (waking the main loop when one
    /// exists), and the execution entry is trimmed or dropped.
    async fn on_task_completion(&self, schedule: &Schedule, task_id: Uuid) {
        tracing::info!(schedule = %schedule.name, %task_id, "task completed");
        self.decrement_active_tasks();

        let mut state = self.inner.state.lock().await;
        let next_start_time = {
            let Some(execution) = state.executions.get_mut(&schedule.id) else {
                return;
            };
            if schedule.exclusive {
                let prev = execution.next_start_time.unwrap_or_else(now_epoch);
                let next = fire_times::next_fire(
                    &Local,
                    schedule,
                    prev,
                    now_epoch(),
                    self.inner.paused.load(Ordering::SeqCst),
                );
                execution.next_start_time = next;
                if next.is_some() {
                    self.inner.wakeup.notify_one();
                }
            }
            execution.next_start_time
        };

        if next_start_time.is_none() {
            // One-shot (or paused) schedule: the whole execution goes away.
            state.executions.remove(&schedule.id);
        } else if let Some(execution) = state.executions.get_mut(&schedule.id) {
            execution.task_processes.remove(&task_id);
        }
    }

    fn decrement_active_tasks(&self) {
        let decremented = self
            .inner
            .active_tasks
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if decremented.is_err() {
            tracing::error!("active task count would be negative");
        }
    }
}
