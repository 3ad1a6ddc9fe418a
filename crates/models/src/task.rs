use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::ModelError;

/// TaskState is the lifecycle state of one task run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, sqlx::Type)]
#[repr(i32)]
pub enum TaskState {
    Running = 1,
    Complete = 2,
    Canceled = 3,
    Interrupted = 4,
}

impl TryFrom<i32> for TaskState {
    type Error = ModelError;

    fn try_from(v: i32) -> Result<Self, Self::Error> {
        match v {
            1 => Ok(TaskState::Running),
            2 => Ok(TaskState::Complete),
            3 => Ok(TaskState::Canceled),
            4 => Ok(TaskState::Interrupted),
            other => Err(ModelError::InvalidTaskState(other)),
        }
    }
}

/// Task is a persisted row of the `tasks` table: one run of a scheduled
/// process. Startup tasks are deliberately never written here.
#[derive(Debug, Clone, PartialEq, serde::Serialize, sqlx::FromRow)]
pub struct Task {
    pub id: Uuid,
    pub process_name: String,
    pub state: TaskState,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub pid: i32,
    pub exit_code: Option<i32>,
    pub reason: Option<String>,
}

/// ScheduledProcess names a command line which schedules may launch.
/// Immutable once loaded.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ScheduledProcess {
    pub name: String,
    pub script: Vec<String>,
}
