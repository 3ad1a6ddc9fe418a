mod config;
mod schedule;
mod task;

pub use config::{CategoryInfo, CategoryItem, CategoryRow, CategoryValue, ItemType};
pub use schedule::{
    Repeat, Schedule, ScheduleRow, ScheduleType, DAY_SECONDS, HOUR_SECONDS, WEEK_SECONDS,
};
pub use task::{ScheduledProcess, Task, TaskState};

/// ModelError reports a persisted row which cannot be mapped into its model type.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("invalid schedule type {0}")]
    InvalidScheduleType(i16),
    #[error("invalid repeat value {0}")]
    InvalidRepeat(i16),
    #[error("invalid task state {0}")]
    InvalidTaskState(i32),
}
