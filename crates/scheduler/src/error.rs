/// SchedulerError is a failure of a scheduler lifecycle operation.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("the scheduler is already running")]
    AlreadyStarted,
    /// `stop()` gave running tasks a grace period and some remain. The
    /// scheduler stays paused; callers may retry.
    #[error("tasks are still running")]
    TasksStillRunning,
    #[error(transparent)]
    Storage(#[from] storage::StorageError),
    #[error(transparent)]
    Model(#[from] models::ModelError),
}
