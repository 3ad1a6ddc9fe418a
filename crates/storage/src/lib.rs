use chrono::{DateTime, Utc};
use models::{CategoryRow, ScheduleRow, ScheduledProcess, Task, TaskState};
use uuid::Uuid;

mod memory;
mod postgres;

pub use memory::MemStorage;
pub use postgres::PgStorage;

/// StorageError is a failure of the storage service.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("malformed row in {table}: {detail}")]
    Malformed { table: &'static str, detail: String },
}

/// AuditCode tags an audit-trail event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum AuditCode {
    /// A configuration category was added.
    #[serde(rename = "CONAD")]
    CategoryAdded,
    /// A configuration category or item was changed or deleted.
    #[serde(rename = "CONCH")]
    CategoryChanged,
}

impl AuditCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditCode::CategoryAdded => "CONAD",
            AuditCode::CategoryChanged => "CONCH",
        }
    }
}

impl std::fmt::Display for AuditCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// AuditEvent is one appended audit-trail entry.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct AuditEvent {
    pub code: AuditCode,
    pub details: serde_json::Value,
}

/// Storage is the typed DML surface the core consumes.
///
/// Having the core reach the database only through this trait keeps the
/// configuration store and scheduler testable against [`MemStorage`], while
/// production deployments use [`PgStorage`].
#[async_trait::async_trait]
pub trait Storage: Send + Sync + 'static {
    // `configuration` table.
    async fn list_categories(&self) -> Result<Vec<CategoryRow>, StorageError>;
    async fn read_category(&self, key: &str) -> Result<Option<CategoryRow>, StorageError>;
    async fn read_category_value(&self, key: &str)
        -> Result<Option<serde_json::Value>, StorageError>;
    /// Reads a single item specification out of a category's JSON document.
    async fn read_category_item(
        &self,
        key: &str,
        item: &str,
    ) -> Result<Option<serde_json::Value>, StorageError>;
    /// Reads the `value` entry of a single item.
    async fn read_item_value_entry(
        &self,
        key: &str,
        item: &str,
    ) -> Result<Option<serde_json::Value>, StorageError>;
    async fn insert_category(
        &self,
        key: &str,
        description: &str,
        value: &serde_json::Value,
        display_name: &str,
    ) -> Result<(), StorageError>;
    async fn update_category(
        &self,
        key: &str,
        description: &str,
        value: &serde_json::Value,
        display_name: &str,
    ) -> Result<(), StorageError>;
    /// Atomically updates the `value` entry of one item within the category
    /// JSON document.
    async fn update_item_value_entry(
        &self,
        key: &str,
        item: &str,
        value: &serde_json::Value,
    ) -> Result<(), StorageError>;
    /// Applies a batch of item-value patches as a single atomic update.
    async fn update_item_value_entries(
        &self,
        key: &str,
        patches: &[(String, serde_json::Value)],
    ) -> Result<(), StorageError>;
    async fn delete_category(&self, key: &str) -> Result<u64, StorageError>;

    // `category_children` table.
    async fn read_children(&self, parent: &str) -> Result<Vec<String>, StorageError>;
    async fn distinct_children(&self) -> Result<Vec<String>, StorageError>;
    async fn insert_child(&self, parent: &str, child: &str) -> Result<(), StorageError>;
    async fn delete_child(&self, parent: &str, child: &str) -> Result<u64, StorageError>;
    async fn delete_children_of(&self, parent: &str) -> Result<u64, StorageError>;
    async fn delete_edges_to(&self, child: &str) -> Result<u64, StorageError>;

    // `scheduled_processes` and `schedules` tables.
    async fn read_scheduled_processes(&self) -> Result<Vec<ScheduledProcess>, StorageError>;
    async fn read_schedules(&self) -> Result<Vec<ScheduleRow>, StorageError>;

    // `tasks` table.
    async fn insert_task(&self, task: &Task) -> Result<(), StorageError>;
    async fn complete_task(
        &self,
        id: Uuid,
        state: TaskState,
        exit_code: Option<i32>,
        end_time: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    // Audit trail.
    async fn append_audit(
        &self,
        code: AuditCode,
        details: serde_json::Value,
    ) -> Result<(), StorageError>;
}
