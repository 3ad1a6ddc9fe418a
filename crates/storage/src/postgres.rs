use chrono::{DateTime, Utc};
use models::{CategoryRow, ScheduleRow, ScheduledProcess, Task, TaskState};
use uuid::Uuid;

use crate::{AuditCode, Storage, StorageError};

/// Audit severity of informational events in the `log` table.
const LOG_LEVEL_INFORMATION: i32 = 4;

/// PgStorage serves the [`Storage`] contract from a Postgres pool.
#[derive(Clone)]
pub struct PgStorage {
    pool: sqlx::PgPool,
}

impl PgStorage {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl Storage for PgStorage {
    async fn list_categories(&self) -> Result<Vec<CategoryRow>, StorageError> {
        let rows = sqlx::query_as::<_, CategoryRow>(
            "SELECT key, description, value, display_name, ts FROM configuration ORDER BY key",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn read_category(&self, key: &str) -> Result<Option<CategoryRow>, StorageError> {
        let row = sqlx::query_as::<_, CategoryRow>(
            "SELECT key, description, value, display_name, ts FROM configuration WHERE key = $1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn read_category_value(
        &self,
        key: &str,
    ) -> Result<Option<serde_json::Value>, StorageError> {
        let value = sqlx::query_scalar::<_, serde_json::Value>(
            "SELECT value FROM configuration WHERE key = $1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(value)
    }

    async fn read_category_item(
        &self,
        key: &str,
        item: &str,
    ) -> Result<Option<serde_json::Value>, StorageError> {
        // `->` yields SQL NULL when the item is absent.
        let value = sqlx::query_scalar::<_, Option<serde_json::Value>>(
            "SELECT value -> $2::text FROM configuration WHERE key = $1",
        )
        .bind(key)
        .bind(item)
        .fetch_optional(&self.pool)
        .await?;
        Ok(value.flatten())
    }

    async fn read_item_value_entry(
        &self,
        key: &str,
        item: &str,
    ) -> Result<Option<serde_json::Value>, StorageError> {
        let value = sqlx::query_scalar::<_, Option<serde_json::Value>>(
            "SELECT value -> $2::text -> 'value' FROM configuration WHERE key = $1",
        )
        .bind(key)
        .bind(item)
        .fetch_optional(&self.pool)
        .await?;
        Ok(value.flatten())
    }

    #[tracing::instrument(level = "debug", err, skip(self, value))]
    async fn insert_category(
        &self,
        key: &str,
        description: &str,
        value: &serde_json::Value,
        display_name: &str,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO configuration (key, description, value, display_name) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(key)
        .bind(description)
        .bind(value)
        .bind(display_name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[tracing::instrument(level = "debug", err, skip(self, value))]
    async fn update_category(
        &self,
        key: &str,
        description: &str,
        value: &serde_json::Value,
        display_name: &str,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "UPDATE configuration \
             SET description = $2, value = $3, display_name = $4, ts = now() \
             WHERE key = $1",
        )
        .bind(key)
        .bind(description)
        .bind(value)
        .bind(display_name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_item_value_entry(
        &self,
        key: &str,
        item: &str,
        value: &serde_json::Value,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "UPDATE configuration \
             SET value = jsonb_set(value, ARRAY[$2::text, 'value'], $3), ts = now() \
             WHERE key = $1",
        )
        .bind(key)
        .bind(item)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[tracing::instrument(level = "debug", err, skip(self, patches))]
    async fn update_item_value_entries(
        &self,
        key: &str,
        patches: &[(String, serde_json::Value)],
    ) -> Result<(), StorageError> {
        let mut txn = self.pool.begin().await?;
        for (item, value) in patches {
            sqlx::query(
                "UPDATE configuration \
                 SET value = jsonb_set(value, ARRAY[$2::text, 'value'], $3), ts = now() \
                 WHERE key = $1",
            )
            .bind(key)
            .bind(item)
            .bind(value)
            .execute(&mut txn)
            .await?;
        }
        txn.commit().await?;
        Ok(())
    }

    async fn delete_category(&self, key: &str) -> Result<u64, StorageError> {
        let done = sqlx::query("DELETE FROM configuration WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected())
    }

    async fn read_children(&self, parent: &str) -> Result<Vec<String>, StorageError> {
        let children = sqlx::query_scalar::<_, String>(
            "SELECT child FROM category_children WHERE parent = $1 ORDER BY child",
        )
        .bind(parent)
        .fetch_all(&self.pool)
        .await?;
        Ok(children)
    }

    async fn distinct_children(&self) -> Result<Vec<String>, StorageError> {
        let children =
            sqlx::query_scalar::<_, String>("SELECT DISTINCT child FROM category_children")
                .fetch_all(&self.pool)
                .await?;
        Ok(children)
    }

    async fn insert_child(&self, parent: &str, child: &str) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO category_children (parent, child) VALUES ($1, $2) \
             ON CONFLICT DO NOTHING",
        )
        .bind(parent)
        .bind(child)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_child(&self, parent: &str, child: &str) -> Result<u64, StorageError> {
        let done = sqlx::query("DELETE FROM category_children WHERE parent = $1 AND child = $2")
            .bind(parent)
            .bind(child)
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected())
    }

    async fn delete_children_of(&self, parent: &str) -> Result<u64, StorageError> {
        let done = sqlx::query("DELETE FROM category_children WHERE parent = $1")
            .bind(parent)
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected())
    }

    async fn delete_edges_to(&self, child: &str) -> Result<u64, StorageError> {
        let done = sqlx::query("DELETE FROM category_children WHERE child = $1")
            .bind(child)
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected())
    }

    async fn read_scheduled_processes(&self) -> Result<Vec<ScheduledProcess>, StorageError> {
        let rows = sqlx::query_as::<_, (String, serde_json::Value)>(
            "SELECT name, script FROM scheduled_processes",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(name, script)| {
                let script: Vec<String> =
                    serde_json::from_value(script).map_err(|err| StorageError::Malformed {
                        table: "scheduled_processes",
                        detail: format!("script of {name:?} is not a string array: {err}"),
                    })?;
                Ok(ScheduledProcess { name, script })
            })
            .collect()
    }

    async fn read_schedules(&self) -> Result<Vec<ScheduleRow>, StorageError> {
        let rows = sqlx::query_as::<_, ScheduleRow>(
            "SELECT id, schedule_name, process_name, schedule_type, schedule_time, \
             schedule_day, schedule_interval, repeat, exclusive FROM schedules",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn insert_task(&self, task: &Task) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO tasks (id, process_name, state, start_time, pid) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(task.id)
        .bind(&task.process_name)
        .bind(task.state)
        .bind(task.start_time)
        .bind(task.pid)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn complete_task(
        &self,
        id: Uuid,
        state: TaskState,
        exit_code: Option<i32>,
        end_time: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        sqlx::query("UPDATE tasks SET state = $2, exit_code = $3, end_time = $4 WHERE id = $1")
            .bind(id)
            .bind(state)
            .bind(exit_code)
            .bind(end_time)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn append_audit(
        &self,
        code: AuditCode,
        details: serde_json::Value,
    ) -> Result<(), StorageError> {
        sqlx::query("INSERT INTO log (code, level, log) VALUES ($1, $2, $3)")
            .bind(code.as_str())
            .bind(LOG_LEVEL_INFORMATION)
            .bind(details)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
