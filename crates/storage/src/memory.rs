use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use models::{CategoryRow, ScheduleRow, ScheduledProcess, Task, TaskState};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{AuditCode, AuditEvent, Storage, StorageError};

/// MemStorage is an in-process implementation of [`Storage`] over plain maps.
///
/// It backs embedded and development deployments that run without a database,
/// and is the storage used by the test suites. Audit events are retained so
/// callers can inspect the emitted trail.
#[derive(Default)]
pub struct MemStorage {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    categories: BTreeMap<String, CategoryRow>,
    edges: Vec<(String, String)>,
    processes: BTreeMap<String, Vec<String>>,
    schedules: Vec<ScheduleRow>,
    tasks: BTreeMap<Uuid, Task>,
    audit: Vec<AuditEvent>,
    category_updates: usize,
}

impl MemStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a schedule row, as an operator would via the schedules table.
    pub async fn add_schedule(&self, row: ScheduleRow) {
        self.inner.lock().await.schedules.push(row);
    }

    /// Seeds a scheduled process (a named argv).
    pub async fn add_process(&self, name: &str, script: &[&str]) {
        self.inner.lock().await.processes.insert(
            name.to_string(),
            script.iter().map(|s| s.to_string()).collect(),
        );
    }

    /// Writes a raw category row, bypassing validation. Used to seed
    /// pre-existing (possibly corrupt) state.
    pub async fn put_raw_category(
        &self,
        key: &str,
        description: &str,
        value: serde_json::Value,
        display_name: &str,
    ) {
        self.inner.lock().await.categories.insert(
            key.to_string(),
            CategoryRow {
                key: key.to_string(),
                description: description.to_string(),
                value,
                display_name: display_name.to_string(),
                ts: Utc::now(),
            },
        );
    }

    /// Returns the audit trail emitted so far.
    pub async fn audit_events(&self) -> Vec<AuditEvent> {
        self.inner.lock().await.audit.clone()
    }

    /// Returns a persisted task row, if any.
    pub async fn task(&self, id: Uuid) -> Option<Task> {
        self.inner.lock().await.tasks.get(&id).cloned()
    }

    /// Returns all persisted task rows.
    pub async fn tasks(&self) -> Vec<Task> {
        self.inner.lock().await.tasks.values().cloned().collect()
    }

    /// Number of whole-category updates applied so far.
    pub async fn category_update_count(&self) -> usize {
        self.inner.lock().await.category_updates
    }
}

#[async_trait::async_trait]
impl Storage for MemStorage {
    async fn list_categories(&self) -> Result<Vec<CategoryRow>, StorageError> {
        Ok(self.inner.lock().await.categories.values().cloned().collect())
    }

    async fn read_category(&self, key: &str) -> Result<Option<CategoryRow>, StorageError> {
        Ok(self.inner.lock().await.categories.get(key).cloned())
    }

    async fn read_category_value(
        &self,
        key: &str,
    ) -> Result<Option<serde_json::Value>, StorageError> {
        Ok(self
            .inner
            .lock()
            .await
            .categories
            .get(key)
            .map(|row| row.value.clone()))
    }

    async fn read_category_item(
        &self,
        key: &str,
        item: &str,
    ) -> Result<Option<serde_json::Value>, StorageError> {
        Ok(self
            .inner
            .lock()
            .await
            .categories
            .get(key)
            .and_then(|row| row.value.get(item))
            .cloned())
    }

    async fn read_item_value_entry(
        &self,
        key: &str,
        item: &str,
    ) -> Result<Option<serde_json::Value>, StorageError> {
        Ok(self
            .inner
            .lock()
            .await
            .categories
            .get(key)
            .and_then(|row| row.value.get(item))
            .and_then(|item| item.get("value"))
            .cloned())
    }

    async fn insert_category(
        &self,
        key: &str,
        description: &str,
        value: &serde_json::Value,
        display_name: &str,
    ) -> Result<(), StorageError> {
        self.inner.lock().await.categories.insert(
            key.to_string(),
            CategoryRow {
                key: key.to_string(),
                description: description.to_string(),
                value: value.clone(),
                display_name: display_name.to_string(),
                ts: Utc::now(),
            },
        );
        Ok(())
    }

    async fn update_category(
        &self,
        key: &str,
        description: &str,
        value: &serde_json::Value,
        display_name: &str,
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().await;
        inner.category_updates += 1;
        if let Some(row) = inner.categories.get_mut(key) {
            row.description = description.to_string();
            row.value = value.clone();
            row.display_name = display_name.to_string();
            row.ts = Utc::now();
        }
        Ok(())
    }

    async fn update_item_value_entry(
        &self,
        key: &str,
        item: &str,
        value: &serde_json::Value,
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().await;
        if let Some(row) = inner.categories.get_mut(key) {
            if let Some(serde_json::Value::Object(entries)) = row.value.get_mut(item) {
                entries.insert("value".to_string(), value.clone());
                row.ts = Utc::now();
            }
        }
        Ok(())
    }

    async fn update_item_value_entries(
        &self,
        key: &str,
        patches: &[(String, serde_json::Value)],
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().await;
        if let Some(row) = inner.categories.get_mut(key) {
            for (item, value) in patches {
                if let Some(serde_json::Value::Object(entries)) = row.value.get_mut(item) {
                    entries.insert("value".to_string(), value.clone());
                }
            }
            row.ts = Utc::now();
        }
        Ok(())
    }

    async fn delete_category(&self, key: &str) -> Result<u64, StorageError> {
        Ok(self.inner.lock().await.categories.remove(key).is_some() as u64)
    }

    async fn read_children(&self, parent: &str) -> Result<Vec<String>, StorageError> {
        let inner = self.inner.lock().await;
        let mut children: Vec<String> = inner
            .edges
            .iter()
            .filter(|(p, _)| p == parent)
            .map(|(_, c)| c.clone())
            .collect();
        children.sort();
        Ok(children)
    }

    async fn distinct_children(&self) -> Result<Vec<String>, StorageError> {
        let inner = self.inner.lock().await;
        let mut children: Vec<String> = inner.edges.iter().map(|(_, c)| c.clone()).collect();
        children.sort();
        children.dedup();
        Ok(children)
    }

    async fn insert_child(&self, parent: &str, child: &str) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().await;
        let edge = (parent.to_string(), child.to_string());
        if !inner.edges.contains(&edge) {
            inner.edges.push(edge);
        }
        Ok(())
    }

    async fn delete_child(&self, parent: &str, child: &str) -> Result<u64, StorageError> {
        let mut inner = self.inner.lock().await;
        let before = inner.edges.len();
        inner.edges.retain(|(p, c)| !(p == parent && c == child));
        Ok((before - inner.edges.len()) as u64)
    }

    async fn delete_children_of(&self, parent: &str) -> Result<u64, StorageError> {
        let mut inner = self.inner.lock().await;
        let before = inner.edges.len();
        inner.edges.retain(|(p, _)| p != parent);
        Ok((before - inner.edges.len()) as u64)
    }

    async fn delete_edges_to(&self, child: &str) -> Result<u64, StorageError> {
        let mut inner = self.inner.lock().await;
        let before = inner.edges.len();
        inner.edges.retain(|(_, c)| c != child);
        Ok((before - inner.edges.len()) as u64)
    }

    async fn read_scheduled_processes(&self) -> Result<Vec<ScheduledProcess>, StorageError> {
        Ok(self
            .inner
            .lock()
            .await
            .processes
            .iter()
            .map(|(name, script)| ScheduledProcess {
                name: name.clone(),
                script: script.clone(),
            })
            .collect())
    }

    async fn read_schedules(&self) -> Result<Vec<ScheduleRow>, StorageError> {
        Ok(self.inner.lock().await.schedules.clone())
    }

    async fn insert_task(&self, task: &Task) -> Result<(), StorageError> {
        self.inner.lock().await.tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn complete_task(
        &self,
        id: Uuid,
        state: TaskState,
        exit_code: Option<i32>,
        end_time: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        if let Some(task) = self.inner.lock().await.tasks.get_mut(&id) {
            task.state = state;
            task.exit_code = exit_code;
            task.end_time = Some(end_time);
        }
        Ok(())
    }

    async fn append_audit(
        &self,
        code: AuditCode,
        details: serde_json::Value,
    ) -> Result<(), StorageError> {
        self.inner
            .lock()
            .await
            .audit
            .push(AuditEvent { code, details });
        Ok(())
    }
}
