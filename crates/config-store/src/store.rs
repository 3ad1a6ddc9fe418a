use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, FutureExt};
use models::{CategoryInfo, CategoryItem, CategoryValue, ItemType};
use storage::{AuditCode, Storage};

use crate::cache::CategoryCache;
use crate::interests::InterestRegistry;
use crate::{validate, ConfigError};

/// Categories which may never be removed by a recursive delete.
pub const RESERVED_CATEGORIES: &[&str] = &[
    "South",
    "North",
    "General",
    "Advanced",
    "Utilities",
    "rest_api",
    "Security",
    "service",
    "SCHEDULER",
    "SMNTR",
    "PURGE_READ",
    "Notifications",
];

/// Upper bound on parent/child traversal depth. The edge table does not
/// enforce acyclicity, so traversals refuse rather than loop.
const MAX_TREE_DEPTH: usize = 64;

/// CategoryNode is one node of the category forest, with recursively
/// populated children.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct CategoryNode {
    pub key: String,
    pub description: String,
    #[serde(rename = "displayName")]
    pub display_name: String,
    pub children: Vec<CategoryNode>,
}

impl From<CategoryInfo> for CategoryNode {
    fn from(info: CategoryInfo) -> Self {
        CategoryNode {
            key: info.key,
            description: info.description,
            display_name: info.display_name,
            children: Vec::new(),
        }
    }
}

/// ConfigStore is the hierarchical, typed, cached configuration store.
///
/// It is constructed once at boot and shared by reference with every
/// collaborator; all of its state besides the storage service itself is the
/// bounded read cache and the in-memory interest registry.
pub struct ConfigStore {
    storage: Arc<dyn Storage>,
    cache: Mutex<CategoryCache>,
    interests: InterestRegistry,
}

impl ConfigStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            cache: Mutex::new(CategoryCache::new()),
            interests: InterestRegistry::default(),
        }
    }

    /// The interest registry, for defining callbacks and registering
    /// interests in category changes.
    pub fn interests(&self) -> &InterestRegistry {
        &self.interests
    }

    /// Cache hit/miss/size counters, for observability.
    pub fn cache_stats(&self) -> (usize, u64, u64) {
        let cache = self.cache.lock().unwrap();
        (cache.len(), cache.hits(), cache.misses())
    }

    /// The cached value of a category, if cached. Does not count an access.
    pub fn cached_value(&self, category_name: &str) -> Option<CategoryValue> {
        self.cache
            .lock()
            .unwrap()
            .peek(category_name)
            .map(|entry| entry.value.clone())
    }

    /// Creates a category, or merges its definition with a previously
    /// persisted one.
    ///
    /// Validation fills each item's `value` from its cleaned default and
    /// rejects documents that carry a `value` of their own. When the category
    /// already exists, persisted item values are preserved across the merge;
    /// items newly marked deprecated are dropped with an audit trail; and
    /// `keep_original_items` retains persisted items missing from the new
    /// definition. An update is written only when the merged document or the
    /// display name actually changed, and registered interests run only after
    /// a write.
    pub async fn create_category(
        &self,
        category_name: &str,
        category_value: serde_json::Value,
        category_description: &str,
        keep_original_items: bool,
        display_name: Option<&str>,
    ) -> Result<(), ConfigError> {
        if category_name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "category_name cannot be empty".to_string(),
            ));
        }
        let mut prepared = validate::validate_category_value(&category_value, true)?;

        let Some(stored_row) = self.storage.read_category(category_name).await? else {
            // Fresh create. Deprecated items are never persisted.
            prepared.retain(|_, item| !item.is_deprecated());
            let display_name = display_name.unwrap_or(category_name);
            let value = to_raw(&prepared)?;

            self.storage
                .insert_category(category_name, category_description, &value, display_name)
                .await?;
            self.storage
                .append_audit(
                    AuditCode::CategoryAdded,
                    serde_json::json!({"name": category_name, "category": value}),
                )
                .await?;
            self.cache
                .lock()
                .unwrap()
                .put(category_name, prepared, display_name);
            return self.run_callbacks(category_name).await;
        };

        let (merged, display_name, changed) =
            match validate::validate_category_value(&stored_row.value, false) {
                Err(err) => {
                    // Nothing can be salvaged from a corrupted document.
                    tracing::error!(
                        category = category_name,
                        error = %err,
                        "stored category value is corrupted; using new value without merge"
                    );
                    prepared.retain(|_, item| !item.is_deprecated());
                    let display_name = display_name.unwrap_or(&stored_row.display_name);
                    (prepared, display_name.to_string(), true)
                }
                Ok(stored) => {
                    let display_name = display_name
                        .unwrap_or(&stored_row.display_name)
                        .to_string();
                    let merged = self
                        .merge_category_values(
                            prepared,
                            &stored,
                            keep_original_items,
                            category_name,
                        )
                        .await?;
                    let changed = merged != stored || display_name != stored_row.display_name;
                    (merged, display_name, changed)
                }
            };

        if !changed {
            return Ok(());
        }

        let value = to_raw(&merged)?;
        self.storage
            .update_category(category_name, category_description, &value, &display_name)
            .await?;

        // Re-read so the cache holds exactly what storage now holds.
        let refreshed = match self.storage.read_category_value(category_name).await? {
            Some(raw) => serde_json::from_value(raw).unwrap_or(merged),
            None => merged,
        };
        self.cache
            .lock()
            .unwrap()
            .put(category_name, refreshed, &display_name);
        self.run_callbacks(category_name).await
    }

    /// Merges a freshly validated definition with the persisted one:
    /// persisted item values win, deprecated items are dropped with a CONCH
    /// audit, and `keep_original_items` re-injects persisted items absent
    /// from the new definition.
    async fn merge_category_values(
        &self,
        mut prepared: CategoryValue,
        stored: &CategoryValue,
        keep_original_items: bool,
        category_name: &str,
    ) -> Result<CategoryValue, ConfigError> {
        let mut remaining = stored.clone();
        let mut deprecated = Vec::new();

        for (item_name, item) in prepared.iter_mut() {
            if let Some(stored_item) = remaining.remove(item_name) {
                item.value = stored_item.value;
            }
            if item.is_deprecated() {
                self.storage
                    .append_audit(
                        AuditCode::CategoryChanged,
                        serde_json::json!({
                            "category": category_name,
                            "item": item_name,
                            "oldValue": item.value,
                            "newValue": "deprecated",
                        }),
                    )
                    .await?;
                deprecated.push(item_name.clone());
            }
        }
        for item_name in deprecated {
            prepared.remove(&item_name);
        }

        if keep_original_items {
            for (item_name, item) in remaining {
                prepared.insert(item_name, item);
            }
        }
        Ok(prepared)
    }

    /// All items of a category, through the cache.
    pub async fn get_category_all_items(
        &self,
        category_name: &str,
    ) -> Result<Option<CategoryValue>, ConfigError> {
        {
            let mut cache = self.cache.lock().unwrap();
            if let Some(entry) = cache.access(category_name) {
                return Ok(Some(entry.value.clone()));
            }
        }
        let Some(row) = self.storage.read_category(category_name).await? else {
            return Ok(None);
        };
        let value: CategoryValue = serde_json::from_value(row.value).map_err(|err| {
            ConfigError::Validation(format!(
                "category {category_name:?} holds an invalid value: {err}"
            ))
        })?;
        self.cache
            .lock()
            .unwrap()
            .put(category_name, value.clone(), &row.display_name);
        Ok(Some(value))
    }

    /// A single item of a category. A cache miss reads the item through a
    /// JSON-path query, then populates the cache with the whole category.
    pub async fn get_category_item(
        &self,
        category_name: &str,
        item_name: &str,
    ) -> Result<Option<CategoryItem>, ConfigError> {
        {
            let mut cache = self.cache.lock().unwrap();
            if let Some(entry) = cache.access(category_name) {
                return Ok(entry.value.get(item_name).cloned());
            }
        }
        let Some(raw) = self
            .storage
            .read_category_item(category_name, item_name)
            .await?
        else {
            return Ok(None);
        };
        let item: CategoryItem = serde_json::from_value(raw).map_err(|err| {
            ConfigError::Validation(format!(
                "item {item_name:?} of category {category_name:?} is invalid: {err}"
            ))
        })?;

        if let Some(row) = self.storage.read_category(category_name).await? {
            if let Ok(value) = serde_json::from_value::<CategoryValue>(row.value) {
                let mut cache = self.cache.lock().unwrap();
                cache.put(category_name, value, &row.display_name);
                cache.patch_item(category_name, item_name, item.clone());
            }
        }
        Ok(Some(item))
    }

    /// The `value` entry of a single item, straight from storage.
    pub async fn get_category_item_value_entry(
        &self,
        category_name: &str,
        item_name: &str,
    ) -> Result<Option<serde_json::Value>, ConfigError> {
        Ok(self
            .storage
            .read_item_value_entry(category_name, item_name)
            .await?)
    }

    /// Sets the `value` entry of an item.
    ///
    /// No storage update is issued when the new value equals the present one,
    /// and registered interests run only when an update was issued.
    pub async fn set_category_item_value_entry(
        &self,
        category_name: &str,
        item_name: &str,
        new_value: serde_json::Value,
    ) -> Result<(), ConfigError> {
        let cached = {
            let mut cache = self.cache.lock().unwrap();
            cache
                .access(category_name)
                .map(|entry| entry.value.get(item_name).cloned())
        };
        let current = match cached {
            // Cache hit, but no such item.
            Some(None) => {
                return Err(ConfigError::item_not_found(category_name, item_name));
            }
            Some(Some(item)) => item,
            None => {
                let raw = self
                    .storage
                    .read_category_item(category_name, item_name)
                    .await?
                    .ok_or_else(|| ConfigError::item_not_found(category_name, item_name))?;
                serde_json::from_value(raw).map_err(|err| {
                    ConfigError::Validation(format!(
                        "item {item_name:?} of category {category_name:?} is invalid: {err}"
                    ))
                })?
            }
        };

        if current.value.as_ref() == Some(&new_value) {
            return Ok(());
        }
        validate::validate_item_update(item_name, &current, &new_value)?;
        let new_value = current.item_type.clean(new_value);
        if current.value.as_ref() == Some(&new_value) {
            return Ok(());
        }

        let old_value = self
            .storage
            .read_item_value_entry(category_name, item_name)
            .await?;
        self.storage
            .update_item_value_entry(category_name, item_name, &new_value)
            .await?;
        self.storage
            .append_audit(
                AuditCode::CategoryChanged,
                serde_json::json!({
                    "category": category_name,
                    "item": item_name,
                    "oldValue": old_value,
                    "newValue": new_value,
                }),
            )
            .await?;

        // Always refresh from storage, not from what we think we wrote.
        if let Some(raw) = self
            .storage
            .read_category_item(category_name, item_name)
            .await?
        {
            if let Ok(item) = serde_json::from_value::<CategoryItem>(raw) {
                self.cache
                    .lock()
                    .unwrap()
                    .patch_item(category_name, item_name, item);
            }
        }
        self.run_callbacks(category_name).await
    }

    /// Resets an item's `value` entry back to its default.
    pub async fn delete_category_item_value_entry(
        &self,
        category_name: &str,
        item_name: &str,
    ) -> Result<CategoryItem, ConfigError> {
        let item = self
            .get_category_item(category_name, item_name)
            .await?
            .ok_or_else(|| ConfigError::item_not_found(category_name, item_name))?;

        self.set_category_item_value_entry(
            category_name,
            item_name,
            serde_json::Value::String(item.default.clone()),
        )
        .await?;

        self.get_category_item(category_name, item_name)
            .await?
            .ok_or_else(|| ConfigError::item_not_found(category_name, item_name))
    }

    /// Applies a batch of item-value updates as one storage call.
    ///
    /// Every update is validated against the stored item types first; only
    /// items whose value actually changes are shipped, in a single atomic
    /// update, followed by one aggregated CONCH event and one callback pass.
    pub async fn update_configuration_item_bulk(
        &self,
        category_name: &str,
        updates: &BTreeMap<String, serde_json::Value>,
    ) -> Result<(), ConfigError> {
        let Some(cat_info) = self.get_category_all_items(category_name).await? else {
            return Err(ConfigError::category_not_found(category_name));
        };

        let mut patches = Vec::new();
        let mut audit_items = serde_json::Map::new();
        for (item_name, new_value) in updates {
            let Some(item) = cat_info.get(item_name) else {
                return Err(ConfigError::item_not_found(category_name, item_name));
            };
            match item.item_type {
                ItemType::Json => {
                    if !new_value.is_object() && !new_value.is_string() {
                        return Err(ConfigError::Validation(
                            "new value should be a valid dict or a string literal, in double quotes"
                                .to_string(),
                        ));
                    }
                }
                _ => {
                    if !new_value.is_string() {
                        return Err(ConfigError::Validation(
                            "new value should be of type string".to_string(),
                        ));
                    }
                }
            }
            validate::validate_item_update(item_name, item, new_value)?;

            let new_value = item.item_type.clean(new_value.clone());
            if item.value.as_ref() != Some(&new_value) {
                audit_items.insert(
                    item_name.clone(),
                    serde_json::json!({"oldValue": item.value, "newValue": new_value}),
                );
                patches.push((item_name.clone(), new_value));
            }
        }
        if patches.is_empty() {
            return Ok(());
        }

        self.storage
            .update_item_value_entries(category_name, &patches)
            .await?;

        if let Some(raw) = self.storage.read_category_value(category_name).await? {
            if let Ok(value) = serde_json::from_value::<CategoryValue>(raw) {
                self.cache
                    .lock()
                    .unwrap()
                    .refresh_value(category_name, value);
            }
        }
        self.storage
            .append_audit(
                AuditCode::CategoryChanged,
                serde_json::json!({"category": category_name, "items": audit_items}),
            )
            .await?;
        self.run_callbacks(category_name).await
    }

    /// All known categories.
    pub async fn get_all_category_names(&self) -> Result<Vec<CategoryInfo>, ConfigError> {
        Ok(self
            .storage
            .list_categories()
            .await?
            .into_iter()
            .map(|row| CategoryInfo {
                key: row.key,
                description: row.description,
                display_name: row.display_name,
            })
            .collect())
    }

    /// The root (or, with `root == false`, non-root) partition of categories,
    /// optionally with their child forests populated.
    pub async fn get_categories_grouped(
        &self,
        root: bool,
        with_children: bool,
    ) -> Result<Vec<CategoryNode>, ConfigError> {
        let child_set: BTreeSet<String> =
            self.storage.distinct_children().await?.into_iter().collect();

        let mut nodes: Vec<CategoryNode> = self
            .storage
            .list_categories()
            .await?
            .into_iter()
            .filter(|row| child_set.contains(&row.key) != root)
            .map(|row| CategoryNode {
                key: row.key,
                description: row.description,
                display_name: row.display_name,
                children: Vec::new(),
            })
            .collect();

        if with_children {
            for node in nodes.iter_mut() {
                self.populate_children(node, 0).await?;
            }
        }
        Ok(nodes)
    }

    fn populate_children<'a>(
        &'a self,
        node: &'a mut CategoryNode,
        depth: usize,
    ) -> BoxFuture<'a, Result<(), ConfigError>> {
        async move {
            if depth >= MAX_TREE_DEPTH {
                return Err(ConfigError::Validation(format!(
                    "category tree under {:?} exceeds depth {MAX_TREE_DEPTH}; \
                     the parent/child graph may contain a cycle",
                    node.key
                )));
            }
            node.children = self
                .get_category_children(&node.key)
                .await?
                .into_iter()
                .map(CategoryNode::from)
                .collect();
            for child in node.children.iter_mut() {
                self.populate_children(child, depth + 1).await?;
            }
            Ok(())
        }
        .boxed()
    }

    /// Direct children of a category.
    pub async fn get_category_children(
        &self,
        category_name: &str,
    ) -> Result<Vec<CategoryInfo>, ConfigError> {
        if self
            .storage
            .read_category_value(category_name)
            .await?
            .is_none()
        {
            return Err(ConfigError::category_not_found(category_name));
        }

        let mut children = Vec::new();
        for child in self.storage.read_children(category_name).await? {
            if let Some(row) = self.storage.read_category(&child).await? {
                children.push(CategoryInfo {
                    key: row.key,
                    description: row.description,
                    display_name: row.display_name,
                });
            }
        }
        Ok(children)
    }

    /// Links `children` under `category_name`, requiring every key to exist.
    /// Returns the resulting set of children.
    pub async fn create_child_category(
        &self,
        category_name: &str,
        children: &[String],
    ) -> Result<Vec<String>, ConfigError> {
        if self
            .storage
            .read_category_value(category_name)
            .await?
            .is_none()
        {
            return Err(ConfigError::category_not_found(category_name));
        }
        for child in children {
            if self.storage.read_category_value(child).await?.is_none() {
                return Err(ConfigError::NotFound(format!("no such child {child:?}")));
            }
        }

        let mut linked = self.storage.read_children(category_name).await?;
        for child in children {
            if !linked.contains(child) {
                self.storage.insert_child(category_name, child).await?;
                linked.push(child.clone());
            }
        }
        Ok(linked)
    }

    /// Unlinks one child. Returns the remaining children.
    pub async fn delete_child_category(
        &self,
        category_name: &str,
        child_category: &str,
    ) -> Result<Vec<String>, ConfigError> {
        if self
            .storage
            .read_category_value(category_name)
            .await?
            .is_none()
        {
            return Err(ConfigError::category_not_found(category_name));
        }
        if self
            .storage
            .read_category_value(child_category)
            .await?
            .is_none()
        {
            return Err(ConfigError::NotFound(format!(
                "no such child {child_category:?}"
            )));
        }

        self.storage
            .delete_child(category_name, child_category)
            .await?;
        Ok(self.storage.read_children(category_name).await?)
    }

    /// Unlinks all children of `category_name`.
    pub async fn delete_parent_category(&self, category_name: &str) -> Result<(), ConfigError> {
        if self
            .storage
            .read_category_value(category_name)
            .await?
            .is_none()
        {
            return Err(ConfigError::category_not_found(category_name));
        }
        self.storage.delete_children_of(category_name).await?;
        Ok(())
    }

    /// Deletes a category and all of its descendants, children before
    /// parents, refusing outright when the subtree reaches a reserved
    /// category.
    pub async fn delete_category_and_children_recursively(
        &self,
        category_name: &str,
    ) -> Result<(), ConfigError> {
        if self
            .storage
            .read_category_value(category_name)
            .await?
            .is_none()
        {
            return Err(ConfigError::category_not_found(category_name));
        }

        let subtree = self.collect_subtree(category_name).await?;
        for node in &subtree {
            if RESERVED_CATEGORIES.contains(&node.as_str()) {
                return Err(ConfigError::Reserved {
                    category: category_name.to_string(),
                    reserved: node.clone(),
                });
            }
        }

        // The subtree is in discovery order, parents first; walk it backwards
        // so children go before their parents.
        for node in subtree.iter().rev() {
            self.storage.delete_edges_to(node).await?;
            if self.storage.delete_category(node).await? > 0 {
                self.storage
                    .append_audit(
                        AuditCode::CategoryChanged,
                        serde_json::json!({"categoryDeleted": node}),
                    )
                    .await?;
            }
            self.cache.lock().unwrap().remove(node);
        }
        Ok(())
    }

    /// Walks the parent/child graph from `root`, returning every reachable
    /// category exactly once, in discovery order. Bounded in depth so a
    /// pathological graph reports an error instead of recursing forever.
    async fn collect_subtree(&self, root: &str) -> Result<Vec<String>, ConfigError> {
        let mut order = vec![root.to_string()];
        let mut seen: BTreeSet<String> = order.iter().cloned().collect();
        let mut stack = vec![(root.to_string(), 0usize)];

        while let Some((node, depth)) = stack.pop() {
            if depth >= MAX_TREE_DEPTH {
                return Err(ConfigError::Validation(format!(
                    "descendants of {root:?} exceed depth {MAX_TREE_DEPTH}"
                )));
            }
            for child in self.storage.read_children(&node).await? {
                if seen.insert(child.clone()) {
                    order.push(child.clone());
                    stack.push((child, depth + 1));
                }
            }
        }
        Ok(order)
    }

    /// Invokes every callback registered for `category_name`. A callback
    /// name which cannot be resolved, or a callback which fails, surfaces an
    /// error to the caller of the mutating operation; the configuration
    /// change itself stands.
    async fn run_callbacks(&self, category_name: &str) -> Result<(), ConfigError> {
        for name in self.interests.names_for(category_name) {
            let Some(callback) = self.interests.resolve(&name) else {
                tracing::error!(
                    callback = %name,
                    category = category_name,
                    "interest callback is not registered"
                );
                return Err(ConfigError::Callback(format!(
                    "callback {name:?} is not registered"
                )));
            };
            callback(category_name.to_string())
                .await
                .map_err(|err| {
                    ConfigError::Callback(format!(
                        "callback {name:?} failed for category {category_name:?}: {err:#}"
                    ))
                })?;
        }
        Ok(())
    }
}

fn to_raw(value: &CategoryValue) -> Result<serde_json::Value, ConfigError> {
    serde_json::to_value(value)
        .map_err(|err| ConfigError::Validation(format!("category value is not serializable: {err}")))
}
