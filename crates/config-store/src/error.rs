use storage::StorageError;

/// ConfigError is a failure of a configuration-store operation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Bad input shape, unknown entry name, type mismatch, enumeration
    /// constraint, or missing required entry.
    #[error("{0}")]
    Validation(String),
    /// The named category, item, or child does not exist.
    #[error("{0}")]
    NotFound(String),
    /// A recursive delete would remove a reserved category.
    #[error("reserved category {reserved:?} found in subtree of {category:?}")]
    Reserved { category: String, reserved: String },
    /// The storage service failed. Validation short-circuits before writes,
    /// so in-memory state is untouched when this surfaces.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// A registered interest could not be resolved or its callback failed.
    /// The configuration change it follows is not rolled back.
    #[error("{0}")]
    Callback(String),
}

impl ConfigError {
    pub(crate) fn category_not_found(name: &str) -> Self {
        Self::NotFound(format!("no such category {name:?}"))
    }

    pub(crate) fn item_not_found(category: &str, item: &str) -> Self {
        Self::NotFound(format!(
            "no detail found for category {category:?} and item {item:?}"
        ))
    }
}
