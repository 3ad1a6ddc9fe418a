mod cache;
mod error;
mod interests;
mod store;
mod validate;

pub use cache::CategoryCache;
pub use error::ConfigError;
pub use interests::{Callback, InterestRegistry};
pub use store::{CategoryNode, ConfigStore, RESERVED_CATEGORIES};
