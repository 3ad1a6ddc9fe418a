use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;

/// Callback is a registered interest handler. It receives the name of the
/// changed category.
pub type Callback = Arc<dyn Fn(String) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// InterestRegistry tracks which callbacks care about which categories.
///
/// Callbacks are registered under a string identifier and interests reference
/// them by that identifier; resolution happens at invocation time, so an
/// interest may be registered before its callback exists. Both maps are
/// in-memory only and are never persisted.
#[derive(Default)]
pub struct InterestRegistry {
    callbacks: Mutex<BTreeMap<String, Callback>>,
    interests: Mutex<BTreeMap<String, BTreeSet<String>>>,
}

impl InterestRegistry {
    /// Registers (or replaces) the callback known by `name`.
    pub fn define<F>(&self, name: &str, callback: F)
    where
        F: Fn(String) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync + 'static,
    {
        self.callbacks
            .lock()
            .unwrap()
            .insert(name.to_string(), Arc::new(callback));
    }

    /// Registers an interest of `callback_name` in changes of `category_name`.
    pub fn register(&self, category_name: &str, callback_name: &str) {
        self.interests
            .lock()
            .unwrap()
            .entry(category_name.to_string())
            .or_default()
            .insert(callback_name.to_string());
    }

    /// Drops an interest. Removing the last interest of a category drops the
    /// category's entry entirely.
    pub fn unregister(&self, category_name: &str, callback_name: &str) {
        let mut interests = self.interests.lock().unwrap();
        if let Some(names) = interests.get_mut(category_name) {
            names.remove(callback_name);
            if names.is_empty() {
                interests.remove(category_name);
            }
        }
    }

    /// Names of all callbacks interested in `category_name`.
    pub(crate) fn names_for(&self, category_name: &str) -> Vec<String> {
        self.interests
            .lock()
            .unwrap()
            .get(category_name)
            .map(|names| names.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn resolve(&self, callback_name: &str) -> Option<Callback> {
        self.callbacks.lock().unwrap().get(callback_name).cloned()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use futures::FutureExt;

    #[test]
    fn interests_are_tracked_per_category() {
        let registry = InterestRegistry::default();
        registry.define("south", |_| async { Ok(()) }.boxed());

        registry.register("COAP", "south");
        registry.register("COAP", "monitor");
        registry.register("HTTP", "south");

        assert_eq!(registry.names_for("COAP"), vec!["monitor", "south"]);
        registry.unregister("COAP", "monitor");
        assert_eq!(registry.names_for("COAP"), vec!["south"]);
        registry.unregister("COAP", "south");
        assert!(registry.names_for("COAP").is_empty());

        assert!(registry.resolve("south").is_some());
        assert!(registry.resolve("monitor").is_none());
    }
}
