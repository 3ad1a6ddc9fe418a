use models::{CategoryItem, CategoryValue, ItemType};

use crate::ConfigError;

/// Validates a raw category value document and lifts it into a typed
/// [`CategoryValue`].
///
/// With `set_value_from_default`, the document describes a category being
/// created: supplying a `value` entry is an error, and each surviving item
/// gets `value := clean(type, default)`. Without it, the document is one
/// re-read from storage: every item must already carry a `value` entry.
pub(crate) fn validate_category_value(
    value: &serde_json::Value,
    set_value_from_default: bool,
) -> Result<CategoryValue, ConfigError> {
    if !value.is_object() {
        return Err(ConfigError::Validation(
            "category value must be a JSON object".to_string(),
        ));
    }
    // Entry names and entry-value shapes are enforced by the typed decode:
    // unknown entries, non-string entry values and bad type names all fail
    // here.
    let mut items: CategoryValue = serde_json::from_value(value.clone())
        .map_err(|err| ConfigError::Validation(format!("invalid category value: {err}")))?;

    for (item_name, item) in items.iter_mut() {
        if set_value_from_default && item.value.is_some() {
            return Err(ConfigError::Validation(format!(
                "specifying a value entry for item {item_name:?} is not allowed; \
                 the default is used as the value"
            )));
        }
        if !set_value_from_default && item.value.is_none() {
            return Err(ConfigError::Validation(format!(
                "missing entry value for item {item_name:?}"
            )));
        }

        match (item.item_type, &item.options) {
            (ItemType::Enumeration, None) => {
                return Err(ConfigError::Validation(format!(
                    "options required for enumeration item {item_name:?}"
                )));
            }
            (ItemType::Enumeration, Some(options)) => {
                if options.is_empty() {
                    return Err(ConfigError::Validation(format!(
                        "options cannot be an empty list for item {item_name:?}"
                    )));
                }
                if !options.contains(&item.default) {
                    return Err(ConfigError::Validation(format!(
                        "default value does not exist in options list for item {item_name:?}"
                    )));
                }
            }
            (_, Some(_)) => {
                return Err(ConfigError::Validation(format!(
                    "unrecognized entry options for item {item_name:?}"
                )));
            }
            (_, None) => {}
        }

        for (entry_name, entry_value) in [
            ("readonly", &item.readonly),
            ("deprecated", &item.deprecated),
        ] {
            if let Some(v) = entry_value {
                if !ItemType::Boolean.validate(&serde_json::Value::String(v.clone())) {
                    return Err(ConfigError::Validation(format!(
                        "entry value must be boolean for entry {entry_name:?} of item {item_name:?}"
                    )));
                }
            }
        }
        for (entry_name, entry_value) in [("minimum", &item.minimum), ("maximum", &item.maximum)] {
            if let Some(v) = entry_value {
                let v = serde_json::Value::String(v.clone());
                if !ItemType::Integer.validate(&v) && !ItemType::Float.validate(&v) {
                    return Err(ConfigError::Validation(format!(
                        "entry value must be an integer or float for entry {entry_name:?} \
                         of item {item_name:?}"
                    )));
                }
            }
        }
        for (entry_name, entry_value) in [("order", &item.order), ("length", &item.length)] {
            if let Some(v) = entry_value {
                if !ItemType::Integer.validate(&serde_json::Value::String(v.clone())) {
                    return Err(ConfigError::Validation(format!(
                        "entry value must be an integer for entry {entry_name:?} of item {item_name:?}"
                    )));
                }
            }
        }

        if !item
            .item_type
            .validate(&serde_json::Value::String(item.default.clone()))
        {
            return Err(ConfigError::Validation(format!(
                "unrecognized value for item {item_name:?}"
            )));
        }

        item.readonly = item.readonly.as_deref().map(str::to_ascii_lowercase);
        item.deprecated = item.deprecated.as_deref().map(str::to_ascii_lowercase);

        if set_value_from_default {
            if let Some(default) = item
                .item_type
                .clean(serde_json::Value::String(item.default.clone()))
                .as_str()
            {
                item.default = default.to_string();
            }
            item.value = Some(serde_json::Value::String(item.default.clone()));
        }
    }

    Ok(items)
}

/// Validates a new value for an existing item: enumeration membership for
/// enumeration items, the type's own validator otherwise.
pub(crate) fn validate_item_update(
    item_name: &str,
    item: &CategoryItem,
    new_value: &serde_json::Value,
) -> Result<(), ConfigError> {
    match item.item_type {
        ItemType::Enumeration => {
            let new_value = new_value.as_str().unwrap_or_default();
            if new_value.is_empty() {
                return Err(ConfigError::Validation("entry_val cannot be empty".to_string()));
            }
            let options = item.options.as_deref().unwrap_or_default();
            if !options.iter().any(|o| o == new_value) {
                return Err(ConfigError::Validation(
                    "new value does not exist in options enum".to_string(),
                ));
            }
        }
        item_type => {
            if !item_type.validate(new_value) {
                return Err(ConfigError::Validation(format!(
                    "unrecognized value for item {item_name:?}"
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_fills_value_from_cleaned_default() {
        let items = validate_category_value(
            &json!({
                "age": {"description": "d", "type": "integer", "default": "72"},
                "factor": {"description": "d", "type": "float", "default": "2"},
                "enabled": {"description": "d", "type": "boolean", "default": "TRUE"},
            }),
            true,
        )
        .unwrap();

        assert_eq!(items["age"].value, Some(json!("72")));
        assert_eq!(items["factor"].default, "2.0");
        assert_eq!(items["factor"].value, Some(json!("2.0")));
        assert_eq!(items["enabled"].default, "true");
    }

    #[test]
    fn unknown_entry_names_are_rejected() {
        let err = validate_category_value(
            &json!({"age": {"description": "d", "type": "integer", "default": "1", "colour": "red"}}),
            true,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)), "{err}");
    }

    #[test]
    fn value_entry_is_rejected_on_create_and_required_from_storage() {
        let doc = json!({"age": {"description": "d", "type": "integer", "default": "1", "value": "2"}});
        assert!(validate_category_value(&doc, true).is_err());
        assert!(validate_category_value(&doc, false).is_ok());

        let bare = json!({"age": {"description": "d", "type": "integer", "default": "1"}});
        assert!(validate_category_value(&bare, false).is_err());
    }

    #[test]
    fn missing_required_entries_are_rejected() {
        for doc in [
            json!({"age": {"type": "integer", "default": "1"}}),
            json!({"age": {"description": "d", "default": "1"}}),
            json!({"age": {"description": "d", "type": "integer"}}),
        ] {
            assert!(validate_category_value(&doc, true).is_err());
        }
    }

    #[test]
    fn enumeration_requires_options_containing_default() {
        assert!(validate_category_value(
            &json!({"color": {"description": "d", "type": "enumeration", "default": "red"}}),
            true,
        )
        .is_err());
        assert!(validate_category_value(
            &json!({"color": {"description": "d", "type": "enumeration", "default": "red",
                              "options": []}}),
            true,
        )
        .is_err());
        assert!(validate_category_value(
            &json!({"color": {"description": "d", "type": "enumeration", "default": "green",
                              "options": ["red", "blue"]}}),
            true,
        )
        .is_err());
        assert!(validate_category_value(
            &json!({"color": {"description": "d", "type": "enumeration", "default": "red",
                              "options": ["red", "blue"]}}),
            true,
        )
        .is_ok());
    }

    #[test]
    fn options_on_a_non_enumeration_item_is_rejected() {
        assert!(validate_category_value(
            &json!({"age": {"description": "d", "type": "integer", "default": "1",
                            "options": ["1"]}}),
            true,
        )
        .is_err());
    }

    #[test]
    fn optional_entries_are_type_checked() {
        let base = |extra: serde_json::Value| {
            let mut item = json!({"description": "d", "type": "integer", "default": "1"});
            item.as_object_mut()
                .unwrap()
                .extend(extra.as_object().unwrap().clone());
            json!({ "age": item })
        };

        assert!(validate_category_value(&base(json!({"readonly": "sure"})), true).is_err());
        assert!(validate_category_value(&base(json!({"readonly": "TRUE"})), true).is_ok());
        assert!(validate_category_value(&base(json!({"minimum": "abc"})), true).is_err());
        assert!(validate_category_value(&base(json!({"minimum": "0.5"})), true).is_ok());
        assert!(validate_category_value(&base(json!({"order": "1.5"})), true).is_err());
        assert!(validate_category_value(&base(json!({"order": "3"})), true).is_ok());
        assert!(validate_category_value(&base(json!({"displayName": "Age"})), true).is_ok());
    }

    #[test]
    fn default_must_validate_under_the_declared_type() {
        assert!(validate_category_value(
            &json!({"age": {"description": "d", "type": "integer", "default": "old"}}),
            true,
        )
        .is_err());
        assert!(validate_category_value(
            &json!({"addr": {"description": "d", "type": "IPv4", "default": "500.1.1.1"}}),
            true,
        )
        .is_err());
    }

    #[test]
    fn readonly_and_deprecated_are_lowercased() {
        let items = validate_category_value(
            &json!({"age": {"description": "d", "type": "integer", "default": "1",
                            "readonly": "TRUE", "deprecated": "False"}}),
            true,
        )
        .unwrap();
        assert_eq!(items["age"].readonly.as_deref(), Some("true"));
        assert_eq!(items["age"].deprecated.as_deref(), Some("false"));
    }
}
