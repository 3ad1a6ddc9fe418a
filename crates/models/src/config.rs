use std::collections::BTreeMap;

/// ItemType is the declared type of a configuration item.
/// All item values travel as strings; the validate / clean pair below is the
/// single place where those strings meet typed semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ItemType {
    #[serde(rename = "boolean")]
    Boolean,
    #[serde(rename = "integer")]
    Integer,
    #[serde(rename = "float")]
    Float,
    #[serde(rename = "string")]
    String,
    #[serde(rename = "IPv4")]
    IPv4,
    #[serde(rename = "IPv6")]
    IPv6,
    #[serde(rename = "X509 certificate")]
    X509Certificate,
    #[serde(rename = "password")]
    Password,
    #[serde(rename = "JSON")]
    Json,
    #[serde(rename = "URL")]
    Url,
    #[serde(rename = "enumeration")]
    Enumeration,
    #[serde(rename = "script")]
    Script,
}

impl ItemType {
    /// Returns whether `value` is acceptable for this type.
    ///
    /// Enumerations have no intrinsic validator (membership in `options` is an
    /// item-level concern), and password / X509 / script content is accepted
    /// as-is: only the string shape is checked.
    pub fn validate(&self, value: &serde_json::Value) -> bool {
        let as_str = value.as_str();
        match self {
            ItemType::Boolean => matches!(
                as_str, Some(s) if s.eq_ignore_ascii_case("true") || s.eq_ignore_ascii_case("false")
            ),
            ItemType::Integer => {
                matches!(as_str, Some(s) if s.trim().parse::<i64>().is_ok())
            }
            ItemType::Float => {
                matches!(as_str, Some(s) if s.trim().parse::<f64>().is_ok())
            }
            ItemType::String | ItemType::Password | ItemType::X509Certificate | ItemType::Script => {
                value.is_string()
            }
            // Both tags accept a textual address of either family; the tag
            // is not enforced against the address family.
            ItemType::IPv4 | ItemType::IPv6 => {
                matches!(as_str, Some(s) if s.parse::<std::net::IpAddr>().is_ok())
            }
            ItemType::Url => match as_str.map(url::Url::parse) {
                Some(Ok(url)) => !url.scheme().is_empty() && url.has_host(),
                _ => false,
            },
            ItemType::Json => {
                value.is_object()
                    || matches!(as_str, Some(s) if serde_json::from_str::<serde_json::Value>(s).is_ok())
            }
            ItemType::Enumeration => true,
        }
    }

    /// Normalizes an accepted value: booleans are lowercased and floats are
    /// re-rendered in their canonical decimal form. Everything else passes
    /// through unchanged. Stable under repeated application.
    pub fn clean(&self, value: serde_json::Value) -> serde_json::Value {
        match self {
            ItemType::Boolean => match value.as_str() {
                Some(s) => serde_json::Value::String(s.to_ascii_lowercase()),
                None => value,
            },
            ItemType::Float => match value.as_str().and_then(|s| s.trim().parse::<f64>().ok()) {
                Some(f) => serde_json::Value::String(format!("{f:?}")),
                None => value,
            },
            _ => value,
        }
    }
}

/// CategoryItem is one keyed configuration parameter of a category.
///
/// `description`, `type` and `default` are always present. `value` appears
/// once the item has been persisted. Entry names outside this set are
/// rejected at deserialization.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CategoryItem {
    pub description: String,
    #[serde(rename = "type")]
    pub item_type: ItemType,
    pub default: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    /// Required for (and only valid on) enumeration items.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub readonly: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<String>,
    #[serde(rename = "displayName", skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl CategoryItem {
    pub fn is_deprecated(&self) -> bool {
        self.deprecated.as_deref() == Some("true")
    }
}

/// CategoryValue maps item names to their specifications.
/// A BTreeMap so that serializations are key-ordered and comparisons are
/// independent of insertion order.
pub type CategoryValue = BTreeMap<String, CategoryItem>;

/// CategoryRow is a persisted row of the `configuration` table.
/// `value` is kept as raw JSON: rows are only lifted into [`CategoryValue`]
/// after validation, so that a corrupted document can be detected rather
/// than refused at decode time.
#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct CategoryRow {
    pub key: String,
    pub description: String,
    pub value: serde_json::Value,
    pub display_name: String,
    pub ts: chrono::DateTime<chrono::Utc>,
}

/// CategoryInfo is the listing projection of a category.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct CategoryInfo {
    pub key: String,
    pub description: String,
    #[serde(rename = "displayName")]
    pub display_name: String,
}

#[cfg(test)]
mod test {
    use super::ItemType;
    use serde_json::{json, Value};

    fn s(v: &str) -> Value {
        Value::String(v.to_string())
    }

    #[test]
    fn boolean_validation_is_case_insensitive() {
        assert!(ItemType::Boolean.validate(&s("true")));
        assert!(ItemType::Boolean.validate(&s("FALSE")));
        assert!(ItemType::Boolean.validate(&s("True")));
        assert!(!ItemType::Boolean.validate(&s("yes")));
        assert!(!ItemType::Boolean.validate(&json!(true)));
    }

    #[test]
    fn numeric_validation() {
        assert!(ItemType::Integer.validate(&s("72")));
        assert!(ItemType::Integer.validate(&s("-3")));
        assert!(!ItemType::Integer.validate(&s("7.2")));
        assert!(!ItemType::Integer.validate(&s("seven")));

        assert!(ItemType::Float.validate(&s("7.2")));
        assert!(ItemType::Float.validate(&s("72")));
        assert!(!ItemType::Float.validate(&s("7,2")));
    }

    #[test]
    fn address_and_url_validation() {
        assert!(ItemType::IPv4.validate(&s("127.0.0.1")));
        assert!(ItemType::IPv6.validate(&s("::1")));
        // The declared family is not enforced; any parseable address passes.
        assert!(ItemType::IPv4.validate(&s("::1")));
        assert!(ItemType::IPv6.validate(&s("127.0.0.1")));
        assert!(!ItemType::IPv4.validate(&s("256.0.0.1")));
        assert!(!ItemType::IPv6.validate(&s("not an address")));

        assert!(ItemType::Url.validate(&s("http://example.com/path")));
        assert!(ItemType::Url.validate(&s("coap://[::1]:5683")));
        // A scheme alone is not enough: the host must be present.
        assert!(!ItemType::Url.validate(&s("file:///etc/passwd")));
        assert!(!ItemType::Url.validate(&s("not a url")));
    }

    #[test]
    fn json_accepts_objects_and_parseable_strings() {
        assert!(ItemType::Json.validate(&json!({"a": 1})));
        assert!(ItemType::Json.validate(&s(r#"{"a": 1}"#)));
        assert!(!ItemType::Json.validate(&s(r#"{"a": "#)));
    }

    #[test]
    fn opaque_types_accept_any_string() {
        for t in [
            ItemType::Password,
            ItemType::X509Certificate,
            ItemType::Script,
            ItemType::String,
        ] {
            assert!(t.validate(&s("anything at all")));
            assert!(!t.validate(&json!(42)));
        }
    }

    #[test]
    fn clean_normalizes_and_is_idempotent() {
        assert_eq!(ItemType::Boolean.clean(s("TRUE")), s("true"));
        assert_eq!(ItemType::Float.clean(s("72")), s("72.0"));
        assert_eq!(ItemType::Float.clean(s("003.50")), s("3.5"));
        assert_eq!(ItemType::Integer.clean(s("0042")), s("0042"));

        for (t, v) in [
            (ItemType::Boolean, "False"),
            (ItemType::Float, "1.25"),
            (ItemType::String, "x"),
        ] {
            let once = t.clean(s(v));
            assert_eq!(t.clean(once.clone()), once);
        }
    }

    #[test]
    fn item_type_serializes_to_wire_names() {
        assert_eq!(
            serde_json::to_value(ItemType::X509Certificate).unwrap(),
            json!("X509 certificate")
        );
        assert_eq!(serde_json::to_value(ItemType::Json).unwrap(), json!("JSON"));
        assert_eq!(
            serde_json::from_value::<ItemType>(json!("IPv6")).unwrap(),
            ItemType::IPv6
        );
        assert!(serde_json::from_value::<ItemType>(json!("ipv6")).is_err());
    }
}
