use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde_json::json;

use super::{ApiError, App};

#[derive(Debug, serde::Deserialize)]
pub struct GroupQuery {
    root: Option<String>,
    children: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
pub struct CreateQuery {
    keep_original_items: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
pub struct CreateBody {
    key: String,
    description: String,
    value: serde_json::Value,
    #[serde(rename = "displayName", default)]
    display_name: Option<String>,
    #[serde(default)]
    children: Option<Vec<String>>,
}

/// Query flags arrive as the literal strings "true" / "false"; anything else
/// reads as unset.
fn parse_flag(flag: &Option<String>) -> Option<bool> {
    match flag.as_deref().map(str::to_ascii_lowercase).as_deref() {
        Some("true") => Some(true),
        Some("false") => Some(false),
        _ => None,
    }
}

/// GET /category: all categories, or the root/non-root partition, or the
/// nested forest when `children=true`.
pub async fn get_categories(
    State(app): State<Arc<App>>,
    Query(query): Query<GroupQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Some(root) = parse_flag(&query.root) else {
        let flat: Vec<_> = app
            .store
            .get_all_category_names()
            .await?
            .into_iter()
            .map(|c| json!({"key": c.key, "description": c.description}))
            .collect();
        return Ok(Json(json!({ "categories": flat })));
    };

    let with_children = parse_flag(&query.children).unwrap_or(false);
    let nodes = app.store.get_categories_grouped(root, with_children).await?;
    if with_children {
        Ok(Json(json!({ "categories": nodes })))
    } else {
        let flat: Vec<_> = nodes
            .into_iter()
            .map(|n| json!({"key": n.key, "description": n.description}))
            .collect();
        Ok(Json(json!({ "categories": flat })))
    }
}

/// POST /category: create or merge a category, optionally attaching
/// children.
pub async fn create_category(
    State(app): State<Arc<App>>,
    Query(query): Query<CreateQuery>,
    Json(body): Json<CreateBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let keep_original_items = match &query.keep_original_items {
        None => false,
        Some(flag) => parse_flag(&Some(flag.clone())).ok_or_else(|| {
            ApiError::bad_request(format!(
                "only 'true' and 'false' are allowed for keep_original_items. {flag} given."
            ))
        })?,
    };

    app.store
        .create_category(
            &body.key,
            body.value,
            &body.description,
            keep_original_items,
            body.display_name.as_deref(),
        )
        .await?;

    let value = app
        .store
        .get_category_all_items(&body.key)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("no such category {:?}", body.key)))?;

    let mut response = json!({
        "key": body.key,
        "description": body.description,
        "value": value,
    });
    if let Some(children) = &body.children {
        let linked = app.store.create_child_category(&body.key, children).await?;
        response["children"] = json!(linked);
    }
    Ok(Json(response))
}

/// GET /category/{name}
pub async fn get_category(
    State(app): State<Arc<App>>,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let value = app
        .store
        .get_category_all_items(&name)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("no such category found for {name:?}")))?;
    Ok(Json(json!(value)))
}

/// DELETE /category/{name}: the category and its whole subtree.
pub async fn delete_category(
    State(app): State<Arc<App>>,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    app.store
        .delete_category_and_children_recursively(&name)
        .await?;
    Ok(Json(
        json!({"result": format!("category {name} with all its children deleted successfully")}),
    ))
}

/// GET /category/{name}/{item}
pub async fn get_item(
    State(app): State<Arc<App>>,
    Path((name, item)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let item = app
        .store
        .get_category_item(&name, &item)
        .await?
        .ok_or_else(|| {
            ApiError::not_found(format!("no such category item found for {name:?}"))
        })?;
    Ok(Json(json!(item)))
}

/// PUT or POST /category/{name}/{item}: body `{"value": ...}`.
pub async fn set_item(
    State(app): State<Arc<App>>,
    Path((name, item)): Path<(String, String)>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Some(new_value) = body.get("value").cloned() else {
        return Err(ApiError::bad_request(format!(
            "missing required value for {item:?}"
        )));
    };
    app.store
        .set_category_item_value_entry(&name, &item, new_value)
        .await?;

    let item = app
        .store
        .get_category_item(&name, &item)
        .await?
        .ok_or_else(|| {
            ApiError::not_found(format!("no such category item found for {name:?}"))
        })?;
    Ok(Json(json!(item)))
}

/// DELETE /category/{name}/{item}/value: reset the value to its default.
pub async fn delete_item_value(
    State(app): State<Arc<App>>,
    Path((name, item)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let item = app
        .store
        .delete_category_item_value_entry(&name, &item)
        .await?;
    Ok(Json(json!(item)))
}

/// GET /category/{name}/children
pub async fn get_children(
    State(app): State<Arc<App>>,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let children = app.store.get_category_children(&name).await?;
    Ok(Json(json!({ "categories": children })))
}

/// POST /category/{name}/children: body `{"children": [...]}`.
pub async fn create_children(
    State(app): State<Arc<App>>,
    Path(name): Path<String>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let children: Vec<String> = body
        .get("children")
        .and_then(|c| serde_json::from_value(c.clone()).ok())
        .ok_or_else(|| ApiError::bad_request("children must be a list of category keys"))?;

    let linked = app.store.create_child_category(&name, &children).await?;
    Ok(Json(json!({ "children": linked })))
}

/// DELETE /category/{name}/children/{child}
pub async fn delete_child(
    State(app): State<Arc<App>>,
    Path((name, child)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let remaining = app.store.delete_child_category(&name, &child).await?;
    Ok(Json(json!({ "children": remaining })))
}

/// DELETE /category/{name}/parent
pub async fn delete_parent(
    State(app): State<Arc<App>>,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    app.store.delete_parent_category(&name).await?;
    Ok(Json(
        json!({"message": format!("parent-child relationship for the parent {name} is deleted")}),
    ))
}

/// PUT /category/{name} bulk item updates: body `{item: value, ...}`.
pub async fn update_bulk(
    State(app): State<Arc<App>>,
    Path(name): Path<String>,
    Json(body): Json<BTreeMap<String, serde_json::Value>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    app.store
        .update_configuration_item_bulk(&name, &body)
        .await?;
    let value = app
        .store
        .get_category_all_items(&name)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("no such category found for {name:?}")))?;
    Ok(Json(json!(value)))
}
