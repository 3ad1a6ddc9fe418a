use std::sync::Arc;

use axum::routing::{delete, get};

mod category;
mod error;

pub use error::ApiError;

/// Shared state of the API handlers.
pub struct App {
    pub store: Arc<config_store::ConfigStore>,
}

/// Builds the daemon's REST router over the configuration store.
pub fn build_router(store: Arc<config_store::ConfigStore>) -> axum::Router {
    let app = Arc::new(App { store });

    axum::Router::new()
        .route(
            "/category",
            get(category::get_categories).post(category::create_category),
        )
        .route(
            "/category/{name}",
            get(category::get_category)
                .put(category::update_bulk)
                .delete(category::delete_category),
        )
        .route(
            "/category/{name}/children",
            get(category::get_children).post(category::create_children),
        )
        .route(
            "/category/{name}/children/{child}",
            delete(category::delete_child),
        )
        .route("/category/{name}/parent", delete(category::delete_parent))
        .route(
            "/category/{name}/{item}",
            get(category::get_item)
                .put(category::set_item)
                .post(category::set_item),
        )
        .route(
            "/category/{name}/{item}/value",
            delete(category::delete_item_value),
        )
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(app)
}
