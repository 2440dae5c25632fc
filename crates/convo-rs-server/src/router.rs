use crate::api;
use axum::{
    Router,
    routing::{get, post},
};
use convo_rs_memory::MemoryManager;
use std::sync::Arc;

/// Build the memory service router over a shared manager.
pub fn build_router(manager: Arc<MemoryManager>) -> Router {
    Router::new()
        .route("/", get(api::root))
        .route("/health", get(api::health))
        .route("/add_message", post(api::add_message))
        .route(
            "/conversation_context/{user_id}",
            get(api::conversation_context),
        )
        .route("/user_stats/{user_id}", get(api::user_stats))
        .route("/clear_memory", post(api::clear_memory))
        .route("/set_preference", post(api::set_preference))
        .route("/cleanup_expired", post(api::cleanup_expired))
        .route("/list_users", get(api::list_users))
        .with_state(manager)
}
