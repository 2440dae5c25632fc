//! Request handlers for the memory HTTP API.

use crate::error::ApiError;
use axum::{
    Json,
    extract::{Path, State},
};
use chrono::Utc;
use convo_rs_memory::{ContextMessage, MemoryManager, MessageType, Role, UserStats};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub(crate) type SharedManager = Arc<MemoryManager>;

#[derive(Debug, Serialize)]
pub(crate) struct RootResponse {
    message: &'static str,
}

pub(crate) async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "Memory Service is running",
    })
}

#[derive(Debug, Serialize)]
pub(crate) struct HealthResponse {
    status: &'static str,
    backend: &'static str,
    max_messages_per_user: usize,
    max_context_messages: usize,
    memory_expire_days: u32,
}

pub(crate) async fn health(State(manager): State<SharedManager>) -> Json<HealthResponse> {
    let limits = manager.limits();
    Json(HealthResponse {
        status: "healthy",
        backend: manager.backend_name(),
        max_messages_per_user: limits.max_messages_per_user,
        max_context_messages: limits.max_context_messages,
        memory_expire_days: limits.expire_days,
    })
}

/// Plain acknowledgement used by write endpoints.
#[derive(Debug, Serialize)]
pub(crate) struct Ack {
    success: bool,
    message: String,
}

impl Ack {
    fn ok(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.into(),
        })
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct AddMessageRequest {
    user_id: String,
    role: Role,
    content: String,
    #[serde(default)]
    message_type: MessageType,
}

pub(crate) async fn add_message(
    State(manager): State<SharedManager>,
    Json(req): Json<AddMessageRequest>,
) -> Result<Json<Ack>, ApiError> {
    manager
        .add_message(&req.user_id, req.role, &req.content, req.message_type)
        .await?;
    Ok(Ack::ok("message added to memory"))
}

#[derive(Debug, Serialize)]
pub(crate) struct ContextResponse {
    success: bool,
    user_id: String,
    message_count: usize,
    context: Vec<ContextMessage>,
}

pub(crate) async fn conversation_context(
    State(manager): State<SharedManager>,
    Path(user_id): Path<String>,
) -> Result<Json<ContextResponse>, ApiError> {
    let context = manager.get_context(&user_id).await?;
    Ok(Json(ContextResponse {
        success: true,
        user_id,
        message_count: context.len(),
        context,
    }))
}

#[derive(Debug, Serialize)]
pub(crate) struct StatsResponse {
    success: bool,
    stats: UserStats,
}

pub(crate) async fn user_stats(
    State(manager): State<SharedManager>,
    Path(user_id): Path<String>,
) -> Result<Json<StatsResponse>, ApiError> {
    let stats = manager.get_stats(&user_id).await?;
    Ok(Json(StatsResponse {
        success: true,
        stats,
    }))
}

#[derive(Debug, Deserialize)]
pub(crate) struct ClearRequest {
    user_id: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ClearResponse {
    success: bool,
    message: String,
    cleared: bool,
}

pub(crate) async fn clear_memory(
    State(manager): State<SharedManager>,
    Json(req): Json<ClearRequest>,
) -> Result<Json<ClearResponse>, ApiError> {
    let cleared = manager.clear(&req.user_id).await?;
    let message = if cleared {
        format!("cleared memory for user {}", req.user_id)
    } else {
        format!("no memory stored for user {}", req.user_id)
    };
    Ok(Json(ClearResponse {
        success: true,
        message,
        cleared,
    }))
}

#[derive(Debug, Deserialize)]
pub(crate) struct PreferenceRequest {
    user_id: String,
    key: String,
    value: String,
}

pub(crate) async fn set_preference(
    State(manager): State<SharedManager>,
    Json(req): Json<PreferenceRequest>,
) -> Result<Json<Ack>, ApiError> {
    manager
        .set_preference(&req.user_id, &req.key, &req.value)
        .await?;
    Ok(Ack::ok(format!("preference {} set", req.key)))
}

#[derive(Debug, Serialize)]
pub(crate) struct CleanupResponse {
    success: bool,
    message: String,
    expired_count: usize,
}

pub(crate) async fn cleanup_expired(
    State(manager): State<SharedManager>,
) -> Result<Json<CleanupResponse>, ApiError> {
    let report = manager.sweep_expired(Utc::now()).await?;
    Ok(Json(CleanupResponse {
        success: true,
        message: format!("purged {} expired user memories", report.purged),
        expired_count: report.purged,
    }))
}

#[derive(Debug, Serialize)]
pub(crate) struct UsersResponse {
    success: bool,
    user_count: usize,
    users: Vec<String>,
}

pub(crate) async fn list_users(
    State(manager): State<SharedManager>,
) -> Result<Json<UsersResponse>, ApiError> {
    let users = manager.list_users().await?;
    Ok(Json(UsersResponse {
        success: true,
        user_count: users.len(),
        users,
    }))
}
