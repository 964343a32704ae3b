use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde::Deserialize;
use serde_json::Value;

use crate::models::{MessageStatus, MessageType, NewMessage};
use crate::services::message_store::{MessageScope, MessageStore, StoreError};
use crate::services::thread_service::{self, UnreadPolicy};
use crate::web::middleware::auth::{AuthenticatedUser, Role};

fn upstream_error(e: StoreError) -> (StatusCode, Json<Value>) {
    (
        e.status,
        Json(
            e.body
                .unwrap_or_else(|| serde_json::json!({ "error": "bad_gateway" })),
        ),
    )
}

/// Admins see the whole table; everyone else sees rows they participate in.
/// The backend re-applies its own row rules either way.
fn scope_for(auth: &AuthenticatedUser) -> MessageScope {
    match auth.role {
        Role::Admin => MessageScope::All,
        Role::Vendor | Role::User => MessageScope::Participant(auth.id.clone()),
    }
}

fn unread_policy_for(auth: &AuthenticatedUser) -> UnreadPolicy<'_> {
    match auth.role {
        Role::Admin => UnreadPolicy::All,
        Role::Vendor | Role::User => UnreadPolicy::Recipient(&auth.id),
    }
}

pub async fn list_messages_handler(
    State(store): State<MessageStore>,
    Extension(auth): Extension<AuthenticatedUser>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let messages = store
        .fetch_messages(&auth.token, &scope_for(&auth))
        .await
        .map_err(|e| {
            tracing::warn!(status = %e.status, body = ?e.body, "list_messages_failed");
            upstream_error(e)
        })?;

    Ok(Json(serde_json::json!({ "messages": messages })))
}

#[derive(Debug, Deserialize)]
pub struct ThreadsQuery {
    /// Thread id to open, typically carried over from the inbox URL.
    thread: Option<String>,
    status: Option<MessageStatus>,
}

pub async fn list_threads_handler(
    State(store): State<MessageStore>,
    Extension(auth): Extension<AuthenticatedUser>,
    Query(q): Query<ThreadsQuery>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let mut messages = store
        .fetch_messages(&auth.token, &scope_for(&auth))
        .await
        .map_err(|e| {
            tracing::warn!(status = %e.status, body = ?e.body, "list_threads_failed");
            upstream_error(e)
        })?;

    if let Some(status) = q.status {
        messages.retain(|m| m.status == status);
    }

    let threads = thread_service::group_threads(&messages, unread_policy_for(&auth));
    let active = thread_service::select_thread(&threads, q.thread.as_deref());

    Ok(Json(serde_json::json!({
        "threads": threads,
        "active_thread": active,
    })))
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdates {
    status: MessageStatus,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusBody {
    #[serde(rename = "messageIds")]
    message_ids: Vec<String>,
    updates: StatusUpdates,
}

pub async fn update_status_handler(
    State(store): State<MessageStore>,
    Extension(auth): Extension<AuthenticatedUser>,
    Json(body): Json<UpdateStatusBody>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if body.message_ids.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "empty_message_ids" })),
        ));
    }

    store
        .update_status(&auth.token, &body.message_ids, body.updates.status)
        .await
        .map_err(|e| {
            tracing::warn!(status = %e.status, body = ?e.body, "update_status_failed");
            upstream_error(e)
        })?;

    Ok(Json(serde_json::json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
pub struct ReplyBody {
    recipient_id: String,
    subject: String,
    message: String,
    item_type: Option<crate::models::ItemType>,
    item_id: Option<String>,
    thread_id: Option<String>,
    parent_message_id: Option<String>,
}

pub async fn send_reply_handler(
    State(store): State<MessageStore>,
    Extension(auth): Extension<AuthenticatedUser>,
    Json(body): Json<ReplyBody>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if body.message.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "empty_message" })),
        ));
    }
    if body.recipient_id.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "missing_recipient" })),
        ));
    }

    let new_message = NewMessage {
        sender_id: auth.id.clone(),
        recipient_id: body.recipient_id,
        subject: body.subject,
        message: body.message,
        item_type: body.item_type,
        item_id: body.item_id,
        thread_id: body.thread_id,
        parent_message_id: body.parent_message_id,
        message_type: MessageType::Response,
        status: MessageStatus::Unread,
    };

    let created = store
        .create_message(&auth.token, &new_message)
        .await
        .map_err(|e| {
            tracing::warn!(status = %e.status, body = ?e.body, "send_reply_failed");
            upstream_error(e)
        })?;

    Ok(Json(serde_json::json!({ "message": created })))
}

/// Opening a thread marks the viewer's unread messages in it as read, then
/// hands the thread back. Callers refetch the inbox afterwards; a failed
/// mark-as-read is logged and swallowed since the next fetch re-derives
/// everything anyway.
pub async fn open_thread_handler(
    State(store): State<MessageStore>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(thread_id): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let messages = store
        .fetch_messages(&auth.token, &scope_for(&auth))
        .await
        .map_err(|e| {
            tracing::warn!(status = %e.status, body = ?e.body, "open_thread_fetch_failed");
            upstream_error(e)
        })?;

    let threads = thread_service::group_threads(&messages, unread_policy_for(&auth));
    let Some(thread) = thread_service::select_thread(&threads, Some(&thread_id)) else {
        return Err((
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "thread_not_found", "thread_id": thread_id })),
        ));
    };

    let mut marked_read = thread_service::unread_message_ids(thread, &auth.id);
    if !marked_read.is_empty() {
        if let Err(e) = store
            .update_status(&auth.token, &marked_read, MessageStatus::Read)
            .await
        {
            tracing::warn!(status = %e.status, body = ?e.body, thread_id = %thread_id, "open_thread_mark_read_failed");
            marked_read.clear();
        }
    }

    Ok(Json(serde_json::json!({
        "thread": thread,
        "marked_read": marked_read,
    })))
}
