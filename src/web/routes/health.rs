use axum::{extract::State, http::StatusCode, Json};
use serde_json::Value;

use crate::services::message_store::MessageStore;

pub async fn health_handler(
    State(store): State<MessageStore>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    match store.health().await {
        Ok(v) => Ok(Json(v)),
        Err(e) => Err((
            e.status,
            Json(
                e.body
                    .unwrap_or_else(|| serde_json::json!({ "error": "bad_gateway" })),
            ),
        )),
    }
}
