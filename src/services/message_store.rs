//! Client for the hosted backend's `contact_messages` table.
//!
//! The backend speaks a PostgREST-style API: row filters ride in the query
//! string, the caller's access token rides in the Authorization header and the
//! backend enforces row-level access with it. This service adds no access
//! control of its own.

use axum::http::StatusCode;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;

use crate::models::{ContactMessage, MessageStatus, NewMessage};

const MESSAGES_SELECT: &str =
    "*,sender:profiles!sender_id(name,email,phone),recipient:profiles!recipient_id(name,email,phone)";

/// Upstream failure, carried to the HTTP layer unchanged so clients see the
/// backend's own status and error body.
#[derive(Debug, Clone)]
pub struct StoreError {
    pub status: StatusCode,
    pub body: Option<Value>,
}

impl StoreError {
    fn new(status: StatusCode, body: Option<Value>) -> Self {
        Self { status, body }
    }
}

fn connect_failed(url: &str, err: impl ToString) -> StoreError {
    StoreError::new(
        StatusCode::BAD_GATEWAY,
        Some(serde_json::json!({
            "error": "connect_failed",
            "detail": err.to_string(),
            "url": url
        })),
    )
}

/// Which rows a fetch asks the backend for. The backend re-checks the token's
/// row-level permissions either way; this only shapes the query.
#[derive(Debug, Clone)]
pub enum MessageScope {
    /// Admin inbox: no participant filter.
    All,
    /// Rows where the given user is sender or recipient.
    Participant(String),
}

fn messages_url(base_url: &str, scope: &MessageScope) -> String {
    let mut url = format!(
        "{}/rest/v1/contact_messages?select={}&order=created_at.desc",
        base_url.trim_end_matches('/'),
        MESSAGES_SELECT
    );
    if let MessageScope::Participant(user_id) = scope {
        url.push_str(&format!(
            "&or=(sender_id.eq.{},recipient_id.eq.{})",
            user_id, user_id
        ));
    }
    url
}

fn status_patch_url(base_url: &str, message_ids: &[String]) -> String {
    format!(
        "{}/rest/v1/contact_messages?id=in.({})",
        base_url.trim_end_matches('/'),
        message_ids.join(",")
    )
}

/// One store per process, built in `main` and handed to the router as state.
#[derive(Clone)]
pub struct MessageStore {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl MessageStore {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
        }
    }

    pub fn from_env() -> Self {
        let base_url =
            std::env::var("BACKEND_URL").unwrap_or_else(|_| "http://127.0.0.1:54321".to_string());
        let api_key = std::env::var("BACKEND_API_KEY").unwrap_or_default();
        Self::new(base_url, api_key)
    }

    fn headers(&self, token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(auth_value) = HeaderValue::from_str(&format!("Bearer {}", token)) {
            headers.insert(AUTHORIZATION, auth_value);
        }
        if let Ok(key_value) = HeaderValue::from_str(&self.api_key) {
            headers.insert("apikey", key_value);
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers
    }

    /// Full visible message set for the viewer. Every caller regroups from
    /// scratch; there is no incremental fetch.
    pub async fn fetch_messages(
        &self,
        token: &str,
        scope: &MessageScope,
    ) -> Result<Vec<ContactMessage>, StoreError> {
        let url = messages_url(&self.base_url, scope);
        let resp = self
            .client
            .get(&url)
            .headers(self.headers(token))
            .send()
            .await
            .map_err(|e| connect_failed(&url, e))?;

        let status =
            StatusCode::from_u16(resp.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
        if !status.is_success() {
            let body: Option<Value> = resp.json().await.ok();
            return Err(StoreError::new(status, body));
        }
        resp.json().await.map_err(|e| connect_failed(&url, e))
    }

    /// Patches `status` on the given rows. No body is consumed beyond
    /// success/failure; callers refetch instead of patching local state.
    pub async fn update_status(
        &self,
        token: &str,
        message_ids: &[String],
        status: MessageStatus,
    ) -> Result<(), StoreError> {
        if message_ids.is_empty() {
            return Ok(());
        }
        let url = status_patch_url(&self.base_url, message_ids);
        let resp = self
            .client
            .patch(&url)
            .headers(self.headers(token))
            .header("Prefer", "return=minimal")
            .json(&serde_json::json!({
                "status": status,
                "updated_at": chrono::Utc::now()
            }))
            .send()
            .await
            .map_err(|e| connect_failed(&url, e))?;

        let http_status =
            StatusCode::from_u16(resp.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
        if !http_status.is_success() {
            let body: Option<Value> = resp.json().await.ok();
            return Err(StoreError::new(http_status, body));
        }
        Ok(())
    }

    /// Inserts a message (reply) and returns the created row.
    pub async fn create_message(
        &self,
        token: &str,
        new_message: &NewMessage,
    ) -> Result<ContactMessage, StoreError> {
        let url = format!(
            "{}/rest/v1/contact_messages",
            self.base_url.trim_end_matches('/')
        );
        let resp = self
            .client
            .post(&url)
            .headers(self.headers(token))
            .header("Prefer", "return=representation")
            .json(new_message)
            .send()
            .await
            .map_err(|e| connect_failed(&url, e))?;

        let status =
            StatusCode::from_u16(resp.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
        if !status.is_success() {
            let body: Option<Value> = resp.json().await.ok();
            return Err(StoreError::new(status, body));
        }

        // Inserts come back as a one-row array.
        let mut rows: Vec<ContactMessage> =
            resp.json().await.map_err(|e| connect_failed(&url, e))?;
        rows.pop().ok_or_else(|| {
            StoreError::new(
                StatusCode::BAD_GATEWAY,
                Some(serde_json::json!({ "error": "empty_insert_response" })),
            )
        })
    }

    /// Reachability probe against the backend's API root.
    pub async fn health(&self) -> Result<Value, StoreError> {
        let url = format!("{}/rest/v1/", self.base_url.trim_end_matches('/'));
        let resp = self
            .client
            .get(&url)
            .header("apikey", &self.api_key)
            .send()
            .await
            .map_err(|e| connect_failed(&url, e))?;

        let status =
            StatusCode::from_u16(resp.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
        if !status.is_success() {
            return Err(StoreError::new(
                status,
                Some(serde_json::json!({ "status": status.as_u16() })),
            ));
        }
        Ok(serde_json::json!({ "status": "ok" }))
    }
}
