//! Typed access to the REST API.
//!
//! Responses are unwrapped leniently: lists may arrive bare, under `data`,
//! under `data.items` or under a named key, and counts under several
//! spellings. Shapes that match none of these read as empty.

use std::sync::{PoisonError, RwLock};

use reqwest::{Client, Method};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::debug;
use uuid::Uuid;

use refuge_types::api::{
    AuthResponse, CreateMatchRequest, CreateNeedRequest, CreateOfferRequest, LoginRequest,
    RespondMatchRequest, SendMessageRequest,
};
use refuge_types::models::{
    Announcement, Conversation, Match, Message, Need, Notification, Offer, User,
};

use crate::config::ClientConfig;
use crate::error::ClientError;

pub struct RestClient {
    http: Client,
    base_url: String,
    token: RwLock<Option<String>>,
}

impl RestClient {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            http: Client::new(),
            base_url: config.api_url.clone(),
            token: RwLock::new(None),
        }
    }

    pub fn set_token(&self, token: Option<String>) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = token;
    }

    pub fn token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        authenticated: bool,
        body: Option<Value>,
    ) -> Result<Value, ClientError> {
        let mut req = self.http.request(method.clone(), format!("{}{}", self.base_url, path));
        if authenticated {
            let token = self.token().ok_or(ClientError::NotAuthenticated)?;
            req = req.bearer_auth(token);
        }
        if let Some(body) = body {
            req = req.json(&body);
        }

        let resp = req.send().await?;
        let status = resp.status();
        let text = resp.text().await?;
        debug!("{} {} -> {}", method, path, status);

        if !status.is_success() {
            return Err(ClientError::Http {
                status: status.as_u16(),
                message: error_message(&text),
            });
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }

    async fn list<T: DeserializeOwned>(
        &self,
        path: &str,
        key: &str,
        authenticated: bool,
    ) -> Result<Vec<T>, ClientError> {
        let value = self.request(Method::GET, path, authenticated, None).await?;
        Ok(serde_json::from_value(Value::Array(extract_list(value, key)))?)
    }

    /// Authenticated write that answers with a single record.
    async fn submit<B, T>(&self, method: Method, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize,
        T: DeserializeOwned,
    {
        let body = serde_json::to_value(body)?;
        let value = self.request(method, path, true, Some(body)).await?;
        Ok(serde_json::from_value(unwrap_data(value))?)
    }

    async fn count(&self, method: Method, path: &str) -> Result<i64, ClientError> {
        let value = self.request(method, path, true, None).await?;
        Ok(extract_count(&value))
    }

    // -- Auth --

    /// Signs in and keeps the token for later calls.
    pub async fn login(&self, email: &str, password: &str) -> Result<User, ClientError> {
        let body = serde_json::to_value(LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        })?;
        let value = self.request(Method::POST, "/auth/login", false, Some(body)).await?;
        let auth: AuthResponse = serde_json::from_value(value)?;
        self.set_token(Some(auth.token));
        Ok(auth.user)
    }

    // -- Messaging --

    pub async fn conversations(&self) -> Result<Vec<Conversation>, ClientError> {
        self.list("/messages/conversations", "conversations", true).await
    }

    pub async fn messages(&self, conversation_id: Uuid) -> Result<Vec<Message>, ClientError> {
        let path = format!("/messages/conversations/{}/messages", conversation_id);
        self.list(&path, "messages", true).await
    }

    pub async fn send_message(
        &self,
        conversation_id: Uuid,
        content: &str,
    ) -> Result<Message, ClientError> {
        let body = SendMessageRequest {
            conversation_id,
            content: content.to_string(),
        };
        self.submit(Method::POST, "/messages/messages", &body).await
    }

    pub async fn mark_conversation_read(&self, conversation_id: Uuid) -> Result<i64, ClientError> {
        let path = format!("/messages/conversations/{}/read", conversation_id);
        self.count(Method::PATCH, &path).await
    }

    pub async fn message_unread_count(&self) -> Result<i64, ClientError> {
        self.count(Method::GET, "/messages/unread-count").await
    }

    // -- Notifications --

    pub async fn notifications(&self) -> Result<Vec<Notification>, ClientError> {
        self.list("/notifications", "notifications", true).await
    }

    pub async fn notification_unread_count(&self) -> Result<i64, ClientError> {
        self.count(Method::GET, "/notifications/unread-count").await
    }

    pub async fn mark_notifications_read(&self, ids: &[Uuid]) -> Result<i64, ClientError> {
        let body = json!({ "ids": ids, "read": true });
        let value = self
            .request(Method::PATCH, "/notifications", true, Some(body))
            .await?;
        Ok(extract_count(&value))
    }

    pub async fn mark_all_notifications_read(&self) -> Result<i64, ClientError> {
        self.count(Method::PATCH, "/notifications/read/all").await
    }

    // -- Board --

    pub async fn announcements(&self) -> Result<Vec<Announcement>, ClientError> {
        self.list("/announcements", "announcements", false).await
    }

    pub async fn needs(&self) -> Result<Vec<Need>, ClientError> {
        self.list("/needs", "needs", false).await
    }

    pub async fn offers(&self) -> Result<Vec<Offer>, ClientError> {
        self.list("/offers", "offers", false).await
    }

    pub async fn matches(&self) -> Result<Vec<Match>, ClientError> {
        self.list("/matches", "matches", true).await
    }

    pub async fn create_need(&self, req: &CreateNeedRequest) -> Result<Need, ClientError> {
        self.submit(Method::POST, "/needs", req).await
    }

    pub async fn create_offer(&self, req: &CreateOfferRequest) -> Result<Offer, ClientError> {
        self.submit(Method::POST, "/offers", req).await
    }

    pub async fn create_match(&self, req: &CreateMatchRequest) -> Result<Match, ClientError> {
        self.submit(Method::POST, "/matches", req).await
    }

    pub async fn respond_match(
        &self,
        id: Uuid,
        req: &RespondMatchRequest,
    ) -> Result<Match, ClientError> {
        let path = format!("/matches/{}/respond", id);
        self.submit(Method::PATCH, &path, req).await
    }
}

/// Pulls a list out of any of the accepted envelopes.
pub fn extract_list(value: Value, key: &str) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Object(mut map) => {
            match map.remove("data") {
                Some(Value::Array(items)) => return items,
                Some(Value::Object(mut data)) => {
                    if let Some(Value::Array(items)) = data.remove("items") {
                        return items;
                    }
                }
                _ => {}
            }
            match map.remove(key) {
                Some(Value::Array(items)) => items,
                _ => Vec::new(),
            }
        }
        _ => Vec::new(),
    }
}

/// Reads a count from a bare number, `count`, `unreadCount` or `data.count`.
pub fn extract_count(value: &Value) -> i64 {
    fn number(v: &Value) -> Option<i64> {
        v.as_i64().or_else(|| v.as_f64().map(|f| f as i64))
    }

    number(value)
        .or_else(|| value.get("count").and_then(number))
        .or_else(|| value.get("unreadCount").and_then(number))
        .or_else(|| value.get("data").and_then(|d| d.get("count")).and_then(number))
        .unwrap_or(0)
}

fn unwrap_data(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.get("data").is_some_and(Value::is_object) => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

/// Best-effort error text: `error`, then `message`, then the raw body.
fn error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        for key in ["error", "message"] {
            if let Some(msg) = value.get(key).and_then(Value::as_str) {
                return msg.to_string();
            }
        }
    }
    body.trim().to_string()
}
