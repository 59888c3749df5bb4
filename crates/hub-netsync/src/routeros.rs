//! MikroTik RouterOS v7 REST client
//!
//! ```text
//! GET    /rest/system/identity              connectivity check
//! GET    /rest/ip/hotspot/user?name=<u>     lookup
//! PUT    /rest/ip/hotspot/user              create
//! PATCH  /rest/ip/hotspot/user/<.id>        update / disable / password
//! DELETE /rest/ip/hotspot/user/<.id>        remove
//! GET    /rest/ip/hotspot/active[?user=<u>] sessions
//! POST   /rest/ip/hotspot/active/remove     kick
//! ```
//!
//! Credentials, address and timeout are read from the settings handle on
//! every request, so rotated credentials apply to the next call.

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;

use crate::client::{HotspotUser, RouterClient, RouterIdentity, UpsertOutcome};
use crate::error::RouterError;
use crate::settings::SettingsHandle;

const USER_PATH: &str = "/ip/hotspot/user";
const ACTIVE_PATH: &str = "/ip/hotspot/active";

/// RouterOS REST API client
#[derive(Debug, Clone)]
pub struct RouterOsClient {
    http: reqwest::Client,
    settings: SettingsHandle,
}

impl RouterOsClient {
    /// Client bound to a settings handle
    pub fn new(settings: SettingsHandle) -> Result<Self, RouterError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("hubspace-netsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RouterError::Connection(e.to_string()))?;
        Ok(Self { http, settings })
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<Value>,
    ) -> Result<Value, RouterError> {
        let settings = self.settings.load();
        let timeout = settings.timeout();
        let url = format!("{}/rest{}", settings.base_url(), path);

        let mut req = self
            .http
            .request(method.clone(), &url)
            .basic_auth(&settings.username, Some(&settings.password))
            .timeout(timeout);
        if !query.is_empty() {
            req = req.query(query);
        }
        if let Some(body) = body {
            req = req.json(&body);
        }

        tracing::debug!(method = %method, path, "router request");
        let resp = req.send().await.map_err(|e| transport_error(e, timeout))?;
        let status = resp.status();
        let text = resp.text().await.map_err(|e| transport_error(e, timeout))?;

        if !status.is_success() {
            return Err(status_error(status, &text));
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| RouterError::InvalidResponse(e.to_string()))
    }

    async fn find_user(&self, username: &str) -> Result<Option<String>, RouterError> {
        let found = self
            .request(Method::GET, USER_PATH, &[("name", username)], None)
            .await?;
        Ok(record_ids(&found)?.into_iter().next())
    }
}

fn transport_error(err: reqwest::Error, timeout: Duration) -> RouterError {
    if err.is_timeout() {
        RouterError::Timeout(timeout)
    } else if err.is_decode() {
        RouterError::InvalidResponse(err.to_string())
    } else {
        RouterError::Connection(err.to_string())
    }
}

fn status_error(status: StatusCode, body: &str) -> RouterError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("detail")
                .or_else(|| v.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.chars().take(200).collect());

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RouterError::Auth(message),
        StatusCode::NOT_FOUND => RouterError::NotFound(message),
        _ => RouterError::Router {
            status: status.as_u16(),
            message,
        },
    }
}

/// `.id` of every record in a RouterOS list answer
fn record_ids(value: &Value) -> Result<Vec<String>, RouterError> {
    let items = value
        .as_array()
        .ok_or_else(|| RouterError::InvalidResponse("expected a list of records".to_string()))?;
    items
        .iter()
        .map(|item| {
            item.get(".id")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| RouterError::InvalidResponse("record without .id".to_string()))
        })
        .collect()
}

#[async_trait]
impl RouterClient for RouterOsClient {
    async fn test_connection(&self) -> Result<RouterIdentity, RouterError> {
        let identity = self.request(Method::GET, "/system/identity", &[], None).await?;
        let name = identity
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| RouterError::InvalidResponse("identity without name".to_string()))?;
        Ok(RouterIdentity {
            name: name.to_string(),
        })
    }

    async fn upsert_hotspot_user(&self, user: &HotspotUser) -> Result<UpsertOutcome, RouterError> {
        let mut body = json!({
            "name": user.username,
            "password": user.password,
            "disabled": "false",
        });
        if let Some(profile) = &user.profile {
            body["profile"] = json!(profile);
        }
        if let Some(server) = &user.server {
            body["server"] = json!(server);
        }
        if let Some(comment) = &user.comment {
            body["comment"] = json!(comment);
        }

        match self.find_user(&user.username).await? {
            Some(id) => {
                self.request(Method::PATCH, &format!("{}/{}", USER_PATH, id), &[], Some(body))
                    .await?;
                Ok(UpsertOutcome::Updated)
            }
            None => {
                self.request(Method::PUT, USER_PATH, &[], Some(body)).await?;
                Ok(UpsertOutcome::Created)
            }
        }
    }

    async fn disable_user(&self, username: &str) -> Result<bool, RouterError> {
        let Some(id) = self.find_user(username).await? else {
            return Ok(false);
        };
        self.request(
            Method::PATCH,
            &format!("{}/{}", USER_PATH, id),
            &[],
            Some(json!({ "disabled": "true" })),
        )
        .await?;
        Ok(true)
    }

    async fn kick_session(&self, username: &str) -> Result<bool, RouterError> {
        let active = self
            .request(Method::GET, ACTIVE_PATH, &[("user", username)], None)
            .await?;
        let sessions = record_ids(&active)?;

        for id in &sessions {
            let removed = self
                .request(
                    Method::POST,
                    &format!("{}/remove", ACTIVE_PATH),
                    &[],
                    Some(json!({ ".id": id })),
                )
                .await;
            match removed {
                // Session ended on its own in between
                Ok(_) | Err(RouterError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(!sessions.is_empty())
    }

    async fn online_count(&self) -> Result<u32, RouterError> {
        let active = self.request(Method::GET, ACTIVE_PATH, &[], None).await?;
        let count = active
            .as_array()
            .ok_or_else(|| RouterError::InvalidResponse("expected a list of sessions".to_string()))?
            .len();
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn remove_user(&self, username: &str) -> Result<bool, RouterError> {
        let Some(id) = self.find_user(username).await? else {
            return Ok(false);
        };
        self.request(Method::DELETE, &format!("{}/{}", USER_PATH, id), &[], None)
            .await?;
        Ok(true)
    }

    async fn set_password(&self, username: &str, password: &str) -> Result<(), RouterError> {
        let id = self
            .find_user(username)
            .await?
            .ok_or_else(|| RouterError::NotFound(format!("hotspot user {}", username)))?;
        self.request(
            Method::PATCH,
            &format!("{}/{}", USER_PATH, id),
            &[],
            Some(json!({ "password": password })),
        )
        .await?;
        Ok(())
    }
}
