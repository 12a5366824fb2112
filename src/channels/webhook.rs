//! Webhook channel: one HTTP GET per recipient.
//!
//! The route carries a `:user_id` placeholder. The payload is sent both as
//! URL-encoded query parameters and as a JSON body. When a shared token is
//! configured it is added as a top-level `token` field.

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value};

use crate::channels::WebhookDelivery;
use crate::config::MailerConfig;
use crate::error::{ConfigError, DeliveryError};

/// Placeholder replaced by the recipient's user id.
pub const USER_ID_PLACEHOLDER: &str = ":user_id";

/// Payload key carrying the shared token.
pub const TOKEN_KEY: &str = "token";

const CHANNEL_NAME: &str = "webhook";

/// Stateless webhook delivery.
pub struct WebhookChannel {
    route: String,
    token: Option<SecretString>,
    client: reqwest::Client,
}

impl WebhookChannel {
    /// Fails if `route` has no `:user_id` placeholder.
    pub fn new(
        route: impl Into<String>,
        token: Option<SecretString>,
    ) -> Result<Self, ConfigError> {
        let route = route.into();
        if !route.contains(USER_ID_PLACEHOLDER) {
            return Err(ConfigError::InvalidValue {
                key: "webhook_route".into(),
                message: format!("{USER_ID_PLACEHOLDER} not in endpoint path: {route}"),
            });
        }
        Ok(Self {
            route,
            token,
            client: reqwest::Client::new(),
        })
    }

    /// Build from the `webhook_route` / `webhook_token` config keys. The token is optional.
    pub fn from_config(config: &MailerConfig) -> Result<Self, ConfigError> {
        let route = config
            .webhook_route
            .clone()
            .filter(|r| !r.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingRequired {
                key: "webhook_route".into(),
                hint: format!("Webhook templates need a route containing {USER_ID_PLACEHOLDER}"),
            })?;
        let token = config
            .webhook_token
            .clone()
            .filter(|t| !t.expose_secret().trim().is_empty());
        Self::new(route, token)
    }

    pub fn route(&self) -> &str {
        &self.route
    }

    /// Route with the placeholder replaced by `user_id`.
    pub fn target_url(&self, user_id: &str) -> String {
        self.route.replace(USER_ID_PLACEHOLDER, user_id)
    }

    /// Copy of `payload` with the shared token added, if one is configured.
    pub fn signed_payload(&self, mut payload: Map<String, Value>) -> Map<String, Value> {
        if let Some(token) = &self.token {
            payload.insert(
                TOKEN_KEY.to_string(),
                Value::String(token.expose_secret().to_string()),
            );
        }
        payload
    }
}

/// Flatten a payload into query parameters. Strings are sent as-is, other
/// values as their JSON text.
pub fn query_pairs(payload: &Map<String, Value>) -> Vec<(String, String)> {
    payload
        .iter()
        .map(|(k, v)| {
            let value = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), value)
        })
        .collect()
}

/// Pull a human-readable message out of an error response body.
fn error_message(body: &str, status: reqwest::StatusCode) -> String {
    let from_json = serde_json::from_str::<Value>(body).ok().and_then(|v| {
        v.get("message")
            .or_else(|| v.get("error"))
            .and_then(|m| m.as_str())
            .map(str::to_string)
    });
    from_json
        .or_else(|| Some(body.trim().to_string()).filter(|s| !s.is_empty()))
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").to_string())
}

#[async_trait]
impl WebhookDelivery for WebhookChannel {
    fn name(&self) -> &str {
        CHANNEL_NAME
    }

    async fn send(&self, user_id: &str, payload: Map<String, Value>) -> Result<(), DeliveryError> {
        let url = self.target_url(user_id);
        let data = self.signed_payload(payload);
        let query = query_pairs(&data);

        tracing::debug!(url = %url, "Calling webhook");

        let resp = self
            .client
            .get(&url)
            .query(&query)
            .header(ACCEPT, "application/json")
            .json(&data)
            .send()
            .await
            .map_err(|e| DeliveryError::SendFailed {
                name: CHANNEL_NAME.into(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(DeliveryError::Http {
                status: status.as_u16(),
                message: error_message(&body, status),
            });
        }

        tracing::debug!(user_id, status = status.as_u16(), "Webhook delivered");
        Ok(())
    }
}
