use std::time::Duration;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;
use url::Url;
use crate::config::Config;
use crate::core::{ContentCatalog, ResourceType, Result, SignatureBroker, UploadError, UploadTicket};
use crate::utils::{endpoint, failure_message, request_error};

/// Backend API client: upload signatures and content registration
#[derive(Debug, Clone)]
pub struct BackendClient {
    client: Client,
    api_base: Url,
    token: Option<String>,
}

impl BackendClient {
    pub fn new(api_base: &str, token: Option<String>, timeout: Duration) -> Result<Self> {
        let api_base = Url::parse(api_base)
            .map_err(|_| UploadError::validation(format!("Invalid api url: {:?}", api_base)))?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| UploadError::internal(format!("Failed to build HTTP client: {}", err)))?;

        Ok(Self {
            client,
            api_base,
            token: token.filter(|token| !token.is_empty()),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            &config.backend.api_base,
            config.backend.token.clone(),
            config.transfer_config().request_timeout,
        )
    }

    /// POSTs JSON with the bearer token; failures come back as plain messages
    async fn post_json(&self, segments: &[&str], body: &Value) -> std::result::Result<Value, String> {
        let token = self.token.as_deref().ok_or_else(|| "not authenticated".to_string())?;
        let url = endpoint(&self.api_base, segments).map_err(|err| err.to_string())?;

        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(|err| request_error(&err))?;

        let status = response.status();
        let text = response.text().await.map_err(|err| request_error(&err))?;
        if !status.is_success() {
            return Err(failure_message(status, &text));
        }

        serde_json::from_str(&text).map_err(|err| format!("Invalid response body: {}", err))
    }
}

/// Some backends wrap the ticket in `{ "data": ... }`
fn unwrap_data(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.contains_key("data") && !map.contains_key("signature") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

#[async_trait]
impl SignatureBroker for BackendClient {
    async fn request_ticket(&self, resource_type: ResourceType) -> Result<UploadTicket> {
        let body = json!({ "type": resource_type.signature_type() });
        let value = self
            .post_json(&["content", "signature"], &body)
            .await
            .map_err(UploadError::Authorization)?;

        let ticket: UploadTicket = serde_json::from_value(unwrap_data(value))
            .map_err(|err| UploadError::Authorization(format!("Invalid upload ticket: {}", err)))?;

        debug!(resource_type = %resource_type, "upload ticket issued");
        Ok(ticket)
    }
}

#[async_trait]
impl ContentCatalog for BackendClient {
    async fn register(&self, payload: &Value) -> Result<Value> {
        self.post_json(&["content"], payload)
            .await
            .map_err(UploadError::Finalization)
    }
}
