use reqwest::StatusCode;
use serde_json::Value;
use url::Url;
use crate::core::{Result, UploadError};

const MAX_BODY_IN_MESSAGE: usize = 200;

/// Appends path segments to `base`, keeping any path the base already has
pub fn endpoint(base: &Url, segments: &[&str]) -> Result<Url> {
    let mut url = base.clone();
    {
        let mut path = url
            .path_segments_mut()
            .map_err(|_| UploadError::internal(format!("{} cannot be used as a base URL", base)))?;
        path.pop_if_empty().extend(segments);
    }

    Ok(url)
}

/// `HTTP <status>: <message>`, preferring the JSON `error.message` of the body
pub fn failure_message(status: StatusCode, body: &str) -> String {
    let detail = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value
                .pointer("/error/message")
                .or_else(|| value.get("message"))
                .or_else(|| value.get("error"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| {
            let body = body.trim();
            if body.is_empty() {
                status.canonical_reason().unwrap_or("request failed").to_string()
            } else {
                body.chars().take(MAX_BODY_IN_MESSAGE).collect()
            }
        });

    format!("HTTP {}: {}", status.as_u16(), detail)
}

/// Describes a transport-level failure; timeouts are called out explicitly
pub fn request_error(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        format!("request timed out: {}", err)
    } else if err.is_connect() {
        format!("connection failed: {}", err)
    } else {
        format!("request failed: {}", err)
    }
}
