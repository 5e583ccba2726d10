use std::time::Duration;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client};
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tracing::debug;
use url::Url;
use crate::config::Config;
use crate::core::{
    ProgressCallback, ProviderResponse, ResourceType, Result, StorageTransport, TransferRequest,
    UploadError,
};
use crate::utils::{endpoint, failure_message, request_error};
use super::progress_stream::ProgressStream;

// 64KB
const READ_BUFFER: usize = 64 * 1024;

pub const SESSION_HEADER: &str = "X-Unique-Upload-Id";

/// Direct-to-provider upload client (`{base}/{account}/{resource_type}/upload`)
#[derive(Debug, Clone)]
pub struct ProviderClient {
    client: Client,
    base_url: Url,
    account: String,
}

impl ProviderClient {
    pub fn new(base_url: &str, account: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|_| UploadError::validation(format!("Invalid storage url: {:?}", base_url)))?;
        let client = Client::builder()
            .timeout(timeout)
            .tcp_nodelay(true)
            .build()
            .map_err(|err| UploadError::internal(format!("Failed to build HTTP client: {}", err)))?;

        Ok(Self {
            client,
            base_url,
            account: account.to_string(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            &config.storage.base_url,
            &config.storage.account,
            config.transfer_config().request_timeout,
        )
    }

    pub fn upload_url(&self, resource_type: ResourceType) -> Result<Url> {
        endpoint(&self.base_url, &[self.account.as_str(), resource_type.as_str(), "upload"])
    }

    async fn file_part(&self, request: &TransferRequest, progress: ProgressCallback) -> Result<Part> {
        let file = File::open(&request.payload).await?;
        let stream = ProgressStream::new(
            ReaderStream::with_capacity(file, READ_BUFFER),
            request.payload_len,
            progress,
        );

        Part::stream_with_length(Body::wrap_stream(stream), request.payload_len)
            .file_name(request.file_name.clone())
            .mime_str(&request.mime_type)
            .map_err(|err| UploadError::validation(format!("Invalid MIME type {:?}: {}", request.mime_type, err)))
    }
}

#[async_trait]
impl StorageTransport for ProviderClient {
    async fn send(&self, request: TransferRequest, progress: ProgressCallback) -> Result<ProviderResponse> {
        let url = self.upload_url(request.resource_type)?;
        let ticket = &request.ticket;

        let mut form = Form::new()
            .part("file", self.file_part(&request, progress).await?)
            .text("api_key", ticket.api_key.clone())
            .text("timestamp", ticket.timestamp.clone())
            .text("signature", ticket.signature.clone());
        if let Some(folder) = &ticket.folder {
            form = form.text("folder", folder.clone());
        }

        let mut builder = self.client.post(url).multipart(form);
        if let Some(session) = &request.session {
            builder = builder
                .header(SESSION_HEADER, session.session_id.as_str())
                .header(reqwest::header::CONTENT_RANGE, session.content_range.as_str());
        }

        let response = builder
            .send()
            .await
            .map_err(|err| UploadError::transfer(request_error(&err)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| UploadError::transfer(request_error(&err)))?;

        if !status.is_success() {
            return Err(UploadError::transfer(failure_message(status, &text)));
        }

        let body = serde_json::from_str(&text)
            .map_err(|err| UploadError::transfer(format!("Invalid provider response: {}", err)))?;

        debug!(status = status.as_u16(), range = ?request.session.as_ref().map(|s| &s.content_range), "provider accepted upload");
        Ok(ProviderResponse::from_body(body))
    }
}
