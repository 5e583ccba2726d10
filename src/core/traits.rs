use std::path::PathBuf;
use std::sync::Arc;
use async_trait::async_trait;
use super::types::{ProviderResponse, ResourceType, UploadTicket};
use super::errors::Result;

/// Byte counters reported while one request body is streaming
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressInfo {
    /// 已发送字节数
    pub bytes_loaded: u64,
    /// 本次请求总字节数
    pub bytes_total: u64,
}

pub type ProgressCallback = Arc<dyn Fn(ProgressInfo) + Sync + Send>;

/// Session headers shared by every chunk of one job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSession {
    /// `X-Unique-Upload-Id`
    pub session_id: String,
    /// `Content-Range`
    pub content_range: String,
}

/// One HTTP transfer: a whole file or a single chunk artifact
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub resource_type: ResourceType,
    pub ticket: UploadTicket,
    /// File whose full content becomes the `file` part
    pub payload: PathBuf,
    pub payload_len: u64,
    pub file_name: String,
    pub mime_type: String,
    pub session: Option<ChunkSession>,
}

/// 上传签名获取 - mints a ticket for one resource type
#[async_trait]
pub trait SignatureBroker: Send + Sync {
    async fn request_ticket(&self, resource_type: ResourceType) -> Result<UploadTicket>;
}

/// 存储传输 - performs one provider upload request
#[async_trait]
pub trait StorageTransport: Send + Sync {
    /// Sends the request and decodes the provider reply.
    ///
    /// `progress` is invoked with the bytes of this request's body only;
    /// callers translate that into job-level progress.
    async fn send(&self, request: TransferRequest, progress: ProgressCallback) -> Result<ProviderResponse>;
}

/// 内容登记 - registers an uploaded asset with the backend catalog
#[async_trait]
pub trait ContentCatalog: Send + Sync {
    async fn register(&self, payload: &serde_json::Value) -> Result<serde_json::Value>;
}
