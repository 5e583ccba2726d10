mod plan;

pub use plan::{plan_transfer, ChunkPlan, TransferPlan};

use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;
use crate::core::{
    Chunk, ChunkSession, MediaUploadResult, ProgressReporter, ProviderResponse, ResourceType, Result,
    SourceAsset, StorageTransport, TransferRequest, UploadError, UploadId, UploadTicket,
};
use super::artifact::ChunkArtifact;

/// 生成分片会话 ID，同一任务的所有分片共用
pub fn new_session_id() -> String {
    format!("uqid-{}", Uuid::new_v4().simple())
}

/// 分片上传器 - sends a file as sequential byte-range requests
pub struct ChunkedUploader {
    transport: Arc<dyn StorageTransport>,
    cache_dir: PathBuf,
}

impl ChunkedUploader {
    pub fn new(transport: Arc<dyn StorageTransport>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            transport,
            cache_dir: cache_dir.into(),
        }
    }

    /// Sends every chunk of `plan` in order; the last provider reply is the result.
    ///
    /// The first failure stops the loop and carries the failing chunk's start offset.
    #[allow(clippy::too_many_arguments)]
    pub async fn upload(
        &self,
        upload_id: UploadId,
        asset: &SourceAsset,
        resource_type: ResourceType,
        ticket: &UploadTicket,
        plan: ChunkPlan,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<MediaUploadResult> {
        let session_id = new_session_id();
        let total = plan.size_bytes();
        let chunk_count = plan.chunk_count();

        info!(
            upload_id = %upload_id,
            session_id = %session_id,
            chunks = chunk_count,
            size = total,
            "starting chunked upload"
        );

        let mut last_response = None;
        for chunk in plan {
            if cancel.is_cancelled() {
                return Err(UploadError::Cancelled);
            }

            let response = self
                .send_chunk(upload_id, asset, resource_type, ticket, &session_id, total, chunk, progress, cancel)
                .await
                .map_err(|err| err.at_offset(chunk.start))?;

            debug!(
                upload_id = %upload_id,
                chunk = chunk.sequence + 1,
                of = chunk_count,
                offset = chunk.start,
                "chunk sent"
            );
            last_response = Some(response);
        }

        last_response
            .ok_or_else(|| UploadError::transfer("Chunk plan was empty"))?
            .into_result()
    }

    #[allow(clippy::too_many_arguments)]
    async fn send_chunk(
        &self,
        upload_id: UploadId,
        asset: &SourceAsset,
        resource_type: ResourceType,
        ticket: &UploadTicket,
        session_id: &str,
        total: u64,
        chunk: Chunk,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<ProviderResponse> {
        let artifact = ChunkArtifact::create(&self.cache_dir, upload_id, &asset.path, &chunk).await?;

        let request = TransferRequest {
            resource_type,
            ticket: ticket.clone(),
            payload: artifact.path().to_path_buf(),
            payload_len: artifact.len(),
            file_name: asset.display_name.clone(),
            mime_type: asset.mime_type.clone(),
            session: Some(ChunkSession {
                session_id: session_id.to_string(),
                content_range: chunk.content_range(total),
            }),
        };

        let result = tokio::select! {
            _ = cancel.cancelled() => Err(UploadError::Cancelled),
            response = self.transport.send(request, progress.chunk_callback(chunk)) => response,
        };

        if let Err(err) = artifact.release().await {
            warn!(upload_id = %upload_id, offset = chunk.start, error = %err, "failed to release chunk artifact");
        }

        result
    }
}
