use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use crate::core::{
    MediaUploadResult, ProgressCallback, ResourceType, Result, SourceAsset, StorageTransport,
    TransferRequest, UploadError, UploadTicket,
};

/// 简单上传器 - the whole file in one multipart request
pub struct SimpleUploader {
    transport: Arc<dyn StorageTransport>,
}

impl SimpleUploader {
    pub fn new(transport: Arc<dyn StorageTransport>) -> Self {
        Self { transport }
    }

    pub async fn upload(
        &self,
        asset: &SourceAsset,
        resource_type: ResourceType,
        ticket: &UploadTicket,
        progress: ProgressCallback,
        cancel: &CancellationToken,
    ) -> Result<MediaUploadResult> {
        if cancel.is_cancelled() {
            return Err(UploadError::Cancelled);
        }

        info!(
            file = %asset.display_name,
            size = asset.size_bytes,
            resource_type = %resource_type,
            "starting whole-file upload"
        );

        let request = TransferRequest {
            resource_type,
            ticket: ticket.clone(),
            payload: asset.path.clone(),
            payload_len: asset.size_bytes,
            file_name: asset.display_name.clone(),
            mime_type: asset.mime_type.clone(),
            session: None,
        };

        let response = tokio::select! {
            _ = cancel.cancelled() => Err(UploadError::Cancelled),
            response = self.transport.send(request, progress) => response,
        };

        response.map_err(|err| err.at_offset(0))?.into_result()
    }
}
