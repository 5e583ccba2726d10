use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use crate::uploaders::{plan_transfer, ChunkedUploader, SimpleUploader, TransferPlan};
use super::errors::{Result, UploadError};
use super::finalizer::Finalizer;
use super::progress::ProgressReporter;
use super::store::JobReporter;
use super::traits::{SignatureBroker, StorageTransport};
use super::types::{
    MediaUploadResult, ResourceType, SourceAsset, TransferConfig, UploadId, UploadOutcome,
    UploadRequest, UploadTicket,
};

/// Runs one job from ticket to catalog registration
pub struct UploadWorker {
    pub(crate) broker: Arc<dyn SignatureBroker>,
    pub(crate) transport: Arc<dyn StorageTransport>,
    pub(crate) finalizer: Finalizer,
    pub(crate) config: Arc<TransferConfig>,
    pub(crate) cancellation_token: CancellationToken,
}

impl UploadWorker {
    /// Executes the job and records its terminal state, even if the pipeline panics
    pub async fn run(self, request: UploadRequest, reporter: JobReporter) -> Result<UploadOutcome> {
        let upload_id = reporter.id();

        let outcome = AssertUnwindSafe(self.execute(&request, &reporter))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(UploadError::internal("upload task panicked")));

        match &outcome {
            Ok(outcome) => info!(
                upload_id = %upload_id,
                remote_id = %outcome.media.remote_id,
                "upload completed"
            ),
            Err(UploadError::Cancelled) => info!(upload_id = %upload_id, "upload cancelled"),
            Err(err) => error!(upload_id = %upload_id, kind = ?err.kind(), error = %err, "upload failed"),
        }

        reporter.finish(&outcome);
        outcome
    }

    async fn execute(&self, request: &UploadRequest, reporter: &JobReporter) -> Result<UploadOutcome> {
        let upload_id = reporter.id();
        let metadata = request
            .metadata
            .as_ref()
            .ok_or_else(|| UploadError::validation("content metadata is required"))?;

        let ticket = self
            .request_ticket(request.resource_type)
            .await
            .map_err(UploadError::into_authorization)?;
        info!(upload_id = %upload_id, resource_type = %request.resource_type, "upload ticket obtained");

        reporter.mark_uploading()?;

        let progress = ProgressReporter::new(request.asset.size_bytes, reporter.progress_sink());
        let media = self
            .transfer(upload_id, &request.asset, request.resource_type, &ticket, &progress)
            .await?;

        let thumbnail = match &request.thumbnail {
            Some(thumbnail) => Some(self.upload_thumbnail(upload_id, thumbnail, &media).await?),
            None => None,
        };

        let catalog_entry = self
            .finalizer
            .finalize(upload_id, metadata, request.resource_type, &media, thumbnail.as_ref())
            .await?;

        Ok(UploadOutcome {
            upload_id,
            media,
            thumbnail,
            catalog_entry,
        })
    }

    async fn request_ticket(&self, resource_type: ResourceType) -> Result<UploadTicket> {
        if self.cancellation_token.is_cancelled() {
            return Err(UploadError::Cancelled);
        }

        tokio::select! {
            _ = self.cancellation_token.cancelled() => Err(UploadError::Cancelled),
            ticket = self.broker.request_ticket(resource_type) => ticket,
        }
    }

    async fn transfer(
        &self,
        upload_id: UploadId,
        asset: &SourceAsset,
        resource_type: ResourceType,
        ticket: &UploadTicket,
        progress: &ProgressReporter,
    ) -> Result<MediaUploadResult> {
        match plan_transfer(asset, resource_type, &self.config) {
            TransferPlan::Whole => {
                SimpleUploader::new(Arc::clone(&self.transport))
                    .upload(asset, resource_type, ticket, progress.whole_callback(), &self.cancellation_token)
                    .await
            }
            TransferPlan::Chunked(plan) => {
                ChunkedUploader::new(Arc::clone(&self.transport), self.config.cache_dir.clone())
                    .upload(upload_id, asset, resource_type, ticket, plan, progress, &self.cancellation_token)
                    .await
            }
        }
    }

    /// Thumbnails get their own image ticket and always go in one request
    async fn upload_thumbnail(
        &self,
        upload_id: UploadId,
        thumbnail: &SourceAsset,
        media: &MediaUploadResult,
    ) -> Result<MediaUploadResult> {
        let result = match self.request_ticket(ResourceType::Image).await {
            Ok(ticket) => {
                SimpleUploader::new(Arc::clone(&self.transport))
                    .upload(
                        thumbnail,
                        ResourceType::Image,
                        &ticket,
                        ProgressReporter::detached().whole_callback(),
                        &self.cancellation_token,
                    )
                    .await
            }
            Err(err) => Err(err.into_authorization()),
        };

        result.map_err(|err| {
            if !matches!(err, UploadError::Cancelled) {
                warn!(
                    upload_id = %upload_id,
                    orphaned_remote_id = %media.remote_id,
                    error = %err,
                    "thumbnail upload failed after primary asset was stored"
                );
            }
            err.into_finalization()
        })
    }
}
