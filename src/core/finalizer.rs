use std::sync::Arc;
use serde_json::{json, Value};
use tracing::info;
use super::errors::{Result, UploadError};
use super::traits::ContentCatalog;
use super::types::{ContentMetadata, MediaUploadResult, ResourceType, UploadId};

/// Registers uploaded media with the content catalog
#[derive(Clone)]
pub struct Finalizer {
    catalog: Arc<dyn ContentCatalog>,
}

impl Finalizer {
    pub fn new(catalog: Arc<dyn ContentCatalog>) -> Self {
        Self { catalog }
    }

    /// `{ ...metadata, video|image: {public_id, url}, thumbnail?: {public_id, url} }`
    pub fn build_payload(
        metadata: &ContentMetadata,
        resource_type: ResourceType,
        media: &MediaUploadResult,
        thumbnail: Option<&MediaUploadResult>,
    ) -> Result<Value> {
        let mut payload = match serde_json::to_value(metadata) {
            Ok(Value::Object(map)) => map,
            Ok(_) => return Err(UploadError::internal("Metadata did not serialize to an object")),
            Err(err) => return Err(UploadError::internal(err.to_string())),
        };

        payload.insert(resource_type.as_str().to_string(), media_reference(media));
        if let Some(thumbnail) = thumbnail {
            payload.insert("thumbnail".to_string(), media_reference(thumbnail));
        }

        Ok(Value::Object(payload))
    }

    pub async fn finalize(
        &self,
        upload_id: UploadId,
        metadata: &ContentMetadata,
        resource_type: ResourceType,
        media: &MediaUploadResult,
        thumbnail: Option<&MediaUploadResult>,
    ) -> Result<Value> {
        let payload = Self::build_payload(metadata, resource_type, media, thumbnail)
            .map_err(UploadError::into_finalization)?;

        let entry = self
            .catalog
            .register(&payload)
            .await
            .map_err(UploadError::into_finalization)?;

        info!(upload_id = %upload_id, remote_id = %media.remote_id, "content registered");
        Ok(entry)
    }
}

fn media_reference(media: &MediaUploadResult) -> Value {
    json!({
        "public_id": media.remote_id,
        "url": media.secure_url,
    })
}
