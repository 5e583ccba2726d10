use super::errors::{Result, UploadError};
use super::types::{SourceAsset, TransferConfig, UploadRequest};

/// Rejects requests that cannot produce a valid job
pub async fn validate_request(request: &UploadRequest, config: &TransferConfig) -> Result<()> {
    if config.chunk_size == 0 {
        return Err(UploadError::validation("chunk_size must be greater than zero"));
    }

    validate_asset(&request.asset, "asset").await?;

    if let Some(thumbnail) = &request.thumbnail {
        validate_asset(thumbnail, "thumbnail").await?;
        if !thumbnail.mime_type.starts_with("image/") {
            return Err(UploadError::validation(format!(
                "thumbnail must be an image, got {}",
                thumbnail.mime_type
            )));
        }
    }

    match &request.metadata {
        None => return Err(UploadError::validation("content metadata is required")),
        Some(metadata) if metadata.title.trim().is_empty() => {
            return Err(UploadError::validation("title is required"));
        }
        Some(_) => {}
    }

    Ok(())
}

async fn validate_asset(asset: &SourceAsset, label: &str) -> Result<()> {
    if asset.path.as_os_str().is_empty() {
        return Err(UploadError::validation(format!("{} path is empty", label)));
    }
    if asset.display_name.is_empty() {
        return Err(UploadError::validation(format!("{} display name is empty", label)));
    }
    if asset.mime_type.is_empty() {
        return Err(UploadError::validation(format!("{} MIME type is empty", label)));
    }

    match tokio::fs::metadata(&asset.path).await {
        Ok(metadata) if metadata.is_file() => Ok(()),
        Ok(_) => Err(UploadError::validation(format!(
            "{} is not a file: {}",
            label,
            asset.path.display()
        ))),
        Err(_) => Err(UploadError::validation(format!(
            "{} not found: {}",
            label,
            asset.path.display()
        ))),
    }
}
