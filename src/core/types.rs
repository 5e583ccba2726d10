use std::path::{Path, PathBuf};
use std::time::Duration;
use chrono::{DateTime, Utc};
use mime_guess::MimeGuess;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;
use super::errors::{ErrorKind, Result, UploadError};

/// The backend sends `timestamp` either as a number or as a string
fn deserialize_timestamp<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Timestamp {
        Text(String),
        Integer(i64),
        Float(f64),
    }

    Ok(match Timestamp::deserialize(deserializer)? {
        Timestamp::Text(text) => text,
        Timestamp::Integer(value) => value.to_string(),
        Timestamp::Float(value) => value.to_string(),
    })
}

pub const MIB: u64 = 1024 * 1024;

/// 上传任务唯一标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct UploadId(pub Uuid);

impl UploadId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UploadId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UploadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job lifecycle: `Pending -> Uploading -> {Completed | Failed}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadState {
    /// Created, waiting for its upload ticket
    Pending,
    /// Bytes are moving to the provider
    Uploading,
    Completed,
    Failed,
}

impl UploadState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn can_transition_to(self, next: UploadState) -> bool {
        use UploadState::*;

        matches!(
            (self, next),
            (Pending, Uploading) | (Pending, Failed) | (Uploading, Completed) | (Uploading, Failed)
        )
    }
}

/// Provider-side resource type; tickets are scoped to one of these
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Image,
    Video,
}

impl ResourceType {
    /// Path segment used by the provider upload endpoint
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }

    /// Value of `type` in the signature request body
    pub fn signature_type(self) -> &'static str {
        match self {
            Self::Image => "images",
            Self::Video => "videos",
        }
    }

    pub fn from_mime(mime_type: &str) -> Self {
        if mime_type.starts_with("image/") {
            Self::Image
        } else {
            Self::Video
        }
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A local file picked for upload
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SourceAsset {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub mime_type: String,
    pub display_name: String,
}

impl SourceAsset {
    pub fn new(
        path: impl Into<PathBuf>,
        size_bytes: u64,
        mime_type: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            size_bytes,
            mime_type: mime_type.into(),
            display_name: display_name.into(),
        }
    }

    /// Reads size from disk and guesses the MIME type from the extension
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path).await?;
        if !metadata.is_file() {
            return Err(UploadError::validation(format!("Not a file: {}", path.display())));
        }

        let display_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| UploadError::validation(format!("Unreadable file name: {}", path.display())))?
            .to_string();

        Ok(Self {
            path: path.to_path_buf(),
            size_bytes: metadata.len(),
            mime_type: MimeGuess::from_path(path).first_or_octet_stream().to_string(),
            display_name,
        })
    }

    pub fn resource_type(&self) -> ResourceType {
        ResourceType::from_mime(&self.mime_type)
    }
}

/// Signed, single-use authorization for one direct-to-provider upload
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct UploadTicket {
    pub signature: String,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: String,
    pub api_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
}

/// Byte range `[start, end)` of one chunked request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct Chunk {
    pub sequence: usize,
    pub start: u64,
    pub end: u64,
    pub length: u64,
}

impl Chunk {
    pub fn new(sequence: usize, start: u64, end: u64) -> Self {
        Self {
            sequence,
            start,
            end,
            length: end - start,
        }
    }

    /// `Content-Range` value, end inclusive
    pub fn content_range(&self, total: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end.saturating_sub(1), total)
    }
}

/// What the provider hands back once an asset is fully stored
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct MediaUploadResult {
    pub remote_id: String,
    pub secure_url: String,
}

/// Decoded provider reply; the identifiers are only mandatory on the last request of a job
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ProviderResponse {
    #[serde(default)]
    pub public_id: Option<String>,
    #[serde(default)]
    pub secure_url: Option<String>,
    #[serde(skip)]
    pub body: serde_json::Value,
}

impl ProviderResponse {
    pub fn from_body(body: serde_json::Value) -> Self {
        let field = |name: &str| body.get(name).and_then(|v| v.as_str()).map(str::to_string);

        Self {
            public_id: field("public_id"),
            secure_url: field("secure_url"),
            body,
        }
    }

    pub fn into_result(self) -> Result<MediaUploadResult> {
        match (self.public_id, self.secure_url) {
            (Some(remote_id), Some(secure_url)) => Ok(MediaUploadResult {
                remote_id,
                secure_url,
            }),
            _ => Err(UploadError::transfer(
                "Provider response is missing public_id or secure_url",
            )),
        }
    }
}

/// Descriptive fields sent to the content catalog with the uploaded media
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentMetadata {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_start: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_end: Option<f64>,
    #[serde(default = "default_language_code")]
    pub language_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Caller-defined fields forwarded verbatim
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_language_code() -> String {
    "en-US".to_string()
}

impl ContentMetadata {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            category: None,
            preview_start: None,
            preview_end: None,
            language_code: default_language_code(),
            user_id: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

/// Everything a caller submits for one upload job
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub asset: SourceAsset,
    pub resource_type: ResourceType,
    pub thumbnail: Option<SourceAsset>,
    /// Required; `submit` rejects a request without it
    pub metadata: Option<ContentMetadata>,
}

impl UploadRequest {
    pub fn new(asset: SourceAsset, resource_type: ResourceType) -> Self {
        Self {
            asset,
            resource_type,
            thumbnail: None,
            metadata: None,
        }
    }

    pub fn video(asset: SourceAsset) -> Self {
        Self::new(asset, ResourceType::Video)
    }

    pub fn image(asset: SourceAsset) -> Self {
        Self::new(asset, ResourceType::Image)
    }

    pub fn with_thumbnail(mut self, thumbnail: SourceAsset) -> Self {
        self.thumbnail = Some(thumbnail);
        self
    }

    pub fn with_metadata(mut self, metadata: ContentMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// What the registry needs to open a job
#[derive(Debug, Clone)]
pub struct JobDescriptor {
    pub source_asset: SourceAsset,
    pub resource_type: ResourceType,
    pub title: Option<String>,
}

impl From<&UploadRequest> for JobDescriptor {
    fn from(request: &UploadRequest) -> Self {
        Self {
            source_asset: request.asset.clone(),
            resource_type: request.resource_type,
            title: request.metadata.as_ref().map(|metadata| metadata.title.clone()),
        }
    }
}

/// Registry entry for one upload job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadJob {
    /// 任务 ID
    pub id: UploadId,
    pub source_asset: SourceAsset,
    pub resource_type: ResourceType,
    /// Catalog title, for observers
    pub title: Option<String>,
    /// 当前状态
    pub status: UploadState,
    pub progress_pct: u8,
    /// 已上传字节数
    pub bytes_sent: u64,
    /// 错误信息
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub result: Option<MediaUploadResult>,
    /// 创建时间
    pub created_at: DateTime<Utc>,
    /// 开始时间
    pub started_at: Option<DateTime<Utc>>,
    /// 完成时间
    pub completed_at: Option<DateTime<Utc>>,
}

/// Final result of a successful job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadOutcome {
    pub upload_id: UploadId,
    pub media: MediaUploadResult,
    pub thumbnail: Option<MediaUploadResult>,
    /// Catalog response for the registered content
    pub catalog_entry: serde_json::Value,
}

/// Transfer tuning
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Bytes per chunk, except the last
    pub chunk_size: u64,
    /// Assets at or above this size are chunked
    pub chunk_threshold: u64,
    /// Bound on every HTTP call
    pub request_timeout: Duration,
    /// Where transient chunk artifacts live
    pub cache_dir: PathBuf,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: 20 * MIB,
            chunk_threshold: 20 * MIB,
            request_timeout: Duration::from_secs(120),
            cache_dir: std::env::temp_dir().join("media-uplink"),
        }
    }
}

/// 上传事件
#[derive(Debug, Clone)]
pub enum UploadEvent {
    /// 任务已添加
    Added {
        upload_id: UploadId,
    },
    /// 状态变更
    StateChanged {
        upload_id: UploadId,
        old_state: UploadState,
        new_state: UploadState,
    },
    /// 进度更新
    Progress {
        upload_id: UploadId,
        percentage: u8,
        bytes_sent: u64,
    },
    /// 任务完成
    Completed {
        upload_id: UploadId,
        result: MediaUploadResult,
    },
    /// 任务失败
    Failed {
        upload_id: UploadId,
        kind: ErrorKind,
        error: String,
    },
}

impl UploadEvent {
    pub fn upload_id(&self) -> UploadId {
        match self {
            Self::Added { upload_id }
            | Self::StateChanged { upload_id, .. }
            | Self::Progress { upload_id, .. }
            | Self::Completed { upload_id, .. }
            | Self::Failed { upload_id, .. } => *upload_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_state_transition() {
        use UploadState::*;

        // valid
        assert!(Pending.can_transition_to(Uploading));
        assert!(Pending.can_transition_to(Failed));
        assert!(Uploading.can_transition_to(Completed));
        assert!(Uploading.can_transition_to(Failed));

        // invalid
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Uploading.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Uploading));
        assert!(!Completed.can_transition_to(Uploading));
    }

    #[test]
    fn test_upload_id_generation() {
        let id1 = UploadId::new();
        let id2 = UploadId::new();

        assert_ne!(id1, id2);
        assert_eq!(id1, id1);
        assert!(!id1.to_string().is_empty());
    }

    #[test]
    fn test_chunk_content_range_is_end_inclusive() {
        let chunk = Chunk::new(1, 20, 40);
        assert_eq!(chunk.length, 20);
        assert_eq!(chunk.content_range(45), "bytes 20-39/45");
    }

    #[test]
    fn test_ticket_accepts_numeric_and_string_timestamps() {
        let numeric: UploadTicket = serde_json::from_str(
            r#"{"signature":"abc","timestamp":1718000000,"api_key":"key"}"#,
        )
        .unwrap();
        assert_eq!(numeric.timestamp, "1718000000");
        assert_eq!(numeric.folder, None);

        let text: UploadTicket = serde_json::from_str(
            r#"{"signature":"abc","timestamp":"1718000000","api_key":"key","folder":"videos"}"#,
        )
        .unwrap();
        assert_eq!(text.timestamp, "1718000000");
        assert_eq!(text.folder.as_deref(), Some("videos"));
    }

    #[test]
    fn test_provider_response_requires_identifiers() {
        let stored = ProviderResponse::from_body(serde_json::json!({
            "public_id": "abc",
            "secure_url": "https://cdn.example/abc.mp4",
        }));
        assert_eq!(
            stored.into_result().unwrap(),
            MediaUploadResult {
                remote_id: "abc".into(),
                secure_url: "https://cdn.example/abc.mp4".into(),
            }
        );

        let partial = ProviderResponse::from_body(serde_json::json!({ "done": false }));
        assert!(matches!(partial.into_result(), Err(UploadError::Transfer { .. })));
    }

    #[test]
    fn test_resource_type_names() {
        assert_eq!(ResourceType::Video.as_str(), "video");
        assert_eq!(ResourceType::Video.signature_type(), "videos");
        assert_eq!(ResourceType::Image.signature_type(), "images");
        assert_eq!(ResourceType::from_mime("image/png"), ResourceType::Image);
        assert_eq!(ResourceType::from_mime("video/mp4"), ResourceType::Video);
    }

    #[test]
    fn test_metadata_serializes_camel_case_with_extras() {
        let mut metadata = ContentMetadata::new("Match highlights").with_category("sports");
        metadata.preview_start = Some(1.5);
        metadata.extra.insert("tags".into(), serde_json::json!(["goal"]));

        let value = serde_json::to_value(&metadata).unwrap();
        assert_eq!(value["title"], "Match highlights");
        assert_eq!(value["previewStart"], 1.5);
        assert_eq!(value["languageCode"], "en-US");
        assert_eq!(value["tags"][0], "goal");
        assert!(value.get("previewEnd").is_none());
    }

    #[tokio::test]
    async fn test_source_asset_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.MP4");
        tokio::fs::write(&path, vec![0u8; 64]).await.unwrap();

        let asset = SourceAsset::from_path(&path).await.unwrap();
        assert_eq!(asset.size_bytes, 64);
        assert_eq!(asset.mime_type, "video/mp4");
        assert_eq!(asset.display_name, "clip.MP4");
        assert_eq!(asset.resource_type(), ResourceType::Video);
    }

    #[tokio::test]
    async fn test_source_asset_guesses_less_common_extensions() {
        let dir = tempfile::tempdir().unwrap();

        let phone_clip = dir.path().join("call.3gp");
        tokio::fs::write(&phone_clip, b"3gp").await.unwrap();
        let asset = SourceAsset::from_path(&phone_clip).await.unwrap();
        assert_eq!(asset.mime_type, "video/3gpp");

        let scan = dir.path().join("scan.tif");
        tokio::fs::write(&scan, b"tif").await.unwrap();
        let asset = SourceAsset::from_path(&scan).await.unwrap();
        assert_eq!(asset.mime_type, "image/tiff");
        assert_eq!(asset.resource_type(), ResourceType::Image);

        let unknown = dir.path().join("blob.zzq");
        tokio::fs::write(&unknown, b"?").await.unwrap();
        let asset = SourceAsset::from_path(&unknown).await.unwrap();
        assert_eq!(asset.mime_type, "application/octet-stream");
    }

    #[test]
    fn test_descriptor_carries_title() {
        let asset = SourceAsset::new("/tmp/a.mp4", 4, "video/mp4", "a.mp4");

        let titled = UploadRequest::video(asset.clone()).with_metadata(ContentMetadata::new("Trailer"));
        assert_eq!(JobDescriptor::from(&titled).title.as_deref(), Some("Trailer"));

        let untitled = UploadRequest::video(asset);
        assert_eq!(JobDescriptor::from(&untitled).title, None);
    }
}
