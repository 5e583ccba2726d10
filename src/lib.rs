pub mod backend;
pub mod config;
pub mod core;
pub mod provider;
pub mod uploaders;
pub mod utils;

// 重新导出核心类型
pub use self::core::{
    ContentMetadata,
    ErrorKind,
    JobHandle,
    MediaUploadResult,
    ResourceType,
    Result,
    SourceAsset,
    TransferConfig,
    UploadError,
    UploadEvent,
    UploadId,
    UploadManager,
    UploadOutcome,
    UploadRegistry,
    UploadRequest,
    UploadState,
};

// 重新导出 HTTP 客户端
pub use backend::BackendClient;
pub use provider::ProviderClient;

#[cfg(test)]
mod tests;
