mod errors;
mod finalizer;
mod manager;
mod progress;
mod store;
mod traits;
mod types;
mod validation;
mod worker;

pub use errors::{ErrorKind, RegistryError, Result, UploadError};
pub use finalizer::Finalizer;
pub use manager::{FilteredEventReceiver, JobHandle, UploadManager};
pub use progress::{percentage, JobProgress, ProgressAggregator, ProgressReporter, ProgressSink};
pub use store::{JobReporter, UploadRegistry, MAX_IN_FLIGHT_PCT};
pub use traits::{
    ChunkSession,
    ContentCatalog,
    ProgressCallback,
    ProgressInfo,
    SignatureBroker,
    StorageTransport,
    TransferRequest,
};
pub use types::{
    Chunk, ContentMetadata, JobDescriptor, MediaUploadResult, ProviderResponse, ResourceType,
    SourceAsset, TransferConfig, UploadEvent, UploadId, UploadJob, UploadOutcome, UploadRequest,
    UploadState, UploadTicket, MIB,
};
pub use validation::validate_request;
