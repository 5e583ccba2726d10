pub mod artifact;
pub mod chunked;
pub mod simple;

pub use artifact::ChunkArtifact;
pub use chunked::{plan_transfer, ChunkPlan, ChunkedUploader, TransferPlan};
pub use simple::SimpleUploader;
