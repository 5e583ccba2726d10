mod client;
mod progress_stream;

pub use client::{ProviderClient, SESSION_HEADER};
pub use progress_stream::ProgressStream;
