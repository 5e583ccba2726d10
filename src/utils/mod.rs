pub mod format;
pub mod http;

pub use format::{format_bytes, format_duration};
pub use http::{endpoint, failure_message, request_error};
