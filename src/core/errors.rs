use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::types::{UploadId, UploadState};

/// Coarse classification recorded on a failed job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Authorization,
    Transfer,
    Finalization,
    Validation,
    Cancelled,
    Internal,
}

#[derive(Error, Debug)]
pub enum UploadError {
    /// Ticket request failed or was rejected; the job never reaches `uploading`
    #[error("Authorization error: {0}")]
    Authorization(String),

    /// A chunk or whole-file request failed
    #[error("Transfer error{}: {message}", offset_suffix(.offset))]
    Transfer {
        offset: Option<u64>,
        message: String,
    },

    /// Bytes are on the provider but the catalog registration failed
    #[error("Finalization error: {0}")]
    Finalization(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Upload was cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Internal error: {0}")]
    Internal(String),
}

fn offset_suffix(offset: &Option<u64>) -> String {
    match offset {
        Some(offset) => format!(" at byte offset {}", offset),
        None => String::new(),
    }
}

impl UploadError {
    pub fn transfer(message: impl Into<String>) -> Self {
        Self::Transfer {
            offset: None,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Authorization(_) => ErrorKind::Authorization,
            Self::Transfer { .. } => ErrorKind::Transfer,
            Self::Finalization(_) => ErrorKind::Finalization,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Io(_) | Self::Registry(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Byte offset of the failing chunk, if any
    pub fn offset(&self) -> Option<u64> {
        match self {
            Self::Transfer { offset, .. } => *offset,
            _ => None,
        }
    }

    /// Pins a failure to the chunk starting at `offset`.
    ///
    /// Anything that went wrong while a chunk was in flight (reading the
    /// artifact, the request itself) is reported as a transfer failure there.
    pub fn at_offset(self, offset: u64) -> Self {
        match self {
            Self::Transfer { message, .. } => Self::Transfer {
                offset: Some(offset),
                message,
            },
            Self::Cancelled => Self::Cancelled,
            other => Self::Transfer {
                offset: Some(offset),
                message: other.to_string(),
            },
        }
    }

    pub(crate) fn into_authorization(self) -> Self {
        match self {
            Self::Authorization(_) | Self::Cancelled => self,
            other => Self::Authorization(other.to_string()),
        }
    }

    pub(crate) fn into_finalization(self) -> Self {
        match self {
            Self::Finalization(_) | Self::Cancelled => self,
            other => Self::Finalization(other.to_string()),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Upload {0} not found")]
    NotFound(UploadId),

    #[error("Upload {upload_id} cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        upload_id: UploadId,
        from: UploadState,
        to: UploadState,
    },
}

/// Error alias
pub type Result<T, E = UploadError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_error_display_includes_offset() {
        let err = UploadError::transfer("connection reset").at_offset(20);
        assert_eq!(
            err.to_string(),
            "Transfer error at byte offset 20: connection reset"
        );
        assert_eq!(err.offset(), Some(20));
        assert_eq!(err.kind(), ErrorKind::Transfer);
    }

    #[test]
    fn test_at_offset_converts_io_errors() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short read");
        let err = UploadError::from(io).at_offset(40);
        assert_eq!(err.kind(), ErrorKind::Transfer);
        assert_eq!(err.offset(), Some(40));
    }

    #[test]
    fn test_cancellation_survives_reclassification() {
        assert!(matches!(UploadError::Cancelled.at_offset(5), UploadError::Cancelled));
        assert!(matches!(UploadError::Cancelled.into_authorization(), UploadError::Cancelled));
        assert!(matches!(UploadError::Cancelled.into_finalization(), UploadError::Cancelled));
    }

    #[test]
    fn test_into_finalization_keeps_message() {
        let err = UploadError::transfer("boom").into_finalization();
        assert_eq!(err.kind(), ErrorKind::Finalization);
        assert!(err.to_string().contains("boom"));
    }
}
