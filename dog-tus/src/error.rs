use http::StatusCode;
use thiserror::Error;

/// Result type for tus operations
pub type TusResult<T> = Result<T, TusError>;

/// Errors that can occur while serving the resumable upload protocol
#[derive(Error, Debug)]
pub enum TusError {
    #[error("Upload not found: {id}")]
    NotFound { id: String },

    #[error("Invalid request: {message}")]
    Invalid { message: String },

    #[error("Operation not supported: {operation}")]
    Unsupported { operation: &'static str },

    /// Operational failure reported by the store. Surfaces as 400.
    #[error("{message}")]
    Store { message: String },

    /// The request body exceeded the allowed read budget. Surfaces as 413.
    #[error("{message}")]
    MaxReadSizeExceeded { message: String },

    /// The store aborted a write because the client went away.
    #[error("Operation was cancelled")]
    Cancelled,

    #[error("Storage backend error: {source}")]
    Backend {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("Invalid header value: {source}")]
    Header {
        #[from]
        source: http::header::InvalidHeaderValue,
    },
}

impl TusError {
    /// Create a backend error from any error type
    pub fn backend<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend {
            source: Box::new(error),
        }
    }

    /// Create a store (operational) error
    pub fn store<S: Into<String>>(message: S) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Create an invalid request error
    pub fn invalid<S: Into<String>>(message: S) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found<S: Into<String>>(id: S) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Create an unsupported operation error
    pub fn unsupported(operation: &'static str) -> Self {
        Self::Unsupported { operation }
    }

    /// Create a read budget error
    pub fn max_read_size_exceeded<S: Into<String>>(message: S) -> Self {
        Self::MaxReadSizeExceeded {
            message: message.into(),
        }
    }

    /// True when the store signalled a client-driven abort rather than a fault
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// HTTP status a host should use when this error escapes to it
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Invalid { .. } | Self::Store { .. } | Self::Header { .. } => {
                StatusCode::BAD_REQUEST
            }
            Self::Unsupported { .. } => StatusCode::NOT_IMPLEMENTED,
            Self::MaxReadSizeExceeded { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Cancelled | Self::Backend { .. } | Self::Io { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_display_their_message_verbatim() {
        let err = TusError::store("Disk is full");
        assert_eq!(err.to_string(), "Disk is full");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn read_budget_maps_to_payload_too_large() {
        let err = TusError::max_read_size_exceeded("Request contains more data than allowed");
        assert_eq!(err.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(!err.is_cancellation());
        assert!(TusError::Cancelled.is_cancellation());
    }
}
