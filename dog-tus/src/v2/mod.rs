//! The token based draft protocol ("tus2").
//!
//! Uploads are addressed by a client chosen `Upload-Token` instead of a
//! server allocated URL, and completion is signalled with
//! `Upload-Incomplete`. [`StorageFacade`] sequences the storage calls for
//! each procedure; [`Tus2Handler`] maps requests onto those procedures.

mod facade;
mod handler;

pub use facade::{CreateResponse, DeleteResponse, OffsetResponse, StorageFacade, WriteResponse};
pub use handler::Tus2Handler;

use async_trait::async_trait;
use http::HeaderMap;
use tokio_util::sync::CancellationToken;

use crate::headers::{UPLOAD_INCOMPLETE, UPLOAD_OFFSET, UPLOAD_TOKEN};
use crate::{BodyReader, ResourceId, StreamBodyReader, TusError, TusResult};

/// Storage for tus2 uploads
#[async_trait]
pub trait Tus2Storage: Send + Sync {
    async fn exists(&self, id: &ResourceId) -> TusResult<bool>;

    async fn get_offset(&self, id: &ResourceId) -> TusResult<u64>;

    async fn is_complete(&self, id: &ResourceId) -> TusResult<bool>;

    async fn create(&self, id: &ResourceId, ctx: &CreateFileContext) -> TusResult<()>;

    /// Append the context's body. May return early or fail with
    /// [`TusError::Cancelled`] once the context's token fires.
    async fn write_data(&self, id: &ResourceId, ctx: &mut WriteDataContext) -> TusResult<()>;

    async fn mark_complete(&self, id: &ResourceId) -> TusResult<()>;

    async fn delete(&self, id: &ResourceId) -> TusResult<()>;
}

/// Protocol headers of a tus2 request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tus2Headers {
    pub resource_id: ResourceId,
    pub upload_offset: Option<u64>,
    pub upload_incomplete: Option<bool>,
}

impl Tus2Headers {
    pub fn new(resource_id: ResourceId) -> Self {
        Self {
            resource_id,
            upload_offset: None,
            upload_incomplete: None,
        }
    }

    pub fn with_upload_offset(mut self, offset: u64) -> Self {
        self.upload_offset = Some(offset);
        self
    }

    pub fn with_upload_incomplete(mut self, incomplete: bool) -> Self {
        self.upload_incomplete = Some(incomplete);
        self
    }

    pub fn parse(headers: &HeaderMap) -> TusResult<Self> {
        let token = headers
            .get(UPLOAD_TOKEN)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.trim().trim_matches(':'))
            .filter(|value| !value.is_empty())
            .ok_or_else(|| TusError::invalid("Header Upload-Token is missing or invalid"))?;

        let upload_offset = match headers.get(UPLOAD_OFFSET) {
            None => None,
            Some(value) => Some(
                value
                    .to_str()
                    .ok()
                    .and_then(|value| value.trim().parse::<u64>().ok())
                    .ok_or_else(|| {
                        TusError::invalid("Header Upload-Offset must be a positive number")
                    })?,
            ),
        };

        let upload_incomplete = match headers.get(UPLOAD_INCOMPLETE).map(|value| value.as_bytes()) {
            None => None,
            Some(b"?1") => Some(true),
            Some(b"?0") => Some(false),
            Some(_) => {
                return Err(TusError::invalid(
                    "Header Upload-Incomplete must be a structured boolean",
                ))
            }
        };

        Ok(Self {
            resource_id: ResourceId::from(token),
            upload_offset,
            upload_incomplete,
        })
    }
}

/// Structured field boolean
pub(crate) fn sf_bool(value: bool) -> &'static str {
    if value {
        "?1"
    } else {
        "?0"
    }
}

#[derive(Debug, Clone)]
pub struct RetrieveOffsetContext {
    pub headers: Tus2Headers,
}

#[derive(Debug, Clone)]
pub struct DeleteContext {
    pub headers: Tus2Headers,
}

#[derive(Debug, Clone)]
pub struct CreateFileContext {
    pub headers: Tus2Headers,
}

/// Everything a data transfer needs
pub struct WriteDataContext {
    pub headers: Tus2Headers,
    pub body: Box<dyn BodyReader>,
    /// Fires when the client disconnects
    pub cancellation: CancellationToken,
}

impl WriteDataContext {
    pub fn new(
        headers: Tus2Headers,
        body: Box<dyn BodyReader>,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            headers,
            body,
            cancellation,
        }
    }

    /// Context with an empty body and a token that never fires
    pub fn empty(headers: Tus2Headers) -> Self {
        Self::new(headers, Box::new(StreamBodyReader::empty()), CancellationToken::new())
    }
}

impl std::fmt::Debug for WriteDataContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteDataContext")
            .field("headers", &self.headers)
            .field("cancelled", &self.cancellation.is_cancelled())
            .finish_non_exhaustive()
    }
}
