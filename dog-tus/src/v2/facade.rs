use std::sync::Arc;

use http::StatusCode;
use tracing::{debug, instrument};

use super::{
    sf_bool, CreateFileContext, DeleteContext, RetrieveOffsetContext, Tus2Storage,
    WriteDataContext,
};
use crate::headers::{UPLOAD_INCOMPLETE, UPLOAD_OFFSET};
use crate::{TusResponse, TusResult};

/// Result of offset retrieval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffsetResponse {
    pub status: StatusCode,
    pub offset: u64,
    pub incomplete: bool,
}

/// Result of a data transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteResponse {
    /// `None` when the client is gone and nothing should be sent
    pub status: Option<StatusCode>,
    /// Offset read back from storage after the write
    pub offset: u64,
    /// `Upload-Incomplete` as the client declared it
    pub incomplete: bool,
    /// The upload was marked complete by this request
    pub completed: bool,
    pub disconnect: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CreateResponse;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeleteResponse;

impl OffsetResponse {
    pub fn write_to(&self, response: &mut TusResponse) -> TusResult<()> {
        response.set_status(self.status);
        response.set_header(UPLOAD_OFFSET, self.offset.to_string())?;
        response.set_header(UPLOAD_INCOMPLETE, sf_bool(self.incomplete))?;
        response.set_no_store();
        Ok(())
    }
}

impl WriteResponse {
    pub fn write_to(&self, response: &mut TusResponse) -> TusResult<()> {
        let Some(status) = self.status else {
            return Ok(());
        };
        response.set_status(status);
        response.set_header(UPLOAD_OFFSET, self.offset.to_string())?;
        response.set_header(UPLOAD_INCOMPLETE, sf_bool(self.incomplete))?;
        Ok(())
    }
}

/// Sequences storage calls for each tus2 procedure
#[derive(Clone)]
pub struct StorageFacade {
    storage: Arc<dyn Tus2Storage>,
}

impl StorageFacade {
    pub fn new<S: Tus2Storage + 'static>(storage: S) -> Self {
        Self::from_arc(Arc::new(storage))
    }

    pub fn from_arc(storage: Arc<dyn Tus2Storage>) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &Arc<dyn Tus2Storage> {
        &self.storage
    }

    /// Offset and completion are looked up concurrently
    #[instrument(skip_all, fields(resource_id = %ctx.headers.resource_id))]
    pub async fn retrieve_offset(&self, ctx: &RetrieveOffsetContext) -> TusResult<OffsetResponse> {
        let id = &ctx.headers.resource_id;

        let (offset, complete) =
            futures::try_join!(self.storage.get_offset(id), self.storage.is_complete(id))?;

        Ok(OffsetResponse {
            status: StatusCode::NO_CONTENT,
            offset,
            incomplete: !complete,
        })
    }

    #[instrument(skip_all, fields(resource_id = %ctx.headers.resource_id))]
    pub async fn delete(&self, ctx: &DeleteContext) -> TusResult<DeleteResponse> {
        self.storage.delete(&ctx.headers.resource_id).await?;
        Ok(DeleteResponse)
    }

    #[instrument(skip_all, fields(resource_id = %ctx.headers.resource_id))]
    pub async fn create_file(&self, ctx: &CreateFileContext) -> TusResult<CreateResponse> {
        self.storage.create(&ctx.headers.resource_id, ctx).await?;
        Ok(CreateResponse)
    }

    /// Write the body, then report where the upload stands.
    ///
    /// A store that fails with cancellation is treated like one that
    /// returned early. The offset is always read back from storage. A
    /// disconnected client gets no status; an upload declared incomplete
    /// stays open; otherwise the upload is marked complete.
    #[instrument(skip_all, fields(resource_id = %ctx.headers.resource_id))]
    pub async fn write_data(&self, ctx: &mut WriteDataContext) -> TusResult<WriteResponse> {
        let id = ctx.headers.resource_id.clone();

        match self.storage.write_data(&id, ctx).await {
            Ok(()) => {}
            Err(err) if err.is_cancellation() => {
                debug!("store aborted write on cancellation");
            }
            Err(err) => return Err(err),
        }

        let incomplete = ctx.headers.upload_incomplete == Some(true);
        let offset = self.storage.get_offset(&id).await?;

        if ctx.cancellation.is_cancelled() {
            debug!(offset, "client disconnected during write");
            return Ok(WriteResponse {
                status: None,
                offset,
                incomplete,
                completed: false,
                disconnect: true,
            });
        }

        if incomplete {
            return Ok(WriteResponse {
                status: Some(StatusCode::CREATED),
                offset,
                incomplete: true,
                completed: false,
                disconnect: false,
            });
        }

        self.storage.mark_complete(&id).await?;
        debug!(offset, "upload marked complete");

        Ok(WriteResponse {
            status: Some(StatusCode::CREATED),
            offset,
            incomplete: false,
            completed: true,
            disconnect: false,
        })
    }
}

impl std::fmt::Debug for StorageFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageFacade").finish_non_exhaustive()
    }
}
