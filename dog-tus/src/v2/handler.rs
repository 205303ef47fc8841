use http::{Method, StatusCode};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use super::{
    CreateFileContext, DeleteContext, RetrieveOffsetContext, StorageFacade, Tus2Headers,
    WriteDataContext,
};
use crate::headers::UPLOAD_OFFSET;
use crate::{
    BodyReader, MaxReadSizeGuardedReader, StreamBodyReader, TusError, TusRequest, TusResponse,
    TusResult,
};

/// Maps tus2 requests onto [`StorageFacade`] procedures
#[derive(Debug, Clone)]
pub struct Tus2Handler {
    facade: StorageFacade,
    max_size: Option<u64>,
}

impl Tus2Handler {
    pub fn new(facade: StorageFacade) -> Self {
        Self {
            facade,
            max_size: None,
        }
    }

    /// Reject bodies that would grow an upload past `bytes`
    pub fn with_max_size(mut self, bytes: u64) -> Self {
        self.max_size = Some(bytes);
        self
    }

    pub fn facade(&self) -> &StorageFacade {
        &self.facade
    }

    /// Serve one request. `Ok(None)` means the client went away and nothing should be sent.
    #[instrument(skip_all, fields(method = %request.method))]
    pub async fn handle(
        &self,
        mut request: TusRequest,
        cancellation: CancellationToken,
    ) -> TusResult<Option<TusResponse>> {
        let mut response = TusResponse::new();

        let headers = match Tus2Headers::parse(&request.headers) {
            Ok(headers) => headers,
            Err(TusError::Invalid { message }) => {
                response.error(StatusCode::BAD_REQUEST, message);
                return Ok(Some(response));
            }
            Err(err) => return Err(err),
        };

        let result = match request.method {
            Method::HEAD => self.retrieve_offset(headers, &mut response).await,
            Method::DELETE => self.delete(headers, &mut response).await,
            Method::POST | Method::PATCH => {
                let body =
                    std::mem::replace(&mut request.body, Box::new(StreamBodyReader::empty()));
                return self.transfer(headers, body, cancellation, response).await;
            }
            _ => {
                response.set_status(StatusCode::METHOD_NOT_ALLOWED);
                Ok(())
            }
        };

        map_error(result, &mut response)?;
        Ok(Some(response))
    }

    async fn retrieve_offset(
        &self,
        headers: Tus2Headers,
        response: &mut TusResponse,
    ) -> TusResult<()> {
        if !self.facade.storage().exists(&headers.resource_id).await? {
            response.set_status(StatusCode::NOT_FOUND);
            return Ok(());
        }

        self.facade
            .retrieve_offset(&RetrieveOffsetContext { headers })
            .await?
            .write_to(response)
    }

    async fn delete(&self, headers: Tus2Headers, response: &mut TusResponse) -> TusResult<()> {
        if !self.facade.storage().exists(&headers.resource_id).await? {
            response.set_status(StatusCode::NOT_FOUND);
            return Ok(());
        }

        self.facade.delete(&DeleteContext { headers }).await?;
        response.set_status(StatusCode::NO_CONTENT);
        Ok(())
    }

    async fn transfer(
        &self,
        headers: Tus2Headers,
        body: Box<dyn BodyReader>,
        cancellation: CancellationToken,
        mut response: TusResponse,
    ) -> TusResult<Option<TusResponse>> {
        let storage = self.facade.storage();
        let id = headers.resource_id.clone();
        let exists = storage.exists(&id).await?;

        let start = match (exists, headers.upload_offset) {
            (false, None | Some(0)) => {
                self.facade
                    .create_file(&CreateFileContext {
                        headers: headers.clone(),
                    })
                    .await?;
                0
            }
            (false, Some(_)) => {
                response.set_status(StatusCode::NOT_FOUND);
                return Ok(Some(response));
            }
            (true, None) => {
                response.error(StatusCode::CONFLICT, "Upload already exists");
                return Ok(Some(response));
            }
            (true, Some(requested)) => {
                let stored = storage.get_offset(&id).await?;
                if requested != stored {
                    response.set_header(UPLOAD_OFFSET, stored.to_string())?;
                    response.error(
                        StatusCode::CONFLICT,
                        format!(
                            "Offset does not match upload. Upload offset: {}. Request offset: {}",
                            stored, requested
                        ),
                    );
                    return Ok(Some(response));
                }
                if storage.is_complete(&id).await? {
                    response.error(StatusCode::BAD_REQUEST, "Upload is already complete");
                    return Ok(Some(response));
                }
                stored
            }
        };

        let body: Box<dyn BodyReader> = match self.max_size {
            Some(max) => Box::new(MaxReadSizeGuardedReader::new(body, start, max)),
            None => body,
        };

        let mut ctx = WriteDataContext::new(headers, body, cancellation);
        let result = self.facade.write_data(&mut ctx).await;

        match result {
            Ok(write) if write.disconnect => {
                debug!(resource_id = %id, offset = write.offset, "client gone, no response");
                Ok(None)
            }
            Ok(write) => {
                write.write_to(&mut response)?;
                Ok(Some(response))
            }
            Err(err) => {
                map_error(Err(err), &mut response)?;
                Ok(Some(response))
            }
        }
    }
}

/// Client errors become responses; everything else propagates
fn map_error(result: TusResult<()>, response: &mut TusResponse) -> TusResult<()> {
    match result {
        Ok(()) => Ok(()),
        Err(TusError::NotFound { .. }) => {
            response.set_status(StatusCode::NOT_FOUND);
            Ok(())
        }
        Err(TusError::Invalid { message })
        | Err(TusError::Store { message })
        | Err(TusError::MaxReadSizeExceeded { message }) => {
            response.error(StatusCode::BAD_REQUEST, message);
            Ok(())
        }
        Err(err) => {
            warn!(error = %err, "tus2 request failed");
            Err(err)
        }
    }
}
