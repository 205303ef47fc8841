use http::header::LOCATION;
use http::StatusCode;
use tracing::info;

use crate::events::{BeforeCreateContext, CreateCompleteContext};
use crate::headers::{UPLOAD_DEFER_LENGTH, UPLOAD_LENGTH, UPLOAD_METADATA};
use crate::operations::{apply_expiration, parse_number_header};
use crate::{parse_metadata, FileConcat, MetadataMap, Outcome, TusContext, TusError, TusResult};

/// `POST`: allocate a new upload
#[derive(Debug, Clone, Default)]
pub struct CreateFile {
    creation: Option<CreationRequest>,
}

/// Creation headers once they passed validation
#[derive(Debug, Clone, Default)]
pub(crate) struct CreationRequest {
    pub upload_length: Option<u64>,
    pub raw_metadata: Option<String>,
}

impl CreateFile {
    pub(crate) async fn validate(&mut self, ctx: &mut TusContext) -> TusResult<bool> {
        self.creation = validate_creation(ctx, None, true)?;
        Ok(self.creation.is_some())
    }

    pub(crate) async fn invoke(&mut self, ctx: &mut TusContext) -> TusResult<()> {
        let creation = self.creation.take().unwrap_or_default();

        let id = ctx
            .store
            .create_file(creation.upload_length, creation.raw_metadata.as_deref())
            .await?;
        info!(file_id = %id, upload_length = ?creation.upload_length, "upload created");

        apply_expiration(ctx, &id).await?;

        let location = ctx.location_for(&id);
        ctx.response.set_header(LOCATION, location)?;
        ctx.response.set_status(StatusCode::CREATED);

        ctx.config.events.create_complete(&CreateCompleteContext {
            file_id: &id,
            upload_length: creation.upload_length,
            file_concatenation: None,
        });

        ctx.file_id = Some(id);
        Ok(())
    }
}

/// Shared checks for `POST` requests that create an upload.
///
/// Writes the error response and returns `None` when the request is rejected.
/// With `require_length` unset neither length header is demanded, which is
/// how final concatenations are created.
pub(crate) fn validate_creation(
    ctx: &mut TusContext,
    file_concatenation: Option<&FileConcat>,
    require_length: bool,
) -> TusResult<Option<CreationRequest>> {
    let upload_length = match parse_number_header(ctx, &UPLOAD_LENGTH, "Upload-Length") {
        Ok(length) => length,
        Err(message) => return reject(ctx, StatusCode::BAD_REQUEST, message),
    };

    if require_length {
        let defer = ctx
            .request
            .header(&UPLOAD_DEFER_LENGTH)
            .map(|value| value.trim().to_string());
        let defer_supported = ctx.store.extensions().creation_defer_length;

        match (upload_length, defer.as_deref()) {
            (Some(_), Some(_)) => {
                return reject(
                    ctx,
                    StatusCode::BAD_REQUEST,
                    "Headers Upload-Length and Upload-Defer-Length are mutually exclusive \
                     and cannot be used in the same request",
                );
            }
            (None, None) if defer_supported => {
                return reject(
                    ctx,
                    StatusCode::BAD_REQUEST,
                    "Header Upload-Length or Upload-Defer-Length must be specified",
                );
            }
            (None, None) => {
                return reject(ctx, StatusCode::BAD_REQUEST, "Missing Upload-Length header");
            }
            (None, Some(_)) if !defer_supported => {
                return reject(
                    ctx,
                    StatusCode::BAD_REQUEST,
                    "Header Upload-Defer-Length is not supported",
                );
            }
            (None, Some(value)) if value != "1" => {
                return reject(
                    ctx,
                    StatusCode::BAD_REQUEST,
                    "Header Upload-Defer-Length must have the value '1' or be omitted",
                );
            }
            _ => {}
        }
    }

    if let (Some(length), Some(max)) = (upload_length, ctx.config.max_allowed_upload_size) {
        if length > max {
            return reject(
                ctx,
                StatusCode::PAYLOAD_TOO_LARGE,
                format!(
                    "Header Upload-Length exceeds the server's max file size. Max size is {}",
                    max
                ),
            );
        }
    }

    let raw_metadata = ctx.request.header(&UPLOAD_METADATA).map(str::to_string);
    let metadata: MetadataMap = match raw_metadata.as_deref().map(parse_metadata).transpose() {
        Ok(metadata) => metadata.unwrap_or_default(),
        Err(TusError::Invalid { message }) => return reject(ctx, StatusCode::BAD_REQUEST, message),
        Err(err) => return Err(err),
    };

    if let Some(validator) = ctx.config.metadata_validator.clone() {
        let problems = validator.validate(&metadata);
        if !problems.is_empty() {
            return reject(ctx, StatusCode::BAD_REQUEST, problems.join(", "));
        }
    }

    let events = ctx.config.events.clone();
    let mut before_create = BeforeCreateContext {
        metadata: &metadata,
        upload_length,
        file_concatenation,
        response: &mut ctx.response,
    };
    if events.before_create(&mut before_create) == Outcome::StopExecution {
        return Ok(None);
    }

    Ok(Some(CreationRequest {
        upload_length,
        raw_metadata,
    }))
}

fn reject(
    ctx: &mut TusContext,
    status: StatusCode,
    message: impl Into<String>,
) -> TusResult<Option<CreationRequest>> {
    ctx.response.error(status, message);
    Ok(None)
}
