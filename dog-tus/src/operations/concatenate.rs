use http::header::LOCATION;
use http::StatusCode;
use tracing::info;

use crate::events::CreateCompleteContext;
use crate::headers::UPLOAD_LENGTH;
use crate::operations::apply_expiration;
use crate::operations::create::{validate_creation, CreationRequest};
use crate::{FileConcat, ResourceId, TusContext, TusResult};

/// `POST` with `Upload-Concat`: create a partial upload, or stitch finished
/// partials together into a final one
#[derive(Debug, Clone)]
pub struct ConcatenateFiles {
    upload_concat: Result<FileConcat, String>,
    creation: Option<CreationRequest>,
    final_length: Option<u64>,
}

impl ConcatenateFiles {
    /// Parse the `Upload-Concat` value. A malformed header is reported during validation.
    pub fn from_header(header: &str, url_path: &str) -> Self {
        let upload_concat = FileConcat::parse(header, url_path).map_err(|err| match err {
            crate::TusError::Invalid { message } => message,
            other => other.to_string(),
        });

        Self {
            upload_concat,
            creation: None,
            final_length: None,
        }
    }

    pub fn upload_concat(&self) -> Option<&FileConcat> {
        self.upload_concat.as_ref().ok()
    }

    pub(crate) async fn validate(&mut self, ctx: &mut TusContext) -> TusResult<bool> {
        let concat = match &self.upload_concat {
            Ok(concat) => concat,
            Err(message) => {
                ctx.response.error(StatusCode::BAD_REQUEST, message.clone());
                return Ok(false);
            }
        };

        if let FileConcat::Final { partials } = concat {
            if ctx.request.headers.contains_key(UPLOAD_LENGTH) {
                ctx.response.error(
                    StatusCode::BAD_REQUEST,
                    "Header Upload-Length: Header must not be specified \
                     when Upload-Concat is final",
                );
                return Ok(false);
            }

            let Some(total) = validate_partials(ctx, partials).await? else {
                return Ok(false);
            };

            if let Some(max) = ctx.config.max_allowed_upload_size {
                if total > max {
                    ctx.response.error(
                        StatusCode::PAYLOAD_TOO_LARGE,
                        format!(
                            "The concatenated file exceeds the server's max file size. \
                             Max size is {}",
                            max
                        ),
                    );
                    return Ok(false);
                }
            }

            self.final_length = Some(total);
            self.creation = validate_creation(ctx, Some(concat), false)?;
        } else {
            self.creation = validate_creation(ctx, Some(concat), true)?;
        }

        Ok(self.creation.is_some())
    }

    pub(crate) async fn invoke(&mut self, ctx: &mut TusContext) -> TusResult<()> {
        let creation = self.creation.take().unwrap_or_default();
        let Ok(concat) = &self.upload_concat else {
            return Ok(());
        };

        let (id, upload_length) = match concat {
            FileConcat::Partial => {
                let id = ctx
                    .store
                    .create_partial_file(creation.upload_length, creation.raw_metadata.as_deref())
                    .await?;
                apply_expiration(ctx, &id).await?;
                (id, creation.upload_length)
            }
            FileConcat::Final { partials } => {
                let id = ctx
                    .store
                    .create_final_file(partials, creation.raw_metadata.as_deref())
                    .await?;
                (id, self.final_length)
            }
        };
        info!(file_id = %id, is_final = concat.is_final(), "concatenated upload created");

        let location = ctx.location_for(&id);
        ctx.response.set_header(LOCATION, location)?;
        ctx.response.set_status(StatusCode::CREATED);

        ctx.config.events.create_complete(&CreateCompleteContext {
            file_id: &id,
            upload_length,
            file_concatenation: Some(concat),
        });

        ctx.file_id = Some(id);
        Ok(())
    }
}

/// Every partial must exist, be a partial upload and be complete. Returns the summed length.
async fn validate_partials(
    ctx: &mut TusContext,
    partials: &[ResourceId],
) -> TusResult<Option<u64>> {
    let store = ctx.store.clone();
    let mut total = 0u64;

    for id in partials {
        if !store.file_exists(id).await? {
            ctx.response.error(
                StatusCode::BAD_REQUEST,
                format!("Header Upload-Concat: Could not find file {}", id),
            );
            return Ok(None);
        }

        if store.get_upload_concat(id).await? != Some(FileConcat::Partial) {
            ctx.response.error(
                StatusCode::BAD_REQUEST,
                format!("Header Upload-Concat: File {} is not a partial file", id),
            );
            return Ok(None);
        }

        let length = store.get_upload_length(id).await?;
        let offset = store.get_upload_offset(id).await?;
        match length {
            Some(length) if length == offset => total = total.saturating_add(length),
            _ => {
                ctx.response.error(
                    StatusCode::BAD_REQUEST,
                    format!("Header Upload-Concat: File {} is not complete", id),
                );
                return Ok(None);
            }
        }
    }

    Ok(Some(total))
}
