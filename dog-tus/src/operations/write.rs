use http::header::CONTENT_TYPE;
use http::StatusCode;
use tracing::{debug, info};

use crate::events::FileCompleteContext;
use crate::headers::{OFFSET_OCTET_STREAM, UPLOAD_EXPIRES, UPLOAD_LENGTH, UPLOAD_OFFSET};
use crate::operations::{
    apply_expiration, ensure_file_available, format_expires, parse_number_header, target_id,
};
use crate::{MaxReadSizeGuardedReader, ResourceId, TusContext, TusError, TusResult};

/// `PATCH`: append the request body at the given offset
#[derive(Debug, Clone, Default)]
pub struct WriteFile {
    from_creation_with_upload: bool,
    request_offset: u64,
    stored_length: Option<u64>,
    new_upload_length: Option<u64>,
}

impl WriteFile {
    pub fn new(from_creation_with_upload: bool) -> Self {
        Self {
            from_creation_with_upload,
            ..Self::default()
        }
    }

    /// Whether this write rides along with a creation request
    pub fn from_creation_with_upload(&self) -> bool {
        self.from_creation_with_upload
    }

    pub(crate) async fn validate(&mut self, ctx: &mut TusContext) -> TusResult<bool> {
        let content_type = ctx.request.header(&CONTENT_TYPE).unwrap_or_default();
        if !is_offset_octet_stream(content_type) {
            let message = format!(
                "Header Content-Type: Content-Type {} is invalid. Must be {}",
                content_type, OFFSET_OCTET_STREAM
            );
            ctx.response.error(StatusCode::UNSUPPORTED_MEDIA_TYPE, message);
            return Ok(false);
        }

        self.request_offset = match parse_number_header(ctx, &UPLOAD_OFFSET, "Upload-Offset") {
            Ok(Some(offset)) => offset,
            Ok(None) => {
                ctx.response
                    .error(StatusCode::BAD_REQUEST, "Missing Upload-Offset header");
                return Ok(false);
            }
            Err(message) => {
                ctx.response.error(StatusCode::BAD_REQUEST, message);
                return Ok(false);
            }
        };

        let requested_length = match parse_number_header(ctx, &UPLOAD_LENGTH, "Upload-Length") {
            Ok(length) => length,
            Err(message) => {
                ctx.response.error(StatusCode::BAD_REQUEST, message);
                return Ok(false);
            }
        };

        let id = target_id(ctx)?;
        if !ensure_file_available(ctx, &id).await? {
            return Ok(false);
        }

        let store = ctx.store.clone();

        if store.extensions().concatenation {
            if let Some(concat) = store.get_upload_concat(&id).await? {
                if concat.is_final() {
                    ctx.response.error(
                        StatusCode::FORBIDDEN,
                        "File with \"Upload-Concat: final\" cannot be patched",
                    );
                    return Ok(false);
                }
            }
        }

        self.stored_length = store.get_upload_length(&id).await?;

        if let Some(length) = requested_length {
            if self.stored_length.is_some() {
                ctx.response.error(
                    StatusCode::BAD_REQUEST,
                    "Header Upload-Length: Upload-Length cannot be updated once set",
                );
                return Ok(false);
            }
            if !store.extensions().creation_defer_length {
                ctx.response.error(
                    StatusCode::BAD_REQUEST,
                    "Header Upload-Length: Deferred upload length is not supported",
                );
                return Ok(false);
            }
            if let Some(max) = ctx.config.max_allowed_upload_size {
                if length > max {
                    ctx.response.error(
                        StatusCode::PAYLOAD_TOO_LARGE,
                        format!(
                            "Header Upload-Length exceeds the server's max file size. \
                             Max size is {}",
                            max
                        ),
                    );
                    return Ok(false);
                }
            }
            self.new_upload_length = Some(length);
        }

        let stored_offset = store.get_upload_offset(&id).await?;
        if stored_offset != self.request_offset {
            ctx.response.error(
                StatusCode::CONFLICT,
                format!(
                    "Offset does not match file. File offset: {}. Request offset: {}",
                    stored_offset, self.request_offset
                ),
            );
            return Ok(false);
        }

        if self.stored_length == Some(stored_offset) {
            ctx.response
                .error(StatusCode::BAD_REQUEST, "Upload is already complete.");
            return Ok(false);
        }

        Ok(true)
    }

    pub(crate) async fn invoke(&mut self, ctx: &mut TusContext) -> TusResult<()> {
        let id = target_id(ctx)?;
        let store = ctx.store.clone();
        let cancellation = ctx.cancellation.clone();

        if let Some(length) = self.new_upload_length {
            store.set_upload_length(&id, length).await?;
        }

        let upload_length = self.new_upload_length.or(self.stored_length);
        let max_size = upload_length
            .or(ctx.config.max_allowed_upload_size)
            .unwrap_or(u64::MAX);

        let mut body =
            MaxReadSizeGuardedReader::new(&mut *ctx.request.body, self.request_offset, max_size);
        let written = match store.append_data(&id, &mut body, &cancellation).await {
            Ok(written) => written,
            Err(TusError::Cancelled) => {
                debug!(file_id = %id, "write cancelled by client");
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        if cancellation.is_cancelled() {
            debug!(file_id = %id, written, "client went away during write");
            return Ok(());
        }

        let offset = store.get_upload_offset(&id).await?;
        debug!(
            file_id = %id,
            written,
            offset,
            from_creation_with_upload = self.from_creation_with_upload,
            "data appended"
        );

        self.set_expiration_header(ctx, &id).await?;

        ctx.response.set_header(UPLOAD_OFFSET, offset.to_string())?;
        ctx.response.set_status(StatusCode::NO_CONTENT);

        if upload_length == Some(offset) {
            info!(file_id = %id, offset, "upload complete");
            ctx.config
                .events
                .file_complete(&FileCompleteContext { file_id: &id });
        }

        Ok(())
    }

    /// Sliding expiry is pushed forward on every write; absolute expiry is only echoed
    async fn set_expiration_header(&self, ctx: &mut TusContext, id: &ResourceId) -> TusResult<()> {
        let expiration = ctx.config.expiration;
        match expiration {
            Some(expiration) if expiration.is_sliding() => apply_expiration(ctx, id).await,
            Some(_) if ctx.store.extensions().expiration => {
                if let Some(expires) = ctx.store.get_expiration(id).await? {
                    ctx.response.set_header(UPLOAD_EXPIRES, format_expires(expires))?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

fn is_offset_octet_stream(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map(str::trim)
        .map_or(false, |mime| mime.eq_ignore_ascii_case(OFFSET_OCTET_STREAM))
}
