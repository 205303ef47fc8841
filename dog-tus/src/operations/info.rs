use http::StatusCode;

use crate::headers::{
    UPLOAD_CONCAT, UPLOAD_DEFER_LENGTH, UPLOAD_LENGTH, UPLOAD_METADATA, UPLOAD_OFFSET,
};
use crate::operations::{ensure_file_available, target_id};
use crate::{TusContext, TusResult};

/// `HEAD`: report how far an upload has come
#[derive(Debug, Clone, Copy, Default)]
pub struct GetFileInfo;

impl GetFileInfo {
    pub(crate) async fn validate(&mut self, ctx: &mut TusContext) -> TusResult<bool> {
        let id = target_id(ctx)?;
        ensure_file_available(ctx, &id).await
    }

    pub(crate) async fn invoke(&mut self, ctx: &mut TusContext) -> TusResult<()> {
        let id = target_id(ctx)?;
        let store = ctx.store.clone();

        let offset = store.get_upload_offset(&id).await?;
        let length = store.get_upload_length(&id).await?;
        let metadata = store.get_upload_metadata(&id).await?;
        let concat = if store.extensions().concatenation {
            store.get_upload_concat(&id).await?
        } else {
            None
        };

        let response = &mut ctx.response;
        response.set_no_store();
        response.set_header(UPLOAD_OFFSET, offset.to_string())?;

        match length {
            Some(length) => response.set_header(UPLOAD_LENGTH, length.to_string())?,
            None => response.set_header(UPLOAD_DEFER_LENGTH, "1")?,
        }

        if let Some(metadata) = metadata.filter(|m| !m.is_empty()) {
            response.set_header(UPLOAD_METADATA, metadata)?;
        }

        if let Some(concat) = concat {
            response.set_header(UPLOAD_CONCAT, concat.to_header(&ctx.config.url_path))?;
        }

        response.set_status(StatusCode::OK);
        Ok(())
    }
}
