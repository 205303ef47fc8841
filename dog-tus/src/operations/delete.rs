use http::StatusCode;
use tracing::info;

use crate::events::DeleteCompleteContext;
use crate::operations::{ensure_file_available, target_id};
use crate::{TusContext, TusResult};

/// `DELETE`: terminate an upload and drop its data
#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteFile;

impl DeleteFile {
    pub(crate) async fn validate(&mut self, ctx: &mut TusContext) -> TusResult<bool> {
        let id = target_id(ctx)?;
        ensure_file_available(ctx, &id).await
    }

    pub(crate) async fn invoke(&mut self, ctx: &mut TusContext) -> TusResult<()> {
        let id = target_id(ctx)?;

        ctx.store.delete_file(&id).await?;
        info!(file_id = %id, "upload deleted");

        ctx.response.set_status(StatusCode::NO_CONTENT);
        ctx.config
            .events
            .delete_complete(&DeleteCompleteContext { file_id: &id });
        Ok(())
    }
}
