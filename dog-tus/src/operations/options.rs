use http::StatusCode;

use crate::headers::{TUS_EXTENSION, TUS_MAX_SIZE, TUS_VERSION, TUS_VERSION_1_0_0};
use crate::{TusContext, TusResult};

/// `OPTIONS`: advertise protocol versions, extensions and limits
#[derive(Debug, Clone, Copy, Default)]
pub struct GetOptions;

impl GetOptions {
    pub(crate) async fn validate(&mut self, _ctx: &mut TusContext) -> TusResult<bool> {
        Ok(true)
    }

    pub(crate) async fn invoke(&mut self, ctx: &mut TusContext) -> TusResult<()> {
        ctx.response.set_header(TUS_VERSION, TUS_VERSION_1_0_0)?;

        let extensions = ctx.store.extensions().names();
        if !extensions.is_empty() {
            ctx.response.set_header(TUS_EXTENSION, extensions.join(","))?;
        }

        if let Some(max) = ctx.config.max_allowed_upload_size {
            ctx.response.set_header(TUS_MAX_SIZE, max.to_string())?;
        }

        ctx.response.set_status(StatusCode::NO_CONTENT);
        Ok(())
    }
}
