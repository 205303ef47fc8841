//! Runs one operation through authorize, version check, lock, validate and invoke.

use std::sync::Arc;

use http::StatusCode;
use tracing::{debug, instrument, warn};

use crate::events::AuthorizeContext;
use crate::headers::{TUS_RESUMABLE, TUS_VERSION, TUS_VERSION_1_0_0};
use crate::operations::Operation;
use crate::{FileLock, LockMode, Outcome, TusContext, TusError, TusResult};

/// Holds an acquired lock and releases it however the executor exits
struct LockGuard(Option<Box<dyn FileLock>>);

impl LockGuard {
    fn release(&mut self) {
        if let Some(lock) = self.0.as_mut() {
            lock.release_if_held();
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// Execute a single operation against the context.
///
/// Expected failures end up in `ctx.response` and return
/// [`Outcome::StopExecution`]: a held lock (409), an exceeded read budget
/// (413) and store errors (400). Anything else is returned as an error once
/// the lock has been released.
#[instrument(skip_all, fields(intent = ?operation.intent_type(), file_id = tracing::field::Empty))]
pub async fn execute(operation: &mut Operation, ctx: &mut TusContext) -> TusResult<Outcome> {
    if let Some(id) = &ctx.file_id {
        tracing::Span::current().record("file_id", tracing::field::display(id));
    }

    let config = Arc::clone(&ctx.config);

    let mut authorize = AuthorizeContext {
        intent: operation.intent_type(),
        file_concatenation: operation.file_concatenation(),
        file_id: ctx.file_id.as_ref(),
        headers: &ctx.request.headers,
        response: &mut ctx.response,
    };
    if config.events.authorize(&mut authorize) == Outcome::StopExecution {
        debug!("request stopped by authorization hook");
        return Ok(Outcome::StopExecution);
    }

    if operation.requires_version_check() && !verify_tus_version(ctx)? {
        return Ok(Outcome::StopExecution);
    }

    let mut guard = LockGuard(None);

    if operation.lock_mode() == LockMode::RequiresLock {
        let id = ctx
            .file_id
            .clone()
            .ok_or_else(|| TusError::invalid("Locking operation without a target upload"))?;

        let mut lock = config.lock_provider.lock_for(&id).await?;
        if !lock.lock().await? {
            debug!(file_id = %id, "upload is locked by another request");
            ctx.response.error(
                StatusCode::CONFLICT,
                format!(
                    "File {} is currently being updated. Please try again later",
                    id
                ),
            );
            return Ok(Outcome::StopExecution);
        }
        guard.0 = Some(lock);
    }

    let result = validate_and_invoke(operation, ctx).await;
    guard.release();

    match result {
        Ok(()) => Ok(Outcome::StopExecution),
        Err(TusError::MaxReadSizeExceeded { message }) => {
            debug!(%message, "request body exceeded read budget");
            ctx.response.error(StatusCode::PAYLOAD_TOO_LARGE, message);
            Ok(Outcome::StopExecution)
        }
        Err(TusError::Store { message }) => {
            debug!(%message, "store rejected operation");
            ctx.response.error(StatusCode::BAD_REQUEST, message);
            Ok(Outcome::StopExecution)
        }
        Err(err) => {
            warn!(error = %err, "operation failed");
            Err(err)
        }
    }
}

async fn validate_and_invoke(operation: &mut Operation, ctx: &mut TusContext) -> TusResult<()> {
    if !operation.validate(ctx).await? {
        debug!(status = %ctx.response.status, "request failed validation");
        return Ok(());
    }
    operation.invoke(ctx).await
}

/// `Tus-Resumable` must name a version this server speaks, else 412
fn verify_tus_version(ctx: &mut TusContext) -> TusResult<bool> {
    let requested = ctx.request.header(&TUS_RESUMABLE).unwrap_or_default().trim();
    if requested == TUS_VERSION_1_0_0 {
        return Ok(true);
    }

    let message = format!(
        "Tus version {} is not supported by the server. Supported versions: {}",
        requested, TUS_VERSION_1_0_0
    );
    ctx.response.set_header(TUS_VERSION, TUS_VERSION_1_0_0)?;
    ctx.response.error(StatusCode::PRECONDITION_FAILED, message);
    Ok(false)
}
