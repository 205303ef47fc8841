//! Protocol operations.
//!
//! Each request resolves to one or two [`Operation`]s. The executor drives
//! every operation through the same two stages: [`Operation::validate`]
//! writes an error response and returns `false` when the request cannot be
//! served, [`Operation::invoke`] talks to the store and fills the response.

mod concatenate;
mod create;
mod delete;
mod info;
mod options;
mod write;

pub use concatenate::ConcatenateFiles;
pub use create::CreateFile;
pub use delete::DeleteFile;
pub use info::GetFileInfo;
pub use options::GetOptions;
pub use write::WriteFile;

use chrono::{DateTime, Utc};
use http::{HeaderName, StatusCode};

use crate::headers::UPLOAD_EXPIRES;
use crate::{FileConcat, IntentType, LockMode, ResourceId, TusContext, TusResult};

/// One protocol operation
#[derive(Debug, Clone)]
pub enum Operation {
    GetOptions(GetOptions),
    GetFileInfo(GetFileInfo),
    CreateFile(CreateFile),
    ConcatenateFiles(ConcatenateFiles),
    WriteFile(WriteFile),
    DeleteFile(DeleteFile),
}

impl Operation {
    pub fn intent_type(&self) -> IntentType {
        match self {
            Self::GetOptions(_) => IntentType::GetOptions,
            Self::GetFileInfo(_) => IntentType::GetFileInfo,
            Self::CreateFile(_) => IntentType::CreateFile,
            Self::ConcatenateFiles(_) => IntentType::ConcatenateFiles,
            Self::WriteFile(_) => IntentType::WriteFile,
            Self::DeleteFile(_) => IntentType::DeleteFile,
        }
    }

    /// Create and concatenate have no resource to lock until the store allocates one
    pub fn lock_mode(&self) -> LockMode {
        match self {
            Self::WriteFile(_) | Self::DeleteFile(_) => LockMode::RequiresLock,
            Self::GetOptions(_)
            | Self::GetFileInfo(_)
            | Self::CreateFile(_)
            | Self::ConcatenateFiles(_) => LockMode::NoLockNeeded,
        }
    }

    /// OPTIONS is the only operation served without a `Tus-Resumable` check
    pub fn requires_version_check(&self) -> bool {
        !matches!(self, Self::GetOptions(_))
    }

    /// Concatenation kind handed to the authorization hook
    pub fn file_concatenation(&self) -> Option<&FileConcat> {
        match self {
            Self::ConcatenateFiles(op) => op.upload_concat(),
            _ => None,
        }
    }

    pub async fn validate(&mut self, ctx: &mut TusContext) -> TusResult<bool> {
        match self {
            Self::GetOptions(op) => op.validate(ctx).await,
            Self::GetFileInfo(op) => op.validate(ctx).await,
            Self::CreateFile(op) => op.validate(ctx).await,
            Self::ConcatenateFiles(op) => op.validate(ctx).await,
            Self::WriteFile(op) => op.validate(ctx).await,
            Self::DeleteFile(op) => op.validate(ctx).await,
        }
    }

    pub async fn invoke(&mut self, ctx: &mut TusContext) -> TusResult<()> {
        match self {
            Self::GetOptions(op) => op.invoke(ctx).await,
            Self::GetFileInfo(op) => op.invoke(ctx).await,
            Self::CreateFile(op) => op.invoke(ctx).await,
            Self::ConcatenateFiles(op) => op.invoke(ctx).await,
            Self::WriteFile(op) => op.invoke(ctx).await,
            Self::DeleteFile(op) => op.invoke(ctx).await,
        }
    }
}

/// `Upload-Expires` header value (RFC 7231 date)
pub fn format_expires(expires: DateTime<Utc>) -> String {
    expires.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Parse a non-negative integer header. `Ok(None)` when the header is absent.
pub(crate) fn parse_number_header(
    ctx: &TusContext,
    name: &HeaderName,
    display: &str,
) -> Result<Option<u64>, String> {
    match ctx.request.headers.get(name) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .ok()
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map(Some)
            .ok_or_else(|| format!("Header {} must be a positive number", display)),
    }
}

/// The operation's target, which the resolver guarantees for targeted operations
pub(crate) fn target_id(ctx: &TusContext) -> TusResult<ResourceId> {
    ctx.file_id
        .clone()
        .ok_or_else(|| crate::TusError::invalid("Request does not target an upload"))
}

/// 404 unless the upload exists and has not expired
pub(crate) async fn ensure_file_available(
    ctx: &mut TusContext,
    id: &ResourceId,
) -> TusResult<bool> {
    let store = ctx.store.clone();

    if !store.file_exists(id).await? {
        ctx.response.set_status(StatusCode::NOT_FOUND);
        return Ok(false);
    }

    if store.extensions().expiration {
        if let Some(expires) = store.get_expiration(id).await? {
            if expires < Utc::now() {
                ctx.response.set_status(StatusCode::NOT_FOUND);
                return Ok(false);
            }
        }
    }

    Ok(true)
}

/// Store a fresh expiry for `id` and advertise it, when expiration is enabled
pub(crate) async fn apply_expiration(ctx: &mut TusContext, id: &ResourceId) -> TusResult<()> {
    let Some(expiration) = ctx.config.expiration else {
        return Ok(());
    };
    if !ctx.store.extensions().expiration {
        return Ok(());
    }

    let expires = expiration.expires_at(Utc::now());
    ctx.store.set_expiration(id, expires).await?;
    ctx.response.set_header(UPLOAD_EXPIRES, format_expires(expires))?;
    Ok(())
}
