//! Classifies a request into the protocol operations it asks for.

use tracing::debug;

use crate::headers::{
    OFFSET_OCTET_STREAM, TUS_RESUMABLE, UPLOAD_CONCAT, UPLOAD_LENGTH, UPLOAD_OFFSET,
    X_HTTP_METHOD_OVERRIDE,
};
use crate::operations::{
    ConcatenateFiles, CreateFile, DeleteFile, GetFileInfo, GetOptions, Operation, WriteFile,
};
use crate::{FileConcat, TusContext};

use http::header::CONTENT_TYPE;
use http::HeaderValue;

/// The operations a single request resolved to.
///
/// `second` is only ever a write that uploads the body sent along with a
/// creation request.
#[derive(Debug)]
pub struct OperationPair {
    pub first: Operation,
    pub second: Option<WriteFile>,
}

/// Method the request asks for, honoring a non-blank `X-HTTP-Method-Override`
pub fn effective_method(ctx: &TusContext) -> String {
    ctx.request
        .header(&X_HTTP_METHOD_OVERRIDE)
        .map(str::trim)
        .filter(|method| !method.is_empty())
        .unwrap_or_else(|| ctx.request.method.as_str())
        .to_ascii_lowercase()
}

/// Resolve the primary operation. `None` means the request is not for this endpoint.
pub fn determine_intent(ctx: &TusContext) -> Option<Operation> {
    let method = effective_method(ctx);

    if method != "options" && !ctx.request.headers.contains_key(TUS_RESUMABLE) {
        return None;
    }

    let targets_file = matches!(method.as_str(), "head" | "patch" | "delete");
    if targets_file {
        ctx.file_id_from_url()?;
    } else if !ctx.url_matches_url_path() {
        return None;
    }

    let extensions = ctx.store.extensions();

    match method.as_str() {
        "options" => Some(Operation::GetOptions(GetOptions)),
        "head" => Some(Operation::GetFileInfo(GetFileInfo)),
        "patch" => Some(Operation::WriteFile(WriteFile::new(false))),
        "delete" if extensions.termination => Some(Operation::DeleteFile(DeleteFile)),
        "post" if extensions.creation => {
            match ctx.request.header(&UPLOAD_CONCAT) {
                Some(header) if extensions.concatenation => Some(Operation::ConcatenateFiles(
                    ConcatenateFiles::from_header(header, &ctx.config.url_path),
                )),
                _ => Some(Operation::CreateFile(CreateFile::default())),
            }
        }
        _ => None,
    }
}

/// Resolve every operation the request asks for and bind the context to its target
pub async fn determine_intents(ctx: &mut TusContext) -> Option<OperationPair> {
    let first = determine_intent(ctx)?;

    if matches!(
        first,
        Operation::GetFileInfo(_) | Operation::WriteFile(_) | Operation::DeleteFile(_)
    ) {
        ctx.file_id = ctx.file_id_from_url();
    }

    let second = creation_with_upload(&first, ctx).await;

    Some(OperationPair { first, second })
}

/// A creation request carrying body bytes also uploads them
async fn creation_with_upload(first: &Operation, ctx: &mut TusContext) -> Option<WriteFile> {
    match first {
        Operation::CreateFile(_) => {}
        Operation::ConcatenateFiles(op) => {
            // final uploads are assembled from their partials and never written to
            if op.upload_concat().map_or(true, FileConcat::is_final) {
                return None;
            }
        }
        _ => return None,
    }

    let content_type = ctx.request.header(&CONTENT_TYPE).unwrap_or_default();
    if !content_type
        .split(';')
        .next()
        .map_or(false, |mime| mime.trim().eq_ignore_ascii_case(OFFSET_OCTET_STREAM))
    {
        return None;
    }

    match ctx.request.body.read().await {
        Ok(result) if !result.buffer.is_empty() => {
            // keep the peeked bytes in the reader for the write
            ctx.request.body.advance_to_examined(0, result.buffer.len());
            Some(WriteFile::new(true))
        }
        Ok(_) => None,
        Err(err) => {
            debug!(error = %err, "could not read body for creation with upload");
            None
        }
    }
}

/// Rewrite the request so the synthesized write starts at offset zero of the new upload
pub fn prepare_for_creation_with_upload(ctx: &mut TusContext) {
    ctx.request.headers.remove(UPLOAD_LENGTH);
    ctx.request
        .headers
        .insert(UPLOAD_OFFSET, HeaderValue::from_static("0"));
}
