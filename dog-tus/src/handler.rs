use std::sync::Arc;

use http::StatusCode;
use tracing::{debug, instrument};

use crate::executor::execute;
use crate::headers::{UPLOAD_EXPIRES, UPLOAD_OFFSET};
use crate::intent::{determine_intents, prepare_for_creation_with_upload, OperationPair};
use crate::operations::Operation;
use crate::{
    Outcome, ResourceId, TusConfig, TusContext, TusRequest, TusResponse, TusResult, TusStore,
};

/// Entry point a host calls for every request under the tus mount path
#[derive(Clone)]
pub struct TusProtocolHandler {
    store: Arc<dyn TusStore>,
    config: Arc<TusConfig>,
}

impl TusProtocolHandler {
    pub fn new<S: TusStore + 'static>(store: S, config: TusConfig) -> Self {
        Self::from_arc(Arc::new(store), Arc::new(config))
    }

    pub fn from_arc(store: Arc<dyn TusStore>, config: Arc<TusConfig>) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &Arc<dyn TusStore> {
        &self.store
    }

    pub fn config(&self) -> &Arc<TusConfig> {
        &self.config
    }

    /// Fresh context for one request
    pub fn context(&self, request: TusRequest) -> TusContext {
        TusContext::new(request, Arc::clone(&self.store), Arc::clone(&self.config))
    }

    /// Serve one request.
    ///
    /// [`Outcome::ContinueExecution`] means the request was not a protocol
    /// request and nothing was written to the response.
    #[instrument(skip_all, fields(method = %ctx.request.method, path = %ctx.request.path))]
    pub async fn invoke(&self, ctx: &mut TusContext) -> TusResult<Outcome> {
        let Some(OperationPair { mut first, second }) = determine_intents(ctx).await else {
            debug!("request is not a tus request");
            return Ok(Outcome::ContinueExecution);
        };

        let outcome = execute(&mut first, ctx).await?;

        if let Some(write) = second {
            if ctx.response.status == StatusCode::CREATED {
                let first_response = std::mem::take(&mut ctx.response);

                prepare_for_creation_with_upload(ctx);
                let mut write = Operation::WriteFile(write);
                let result = execute(&mut write, ctx).await;

                let second_response = std::mem::replace(&mut ctx.response, first_response);
                result?;

                let store = Arc::clone(&ctx.store);
                let file_id = ctx.file_id.clone();
                let first_response = std::mem::take(&mut ctx.response);
                ctx.response = merge_responses(
                    store.as_ref(),
                    file_id.as_ref(),
                    (&first, first_response),
                    Some((&write, second_response)),
                )
                .await?;
            }
        }

        ctx.response.set_tus_resumable();
        Ok(outcome)
    }
}

impl std::fmt::Debug for TusProtocolHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TusProtocolHandler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Fold the write half of a creation-with-upload into the creation response.
///
/// The creation response is returned as is unless it is a 201 from create
/// or concatenate followed by a write. Then it gains the write's
/// `Upload-Offset`, or the store's offset when the write produced none,
/// and the write's `Upload-Expires`.
pub async fn merge_responses(
    store: &dyn TusStore,
    file_id: Option<&ResourceId>,
    (first, mut merged): (&Operation, TusResponse),
    second: Option<(&Operation, TusResponse)>,
) -> TusResult<TusResponse> {
    if !matches!(first, Operation::CreateFile(_) | Operation::ConcatenateFiles(_)) {
        return Ok(merged);
    }

    let Some((Operation::WriteFile(_), second)) = second else {
        return Ok(merged);
    };

    if merged.status != StatusCode::CREATED {
        return Ok(merged);
    }

    let offset = match second.header(&UPLOAD_OFFSET) {
        Some(offset) => offset.to_string(),
        None => match file_id {
            Some(id) => store.get_upload_offset(id).await?.to_string(),
            None => return Ok(merged),
        },
    };
    merged.set_header(UPLOAD_OFFSET, offset)?;

    if let Some(expires) = second.headers.get(UPLOAD_EXPIRES) {
        merged.headers.insert(UPLOAD_EXPIRES, expires.clone());
    }

    Ok(merged)
}

#[cfg(test)]
mod tests {
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::operations::{CreateFile, DeleteFile, GetFileInfo, WriteFile};
    use crate::{MemoryStore, StreamBodyReader};

    fn response(status: StatusCode, headers: &[(http::HeaderName, &str)]) -> TusResponse {
        let mut response = TusResponse::new();
        response.set_status(status);
        for (name, value) in headers {
            response.set_header(name.clone(), *value).unwrap();
        }
        response
    }

    fn created() -> TusResponse {
        response(StatusCode::CREATED, &[(http::header::LOCATION, "/files/a")])
    }

    fn written() -> TusResponse {
        response(
            StatusCode::NO_CONTENT,
            &[(UPLOAD_OFFSET, "3"), (UPLOAD_EXPIRES, "Mon, 19 Oct 2026 10:00:00 GMT")],
        )
    }

    #[tokio::test]
    async fn other_first_operations_pass_through() {
        let store = MemoryStore::new();
        let id = ResourceId::from("a");
        let write = Operation::WriteFile(WriteFile::new(true));

        for first in [
            Operation::GetFileInfo(GetFileInfo),
            Operation::DeleteFile(DeleteFile::default()),
        ] {
            let merged = merge_responses(
                &store,
                Some(&id),
                (&first, created()),
                Some((&write, written())),
            )
            .await
            .unwrap();

            assert_eq!(merged.status, StatusCode::CREATED);
            assert!(merged.header(&UPLOAD_OFFSET).is_none());
            assert!(merged.header(&UPLOAD_EXPIRES).is_none());
        }
    }

    #[tokio::test]
    async fn create_without_a_following_write_passes_through() {
        let store = MemoryStore::new();
        let id = ResourceId::from("a");
        let create = Operation::CreateFile(CreateFile::default());
        let info = Operation::GetFileInfo(GetFileInfo);

        let alone = merge_responses(&store, Some(&id), (&create, created()), None)
            .await
            .unwrap();
        assert!(alone.header(&UPLOAD_OFFSET).is_none());

        let not_a_write = merge_responses(
            &store,
            Some(&id),
            (&create, created()),
            Some((&info, written())),
        )
        .await
        .unwrap();
        assert!(not_a_write.header(&UPLOAD_OFFSET).is_none());
        assert!(not_a_write.header(&UPLOAD_EXPIRES).is_none());
    }

    #[tokio::test]
    async fn failed_creation_is_returned_unchanged() {
        let store = MemoryStore::new();
        let create = Operation::CreateFile(CreateFile::default());
        let write = Operation::WriteFile(WriteFile::new(true));
        let mut rejected = TusResponse::new();
        rejected.error(StatusCode::BAD_REQUEST, "Header Upload-Length must be set");

        let merged =
            merge_responses(&store, None, (&create, rejected), Some((&write, written())))
                .await
                .unwrap();

        assert_eq!(merged.status, StatusCode::BAD_REQUEST);
        assert!(merged.header(&UPLOAD_OFFSET).is_none());
        assert_eq!(merged.body.as_deref(), Some("Header Upload-Length must be set"));
    }

    #[tokio::test]
    async fn write_offset_and_expiry_replace_creation_values() {
        let store = MemoryStore::new();
        let id = ResourceId::from("a");
        let create = Operation::CreateFile(CreateFile::default());
        let write = Operation::WriteFile(WriteFile::new(true));
        let first = response(
            StatusCode::CREATED,
            &[
                (http::header::LOCATION, "/files/a"),
                (UPLOAD_EXPIRES, "Sun, 18 Oct 2026 10:00:00 GMT"),
            ],
        );

        let merged = merge_responses(
            &store,
            Some(&id),
            (&create, first),
            Some((&write, written())),
        )
        .await
        .unwrap();

        assert_eq!(merged.status, StatusCode::CREATED);
        assert_eq!(merged.header(&http::header::LOCATION), Some("/files/a"));
        assert_eq!(merged.header(&UPLOAD_OFFSET), Some("3"));
        assert_eq!(merged.header(&UPLOAD_EXPIRES), Some("Mon, 19 Oct 2026 10:00:00 GMT"));
    }

    #[tokio::test]
    async fn missing_write_offset_falls_back_to_the_store() {
        let store = MemoryStore::new();
        let id = store.create_file(Some(10), None).await.unwrap();
        let mut body = StreamBodyReader::from_bytes("abcd");
        store
            .append_data(&id, &mut body, &CancellationToken::new())
            .await
            .unwrap();

        let create = Operation::CreateFile(CreateFile::default());
        let write = Operation::WriteFile(WriteFile::new(true));
        let cancelled = response(StatusCode::OK, &[]);

        let merged = merge_responses(
            &store,
            Some(&id),
            (&create, created()),
            Some((&write, cancelled)),
        )
        .await
        .unwrap();

        assert_eq!(merged.header(&UPLOAD_OFFSET), Some("4"));
        assert!(merged.header(&UPLOAD_EXPIRES).is_none());
    }
}
