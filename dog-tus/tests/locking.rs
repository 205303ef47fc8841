use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use http::header::{CONTENT_TYPE, LOCATION};
use http::{HeaderValue, Method, StatusCode};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use dog_tus::headers::*;
use dog_tus::prelude::*;
use dog_tus::{FileLock, FileLockProvider, InMemoryFileLockProvider};

/// Wraps the memory store and lets a test decide when writes run and whether they fail
#[derive(Clone, Default)]
struct ScriptedStore {
    inner: MemoryStore,
    gate: Option<Gate>,
    append_calls: Arc<AtomicUsize>,
    failure: Option<fn() -> TusError>,
}

#[derive(Clone, Default)]
struct Gate {
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait]
impl TusStore for ScriptedStore {
    fn extensions(&self) -> StoreExtensions {
        self.inner.extensions()
    }

    async fn file_exists(&self, id: &ResourceId) -> TusResult<bool> {
        self.inner.file_exists(id).await
    }

    async fn get_upload_length(&self, id: &ResourceId) -> TusResult<Option<u64>> {
        self.inner.get_upload_length(id).await
    }

    async fn get_upload_offset(&self, id: &ResourceId) -> TusResult<u64> {
        self.inner.get_upload_offset(id).await
    }

    async fn get_upload_metadata(&self, id: &ResourceId) -> TusResult<Option<String>> {
        self.inner.get_upload_metadata(id).await
    }

    async fn append_data(
        &self,
        id: &ResourceId,
        reader: &mut dyn BodyReader,
        cancellation: &CancellationToken,
    ) -> TusResult<u64> {
        self.append_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }

        if let Some(failure) = self.failure {
            return Err(failure());
        }

        self.inner.append_data(id, reader, cancellation).await
    }

    async fn create_file(
        &self,
        length: Option<u64>,
        metadata: Option<&str>,
    ) -> TusResult<ResourceId> {
        TusStore::create_file(&self.inner, length, metadata).await
    }
}

/// Counts acquisitions and releases of every lock it hands out
#[derive(Clone, Default)]
struct CountingLockProvider {
    inner: InMemoryFileLockProvider,
    acquired: Arc<AtomicUsize>,
    released: Arc<AtomicUsize>,
}

struct CountingLock {
    inner: Box<dyn FileLock>,
    held: bool,
    acquired: Arc<AtomicUsize>,
    released: Arc<AtomicUsize>,
}

#[async_trait]
impl FileLockProvider for CountingLockProvider {
    async fn lock_for(&self, id: &ResourceId) -> TusResult<Box<dyn FileLock>> {
        Ok(Box::new(CountingLock {
            inner: self.inner.lock_for(id).await?,
            held: false,
            acquired: self.acquired.clone(),
            released: self.released.clone(),
        }))
    }
}

#[async_trait]
impl FileLock for CountingLock {
    async fn lock(&mut self) -> TusResult<bool> {
        self.held = self.inner.lock().await?;
        if self.held {
            self.acquired.fetch_add(1, Ordering::SeqCst);
        }
        Ok(self.held)
    }

    fn release_if_held(&mut self) {
        if self.held {
            self.held = false;
            self.released.fetch_add(1, Ordering::SeqCst);
            self.inner.release_if_held();
        }
    }
}

impl Drop for CountingLock {
    fn drop(&mut self) {
        self.release_if_held();
    }
}

fn tus(method: Method, path: &str) -> TusRequest {
    TusRequest::new(method, path).with_header(TUS_RESUMABLE, HeaderValue::from_static("1.0.0"))
}

fn patch(path: &str, offset: u64, body: &'static str) -> TusRequest {
    tus(Method::PATCH, path)
        .with_header(CONTENT_TYPE, HeaderValue::from_static(OFFSET_OCTET_STREAM))
        .with_header(UPLOAD_OFFSET, HeaderValue::from(offset))
        .with_body(StreamBodyReader::from_bytes(body))
}

async fn create(handler: &TusProtocolHandler, length: u64) -> String {
    let request = tus(Method::POST, "/files").with_header(UPLOAD_LENGTH, HeaderValue::from(length));
    let mut ctx = handler.context(request);
    handler.invoke(&mut ctx).await.unwrap();
    ctx.response.header(&LOCATION).unwrap().to_string()
}

fn handler_for(store: ScriptedStore, locks: CountingLockProvider) -> TusProtocolHandler {
    TusProtocolHandler::new(store, TusConfig::default().with_lock_provider(locks))
}

/// Two writes racing on one upload: the loser gets 409 and never reaches the store
#[tokio::test]
async fn test_concurrent_writes_fail_fast() {
    let gate = Gate::default();
    let store = ScriptedStore {
        gate: Some(gate.clone()),
        ..ScriptedStore::default()
    };
    let appends = store.append_calls.clone();
    let handler = handler_for(store, CountingLockProvider::default());
    let location = create(&handler, 10).await;

    let first = {
        let handler = handler.clone();
        let location = location.clone();
        tokio::spawn(async move {
            let mut ctx = handler.context(patch(&location, 0, "abc"));
            handler.invoke(&mut ctx).await.unwrap();
            ctx.response
        })
    };

    gate.entered.notified().await;

    let mut ctx = handler.context(patch(&location, 0, "xyz"));
    handler.invoke(&mut ctx).await.unwrap();
    assert_eq!(ctx.response.status, StatusCode::CONFLICT);
    assert!(ctx.response.body.unwrap().contains("is currently being updated"));
    assert_eq!(appends.load(Ordering::SeqCst), 1);

    gate.release.notify_one();
    let response = first.await.unwrap();
    assert_eq!(response.status, StatusCode::NO_CONTENT);
    assert_eq!(response.header(&UPLOAD_OFFSET), Some("3"));
}

#[tokio::test]
async fn test_lock_released_after_validation_failure() {
    let locks = CountingLockProvider::default();
    let handler = handler_for(ScriptedStore::default(), locks.clone());
    let location = create(&handler, 10).await;

    let mut ctx = handler.context(patch(&location, 4, "abc"));
    handler.invoke(&mut ctx).await.unwrap();

    assert_eq!(ctx.response.status, StatusCode::CONFLICT);
    assert_eq!(locks.acquired.load(Ordering::SeqCst), 1);
    assert_eq!(locks.released.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_lock_released_after_store_error() {
    let locks = CountingLockProvider::default();
    let store = ScriptedStore {
        failure: Some(|| TusError::store("Disk is full")),
        ..ScriptedStore::default()
    };
    let handler = handler_for(store, locks.clone());
    let location = create(&handler, 10).await;

    let mut ctx = handler.context(patch(&location, 0, "abc"));
    handler.invoke(&mut ctx).await.unwrap();

    assert_eq!(ctx.response.status, StatusCode::BAD_REQUEST);
    assert_eq!(ctx.response.body.as_deref(), Some("Disk is full"));
    assert_eq!(locks.acquired.load(Ordering::SeqCst), 1);
    assert_eq!(locks.released.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_lock_released_after_fatal_error() {
    let locks = CountingLockProvider::default();
    let store = ScriptedStore {
        failure: Some(|| TusError::backend(std::io::Error::new(std::io::ErrorKind::Other, "gone"))),
        ..ScriptedStore::default()
    };
    let handler = handler_for(store, locks.clone());
    let location = create(&handler, 10).await;

    let mut ctx = handler.context(patch(&location, 0, "abc"));
    let err = handler.invoke(&mut ctx).await.unwrap_err();

    assert!(matches!(err, TusError::Backend { .. }));
    assert_eq!(locks.acquired.load(Ordering::SeqCst), 1);
    assert_eq!(locks.released.load(Ordering::SeqCst), 1);

    // the upload is writable again
    let mut ctx = handler.context(patch(&location, 0, "abc"));
    let _ = handler.invoke(&mut ctx).await;
    assert_eq!(locks.acquired.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_lock_released_after_read_budget_exceeded() {
    let locks = CountingLockProvider::default();
    let handler = handler_for(ScriptedStore::default(), locks.clone());
    let location = create(&handler, 2).await;

    let mut ctx = handler.context(patch(&location, 0, "abc"));
    handler.invoke(&mut ctx).await.unwrap();

    assert_eq!(ctx.response.status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(locks.released.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_info_and_options_never_lock() {
    let locks = CountingLockProvider::default();
    let handler = handler_for(ScriptedStore::default(), locks.clone());
    let location = create(&handler, 2).await;

    let mut ctx = handler.context(tus(Method::HEAD, &location));
    handler.invoke(&mut ctx).await.unwrap();
    let mut ctx = handler.context(TusRequest::new(Method::OPTIONS, "/files"));
    handler.invoke(&mut ctx).await.unwrap();

    assert_eq!(locks.acquired.load(Ordering::SeqCst), 0);
}

/// A write that notices the client leaving sends nothing back
#[tokio::test]
async fn test_cancelled_write_leaves_response_untouched() {
    let handler = TusProtocolHandler::new(MemoryStore::new(), TusConfig::default());
    let location = create(&handler, 10).await;

    let token = CancellationToken::new();
    token.cancel();
    let mut ctx = handler
        .context(patch(&location, 0, "abc"))
        .with_cancellation(token);
    let outcome = handler.invoke(&mut ctx).await.unwrap();

    assert_eq!(outcome, Outcome::StopExecution);
    assert_eq!(ctx.response.status, StatusCode::OK);
    assert!(ctx.response.header(&UPLOAD_OFFSET).is_none());
}
