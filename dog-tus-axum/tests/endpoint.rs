use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::{HeaderValue, Request, StatusCode};
use dog_tus::headers::*;
use dog_tus::prelude::*;
use dog_tus::v2::{StorageFacade, Tus2Handler};
use dog_tus_axum::{Tus2Endpoint, TusEndpoint};
use futures::StreamExt;
use http_body_util::BodyExt;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

fn router(store: MemoryStore) -> axum::Router {
    TusEndpoint::new(TusProtocolHandler::new(store, TusConfig::default())).router()
}

async fn body_text(res: axum::response::Response) -> String {
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn options_advertises_protocol_and_sets_request_id() {
    let res = router(MemoryStore::new())
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/files")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    assert_eq!(res.headers().get(TUS_VERSION).unwrap(), "1.0.0");
    assert_eq!(res.headers().get(TUS_RESUMABLE).unwrap(), "1.0.0");
    assert!(res.headers().get("x-request-id").is_some());
}

#[tokio::test]
async fn upload_round_trip_through_router() {
    let store = MemoryStore::new();
    let app = router(store.clone());

    let res = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/files")
                .header(TUS_RESUMABLE, "1.0.0")
                .header(UPLOAD_LENGTH, "11")
                .header("content-type", OFFSET_OCTET_STREAM)
                .body(Body::from("hello "))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::CREATED);
    assert_eq!(res.headers().get(UPLOAD_OFFSET).unwrap(), "6");
    let location = res.headers().get("location").unwrap().to_str().unwrap().to_string();
    assert!(location.starts_with("/files/"));

    let res = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PATCH")
                .uri(&location)
                .header(TUS_RESUMABLE, "1.0.0")
                .header(UPLOAD_OFFSET, "6")
                .header("content-type", OFFSET_OCTET_STREAM)
                .body(Body::from("world"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    assert_eq!(res.headers().get(UPLOAD_OFFSET).unwrap(), "11");

    let res = app
        .oneshot(
            Request::builder()
                .method("HEAD")
                .uri(&location)
                .header(TUS_RESUMABLE, "1.0.0")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers().get(UPLOAD_LENGTH).unwrap(), "11");
    assert_eq!(res.headers().get("cache-control").unwrap(), "no-store");

    let id = location.trim_start_matches("/files/");
    assert_eq!(store.data(&ResourceId::from(id)).unwrap(), b"hello world");
}

#[tokio::test]
async fn non_protocol_requests_are_not_found() {
    let res = router(MemoryStore::new())
        .oneshot(Request::builder().uri("/files").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn validation_errors_carry_plain_text_bodies() {
    let res = router(MemoryStore::new())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/files")
                .header(TUS_RESUMABLE, "1.0.0")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert!(body_text(res).await.contains("Upload-Length"));
}

fn patch(location: &str, offset: u64, body: Body) -> Request<Body> {
    Request::builder()
        .method("PATCH")
        .uri(location)
        .header(TUS_RESUMABLE, "1.0.0")
        .header(UPLOAD_OFFSET, offset.to_string())
        .header("content-type", OFFSET_OCTET_STREAM)
        .body(body)
        .unwrap()
}

#[tokio::test]
async fn dropped_request_cancels_the_write_and_frees_the_upload() {
    let store = MemoryStore::new();
    let app = router(store.clone());

    let res = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/files")
                .header(TUS_RESUMABLE, "1.0.0")
                .header(UPLOAD_LENGTH, "10")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let location = res.headers().get("location").unwrap().to_str().unwrap().to_string();

    // first chunk arrives, then the client goes quiet
    let stalled = futures::stream::once(async { Ok::<_, std::io::Error>(Bytes::from("abcdef")) })
        .chain(futures::stream::pending());
    let attempt = tokio::time::timeout(
        Duration::from_millis(200),
        app.clone().oneshot(patch(&location, 0, Body::from_stream(stalled))),
    )
    .await;
    assert!(attempt.is_err(), "stalled upload should not finish");

    // the engine task winds down once it sees the cancelled token
    let mut status = StatusCode::CONFLICT;
    for _ in 0..50 {
        let res = app
            .clone()
            .oneshot(patch(&location, 6, Body::from("7890")))
            .await
            .unwrap();
        status = res.status();
        if status != StatusCode::CONFLICT {
            assert_eq!(res.headers().get(UPLOAD_OFFSET).unwrap(), "10");
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(status, StatusCode::NO_CONTENT);
    let id = location.trim_start_matches("/files/");
    assert_eq!(store.data(&ResourceId::from(id)).unwrap(), b"abcdef7890");
}

/// Store whose backend is unreachable
struct UnreachableStore;

#[async_trait::async_trait]
impl TusStore for UnreachableStore {
    fn extensions(&self) -> StoreExtensions {
        StoreExtensions::basic().with_creation()
    }

    async fn file_exists(&self, _id: &ResourceId) -> TusResult<bool> {
        Ok(false)
    }

    async fn get_upload_length(&self, _id: &ResourceId) -> TusResult<Option<u64>> {
        Ok(None)
    }

    async fn get_upload_offset(&self, _id: &ResourceId) -> TusResult<u64> {
        Ok(0)
    }

    async fn get_upload_metadata(&self, _id: &ResourceId) -> TusResult<Option<String>> {
        Ok(None)
    }

    async fn append_data(
        &self,
        _id: &ResourceId,
        _reader: &mut dyn BodyReader,
        _cancellation: &CancellationToken,
    ) -> TusResult<u64> {
        Ok(0)
    }

    async fn create_file(
        &self,
        _length: Option<u64>,
        _metadata: Option<&str>,
    ) -> TusResult<ResourceId> {
        Err(TusError::backend(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "db at 10.0.0.7 refused",
        )))
    }
}

#[tokio::test]
async fn backend_failures_become_sanitized_500s() {
    let app =
        TusEndpoint::new(TusProtocolHandler::new(UnreachableStore, TusConfig::default())).router();

    let res = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/files")
                .header(TUS_RESUMABLE, "1.0.0")
                .header(UPLOAD_LENGTH, "3")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = serde_json::from_str(&body_text(res).await).unwrap();
    assert_eq!(body["code"], 500);
    assert_eq!(body["name"], "InternalServerError");
    assert!(!body["message"].as_str().unwrap().contains("10.0.0.7"));
}

#[tokio::test]
async fn tus2_endpoint_accepts_token_uploads() {
    let store = MemoryStore::new();
    let handler = Tus2Handler::new(StorageFacade::new(store.clone()));
    let app = Tus2Endpoint::new(handler, "/uploads").router();

    let res = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/uploads")
                .header(UPLOAD_TOKEN, HeaderValue::from_static(":YWJj:"))
                .header(UPLOAD_INCOMPLETE, "?0")
                .body(Body::from("payload"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::CREATED);
    assert_eq!(res.headers().get(UPLOAD_OFFSET).unwrap(), "7");
    assert_eq!(store.data(&ResourceId::from("YWJj")).unwrap(), b"payload");
}
