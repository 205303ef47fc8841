use std::sync::Arc;

use axum::{
    body::Body,
    extract::{OriginalUri, Path, Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use dog_tus::v2::Tus2Handler;
use dog_tus::{
    Outcome, StreamBodyReader, TusError, TusProtocolHandler, TusRequest, TusResponse,
};
use futures::TryStreamExt;
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::{DefaultOnRequest, TraceLayer};
use tracing::{debug, Level};

use crate::TusAxumError;

/// Serves tus 1.0.0 uploads under the handler's mount path
#[derive(Clone, Debug)]
pub struct TusEndpoint {
    handler: TusProtocolHandler,
}

impl TusEndpoint {
    pub fn new(handler: TusProtocolHandler) -> Self {
        Self { handler }
    }

    pub fn handler(&self) -> &TusProtocolHandler {
        &self.handler
    }

    /// Router answering `<url_path>` and `<url_path>/{file_id}` for every method
    pub fn router(self) -> Router<()> {
        let base = mount_path(&self.handler.config().url_path);
        let file_route = format!("{}/{{file_id}}", base.trim_end_matches('/'));

        let router = Router::new()
            .route(&base, any(serve_upload))
            .route(&file_route, any(serve_upload_file))
            .with_state(self);

        with_http_layers(router)
    }

    pub async fn listen<A>(self, addr: A) -> anyhow::Result<()>
    where
        A: ToSocketAddrs,
    {
        let listener = TcpListener::bind(addr).await?;
        axum::serve(listener, self.router()).await?;
        Ok(())
    }

    /// Run one request through the engine.
    ///
    /// The engine runs on its own task; dropping the returned future cancels
    /// the upload's token so the store can stop at a clean offset.
    pub async fn serve(
        &self,
        file_id: Option<String>,
        request: Request,
    ) -> Result<Response, TusAxumError> {
        let request = into_tus_request(request, file_id);

        let cancellation = CancellationToken::new();
        let cancel_on_drop = cancellation.clone().drop_guard();

        let handler = self.handler.clone();
        let task = tokio::spawn(async move {
            let mut ctx = handler.context(request).with_cancellation(cancellation);
            let outcome = handler.invoke(&mut ctx).await?;
            Ok::<_, TusError>((outcome, ctx.response))
        });

        let joined = task.await;
        cancel_on_drop.disarm();

        let (outcome, response) = joined.map_err(TusError::backend)??;
        if outcome == Outcome::ContinueExecution {
            debug!("not an upload request");
            return Ok(StatusCode::NOT_FOUND.into_response());
        }

        Ok(into_response(response))
    }
}

async fn serve_upload(
    State(endpoint): State<TusEndpoint>,
    request: Request,
) -> Result<Response, TusAxumError> {
    endpoint.serve(None, request).await
}

async fn serve_upload_file(
    State(endpoint): State<TusEndpoint>,
    Path(file_id): Path<String>,
    request: Request,
) -> Result<Response, TusAxumError> {
    endpoint.serve(Some(file_id), request).await
}

/// Serves the token based draft protocol on a single path
#[derive(Clone, Debug)]
pub struct Tus2Endpoint {
    handler: Arc<Tus2Handler>,
    path: String,
}

impl Tus2Endpoint {
    pub fn new<P: Into<String>>(handler: Tus2Handler, path: P) -> Self {
        Self {
            handler: Arc::new(handler),
            path: mount_path(&path.into()),
        }
    }

    pub fn router(self) -> Router<()> {
        let path = self.path.clone();
        let router = Router::new()
            .route(&path, any(serve_tus2))
            .with_state(self);

        with_http_layers(router)
    }

    pub async fn serve(&self, request: Request) -> Result<Response, TusAxumError> {
        let request = into_tus_request(request, None);

        let cancellation = CancellationToken::new();
        let cancel_on_drop = cancellation.clone().drop_guard();

        let handler = Arc::clone(&self.handler);
        let joined = tokio::spawn(async move { handler.handle(request, cancellation).await }).await;
        cancel_on_drop.disarm();

        match joined.map_err(TusError::backend)?? {
            Some(response) => Ok(into_response(response)),
            // the client is gone, nobody reads this
            None => Ok(StatusCode::NO_CONTENT.into_response()),
        }
    }
}

async fn serve_tus2(
    State(endpoint): State<Tus2Endpoint>,
    request: Request,
) -> Result<Response, TusAxumError> {
    endpoint.serve(request).await
}

fn mount_path(url_path: &str) -> String {
    let trimmed = url_path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

fn with_http_layers(router: Router<()>) -> Router<()> {
    router.layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(
                TraceLayer::new_for_http()
                    .on_request(DefaultOnRequest::new().level(Level::DEBUG)),
            )
            .layer(PropagateRequestIdLayer::x_request_id()),
    )
}

fn into_tus_request(request: Request, file_id: Option<String>) -> TusRequest {
    let (parts, body) = request.into_parts();

    // nested routers strip their prefix from the uri
    let path = parts
        .extensions
        .get::<OriginalUri>()
        .map(|OriginalUri(uri)| uri.path().to_string())
        .unwrap_or_else(|| parts.uri.path().to_string());

    let stream = body.into_data_stream().map_err(std::io::Error::other);

    let request = TusRequest::new(parts.method, path)
        .with_headers(parts.headers)
        .with_body(StreamBodyReader::new(Box::pin(stream)));

    match file_id {
        Some(file_id) => request.with_route_file_id(file_id),
        None => request,
    }
}

fn into_response(response: TusResponse) -> Response {
    let body = response.body.map(Body::from).unwrap_or_else(Body::empty);

    let mut out = Response::new(body);
    *out.status_mut() = response.status;
    *out.headers_mut() = response.headers;
    out
}
