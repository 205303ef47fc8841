use std::sync::Arc;

use http::header::{CACHE_CONTROL, CONTENT_TYPE};
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use tokio_util::sync::CancellationToken;

use crate::headers::{TUS_RESUMABLE, TUS_VERSION_1_0_0};
use crate::{BodyReader, ResourceId, StreamBodyReader, TusConfig, TusResult, TusStore};

/// Inbound request as seen by the engine
pub struct TusRequest {
    pub method: Method,
    /// URL path, without query string
    pub path: String,
    pub headers: HeaderMap,
    pub body: Box<dyn BodyReader>,
    /// Resource id captured by the host's router, if it routes ids itself
    pub route_file_id: Option<String>,
}

impl TusRequest {
    pub fn new<P: Into<String>>(method: Method, path: P) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: Box::new(StreamBodyReader::empty()),
            route_file_id: None,
        }
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body<B: BodyReader + 'static>(mut self, body: B) -> Self {
        self.body = Box::new(body);
        self
    }

    pub fn with_route_file_id<S: Into<String>>(mut self, file_id: S) -> Self {
        self.route_file_id = Some(file_id.into());
        self
    }

    /// Header value as a string, if present and visible ASCII
    pub fn header(&self, name: &HeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }
}

impl std::fmt::Debug for TusRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TusRequest")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("headers", &self.headers)
            .field("route_file_id", &self.route_file_id)
            .finish_non_exhaustive()
    }
}

/// Response the engine populates for the host to send
#[derive(Debug, Clone)]
pub struct TusResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Option<String>,
}

impl Default for TusResponse {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: None,
        }
    }
}

impl TusResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    /// Set a header, replacing any previous value
    pub fn set_header(&mut self, name: HeaderName, value: impl AsRef<str>) -> TusResult<()> {
        self.headers.insert(name, HeaderValue::from_str(value.as_ref())?);
        Ok(())
    }

    pub fn header(&self, name: &HeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Turn the response into a plain text error
    pub fn error(&mut self, status: StatusCode, message: impl Into<String>) {
        self.status = status;
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        self.body = Some(message.into());
    }

    pub(crate) fn set_tus_resumable(&mut self) {
        self.headers
            .insert(TUS_RESUMABLE, HeaderValue::from_static(TUS_VERSION_1_0_0));
    }

    pub(crate) fn set_no_store(&mut self) {
        self.headers
            .insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
    }
}

/// Everything one request needs while it moves through the engine
pub struct TusContext {
    pub request: TusRequest,
    pub response: TusResponse,
    pub config: Arc<TusConfig>,
    pub store: Arc<dyn TusStore>,
    /// Resource the current operation targets
    pub file_id: Option<ResourceId>,
    /// Fires when the client goes away
    pub cancellation: CancellationToken,
}

impl TusContext {
    pub fn new(request: TusRequest, store: Arc<dyn TusStore>, config: Arc<TusConfig>) -> Self {
        Self {
            request,
            response: TusResponse::default(),
            config,
            store,
            file_id: None,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// `Location` value for a resource under the configured mount path
    pub fn location_for(&self, id: &ResourceId) -> String {
        format!("{}/{}", self.config.url_path.trim_end_matches('/'), id)
    }

    /// Whether the request path is the mount path itself
    pub fn url_matches_url_path(&self) -> bool {
        let path = self.request.path.trim_end_matches('/');
        let base = self.config.url_path.trim_end_matches('/');
        path.eq_ignore_ascii_case(base)
    }

    /// Resource id addressed by the request, from routing or from the path
    pub fn file_id_from_url(&self) -> Option<ResourceId> {
        if let Some(id) = self.request.route_file_id.as_deref() {
            return (!id.is_empty()).then(|| ResourceId::from(id));
        }

        let base = self.config.url_path.trim_end_matches('/');
        let path = self.request.path.as_str();

        let prefix = path.get(..base.len())?;
        if !prefix.eq_ignore_ascii_case(base) || path.as_bytes().get(base.len()) != Some(&b'/') {
            return None;
        }

        let id = path[base.len() + 1..].trim_end_matches('/');
        if id.is_empty() || id.contains('/') {
            return None;
        }

        Some(ResourceId::from(id))
    }
}

impl std::fmt::Debug for TusContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TusContext")
            .field("request", &self.request)
            .field("response", &self.response)
            .field("config", &self.config)
            .field("file_id", &self.file_id)
            .finish_non_exhaustive()
    }
}
