//! Header names and fixed values used by the tus 1.0.0 protocol.
//!
//! `http::HeaderMap` compares names case-insensitively, so every lookup in the
//! engine goes through these lowercase constants.

use http::HeaderName;

pub const TUS_RESUMABLE: HeaderName = HeaderName::from_static("tus-resumable");
pub const TUS_VERSION: HeaderName = HeaderName::from_static("tus-version");
pub const TUS_EXTENSION: HeaderName = HeaderName::from_static("tus-extension");
pub const TUS_MAX_SIZE: HeaderName = HeaderName::from_static("tus-max-size");
pub const UPLOAD_LENGTH: HeaderName = HeaderName::from_static("upload-length");
pub const UPLOAD_DEFER_LENGTH: HeaderName = HeaderName::from_static("upload-defer-length");
pub const UPLOAD_OFFSET: HeaderName = HeaderName::from_static("upload-offset");
pub const UPLOAD_METADATA: HeaderName = HeaderName::from_static("upload-metadata");
pub const UPLOAD_CONCAT: HeaderName = HeaderName::from_static("upload-concat");
pub const UPLOAD_EXPIRES: HeaderName = HeaderName::from_static("upload-expires");
pub const X_HTTP_METHOD_OVERRIDE: HeaderName = HeaderName::from_static("x-http-method-override");

/// Alternate protocol: opaque token naming the resource
pub const UPLOAD_TOKEN: HeaderName = HeaderName::from_static("upload-token");
/// Alternate protocol: structured boolean (`?1` / `?0`)
pub const UPLOAD_INCOMPLETE: HeaderName = HeaderName::from_static("upload-incomplete");

/// The only protocol version this engine speaks
pub const TUS_VERSION_1_0_0: &str = "1.0.0";

/// Content type required on PATCH bodies
pub const OFFSET_OCTET_STREAM: &str = "application/offset+octet-stream";
