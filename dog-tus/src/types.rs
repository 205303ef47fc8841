use bytes::Bytes;
use futures_core::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use uuid::Uuid;

use crate::{TusError, TusResult};

/// Stream of bytes for request bodies
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// Unique identifier for an upload resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId(pub String);

impl ResourceId {
    /// Generate a new random resource ID
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Get the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ResourceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ResourceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Protocol action a request resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntentType {
    CreateFile,
    ConcatenateFiles,
    WriteFile,
    DeleteFile,
    GetFileInfo,
    GetOptions,
}

/// Whether an operation needs exclusive access to its resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    RequiresLock,
    NoLockNeeded,
}

/// What the host should do once the engine returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The request was not for this protocol; the host treats it as unhandled
    ContinueExecution,
    /// The response has been populated
    StopExecution,
}

/// Value of the `Upload-Concat` header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileConcat {
    Partial,
    Final { partials: Vec<ResourceId> },
}

const INVALID_UPLOAD_CONCAT: &str =
    "Header Upload-Concat: Header is invalid. Valid values are \"partial\" and \"final\" \
     followed by a list of file urls to concatenate";

impl FileConcat {
    /// Parse an `Upload-Concat` header. Final uploads must reference files under `url_path`.
    pub fn parse(header: &str, url_path: &str) -> TusResult<Self> {
        let header = header.trim();

        if header.eq_ignore_ascii_case("partial") {
            return Ok(Self::Partial);
        }

        let (kind, urls) = header
            .split_once(';')
            .ok_or_else(|| TusError::invalid(INVALID_UPLOAD_CONCAT))?;

        if !kind.trim().eq_ignore_ascii_case("final") {
            return Err(TusError::invalid(INVALID_UPLOAD_CONCAT));
        }

        let partials = urls
            .split(' ')
            .filter(|url| !url.is_empty())
            .map(|url| partial_id_from_url(url, url_path))
            .collect::<TusResult<Vec<_>>>()?;

        if partials.is_empty() {
            return Err(TusError::invalid(INVALID_UPLOAD_CONCAT));
        }

        Ok(Self::Final { partials })
    }

    pub fn is_final(&self) -> bool {
        matches!(self, Self::Final { .. })
    }

    /// Render back to header form, using `url_path` to build partial URLs
    pub fn to_header(&self, url_path: &str) -> String {
        match self {
            Self::Partial => "partial".to_string(),
            Self::Final { partials } => {
                let base = url_path.trim_end_matches('/');
                let urls = partials
                    .iter()
                    .map(|id| format!("{}/{}", base, id))
                    .collect::<Vec<_>>()
                    .join(" ");
                format!("final;{}", urls)
            }
        }
    }
}

fn partial_id_from_url(url: &str, url_path: &str) -> TusResult<ResourceId> {
    // Absolute URLs are reduced to their path
    let path = match url.split_once("://") {
        Some((_, rest)) => rest.find('/').map(|idx| &rest[idx..]).unwrap_or(""),
        None => url,
    };

    let base = url_path.trim_end_matches('/');
    let matches_base = path
        .get(..base.len())
        .map_or(false, |prefix| prefix.eq_ignore_ascii_case(base))
        && path.as_bytes().get(base.len()) == Some(&b'/');

    if !matches_base {
        return Err(TusError::invalid(format!(
            "Header Upload-Concat: Could not find file {}",
            url
        )));
    }

    let id = path[base.len() + 1..].trim_end_matches('/');
    if id.is_empty() || id.contains('/') {
        return Err(TusError::invalid(format!(
            "Header Upload-Concat: Could not find file {}",
            url
        )));
    }

    Ok(ResourceId::from(id))
}
