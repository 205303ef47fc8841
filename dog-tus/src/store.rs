use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::{BodyReader, FileConcat, ResourceId, TusError, TusResult};

/// Storage primitives for the tus 1.0.0 protocol.
///
/// Only the core methods are required. Methods belonging to an extension
/// default to [`TusError::Unsupported`]; a store opts in by overriding them
/// and advertising the extension in [`TusStore::extensions`].
#[async_trait]
pub trait TusStore: Send + Sync {
    /// Extensions this store implements
    fn extensions(&self) -> StoreExtensions;

    async fn file_exists(&self, id: &ResourceId) -> TusResult<bool>;

    /// Declared total length, `None` while deferred
    async fn get_upload_length(&self, id: &ResourceId) -> TusResult<Option<u64>>;

    /// Bytes durably stored so far
    async fn get_upload_offset(&self, id: &ResourceId) -> TusResult<u64>;

    /// Raw `Upload-Metadata` header value given at creation
    async fn get_upload_metadata(&self, id: &ResourceId) -> TusResult<Option<String>>;

    /// Append everything `reader` yields and return the number of bytes written.
    ///
    /// A store that notices `cancellation` may either return the count written
    /// so far or fail with [`TusError::Cancelled`].
    async fn append_data(
        &self,
        id: &ResourceId,
        reader: &mut dyn BodyReader,
        cancellation: &CancellationToken,
    ) -> TusResult<u64>;

    // creation

    async fn create_file(
        &self,
        _upload_length: Option<u64>,
        _metadata: Option<&str>,
    ) -> TusResult<ResourceId> {
        Err(TusError::unsupported("create_file"))
    }

    // creation-defer-length

    async fn set_upload_length(&self, _id: &ResourceId, _upload_length: u64) -> TusResult<()> {
        Err(TusError::unsupported("set_upload_length"))
    }

    // termination

    async fn delete_file(&self, _id: &ResourceId) -> TusResult<()> {
        Err(TusError::unsupported("delete_file"))
    }

    // concatenation

    async fn create_partial_file(
        &self,
        _upload_length: Option<u64>,
        _metadata: Option<&str>,
    ) -> TusResult<ResourceId> {
        Err(TusError::unsupported("create_partial_file"))
    }

    async fn create_final_file(
        &self,
        _partials: &[ResourceId],
        _metadata: Option<&str>,
    ) -> TusResult<ResourceId> {
        Err(TusError::unsupported("create_final_file"))
    }

    async fn get_upload_concat(&self, _id: &ResourceId) -> TusResult<Option<FileConcat>> {
        Ok(None)
    }

    // expiration

    async fn set_expiration(&self, _id: &ResourceId, _expires: DateTime<Utc>) -> TusResult<()> {
        Err(TusError::unsupported("set_expiration"))
    }

    async fn get_expiration(&self, _id: &ResourceId) -> TusResult<Option<DateTime<Utc>>> {
        Ok(None)
    }
}

/// Protocol extensions a store supports
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreExtensions {
    pub creation: bool,
    pub creation_defer_length: bool,
    pub termination: bool,
    pub concatenation: bool,
    pub expiration: bool,
}

impl StoreExtensions {
    /// Core protocol only
    pub fn basic() -> Self {
        Self::default()
    }

    /// Every extension this engine knows about
    pub fn all() -> Self {
        Self {
            creation: true,
            creation_defer_length: true,
            termination: true,
            concatenation: true,
            expiration: true,
        }
    }

    pub fn with_creation(mut self) -> Self {
        self.creation = true;
        self
    }

    pub fn with_creation_defer_length(mut self) -> Self {
        self.creation = true;
        self.creation_defer_length = true;
        self
    }

    pub fn with_termination(mut self) -> Self {
        self.termination = true;
        self
    }

    pub fn with_concatenation(mut self) -> Self {
        self.concatenation = true;
        self
    }

    pub fn with_expiration(mut self) -> Self {
        self.expiration = true;
        self
    }

    /// Names advertised in the `Tus-Extension` header
    pub fn names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();

        if self.creation {
            names.push("creation");
            names.push("creation-with-upload");
        }
        if self.creation_defer_length {
            names.push("creation-defer-length");
        }
        if self.termination {
            names.push("termination");
        }
        if self.concatenation {
            names.push("concatenation");
        }
        if self.expiration {
            names.push("expiration");
        }

        names
    }
}
