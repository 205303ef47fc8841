use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::BytesMut;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::v2::{CreateFileContext, Tus2Storage, WriteDataContext};
use crate::{
    BodyReader, FileConcat, ResourceId, StoreExtensions, TusError, TusResult, TusStore,
};

/// One upload held in memory
#[derive(Debug, Clone, Default)]
struct MemoryUpload {
    data: BytesMut,
    upload_length: Option<u64>,
    metadata: Option<String>,
    concat: Option<FileConcat>,
    expires: Option<DateTime<Utc>>,
    /// Set by tus2 uploads once the client declared them complete
    complete: bool,
}

/// Store keeping every upload in process memory.
///
/// Serves both protocol versions; tus2 uploads share the table with tus
/// 1.0.0 uploads, keyed by their token.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    uploads: Arc<RwLock<HashMap<ResourceId, MemoryUpload>>>,
    extensions: StoreExtensions,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Store with every extension enabled
    pub fn new() -> Self {
        Self::with_extensions(StoreExtensions::all())
    }

    pub fn with_extensions(extensions: StoreExtensions) -> Self {
        Self {
            uploads: Arc::new(RwLock::new(HashMap::new())),
            extensions,
        }
    }

    /// Bytes stored for `id`
    pub fn data(&self, id: &ResourceId) -> Option<Vec<u8>> {
        self.uploads.read().get(id).map(|upload| upload.data.to_vec())
    }

    pub fn len(&self) -> usize {
        self.uploads.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.uploads.read().is_empty()
    }

    /// Drop incomplete uploads whose expiry lies before `now`. Returns how many went.
    pub fn remove_expired(&self, now: DateTime<Utc>) -> usize {
        let mut uploads = self.uploads.write();
        let before = uploads.len();

        uploads.retain(|_, upload| {
            let finished = upload.upload_length == Some(upload.data.len() as u64);
            finished || upload.expires.map_or(true, |expires| expires >= now)
        });

        let removed = before - uploads.len();
        if removed > 0 {
            debug!(removed, "removed expired uploads");
        }
        removed
    }

    fn insert(&self, upload: MemoryUpload) -> ResourceId {
        let id = ResourceId::new();
        self.uploads.write().insert(id.clone(), upload);
        id
    }

    fn with_upload<T>(&self, id: &ResourceId, f: impl FnOnce(&MemoryUpload) -> T) -> TusResult<T> {
        self.uploads
            .read()
            .get(id)
            .map(f)
            .ok_or_else(|| TusError::not_found(id.as_str()))
    }

    fn with_upload_mut<T>(
        &self,
        id: &ResourceId,
        f: impl FnOnce(&mut MemoryUpload) -> T,
    ) -> TusResult<T> {
        self.uploads
            .write()
            .get_mut(id)
            .map(f)
            .ok_or_else(|| TusError::not_found(id.as_str()))
    }

    /// Drain `reader` into the upload until it completes or `cancellation` fires
    async fn append(
        &self,
        id: &ResourceId,
        reader: &mut dyn BodyReader,
        cancellation: &CancellationToken,
    ) -> TusResult<u64> {
        let mut written = 0u64;

        loop {
            let result = tokio::select! {
                biased;
                _ = cancellation.cancelled() => return Err(TusError::Cancelled),
                result = reader.read() => result?,
            };

            let len = result.buffer.len();
            if len > 0 {
                self.with_upload_mut(id, |upload| upload.data.extend_from_slice(&result.buffer))?;
                written += len as u64;
            }
            reader.advance_to(len);

            if result.is_completed || result.is_canceled {
                break;
            }
        }

        Ok(written)
    }
}

#[async_trait]
impl TusStore for MemoryStore {
    fn extensions(&self) -> StoreExtensions {
        self.extensions.clone()
    }

    async fn file_exists(&self, id: &ResourceId) -> TusResult<bool> {
        Ok(self.uploads.read().contains_key(id))
    }

    async fn get_upload_length(&self, id: &ResourceId) -> TusResult<Option<u64>> {
        self.with_upload(id, |upload| upload.upload_length)
    }

    async fn get_upload_offset(&self, id: &ResourceId) -> TusResult<u64> {
        self.with_upload(id, |upload| upload.data.len() as u64)
    }

    async fn get_upload_metadata(&self, id: &ResourceId) -> TusResult<Option<String>> {
        self.with_upload(id, |upload| upload.metadata.clone())
    }

    async fn append_data(
        &self,
        id: &ResourceId,
        reader: &mut dyn BodyReader,
        cancellation: &CancellationToken,
    ) -> TusResult<u64> {
        self.append(id, reader, cancellation).await
    }

    async fn create_file(
        &self,
        upload_length: Option<u64>,
        metadata: Option<&str>,
    ) -> TusResult<ResourceId> {
        Ok(self.insert(MemoryUpload {
            upload_length,
            metadata: metadata.map(str::to_string),
            ..MemoryUpload::default()
        }))
    }

    async fn set_upload_length(&self, id: &ResourceId, upload_length: u64) -> TusResult<()> {
        self.with_upload_mut(id, |upload| upload.upload_length = Some(upload_length))
    }

    async fn delete_file(&self, id: &ResourceId) -> TusResult<()> {
        self.uploads
            .write()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| TusError::not_found(id.as_str()))
    }

    async fn create_partial_file(
        &self,
        upload_length: Option<u64>,
        metadata: Option<&str>,
    ) -> TusResult<ResourceId> {
        Ok(self.insert(MemoryUpload {
            upload_length,
            metadata: metadata.map(str::to_string),
            concat: Some(FileConcat::Partial),
            ..MemoryUpload::default()
        }))
    }

    async fn create_final_file(
        &self,
        partials: &[ResourceId],
        metadata: Option<&str>,
    ) -> TusResult<ResourceId> {
        let mut data = BytesMut::new();
        {
            let uploads = self.uploads.read();
            for id in partials {
                let partial = uploads
                    .get(id)
                    .ok_or_else(|| TusError::store(format!("File {} does not exist", id)))?;
                data.extend_from_slice(&partial.data);
            }
        }

        let upload_length = Some(data.len() as u64);
        Ok(self.insert(MemoryUpload {
            data,
            upload_length,
            metadata: metadata.map(str::to_string),
            concat: Some(FileConcat::Final {
                partials: partials.to_vec(),
            }),
            ..MemoryUpload::default()
        }))
    }

    async fn get_upload_concat(&self, id: &ResourceId) -> TusResult<Option<FileConcat>> {
        self.with_upload(id, |upload| upload.concat.clone())
    }

    async fn set_expiration(&self, id: &ResourceId, expires: DateTime<Utc>) -> TusResult<()> {
        self.with_upload_mut(id, |upload| upload.expires = Some(expires))
    }

    async fn get_expiration(&self, id: &ResourceId) -> TusResult<Option<DateTime<Utc>>> {
        self.with_upload(id, |upload| upload.expires)
    }
}

#[async_trait]
impl Tus2Storage for MemoryStore {
    async fn exists(&self, id: &ResourceId) -> TusResult<bool> {
        Ok(self.uploads.read().contains_key(id))
    }

    async fn get_offset(&self, id: &ResourceId) -> TusResult<u64> {
        self.with_upload(id, |upload| upload.data.len() as u64)
    }

    async fn is_complete(&self, id: &ResourceId) -> TusResult<bool> {
        self.with_upload(id, |upload| upload.complete)
    }

    async fn create(&self, id: &ResourceId, _ctx: &CreateFileContext) -> TusResult<()> {
        self.uploads
            .write()
            .entry(id.clone())
            .or_insert_with(MemoryUpload::default);
        Ok(())
    }

    async fn write_data(&self, id: &ResourceId, ctx: &mut WriteDataContext) -> TusResult<()> {
        let cancellation = ctx.cancellation.clone();
        self.append(id, &mut *ctx.body, &cancellation).await?;
        Ok(())
    }

    async fn mark_complete(&self, id: &ResourceId) -> TusResult<()> {
        self.with_upload_mut(id, |upload| upload.complete = true)
    }

    async fn delete(&self, id: &ResourceId) -> TusResult<()> {
        self.uploads.write().remove(id);
        Ok(())
    }
}
