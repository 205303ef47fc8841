use async_trait::async_trait;
use tracing::debug;

use crate::{BodyReader, ReadResult, TusError, TusResult};

/// Caps how many bytes a single request may push through a [`BodyReader`].
///
/// Counting starts at `start_counting_from` (bytes already stored before this
/// request) and a read fails as soon as committed plus pending bytes would
/// pass `max_size_to_read`.
pub struct MaxReadSizeGuardedReader<R> {
    inner: R,
    total_committed_bytes: u64,
    bytes_pending_advance: u64,
    max_size_to_read: u64,
}

impl<R: BodyReader> MaxReadSizeGuardedReader<R> {
    pub fn new(inner: R, start_counting_from: u64, max_size_to_read: u64) -> Self {
        Self {
            inner,
            total_committed_bytes: start_counting_from,
            bytes_pending_advance: 0,
            max_size_to_read,
        }
    }

    pub fn total_committed_bytes(&self) -> u64 {
        self.total_committed_bytes
    }

    pub fn bytes_pending_advance(&self) -> u64 {
        self.bytes_pending_advance
    }
}

impl<R> std::fmt::Debug for MaxReadSizeGuardedReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaxReadSizeGuardedReader")
            .field("total_committed_bytes", &self.total_committed_bytes)
            .field("bytes_pending_advance", &self.bytes_pending_advance)
            .field("max_size_to_read", &self.max_size_to_read)
            .finish()
    }
}

#[async_trait]
impl<R: BodyReader> BodyReader for MaxReadSizeGuardedReader<R> {
    async fn read(&mut self) -> TusResult<ReadResult> {
        let result = self.inner.read().await?;

        // Until advance_to is called the buffer holds every unconsumed byte
        // from previous reads as well.
        self.bytes_pending_advance = result.buffer.len() as u64;

        if self.total_committed_bytes.saturating_add(self.bytes_pending_advance)
            > self.max_size_to_read
        {
            debug!(
                committed = self.total_committed_bytes,
                pending = self.bytes_pending_advance,
                max = self.max_size_to_read,
                "request body exceeded read budget"
            );
            return Err(TusError::max_read_size_exceeded(
                "Request contains more data than allowed",
            ));
        }

        Ok(result)
    }

    fn try_read(&mut self) -> TusResult<Option<ReadResult>> {
        Err(TusError::unsupported("try_read on a size guarded reader"))
    }

    fn advance_to(&mut self, consumed: usize) {
        self.total_committed_bytes += self.bytes_pending_advance;
        self.bytes_pending_advance = 0;
        self.inner.advance_to(consumed);
    }

    fn advance_to_examined(&mut self, consumed: usize, examined: usize) {
        self.inner.advance_to_examined(consumed, examined);
    }

    fn cancel_pending_read(&mut self) -> TusResult<()> {
        Err(TusError::unsupported("cancel_pending_read on a size guarded reader"))
    }

    fn complete(&mut self, error: Option<&TusError>) {
        self.inner.complete(error);
    }
}
