use async_trait::async_trait;
use bytes::{Buf, Bytes, BytesMut};
use futures_util::StreamExt;

use crate::{ByteStream, TusError, TusResult};

/// Result of a single read from a [`BodyReader`]
#[derive(Debug, Clone, Default)]
pub struct ReadResult {
    /// Every byte not yet consumed via `advance_to`, not only the newest chunk
    pub buffer: Bytes,
    /// The source has no more data
    pub is_completed: bool,
    /// The pending read was cancelled
    pub is_canceled: bool,
}

/// Sequential, buffered reader over a request body.
///
/// Data handed out by `read` stays in the buffer until the caller advances
/// past it, so a caller may look at bytes without consuming them.
#[async_trait]
pub trait BodyReader: Send {
    /// Wait for more data and return the whole unconsumed buffer
    async fn read(&mut self) -> TusResult<ReadResult>;

    /// Return buffered data without waiting, if any is unexamined
    fn try_read(&mut self) -> TusResult<Option<ReadResult>>;

    /// Consume `consumed` bytes from the front of the buffer
    fn advance_to(&mut self, consumed: usize);

    /// Consume `consumed` bytes and mark the buffer examined up to `examined`
    fn advance_to_examined(&mut self, consumed: usize, examined: usize);

    /// Make the next pending `read` return with `is_canceled`
    fn cancel_pending_read(&mut self) -> TusResult<()>;

    /// Stop reading; further reads report completion
    fn complete(&mut self, error: Option<&TusError>);
}

#[async_trait]
impl<R: BodyReader + ?Sized> BodyReader for &mut R {
    async fn read(&mut self) -> TusResult<ReadResult> {
        (**self).read().await
    }

    fn try_read(&mut self) -> TusResult<Option<ReadResult>> {
        (**self).try_read()
    }

    fn advance_to(&mut self, consumed: usize) {
        (**self).advance_to(consumed)
    }

    fn advance_to_examined(&mut self, consumed: usize, examined: usize) {
        (**self).advance_to_examined(consumed, examined)
    }

    fn cancel_pending_read(&mut self) -> TusResult<()> {
        (**self).cancel_pending_read()
    }

    fn complete(&mut self, error: Option<&TusError>) {
        (**self).complete(error)
    }
}

#[async_trait]
impl<R: BodyReader + ?Sized> BodyReader for Box<R> {
    async fn read(&mut self) -> TusResult<ReadResult> {
        (**self).read().await
    }

    fn try_read(&mut self) -> TusResult<Option<ReadResult>> {
        (**self).try_read()
    }

    fn advance_to(&mut self, consumed: usize) {
        (**self).advance_to(consumed)
    }

    fn advance_to_examined(&mut self, consumed: usize, examined: usize) {
        (**self).advance_to_examined(consumed, examined)
    }

    fn cancel_pending_read(&mut self) -> TusResult<()> {
        (**self).cancel_pending_read()
    }

    fn complete(&mut self, error: Option<&TusError>) {
        (**self).complete(error)
    }
}

/// [`BodyReader`] over a stream of byte chunks
pub struct StreamBodyReader {
    stream: Option<ByteStream>,
    buffer: Bytes,
    examined: usize,
    cancel_requested: bool,
}

impl StreamBodyReader {
    pub fn new(stream: ByteStream) -> Self {
        Self {
            stream: Some(stream),
            buffer: Bytes::new(),
            examined: 0,
            cancel_requested: false,
        }
    }

    /// Reader over an in-memory body, delivered as one chunk
    pub fn from_bytes(body: impl Into<Bytes>) -> Self {
        let body = body.into();
        let stream = futures::stream::once(async move { Ok::<_, std::io::Error>(body) });
        Self::new(Box::pin(stream))
    }

    /// Reader over an in-memory body, delivered in the given chunks
    pub fn from_chunks<I>(chunks: I) -> Self
    where
        I: IntoIterator<Item = Bytes>,
        I::IntoIter: Send + 'static,
    {
        let stream = futures::stream::iter(chunks.into_iter().map(Ok::<_, std::io::Error>));
        Self::new(Box::pin(stream))
    }

    /// Reader with no body at all
    pub fn empty() -> Self {
        Self {
            stream: None,
            buffer: Bytes::new(),
            examined: 0,
            cancel_requested: false,
        }
    }

    /// Keeps a lone chunk as is; only a tail left behind by a partial consume is copied
    fn append(&mut self, chunk: Bytes) {
        if self.buffer.is_empty() {
            self.buffer = chunk;
            return;
        }
        let mut joined = BytesMut::with_capacity(self.buffer.len() + chunk.len());
        joined.extend_from_slice(&self.buffer);
        joined.extend_from_slice(&chunk);
        self.buffer = joined.freeze();
    }

    fn snapshot(&self) -> ReadResult {
        ReadResult {
            buffer: self.buffer.clone(),
            is_completed: self.stream.is_none(),
            is_canceled: false,
        }
    }
}

impl std::fmt::Debug for StreamBodyReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamBodyReader")
            .field("buffered", &self.buffer.len())
            .field("examined", &self.examined)
            .field("completed", &self.stream.is_none())
            .finish()
    }
}

#[async_trait]
impl BodyReader for StreamBodyReader {
    async fn read(&mut self) -> TusResult<ReadResult> {
        if self.cancel_requested {
            self.cancel_requested = false;
            let mut result = self.snapshot();
            result.is_canceled = true;
            return Ok(result);
        }

        // Unexamined data is returned without waiting for the source
        if self.examined < self.buffer.len() {
            return Ok(self.snapshot());
        }

        if let Some(stream) = self.stream.as_mut() {
            loop {
                match stream.next().await {
                    Some(Ok(chunk)) if chunk.is_empty() => continue,
                    Some(Ok(chunk)) => {
                        self.append(chunk);
                        break;
                    }
                    Some(Err(source)) => {
                        self.stream = None;
                        return Err(TusError::Io { source });
                    }
                    None => {
                        self.stream = None;
                        break;
                    }
                }
            }
        }

        Ok(self.snapshot())
    }

    fn try_read(&mut self) -> TusResult<Option<ReadResult>> {
        if self.examined < self.buffer.len() || self.stream.is_none() {
            return Ok(Some(self.snapshot()));
        }
        Ok(None)
    }

    fn advance_to(&mut self, consumed: usize) {
        self.advance_to_examined(consumed, consumed);
    }

    fn advance_to_examined(&mut self, consumed: usize, examined: usize) {
        let consumed = consumed.min(self.buffer.len());
        self.buffer.advance(consumed);
        self.examined = examined.saturating_sub(consumed).min(self.buffer.len());
    }

    fn cancel_pending_read(&mut self) -> TusResult<()> {
        self.cancel_requested = true;
        Ok(())
    }

    fn complete(&mut self, _error: Option<&TusError>) {
        self.stream = None;
        self.buffer = Bytes::new();
        self.examined = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unconsumed_bytes_accumulate_across_reads() {
        let mut reader = StreamBodyReader::from_chunks(vec![
            Bytes::from_static(b"abc"),
            Bytes::from_static(b"def"),
        ]);

        let first = reader.read().await.unwrap();
        assert_eq!(&first.buffer[..], b"abc");
        reader.advance_to_examined(0, first.buffer.len());

        let second = reader.read().await.unwrap();
        assert_eq!(&second.buffer[..], b"abcdef");
        reader.advance_to(second.buffer.len());

        let last = reader.read().await.unwrap();
        assert!(last.buffer.is_empty());
        assert!(last.is_completed);
    }

    #[tokio::test]
    async fn unexamined_data_is_returned_again_without_waiting() {
        let mut reader = StreamBodyReader::from_bytes(Bytes::from_static(b"hello"));
        let first = reader.read().await.unwrap();
        reader.advance_to_examined(2, 2);

        assert_eq!(&reader.try_read().unwrap().unwrap().buffer[..], b"llo");
        let again = reader.read().await.unwrap();
        assert_eq!(first.buffer.len() - 2, again.buffer.len());
    }

    #[tokio::test]
    async fn reads_share_the_chunk_instead_of_copying_it() {
        let chunk = Bytes::from(vec![7u8; 4096]);
        let mut reader = StreamBodyReader::from_bytes(chunk.clone());

        let first = reader.read().await.unwrap();
        assert_eq!(first.buffer.as_ptr(), chunk.as_ptr());
        reader.advance_to_examined(0, first.buffer.len());

        let again = reader.try_read().unwrap().unwrap();
        assert_eq!(again.buffer.as_ptr(), chunk.as_ptr());

        reader.advance_to(1024);
        let rest = reader.read().await.unwrap();
        assert_eq!(rest.buffer.len(), 3072);
        assert_eq!(rest.buffer.as_ptr(), chunk[1024..].as_ptr());
    }

    #[test]
    fn read_waits_while_the_source_is_idle() {
        let idle = futures::stream::pending::<Result<Bytes, std::io::Error>>();
        let mut reader = StreamBodyReader::new(Box::pin(idle));

        let mut read = tokio_test::task::spawn(reader.read());
        tokio_test::assert_pending!(read.poll());
    }

    #[tokio::test]
    async fn cancel_pending_read_flags_the_next_read() {
        let mut reader = StreamBodyReader::from_bytes(Bytes::from_static(b"x"));
        reader.cancel_pending_read().unwrap();
        assert!(reader.read().await.unwrap().is_canceled);
        assert!(!reader.read().await.unwrap().is_canceled);
    }
}
