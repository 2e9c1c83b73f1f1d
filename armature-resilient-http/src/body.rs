//! Replayable request bodies.
//!
//! A request may be sent several times (retries, protocol fallback), so its
//! body is buffered once into a [`ReusableReader`] and replayed from memory.

use bytes::Bytes;
use parking_lot::Mutex;
use std::fmt;
use std::io::{self, Read};
use tokio::io::{AsyncRead, AsyncReadExt};

/// In-memory body that rewinds itself after reaching the end.
///
/// Reading to the end yields `Ok(0)` once and moves the cursor back to the
/// start, so the next read sees the data again. An empty reader returns
/// `Ok(0)` on every call. Reads through `&ReusableReader` are serialized by an
/// internal lock, so a reader shared with a logging layer stays consistent.
pub struct ReusableReader {
    data: Bytes,
    cursor: Mutex<usize>,
}

impl ReusableReader {
    /// Wrap in-memory data.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            cursor: Mutex::new(0),
        }
    }

    /// An empty body.
    pub fn empty() -> Self {
        Self::new(Bytes::new())
    }

    /// Drain a single-use reader into memory.
    pub fn from_reader<R: Read>(mut reader: R) -> io::Result<Self> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Ok(Self::new(data))
    }

    /// Drain a single-use async reader into memory.
    pub async fn from_async_reader<R: AsyncRead + Unpin>(mut reader: R) -> io::Result<Self> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data).await?;
        Ok(Self::new(data))
    }

    /// Number of bytes in the body.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the body is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The full body, independent of the read cursor.
    pub fn bytes(&self) -> Bytes {
        self.data.clone()
    }

    /// Move the read cursor back to the start.
    pub fn rewind(&self) {
        *self.cursor.lock() = 0;
    }

    /// No-op; the data lives in memory.
    pub fn close(&self) -> io::Result<()> {
        Ok(())
    }
}

impl Read for &ReusableReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut cursor = self.cursor.lock();
        if self.data.is_empty() || buf.is_empty() {
            return Ok(0);
        }
        if *cursor >= self.data.len() {
            *cursor = 0;
            return Ok(0);
        }

        let remaining = &self.data[*cursor..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        *cursor += n;
        Ok(n)
    }
}

impl Read for ReusableReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (&*self).read(buf)
    }
}

impl Clone for ReusableReader {
    /// Clones share the data but start with a fresh cursor.
    fn clone(&self) -> Self {
        Self::new(self.data.clone())
    }
}

impl Default for ReusableReader {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for ReusableReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReusableReader")
            .field("len", &self.data.len())
            .field("cursor", &*self.cursor.lock())
            .finish()
    }
}

impl From<Bytes> for ReusableReader {
    fn from(data: Bytes) -> Self {
        Self::new(data)
    }
}

impl From<Vec<u8>> for ReusableReader {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

impl From<&'static [u8]> for ReusableReader {
    fn from(data: &'static [u8]) -> Self {
        Self::new(data)
    }
}

impl From<String> for ReusableReader {
    fn from(data: String) -> Self {
        Self::new(data)
    }
}

impl From<&'static str> for ReusableReader {
    fn from(data: &'static str) -> Self {
        Self::new(data)
    }
}

type BodyProducer = Box<dyn FnOnce() -> io::Result<Box<dyn Read + Send>> + Send>;

/// Body input accepted by a request, converted to a [`ReusableReader`]
/// before the first attempt.
pub enum RequestBody {
    /// No body.
    Empty,
    /// Raw bytes or text.
    Bytes(Bytes),
    /// A single-use stream, drained once.
    Reader(Box<dyn Read + Send>),
    /// A function producing a single-use stream, invoked once.
    Producer(BodyProducer),
    /// An already replayable body.
    Reusable(ReusableReader),
}

impl RequestBody {
    /// Body from a single-use reader.
    pub fn reader(reader: impl Read + Send + 'static) -> Self {
        Self::Reader(Box::new(reader))
    }

    /// Body from a function returning a reader.
    pub fn from_fn<F, R>(producer: F) -> Self
    where
        F: FnOnce() -> io::Result<R> + Send + 'static,
        R: Read + Send + 'static,
    {
        Self::Producer(Box::new(move || {
            producer().map(|r| Box::new(r) as Box<dyn Read + Send>)
        }))
    }

    /// Buffer the body into a replayable reader.
    ///
    /// Fails only when a stream or producer fails while being drained.
    pub fn into_reusable(self) -> io::Result<ReusableReader> {
        match self {
            Self::Empty => Ok(ReusableReader::empty()),
            Self::Bytes(data) => Ok(ReusableReader::new(data)),
            Self::Reader(reader) => ReusableReader::from_reader(reader),
            Self::Producer(producer) => ReusableReader::from_reader(producer()?),
            Self::Reusable(reader) => {
                reader.rewind();
                Ok(reader)
            }
        }
    }
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Bytes(data) => f.debug_tuple("Bytes").field(&data.len()).finish(),
            Self::Reader(_) => f.write_str("Reader(..)"),
            Self::Producer(_) => f.write_str("Producer(..)"),
            Self::Reusable(reader) => f.debug_tuple("Reusable").field(reader).finish(),
        }
    }
}

impl From<()> for RequestBody {
    fn from(_: ()) -> Self {
        Self::Empty
    }
}

impl From<Bytes> for RequestBody {
    fn from(data: Bytes) -> Self {
        Self::Bytes(data)
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(data: Vec<u8>) -> Self {
        Self::Bytes(data.into())
    }
}

impl From<&'static [u8]> for RequestBody {
    fn from(data: &'static [u8]) -> Self {
        Self::Bytes(Bytes::from_static(data))
    }
}

impl From<String> for RequestBody {
    fn from(data: String) -> Self {
        Self::Bytes(data.into())
    }
}

impl From<&'static str> for RequestBody {
    fn from(data: &'static str) -> Self {
        Self::Bytes(Bytes::from_static(data.as_bytes()))
    }
}

impl From<ReusableReader> for RequestBody {
    fn from(reader: ReusableReader) -> Self {
        Self::Reusable(reader)
    }
}
