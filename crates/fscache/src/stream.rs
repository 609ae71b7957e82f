//! Shared read stream owned by a cached file.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::io::AsyncReadExt;
use tokio::sync::Mutex;

use crate::backend::BoxedReader;

/// Read stream handed out by [`Registry::open_stream`](crate::Registry::open_stream).
///
/// The registry keeps one per cached file and hands out clones of the same
/// `Arc` while the file is unchanged; compare with `Arc::ptr_eq`. When the
/// file goes stale the registry closes this stream and opens a new one, so
/// holders of the old `Arc` see reads fail with `NotConnected`.
pub struct FileStream {
    path: String,
    reader: Mutex<Option<BoxedReader>>,
    closed: AtomicBool,
}

impl std::fmt::Debug for FileStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStream")
            .field("path", &self.path)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl FileStream {
    pub(crate) fn new(path: impl Into<String>, reader: BoxedReader) -> Self {
        Self {
            path: path.into(),
            reader: Mutex::new(Some(reader)),
            closed: AtomicBool::new(false),
        }
    }

    /// Path the stream was opened for.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Read into `buf`, returning the number of bytes read (0 at EOF).
    pub async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut guard = self.reader.lock().await;
        let reader = guard.as_mut().ok_or_else(|| self.closed_error())?;
        reader.read(buf).await
    }

    /// Read everything that remains into `buf`.
    pub async fn read_to_end(&self, buf: &mut Vec<u8>) -> io::Result<usize> {
        let mut guard = self.reader.lock().await;
        let reader = guard.as_mut().ok_or_else(|| self.closed_error())?;
        reader.read_to_end(buf).await
    }

    /// Release the underlying reader. Returns false if it was already closed.
    pub(crate) async fn close(&self) -> bool {
        let reader = self.reader.lock().await.take();
        self.closed.store(true, Ordering::Release);
        reader.is_some()
    }

    fn closed_error(&self) -> io::Error {
        io::Error::new(
            io::ErrorKind::NotConnected,
            format!("stream for {} is closed", self.path),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn stream(data: &'static [u8]) -> FileStream {
        FileStream::new("notes.txt", Box::new(Cursor::new(data)))
    }

    #[tokio::test]
    async fn test_read_to_end() {
        let s = stream(b"hello world");
        let mut buf = Vec::new();
        assert_eq!(s.read_to_end(&mut buf).await.unwrap(), 11);
        assert_eq!(buf, b"hello world");
    }

    #[tokio::test]
    async fn test_partial_reads_advance() {
        let s = stream(b"hello world");
        let mut buf = [0u8; 5];
        s.read(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");

        let mut rest = Vec::new();
        s.read_to_end(&mut rest).await.unwrap();
        assert_eq!(rest, b" world");
    }

    #[tokio::test]
    async fn test_close_once() {
        let s = stream(b"data");
        assert!(!s.is_closed());
        assert!(s.close().await);
        assert!(s.is_closed());
        assert!(!s.close().await);

        let mut buf = Vec::new();
        let err = s.read_to_end(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }
}
