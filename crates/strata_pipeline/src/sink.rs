//! Output sink wrapper that retains what it forwards.

use std::io::{self, Write};

/// Forwards writes to an inner sink, counting them and optionally keeping a
/// copy of every byte for the cache commit.
///
/// Bytes are only recorded after the inner sink has accepted them, so a
/// failed write never leaves captured bytes the client did not receive.
pub struct CaptureSink<W: Write> {
    inner: W,
    captured: Option<Vec<u8>>,
    written: u64,
}

impl<W: Write> CaptureSink<W> {
    /// Wraps `inner` and captures everything written.
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            captured: Some(Vec::new()),
            written: 0,
        }
    }

    /// Wraps `inner` and only counts bytes.
    pub fn passthrough(inner: W) -> Self {
        Self {
            inner,
            captured: None,
            written: 0,
        }
    }

    /// Number of bytes accepted by the inner sink.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Bytes captured so far, if capturing.
    pub fn captured(&self) -> Option<&[u8]> {
        self.captured.as_deref()
    }

    /// Consumes the wrapper, returning the captured bytes, if capturing.
    pub fn into_captured(self) -> Option<Vec<u8>> {
        self.captured
    }
}

impl<W: Write> Write for CaptureSink<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        if let Some(captured) = self.captured.as_mut() {
            captured.extend_from_slice(&buf[..n]);
        }
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_forwarded_bytes() {
        let mut out = Vec::new();
        let mut sink = CaptureSink::new(&mut out);
        sink.write_all(b"hello ").unwrap();
        sink.write_all(b"world").unwrap();
        assert_eq!(sink.written(), 11);
        assert_eq!(sink.captured(), Some(&b"hello world"[..]));
        assert_eq!(sink.into_captured().unwrap(), b"hello world");
        assert_eq!(out, b"hello world");
    }

    #[test]
    fn passthrough_only_counts() {
        let mut out = Vec::new();
        let mut sink = CaptureSink::passthrough(&mut out);
        sink.write_all(b"abc").unwrap();
        assert_eq!(sink.written(), 3);
        assert!(sink.captured().is_none());
        assert_eq!(out, b"abc");
    }

    struct Closed;

    impl Write for Closed {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn failed_write_captures_nothing() {
        let mut sink = CaptureSink::new(Closed);
        assert!(sink.write_all(b"lost").is_err());
        assert_eq!(sink.written(), 0);
        assert_eq!(sink.captured(), Some(&b""[..]));
    }
}
