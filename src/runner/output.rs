//! Output and log sinks handed to execution backends.

use bytes::Bytes;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::info;

/// Returned when a write would grow an [`OutputBuffer`] past its limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputLimitExceeded {
    pub limit: usize,
}

impl std::fmt::Display for OutputLimitExceeded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "function output exceeded {} bytes", self.limit)
    }
}

impl std::error::Error for OutputLimitExceeded {}

#[derive(Debug, Default)]
struct OutputState {
    data: Vec<u8>,
    overflowed: bool,
}

/// Bounded, shareable buffer for a function's standard output.
///
/// Clones share the same storage. A write that would exceed the limit is
/// rejected as a whole and marks the buffer as overflowed; every later write
/// is rejected too.
#[derive(Debug, Clone)]
pub struct OutputBuffer {
    state: Arc<Mutex<OutputState>>,
    limit: usize,
}

impl OutputBuffer {
    /// Create an empty buffer accepting at most `limit` bytes.
    pub fn new(limit: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(OutputState::default())),
            limit,
        }
    }

    fn lock(&self) -> MutexGuard<'_, OutputState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append `chunk`, or reject it if the limit would be exceeded.
    pub fn append(&self, chunk: &[u8]) -> Result<(), OutputLimitExceeded> {
        let mut state = self.lock();
        if state.overflowed || state.data.len() + chunk.len() > self.limit {
            state.overflowed = true;
            return Err(OutputLimitExceeded { limit: self.limit });
        }
        state.data.extend_from_slice(chunk);
        Ok(())
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn len(&self) -> usize {
        self.lock().data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a write was ever rejected.
    pub fn overflowed(&self) -> bool {
        self.lock().overflowed
    }

    /// Take the captured bytes, leaving the buffer empty.
    pub fn take(&self) -> Bytes {
        Bytes::from(std::mem::take(&mut self.lock().data))
    }
}

impl Write for OutputBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.append(buf)
            .map(|_| buf.len())
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Creates the diagnostic sink for one invocation.
pub trait LoggerFactory: Send + Sync {
    fn new_function_logger(
        &self,
        app: &str,
        route: &str,
        image: &str,
        request_id: &str,
    ) -> Box<dyn Write + Send>;
}

/// Re-emits function diagnostics as `tracing` events on the `function`
/// target, one event per line.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLoggerFactory;

impl LoggerFactory for TracingLoggerFactory {
    fn new_function_logger(
        &self,
        app: &str,
        route: &str,
        image: &str,
        request_id: &str,
    ) -> Box<dyn Write + Send> {
        Box::new(FunctionLogWriter {
            app: app.to_string(),
            route: route.to_string(),
            image: image.to_string(),
            request_id: request_id.to_string(),
            pending: Vec::new(),
        })
    }
}

/// Line-buffering writer behind [`TracingLoggerFactory`].
#[derive(Debug)]
pub struct FunctionLogWriter {
    app: String,
    route: String,
    image: String,
    request_id: String,
    pending: Vec<u8>,
}

impl FunctionLogWriter {
    fn emit(&self, line: &[u8]) {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        info!(
            target: "function",
            app = %self.app,
            route = %self.route,
            image = %self.image,
            request_id = %self.request_id,
            "{}",
            String::from_utf8_lossy(line)
        );
    }
}

impl Write for FunctionLogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            self.emit(&line[..pos]);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.pending.is_empty() {
            let line = std::mem::take(&mut self.pending);
            self.emit(&line);
        }
        Ok(())
    }
}

impl Drop for FunctionLogWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_buffer_within_limit() {
        let buffer = OutputBuffer::new(8);
        buffer.append(b"hello").unwrap();
        buffer.append(b"!!!").unwrap();

        assert_eq!(buffer.len(), 8);
        assert!(!buffer.overflowed());
        assert_eq!(buffer.take(), Bytes::from_static(b"hello!!!"));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_output_buffer_rejects_past_limit() {
        let buffer = OutputBuffer::new(4);
        buffer.append(b"abc").unwrap();

        let err = buffer.append(b"de").unwrap_err();
        assert_eq!(err.limit, 4);
        assert!(buffer.overflowed());
        assert_eq!(buffer.len(), 3);

        // Once overflowed, even a fitting write is refused.
        assert!(buffer.append(b"d").is_err());
    }

    #[test]
    fn test_output_buffer_clones_share_storage() {
        let buffer = OutputBuffer::new(16);
        let mut writer = buffer.clone();
        write!(writer, "hi {}", 42).unwrap();

        assert_eq!(buffer.take(), Bytes::from_static(b"hi 42"));
    }

    #[test]
    fn test_output_buffer_io_write_error() {
        let mut buffer = OutputBuffer::new(2);
        let err = buffer.write_all(b"too long").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Other);
    }

    #[test]
    fn test_function_log_writer_splits_lines() {
        let mut writer = FunctionLogWriter {
            app: "demo".to_string(),
            route: "/hello".to_string(),
            image: "iron/hello".to_string(),
            request_id: "req-1".to_string(),
            pending: Vec::new(),
        };

        writer.write_all(b"first\nsec").unwrap();
        assert_eq!(writer.pending, b"sec");
        writer.write_all(b"ond\r\nthird").unwrap();
        assert_eq!(writer.pending, b"third");
        writer.flush().unwrap();
        assert!(writer.pending.is_empty());
    }
}
