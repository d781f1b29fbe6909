//! In-memory writer for capturing reporter output.

use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};

/// Cloneable, thread-safe byte buffer implementing [`Write`].
///
/// Clones share the same buffer, so one handle can be given to a
/// [`super::ReportingChannel`] while another reads what was written.
#[derive(Debug, Clone, Default)]
pub struct BufferSink {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, lossily decoded as UTF-8.
    pub fn contents(&self) -> String {
        let buf = self.buf.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Completed lines written so far (text after the last `\n` is excluded).
    pub fn lines(&self) -> Vec<String> {
        let contents = self.contents();
        let complete = match contents.rfind('\n') {
            Some(idx) => &contents[..idx],
            None => return Vec::new(),
        };
        complete.split('\n').map(str::to_string).collect()
    }
}

impl Write for BufferSink {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut buf = self.buf.lock().unwrap_or_else(PoisonError::into_inner);
        buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
