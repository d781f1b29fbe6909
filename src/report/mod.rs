//! Status reporting: the dual-sink channel, the line protocol and capture.

pub mod channel;
pub mod protocol;
pub mod sink;

pub use channel::{ConsoleLayout, DEFAULT_CLEAR_WIDTH, ReportingChannel};
pub use protocol::{COMPLETE_PAYLOAD, STATUS_PREFIX, StatusLine};
pub use sink::BufferSink;
