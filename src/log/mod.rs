//! Structured logging.
//!
//! ```text
//! Logger (bound fields) ──┐
//!                         ├─► LogSink ──► console        (pretty | json)
//! tracing ─► SinkLayer ───┘        ├────► combined-*.log (rotating, all levels)
//!                                  ├────► error-*.log    (rotating, error only)
//!                                  └────► exceptions.log / rejections.log (fatal only)
//! ```

mod console;
mod event;
mod file;
mod layer;
mod level;
mod logger;
mod memory;
mod rotate;
mod sink;

pub use console::{ConsoleTransport, Format};
pub use event::LogEvent;
pub use file::FileTransport;
pub use layer::SinkLayer;
pub use level::{Level, ParseLevelError};
pub use logger::{Logger, Profiler};
pub use memory::MemoryTransport;
pub use rotate::{RotatingFile, RotationPolicy};
pub use sink::{Fatal, LogSink, LogSinkBuilder, Transport};
