//! In-memory transport. Clones share one buffer, so a test can hand one clone
//! to the sink and inspect the other.

use std::io;
use std::sync::Arc;

use parking_lot::Mutex;

use super::event::LogEvent;
use super::level::Level;
use super::sink::Transport;

#[derive(Clone)]
pub struct MemoryTransport {
    min_level: Level,
    events: Arc<Mutex<Vec<LogEvent>>>,
}

impl MemoryTransport {
    pub fn new(min_level: Level) -> Self {
        Self { min_level, events: Arc::new(Mutex::new(Vec::new())) }
    }

    /// Snapshot of everything received so far, in arrival order.
    pub fn events(&self) -> Vec<LogEvent> {
        self.events.lock().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.events.lock().iter().map(|e| e.message.clone()).collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl Transport for MemoryTransport {
    fn name(&self) -> &str {
        "memory"
    }

    fn min_level(&self) -> Level {
        self.min_level
    }

    fn log(&self, event: &LogEvent) -> io::Result<()> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}
