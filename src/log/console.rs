//! Console transport.

use std::io::{self, Write};

use chrono::Local;
use console::Style;
use parking_lot::Mutex;

use super::event::LogEvent;
use super::level::Level;
use super::sink::Transport;

/// How the console renders an event.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Format {
    /// `[2026-10-16 02:41:07.318 PM] info: \tmessage`, colored by level.
    /// Metadata is left to the file transports.
    Pretty,
    /// One JSON object per line, for log collectors.
    Json,
}

pub struct ConsoleTransport {
    format: Format,
    min_level: Level,
    out: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleTransport {
    pub fn stdout(format: Format) -> Self {
        Self::with_writer(format, Box::new(io::stdout()))
    }

    /// Console rendering into an arbitrary writer.
    pub fn with_writer(format: Format, out: Box<dyn Write + Send>) -> Self {
        Self { format, min_level: Level::Debug, out: Mutex::new(out) }
    }

    pub fn min_level(mut self, level: Level) -> Self {
        self.min_level = level;
        self
    }

    fn render(&self, event: &LogEvent) -> String {
        match self.format {
            Format::Json => event.to_json_line(),
            Format::Pretty => {
                let timestamp = event
                    .timestamp
                    .with_timezone(&Local)
                    .format("%Y-%m-%d %I:%M:%S%.3f %p");
                let line = format!("[{timestamp}] {}: \t{}", event.level, event.message);
                level_style(event.level).apply_to(line).to_string()
            }
        }
    }
}

fn level_style(level: Level) -> Style {
    match level {
        Level::Error => Style::new().red(),
        Level::Warn  => Style::new().yellow(),
        Level::Info  => Style::new().green(),
        Level::Http  => Style::new().green(),
        Level::Debug => Style::new().blue(),
    }
}

impl Transport for ConsoleTransport {
    fn name(&self) -> &str {
        "console"
    }

    fn min_level(&self) -> Level {
        self.min_level
    }

    fn log(&self, event: &LogEvent) -> io::Result<()> {
        let mut line = self.render(event);
        line.push('\n');
        // One write_all per record under the lock keeps lines whole.
        self.out.lock().write_all(line.as_bytes())
    }

    fn flush(&self) -> io::Result<()> {
        self.out.lock().flush()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::{Map, Value, json};

    use super::*;

    #[derive(Clone, Default)]
    struct Shared(Arc<Mutex<Vec<u8>>>);

    impl Write for Shared {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Shared {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().clone()).unwrap()
        }
    }

    #[test]
    fn json_format_writes_one_parseable_line_per_event() {
        let buf = Shared::default();
        let console = ConsoleTransport::with_writer(Format::Json, Box::new(buf.clone()));

        let mut fields = Map::new();
        fields.insert("requestId".into(), json!("r-1"));
        console.log(&LogEvent::new(Level::Warn, "first").with_fields(fields)).unwrap();
        console.log(&LogEvent::new(Level::Info, "second")).unwrap();

        let text = buf.text();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["level"], "warn");
        assert_eq!(first["requestId"], "r-1");
    }

    #[test]
    fn pretty_format_shows_level_and_message() {
        let buf = Shared::default();
        let console = ConsoleTransport::with_writer(Format::Pretty, Box::new(buf.clone()));

        console.log(&LogEvent::new(Level::Info, "Server running")).unwrap();

        let text = console::strip_ansi_codes(&buf.text()).into_owned();
        assert!(text.starts_with('['));
        assert!(text.contains("] info: \tServer running"));
        assert!(text.ends_with('\n'));
    }
}
