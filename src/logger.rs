use std::{
    cell::RefCell,
    fmt,
    fs::OpenOptions,
    io::{self, Write},
    path::Path,
};

use chrono::Local;

// ── Levels ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        })
    }
}

// ── Sink ──────────────────────────────────────────────────────────────────────

/// Append-only installation log.
///
/// Constructed once by `main` and borrowed by everything that logs. Each
/// entry is written as `[HH:MM:SS] [LEVEL] message` and flushed immediately,
/// so the file is complete up to the last entry even if the process dies.
pub struct LogSink {
    out: RefCell<Box<dyn Write>>,
}

impl LogSink {
    /// Opens (or creates) `path` in append mode and writes the run banner.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::from_writer(Box::new(file)))
    }

    /// Builds a sink over any writer and writes the run banner.
    pub fn from_writer(out: Box<dyn Write>) -> Self {
        let sink = Self {
            out: RefCell::new(out),
        };
        let stamp = Local::now().format("%a %b %e %H:%M:%S %Y");
        sink.write_raw(&format!("\n=== Tonarchy Installation Log - {} ===\n", stamp));
        sink
    }

    pub fn log(&self, level: Level, msg: impl AsRef<str>) {
        let stamp = Local::now().format("%H:%M:%S");
        self.write_raw(&format!("[{}] [{}] {}\n", stamp, level, msg.as_ref()));
    }

    pub fn debug(&self, msg: impl AsRef<str>) {
        self.log(Level::Debug, msg);
    }

    pub fn info(&self, msg: impl AsRef<str>) {
        self.log(Level::Info, msg);
    }

    pub fn warn(&self, msg: impl AsRef<str>) {
        self.log(Level::Warn, msg);
    }

    pub fn error(&self, msg: impl AsRef<str>) {
        self.log(Level::Error, msg);
    }

    // A log write that fails must never take the installer down with it.
    fn write_raw(&self, text: &str) {
        let mut out = self.out.borrow_mut();
        let _ = out.write_all(text.as_bytes());
        let _ = out.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::SharedBuf;

    #[test]
    fn banner_then_timestamped_entries() {
        let buf = SharedBuf::default();
        let sink = LogSink::from_writer(Box::new(buf.clone()));
        sink.info("Tonarchy installer started");
        sink.error("boom");

        let text = buf.contents();
        let lines: Vec<&str> = text.lines().filter(|l| !l.is_empty()).collect();
        assert!(lines[0].starts_with("=== Tonarchy Installation Log - "));
        assert!(lines[0].ends_with(" ==="));

        // [HH:MM:SS] [INFO] message
        assert_eq!(&lines[1][0..1], "[");
        assert_eq!(&lines[1][9..10], "]");
        assert!(lines[1].ends_with("[INFO] Tonarchy installer started"));
        assert!(lines[2].ends_with("[ERROR] boom"));
    }

    #[test]
    fn open_appends_across_runs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("install.log");

        LogSink::open(&path).unwrap().info("first run");
        LogSink::open(&path).unwrap().info("second run");

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.matches("=== Tonarchy Installation Log").count(), 2);
        let first = text.find("first run").unwrap();
        let second = text.find("second run").unwrap();
        assert!(first < second);
    }
}
