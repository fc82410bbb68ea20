//! Ring-buffered structured log stream, optionally mirrored to a [`Tracer`].

use crate::tracer::Tracer;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

/// Log severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// Verbose diagnostic detail.
    Debug,
    /// Routine informational message.
    Info,
    /// Recoverable but noteworthy condition.
    Warn,
    /// Surfaced failure.
    Error,
}

/// A single log entry.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LogEntry {
    /// Severity of this entry.
    pub level: Level,
    /// Module name that produced the entry.
    pub module: String,
    /// Human-readable message.
    pub message: String,
    /// Structured payload, if any.
    pub data: Option<serde_json::Value>,
    /// Milliseconds since the epoch when the entry was produced.
    pub timestamp: u64,
}

/// Ring-buffered logger with evict-half overflow, matching [`Tracer`]'s
/// discipline, plus optional mirroring of every entry as a `"log"` trace
/// event.
#[derive(Debug)]
pub struct Logger {
    buffer: Mutex<VecDeque<LogEntry>>,
    capacity: usize,
    sender: broadcast::Sender<LogEntry>,
    mirror: Mutex<Option<Arc<Tracer>>>,
}

impl Logger {
    /// Creates a logger with the given ring-buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(16));
        Self {
            buffer: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            sender,
            mirror: Mutex::new(None),
        }
    }

    /// Mirrors every subsequent entry to `tracer` as a `{type: "log", ...}`
    /// event.
    pub fn mirror_to(&self, tracer: Arc<Tracer>) {
        *self.mirror.lock() = Some(tracer);
    }

    /// Records an entry at `level` for `module`.
    pub fn log(
        &self,
        level: Level,
        module: impl Into<String>,
        message: impl Into<String>,
        data: Option<serde_json::Value>,
        now_ms: u64,
    ) {
        let entry = LogEntry {
            level,
            module: module.into(),
            message: message.into(),
            data,
            timestamp: now_ms,
        };
        {
            let mut buf = self.buffer.lock();
            buf.push_back(entry.clone());
            if buf.len() > self.capacity {
                let to_drop = buf.len() / 2;
                for _ in 0..to_drop {
                    buf.pop_front();
                }
            }
        }
        if let Some(tracer) = self.mirror.lock().as_ref() {
            tracer.emit(
                "log",
                serde_json::json!({
                    "level": entry.level,
                    "module": entry.module,
                    "message": entry.message,
                    "data": entry.data,
                }),
                now_ms,
            );
        }
        let _ = self.sender.send(entry);
    }

    /// A namespace-scoped handle: `for_module("x").info("m")` produces the
    /// same entry as `logger.log(Info, "x", "m", ...)`.
    pub fn for_module<'a>(self: &'a Arc<Self>, module: impl Into<String>) -> ModuleLogger<'a> {
        ModuleLogger {
            logger: self,
            module: module.into(),
        }
    }

    /// A consumer stream, filtered to entries at or above `min_level` whose
    /// module starts with `module_prefix`, yielding only future emissions.
    pub fn entries(
        &self,
        module_prefix: Option<String>,
        min_level: Option<Level>,
    ) -> impl futures::Stream<Item = LogEntry> {
        BroadcastStream::new(self.sender.subscribe())
            .filter_map(|r| r.ok())
            .filter(move |entry| {
                let level_ok = min_level.map(|m| entry.level >= m).unwrap_or(true);
                let module_ok = module_prefix
                    .as_deref()
                    .map(|p| entry.module.starts_with(p))
                    .unwrap_or(true);
                level_ok && module_ok
            })
    }

    /// A copy of the current buffer, optionally filtered by minimum level.
    pub fn snapshot(&self, min_level: Option<Level>) -> Vec<LogEntry> {
        let buf = self.buffer.lock();
        match min_level {
            Some(m) => buf.iter().filter(|e| e.level >= m).cloned().collect(),
            None => buf.iter().cloned().collect(),
        }
    }
}

/// A module-namespaced view over a [`Logger`]; a thin convenience wrapper,
/// not a distinct log sink.
pub struct ModuleLogger<'a> {
    logger: &'a Logger,
    module: String,
}

impl ModuleLogger<'_> {
    /// Logs a debug-level message under this module.
    pub fn debug(&self, message: impl Into<String>, now_ms: u64) {
        self.logger
            .log(Level::Debug, self.module.clone(), message, None, now_ms);
    }

    /// Logs an info-level message under this module.
    pub fn info(&self, message: impl Into<String>, now_ms: u64) {
        self.logger
            .log(Level::Info, self.module.clone(), message, None, now_ms);
    }

    /// Logs a warn-level message under this module.
    pub fn warn(&self, message: impl Into<String>, now_ms: u64) {
        self.logger
            .log(Level::Warn, self.module.clone(), message, None, now_ms);
    }

    /// Logs an error-level message under this module.
    pub fn error(&self, message: impl Into<String>, now_ms: u64) {
        self.logger
            .log(Level::Error, self.module.clone(), message, None, now_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn for_module_is_a_transparent_namespace() {
        let logger = Arc::new(Logger::new(16));
        logger.log(Level::Info, "x", "m", None, 0);
        logger.for_module("x").info("m", 0);
        let snap = logger.snapshot(None);
        assert_eq!(snap.len(), 2);
        assert_eq!(snap[0].module, snap[1].module);
        assert_eq!(snap[0].message, snap[1].message);
    }

    #[test]
    fn mirrors_to_tracer_as_log_event() {
        let tracer = Arc::new(Tracer::new(16));
        let logger = Logger::new(16);
        logger.mirror_to(tracer.clone());
        logger.log(Level::Warn, "net", "dropped packet", None, 5);
        let events = tracer.snapshot(Some("log"));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].payload["module"], "net");
    }
}
