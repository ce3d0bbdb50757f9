//! Per-invocation structured logging.
//!
//! Every line carries the same envelope (component, level, event name,
//! execution id, timestamp, JSON details) so that operators can filter
//! CloudWatch by event and the log retention controller can find lifecycle
//! markers again later.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

pub const COMPONENT: &str = "cfn_custom_resource";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub component: &'static str,
    pub level: LogLevel,
    pub event: String,
    pub execution_id: String,
    pub timestamp: String,
    pub message: String,
    pub details: Value,
}

pub trait LogSink: Send + Sync {
    fn record(&self, entry: &LogEntry);

    fn flush(&self) {}
}

/// Forwards entries to the process-wide `tracing` subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn record(&self, entry: &LogEntry) {
        let details = entry.details.to_string();
        match entry.level {
            LogLevel::Debug => tracing::debug!(
                component = entry.component,
                event = %entry.event,
                execution_id = %entry.execution_id,
                details = %details,
                "{}",
                entry.message
            ),
            LogLevel::Info => tracing::info!(
                component = entry.component,
                event = %entry.event,
                execution_id = %entry.execution_id,
                details = %details,
                "{}",
                entry.message
            ),
            LogLevel::Warn => tracing::warn!(
                component = entry.component,
                event = %entry.event,
                execution_id = %entry.execution_id,
                details = %details,
                "{}",
                entry.message
            ),
            LogLevel::Error => tracing::error!(
                component = entry.component,
                event = %entry.event,
                execution_id = %entry.execution_id,
                details = %details,
                "{}",
                entry.message
            ),
        }
    }
}

/// Keeps entries in memory, for tests and for callers that want to inspect
/// what an invocation logged.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn entries_at(&self, level: LogLevel) -> Vec<LogEntry> {
        self.entries()
            .into_iter()
            .filter(|entry| entry.level == level)
            .collect()
    }

    pub fn has_event(&self, event: &str) -> bool {
        self.entries().iter().any(|entry| entry.event == event)
    }
}

impl LogSink for MemorySink {
    fn record(&self, entry: &LogEntry) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry.clone());
    }
}

/// Logger handle scoped to one invocation.
#[derive(Clone)]
pub struct InvocationLogger {
    sink: Arc<dyn LogSink>,
    execution_id: String,
    quiet: Arc<AtomicBool>,
}

impl InvocationLogger {
    pub fn new(sink: Arc<dyn LogSink>, execution_id: impl Into<String>) -> Self {
        Self {
            sink,
            execution_id: execution_id.into(),
            quiet: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    pub fn debug(&self, event: &str, message: impl Into<String>, details: Value) {
        self.emit(LogLevel::Debug, event, message.into(), details);
    }

    pub fn info(&self, event: &str, message: impl Into<String>, details: Value) {
        self.emit(LogLevel::Info, event, message.into(), details);
    }

    pub fn warn(&self, event: &str, message: impl Into<String>, details: Value) {
        self.emit(LogLevel::Warn, event, message.into(), details);
    }

    pub fn error(&self, event: &str, message: impl Into<String>, details: Value) {
        self.emit(LogLevel::Error, event, message.into(), details);
    }

    /// Drop everything below error severity from now on. Used once the
    /// invocation's own log stream has been purged.
    pub fn quiet(&self) {
        self.quiet.store(true, Ordering::Release);
    }

    pub fn flush(&self) {
        self.sink.flush();
    }

    fn emit(&self, level: LogLevel, event: &str, message: String, details: Value) {
        if level < LogLevel::Error && self.quiet.load(Ordering::Acquire) {
            return;
        }
        self.sink.record(&LogEntry {
            component: COMPONENT,
            level,
            event: event.to_string(),
            execution_id: self.execution_id.clone(),
            timestamp: Utc::now().to_rfc3339(),
            message,
            details,
        });
    }
}

impl fmt::Debug for InvocationLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationLogger")
            .field("execution_id", &self.execution_id)
            .field("quiet", &self.quiet.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

/// JSON lines on stdout, filtered by `RUST_LOG` (default `info`).
pub fn init_tracing() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .json()
        .flatten_event(true)
        .with_current_span(false)
        .with_span_list(false)
        .with_target(false)
        .with_env_filter(filter)
        .try_init()
}
