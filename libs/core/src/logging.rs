//! Logging Sink
//!
//! ## Purpose
//!
//! Everything in the workspace logs through `tracing`. This module routes
//! those events to a single process-global sink: either a handler installed
//! with [`set_log_handler`], or standard error when none is set.
//!
//! Severities follow syslog: [`LogPriority`] carries the numeric values 3
//! (error) through 7 (debug). `tracing` has no notice level, so
//! [`log`] tags each event with a `priority` field and [`SinkLayer`] prefers
//! that field over the event level.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use vswitch_core::logging::{init_logging, set_log_handler, LogPriority};
//!
//! set_log_handler(Some(Box::new(|priority, line| {
//!     println!("[{}] {}", priority, line);
//! })));
//! init_logging("info");
//! vswitch_core::logging::log(LogPriority::Notice, "context ready");
//! ```

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::fmt::{self, Write as _};
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

const PRIORITY_FIELD: &str = "priority";

/// Syslog severity of a log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogPriority {
    Error = 3,
    Warning = 4,
    Notice = 5,
    Info = 6,
    Debug = 7,
}

impl LogPriority {
    pub fn syslog(self) -> u8 {
        self as u8
    }

    pub fn from_syslog(value: u64) -> Option<Self> {
        match value {
            3 => Some(Self::Error),
            4 => Some(Self::Warning),
            5 => Some(Self::Notice),
            6 => Some(Self::Info),
            7 => Some(Self::Debug),
            _ => None,
        }
    }

    pub fn from_level(level: &Level) -> Self {
        if *level == Level::ERROR {
            Self::Error
        } else if *level == Level::WARN {
            Self::Warning
        } else if *level == Level::INFO {
            Self::Info
        } else {
            Self::Debug
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Notice => "notice",
            Self::Info => "info",
            Self::Debug => "debug",
        }
    }
}

impl fmt::Display for LogPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives every formatted log line
pub type LogHandler = Box<dyn Fn(LogPriority, &str) + Send + Sync>;

type SharedHandler = Arc<dyn Fn(LogPriority, &str) + Send + Sync>;

static LOG_HANDLER: Lazy<RwLock<Option<SharedHandler>>> = Lazy::new(|| RwLock::new(None));

/// Install `handler` as the process-wide sink, or restore standard error with
/// `None`
pub fn set_log_handler(handler: Option<LogHandler>) {
    *LOG_HANDLER.write() = handler.map(SharedHandler::from);
}

/// Deliver one line to the current sink
fn dispatch(priority: LogPriority, line: &str) {
    // Clone out of the lock so a handler may replace itself.
    let handler = LOG_HANDLER.read().clone();
    match handler {
        Some(handler) => handler(priority, line),
        None => eprintln!("{}: {}", priority, line),
    }
}

/// Emit `message` with an explicit syslog priority
pub fn log(priority: LogPriority, message: &str) {
    let value = priority.syslog();
    match priority {
        LogPriority::Error => tracing::error!(priority = value, "{}", message),
        LogPriority::Warning => tracing::warn!(priority = value, "{}", message),
        LogPriority::Notice | LogPriority::Info => {
            tracing::info!(priority = value, "{}", message)
        }
        LogPriority::Debug => tracing::debug!(priority = value, "{}", message),
    }
}

/// `tracing` layer forwarding events to the log sink
#[derive(Debug, Default, Clone, Copy)]
pub struct SinkLayer;

impl SinkLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S: Subscriber> Layer<S> for SinkLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = LineVisitor::default();
        event.record(&mut visitor);
        let priority = visitor
            .priority
            .unwrap_or_else(|| LogPriority::from_level(event.metadata().level()));
        dispatch(priority, &visitor.finish());
    }
}

#[derive(Default)]
struct LineVisitor {
    message: String,
    fields: String,
    priority: Option<LogPriority>,
}

impl LineVisitor {
    fn push_field(&mut self, name: &str, value: &dyn fmt::Debug) {
        let _ = write!(self.fields, " {}={:?}", name, value);
    }

    fn finish(self) -> String {
        let mut line = self.message;
        line.push_str(&self.fields);
        line
    }
}

impl Visit for LineVisitor {
    fn record_u64(&mut self, field: &Field, value: u64) {
        if field.name() == PRIORITY_FIELD {
            self.priority = LogPriority::from_syslog(value);
        } else {
            self.push_field(field.name(), &value);
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        if field.name() == PRIORITY_FIELD {
            self.priority = u64::try_from(value).ok().and_then(LogPriority::from_syslog);
        } else {
            self.push_field(field.name(), &value);
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            self.push_field(field.name(), &value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{:?}", value);
        } else {
            self.push_field(field.name(), value);
        }
    }
}

/// Install `registry + EnvFilter + SinkLayer` as the global subscriber.
///
/// Returns `false` when a global subscriber was already set; the existing one
/// stays in place.
pub fn init_logging(filter: &str) -> bool {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(SinkLayer::new())
        .try_init()
        .is_ok()
}
