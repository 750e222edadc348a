use bitflags::bitflags;
use std::sync::Arc;
use tracing::{field::Visit, Event, Level, Subscriber};
use tracing_subscriber::{layer::Context, Layer};

bitflags! {
    /// Controls which internal log severities invoke `log_callback`
    ///
    #[derive(Default, serde::Serialize, serde::Deserialize)]
    pub struct LogSeverityMask: u32 {
        const ERROR   = 1 << 0;
        const WARNING = 1 << 1;
        const INFO    = 1 << 2;
        const VERBOSE = 1 << 3;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogSeverity {
    Error,
    Warning,
    Info,
    Verbose,
}

impl LogSeverity {
    fn from_level(level: &Level) -> Self {
        match *level {
            Level::ERROR => Self::Error,
            Level::WARN => Self::Warning,
            Level::INFO => Self::Info,
            _ => Self::Verbose,
        }
    }

    fn mask_bit(self) -> LogSeverityMask {
        match self {
            Self::Error => LogSeverityMask::ERROR,
            Self::Warning => LogSeverityMask::WARNING,
            Self::Info => LogSeverityMask::INFO,
            Self::Verbose => LogSeverityMask::VERBOSE,
        }
    }
}

/// `log_callback(user_data, severity, file, line, msg)` The
/// `user_data` capture is the closure's own environment rather than a raw
/// pointer, since this is a Rust host boundary rather than a C ABI one.
pub type LogCallback = Arc<dyn Fn(LogSeverity, &str, u32, &str) + Send + Sync>;

/// A `tracing_subscriber` layer that forwards filtered events to the host's
/// `log_callback`. Installed once per device-state; every crate in this
/// workspace logs through ordinary `tracing` macros and never touches the
/// host callback directly.
pub struct HostLogLayer {
    callback: LogCallback,
    mask: LogSeverityMask,
}

impl HostLogLayer {
    pub fn new(callback: LogCallback, mask: LogSeverityMask) -> Self {
        Self { callback, mask }
    }
}

#[derive(Default)]
struct MessageVisitor(String);

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name == "message" {
            self.0 = format!("{:?}", value);
        }
    }
}

impl<S: Subscriber> Layer<S> for HostLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let severity = LogSeverity::from_level(event.metadata().level());
        if !self.mask.contains(severity.mask_bit()) {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let file = event.metadata().file().unwrap_or("<unknown>");
        let line = event.metadata().line().unwrap_or(0);
        (self.callback)(severity, file, line, &visitor.0);
    }
}
