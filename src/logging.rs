//! Structured logging
//!
//! Library code logs through `tracing`. The worker installs a
//! [`ConsoleLayer`] that formats each event as one line and hands it to the
//! Workers console; native builds write to stderr instead.

use std::fmt::Write as _;

use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::{Context, SubscriberExt};

use crate::config::Config;

/// Receives formatted log lines
pub type Sink = fn(Level, &str);

/// Parse a `LOG_LEVEL` value, defaulting to info
pub fn parse_level(raw: &str) -> Level {
    match raw.trim().to_ascii_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

#[cfg(target_arch = "wasm32")]
fn console_sink(level: Level, line: &str) {
    match level {
        Level::ERROR => worker::console_error!("{line}"),
        Level::WARN => worker::console_warn!("{line}"),
        _ => worker::console_log!("{line}"),
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn console_sink(_level: Level, line: &str) {
    eprintln!("{line}");
}

/// Tracing layer that writes events to the console
pub struct ConsoleLayer {
    max_level: Level,
    sink: Sink,
}

impl ConsoleLayer {
    pub fn new(max_level: Level) -> Self {
        Self::with_sink(max_level, console_sink)
    }

    pub fn with_sink(max_level: Level, sink: Sink) -> Self {
        Self { max_level, sink }
    }
}

impl<S> Layer<S> for ConsoleLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        // more verbose levels compare greater
        if *metadata.level() > self.max_level {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let mut line = format!("{} {}: {}", metadata.level(), metadata.target(), visitor.message);
        line.push_str(&visitor.fields);
        (self.sink)(*metadata.level(), &line);
    }
}

/// Collects the `message` field and renders the rest as `key=value`
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            let _ = write!(self.fields, " {}={value:?}", field.name());
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            let _ = write!(self.fields, " {}={value}", field.name());
        }
    }
}

/// Install the console layer as the global subscriber. Later calls in the
/// same isolate are no-ops.
pub fn init(config: &Config) {
    let layer = ConsoleLayer::new(parse_level(&config.log_level));
    let subscriber = tracing_subscriber::registry().with(layer);
    if tracing::subscriber::set_global_default(subscriber).is_ok() {
        tracing::debug!(environment = %config.environment, "logging initialized");
    }
}
