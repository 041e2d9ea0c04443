//! Tracing setup for the plugin: everything goes to stderr, and when the host
//! has installed log callbacks the same events are forwarded to it.

use std::ffi::{c_char, CString};
use std::fmt::{self, Write as _};
use std::sync::{Arc, OnceLock};

use arc_swap::ArcSwapOption;
use bridgeconfig::LoggingSection;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt as tracing_fmt, EnvFilter};

/// Host sink receiving one NUL-terminated UTF-8 line per event.
pub type LogCallback = extern "C" fn(message: *const c_char);

struct HostSinks {
    log: Option<LogCallback>,
    log_error: Option<LogCallback>,
}

fn sinks() -> &'static ArcSwapOption<HostSinks> {
    static SINKS: OnceLock<ArcSwapOption<HostSinks>> = OnceLock::new();
    SINKS.get_or_init(ArcSwapOption::default)
}

/// Replaces the host sinks. `None` disables the corresponding sink.
pub fn set_host_sinks(log: Option<LogCallback>, log_error: Option<LogCallback>) {
    let next = (log.is_some() || log_error.is_some())
        .then(|| Arc::new(HostSinks { log, log_error }));
    sinks().store(next);
}

/// Installs the global subscriber once per process; later calls are ignored.
pub fn install(section: &LoggingSection) {
    static INSTALLED: OnceLock<()> = OnceLock::new();
    INSTALLED.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&section.filter))
            .unwrap_or_else(|_| EnvFilter::new("info"));
        let host = section.forward_to_host.then_some(HostLogLayer);

        // Fails when the host process already installed a subscriber; its
        // subscriber then receives our events.
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .with(host)
            .try_init();
    });
}

/// Forwards WARN and ERROR events to `log_error`, everything else to `log`.
pub struct HostLogLayer;

impl<S: Subscriber> Layer<S> for HostLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let Some(sinks) = sinks().load_full() else {
            return;
        };
        let metadata = event.metadata();
        let level = *metadata.level();
        let sink = if level == Level::WARN || level == Level::ERROR {
            sinks.log_error
        } else {
            sinks.log
        };
        let Some(sink) = sink else {
            return;
        };

        let mut visitor = LineVisitor::default();
        event.record(&mut visitor);
        let line = format!("[{level}] {}{}", visitor.message, visitor.fields);
        if let Ok(line) = CString::new(line.replace('\0', " ")) {
            sink(line.as_ptr());
        }
    }
}

#[derive(Default)]
struct LineVisitor {
    message: String,
    fields: String,
}

impl Visit for LineVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}
