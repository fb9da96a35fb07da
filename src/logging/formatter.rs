//! Single-line, colored event format for interactive use.

use std::fmt;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;
use yansi::Paint;

/// `HH:MM:SS.mmm LEVEL target: message key=value ...`
pub struct CustomPrettyFormatter;

fn level_label(level: &Level) -> &'static str {
    match *level {
        Level::ERROR => "ERROR",
        Level::WARN => " WARN",
        Level::INFO => " INFO",
        Level::DEBUG => "DEBUG",
        Level::TRACE => "TRACE",
    }
}

impl<S, N> FormatEvent<S, N> for CustomPrettyFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let meta = event.metadata();
        let time = chrono::Local::now().format("%H:%M:%S%.3f").to_string();
        let label = level_label(meta.level());

        if writer.has_ansi_escapes() {
            let level = match *meta.level() {
                Level::ERROR => label.red().bold(),
                Level::WARN => label.yellow().bold(),
                Level::INFO => label.green(),
                Level::DEBUG => label.blue(),
                Level::TRACE => label.magenta(),
            };
            write!(writer, "{} {} {}: ", time.dim(), level, meta.target().dim())?;
        } else {
            write!(writer, "{time} {label} {}: ", meta.target())?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}
