use colored::*;
use std::fmt;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

/// A custom tracing event formatter for colorizing log output based on level.
///
/// Info lines are printed bare so they read like normal program output.
/// Warnings and errors get a short level prefix, since publish failures and
/// dropped deliveries need to stand out in a long benchmark log.
pub struct ColorizedFormatter;

impl<S, N> FormatEvent<S, N> for ColorizedFormatter
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
        // format_fields writes directly, so buffer the line to color all of it
        let mut buffer = String::new();
        let mut buf_writer = Writer::new(&mut buffer);
        ctx.format_fields(buf_writer.by_ref(), event)?;

        let level = *event.metadata().level();
        let line = format!("{}{}", level_prefix(level), buffer);
        let colored_output = match level {
            Level::INFO => line.white(),
            Level::WARN => line.yellow(),
            Level::ERROR => line.red(),
            Level::DEBUG => line.blue(),
            Level::TRACE => line.purple(),
        };

        writeln!(writer, "{}", colored_output)
    }
}

fn level_prefix(level: Level) -> &'static str {
    match level {
        Level::WARN => "warning: ",
        Level::ERROR => "error: ",
        _ => "",
    }
}

/// Filter directive used when `RUST_LOG` is not set
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "debug"
    } else {
        "info"
    }
}

/// Install the global subscriber: `RUST_LOG` wins, otherwise info (or debug
/// with `verbose`), rendered through [`ColorizedFormatter`].
pub fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .event_format(ColorizedFormatter)
        .init();
}
