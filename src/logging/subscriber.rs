//! Tracing subscriber for a provisioning run: coloured console output plus a
//! per-command run log tagged with the module each line belongs to.
use std::fmt::Write as _;
use std::fs;
use std::io::Write as _;
use std::path::Path;
use std::sync::Mutex;

use tracing::span;
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;

use super::utils::{format_utc_datetime, format_utc_time, log_file_path, strip_ansi};

/// Target for module stage headers.
pub(super) const STAGE_TARGET: &str = "provision::stage";
/// Target for dry-run change lines.
pub(super) const DRY_RUN_TARGET: &str = "provision::dry_run";
/// Name of the span the runner enters while executing a module.
pub const MODULE_SPAN: &str = "module";

/// What the run log header records about a run.
#[derive(Debug, Clone, Copy)]
pub struct RunHeader<'a> {
    /// Subcommand name; also names the log file.
    pub command: &'a str,
    /// Device targeted, when the command takes one.
    pub device: Option<&'a str>,
    /// Whether the run changes nothing.
    pub dry_run: bool,
}

impl RunHeader<'_> {
    fn render(&self) -> String {
        let mut out = format!(
            "== provision {} ({}) {} ==\nstarted: {} UTC\n",
            crate::VERSION,
            crate::TARGET,
            self.command,
            format_utc_datetime(),
        );
        if let Some(device) = self.device {
            let mode = if self.dry_run { "dry run" } else { "converge" };
            let _ = write!(out, "device:  {device}\nmode:    {mode}\n");
        }
        out
    }
}

/// Collects one named field of an event or span.
struct FieldVisitor {
    name: &'static str,
    value: Option<String>,
}

impl FieldVisitor {
    const fn new(name: &'static str) -> Self {
        Self { name, value: None }
    }
}

impl tracing::field::Visit for FieldVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == self.name {
            self.value = Some(format!("{value:?}"));
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == self.name {
            self.value = Some(value.to_string());
        }
    }
}

fn message(event: &tracing::Event<'_>) -> String {
    let mut visitor = FieldVisitor::new("message");
    event.record(&mut visitor);
    visitor.value.unwrap_or_default()
}

/// Module id captured from a [`MODULE_SPAN`], kept in the span's extensions.
struct ModuleId(String);

/// Appends every event to the run log, stripped of ANSI codes and prefixed
/// with the time and the module being executed.
///
/// Captures `DEBUG` and above regardless of console verbosity.
#[derive(Debug)]
pub(super) struct RunLogLayer {
    file: Mutex<fs::File>,
}

impl RunLogLayer {
    /// Truncate the log for `header.command` under the cache directory.
    ///
    /// Returns `None` if the cache directory or the file is unavailable.
    pub(super) fn new(header: &RunHeader<'_>) -> Option<Self> {
        Self::create(&log_file_path(header.command)?, header)
    }

    /// Truncate `path`, write the run header and append from then on.
    pub(super) fn create(path: &Path, header: &RunHeader<'_>) -> Option<Self> {
        fs::write(path, header.render()).ok()?;
        let file = fs::OpenOptions::new().append(true).open(path).ok()?;
        Some(Self {
            file: Mutex::new(file),
        })
    }
}

impl<S> tracing_subscriber::Layer<S> for RunLogLayer
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        if attrs.metadata().name() != MODULE_SPAN {
            return;
        }
        let mut visitor = FieldVisitor::new("id");
        attrs.record(&mut visitor);
        if let (Some(span), Some(module)) = (ctx.span(id), visitor.value) {
            span.extensions_mut().insert(ModuleId(module));
        }
    }

    fn on_event(&self, event: &tracing::Event<'_>, ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let module = ctx.event_scope(event).and_then(|mut scope| {
            scope.find_map(|span| {
                let extensions = span.extensions();
                extensions.get::<ModuleId>().map(|m| m.0.clone())
            })
        });

        let mut line = format!("[{}] ", format_utc_time());
        let msg = strip_ansi(&message(event));
        match (*metadata.level(), metadata.target()) {
            (tracing::Level::INFO, STAGE_TARGET) => {
                let _ = write!(line, "==> {msg}");
            }
            (level, target) => {
                if let Some(module) = &module {
                    let _ = write!(line, "{module:<12} ");
                } else {
                    line.push_str("             ");
                }
                let tag = match (level, target) {
                    (tracing::Level::INFO, DRY_RUN_TARGET) => "[dry run] ",
                    (tracing::Level::ERROR, _) => "[error] ",
                    (tracing::Level::WARN, _) => "[warn] ",
                    (tracing::Level::DEBUG | tracing::Level::TRACE, _) => "[debug] ",
                    _ => "",
                };
                let _ = write!(line, "{tag}{msg}");
            }
        }

        if let Ok(mut f) = self.file.lock() {
            writeln!(f, "{line}").ok();
        }
    }
}

/// Console event formatter: stage arrows, dry-run tags, coloured levels.
struct ConsoleFormatter;

impl<S, N> tracing_subscriber::fmt::FormatEvent<S, N> for ConsoleFormatter
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> tracing_subscriber::fmt::FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &tracing_subscriber::fmt::FmtContext<'_, S, N>,
        mut writer: tracing_subscriber::fmt::format::Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let metadata = event.metadata();
        let msg = message(event);
        match (*metadata.level(), metadata.target()) {
            (tracing::Level::ERROR, _) => writeln!(writer, "\x1b[31mERROR\x1b[0m {msg}"),
            (tracing::Level::WARN, _) => writeln!(writer, "\x1b[33mWARN\x1b[0m  {msg}"),
            (tracing::Level::INFO, STAGE_TARGET) => {
                writeln!(writer, "\x1b[1;34m==>\x1b[0m \x1b[1m{msg}\x1b[0m")
            }
            (tracing::Level::INFO, DRY_RUN_TARGET) => {
                writeln!(writer, "  \x1b[33m[DRY RUN]\x1b[0m {msg}")
            }
            (tracing::Level::INFO, _) => writeln!(writer, "  {msg}"),
            _ => writeln!(writer, "  \x1b[2m{msg}\x1b[0m"),
        }
    }
}

/// Initialise the global [`tracing`] subscriber for one run.
///
/// Console output honours `verbose`; the run log under
/// `$XDG_CACHE_HOME/provision/<command>.log` receives every event from
/// `debug` up. Must be called once, before any logging.
pub fn init_subscriber(verbose: bool, header: &RunHeader<'_>) {
    use tracing_subscriber::fmt::writer::MakeWriterExt as _;
    use tracing_subscriber::{
        Layer as _, filter::LevelFilter, fmt, layer::SubscriberExt as _,
        util::SubscriberInitExt as _,
    };

    let console_level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };

    let make_writer = std::io::stderr
        .with_max_level(tracing::Level::WARN)
        .and(std::io::stdout.with_min_level(tracing::Level::INFO));

    let console_layer = fmt::layer()
        .event_format(ConsoleFormatter)
        .with_writer(make_writer)
        .with_filter(console_level);

    let run_log = RunLogLayer::new(header).map(|l| l.with_filter(LevelFilter::DEBUG));

    tracing_subscriber::registry()
        .with(console_layer)
        .with(run_log)
        .init();
}
