use crate::prelude::Result;
use clap::ValueEnum;
use tracing::subscriber::set_global_default;
use tracing::{Level, Subscriber};
use tracing_log::LogTracer;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{EnvFilter, fmt::MakeWriter};

/// Log targets of the provider. Verbosity flags only raise these, the HTTP
/// stack below stays at `warn`.
///
const TARGETS: [&str; 5] = ["cli", "config", "model", "proxmox", "service"];

/// Shape of the log lines written to stderr.
///
#[derive(Debug, Clone, Copy, Default, PartialEq, ValueEnum)]
pub enum LogFormat {
    /// Compact human readable lines.
    #[default]
    Text,
    /// One JSON object per line, for CI runners collecting logs.
    Json,
}

/// Filter used when `RUST_LOG` is not set: `level` for the provider targets,
/// `warn` for everything else.
///
pub fn default_directives(level: Level) -> String {
    let level = level.as_str().to_lowercase();
    std::iter::once("warn".to_owned())
        .chain(TARGETS.iter().map(|target| format!("{target}={level}")))
        .collect::<Vec<_>>()
        .join(",")
}

/// Composes and returns a tracing subscriber for provider logging.
///
/// # Arguments
///
/// * `level`: Level of the provider targets if the `RUST_LOG` environment
///   variable is not set.
/// * `format`: Text or JSON lines.
/// * `sink`: Destination where logs will be written to. The CLI passes
///   `stderr` so that stdout only carries the resulting state.
///
pub fn get_subscriber<Sink>(level: Level, format: LogFormat, sink: Sink) -> Box<dyn Subscriber + Sync + Send>
where
    Sink: for<'a> MakeWriter<'a> + Sync + Send + 'static,
{
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_error| EnvFilter::new(default_directives(level)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_writer(sink);

    // Task waits are spans, their close events carry how long Proxmox took.
    match format {
        LogFormat::Text => Box::new(builder.compact().finish()),
        LogFormat::Json => Box::new(
            builder
                .json()
                .with_current_span(true)
                .with_file(true)
                .with_line_number(true)
                .with_span_events(FmtSpan::CLOSE)
                .finish(),
        ),
    }
}

/// Register a subscriber as global default to process span data.
///
/// # Warning
///
/// This function should only be called **once** in the application's lifetime.
///
pub fn init_subscriber(subscriber: impl Subscriber + Sync + Send) -> Result<()> {
    // Crates logging through `log` end up in the same output.
    LogTracer::init()?;

    set_global_default(subscriber)?;
    Ok(())
}
