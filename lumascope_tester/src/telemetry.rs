use clap::ValueEnum;
use tracing::Level;
use tracing_subscriber::fmt::time::UtcTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Installs the global subscriber. Logs go to stderr so stdout stays free for
/// the run summary.
pub fn init_tracing(format: LogFormat, verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let builder = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_timer(UtcTime::rfc_3339())
        .with_writer(std::io::stderr)
        .with_target(false);

    let result = match format {
        LogFormat::Text => tracing::subscriber::set_global_default(builder.finish()),
        LogFormat::Json => tracing::subscriber::set_global_default(
            builder
                .json()
                .with_current_span(false)
                .with_span_list(false)
                .finish(),
        ),
    };
    if let Err(err) = result {
        eprintln!("tracing already initialised: {err}");
    }
}
