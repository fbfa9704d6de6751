use std::fs;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Sends Neo call and sync events to stderr and to `logs/neo.log` as JSON, rolled daily.
///
/// Stdout is left for the XML and JSON that commands print.
/// `RUST_LOG` overrides the default `jmbo_neo=info` filter.
pub fn init_logging() {
    let _ = fs::create_dir_all("logs");

    let file_appender = tracing_appender::rolling::daily("logs", "neo.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer().json().with_writer(file_writer);
    let console_layer = fmt::layer().with_writer(std::io::stderr);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("jmbo_neo=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .init();

    // The file writer flushes on drop; it must outlive every command.
    std::mem::forget(guard);
}
