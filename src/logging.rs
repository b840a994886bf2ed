use once_cell::sync::OnceCell;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

static FILE_GUARD: OnceCell<WorkerGuard> = OnceCell::new();

/// Initialise logging.
///
/// Without `debug` the level is forced to `info` and `RUST_LOG` is ignored.
/// When `log_file` is given, output also goes to that file through a
/// non-blocking writer that lives for the rest of the process.
/// Calling this again after a subscriber is installed does nothing.
pub fn init(debug: bool, log_file: Option<PathBuf>) {
    let level = if debug { "debug" } else { "info" };

    let filter = if debug {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    } else {
        EnvFilter::new(level)
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let file = log_file.and_then(|path| {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let name = path.file_name()?.to_owned();
        Some(tracing_appender::rolling::never(dir, name))
    });

    let result = match file {
        Some(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let installed = builder
                .with_ansi(false)
                .with_writer(std::io::stderr.and(writer))
                .try_init();
            if installed.is_ok() {
                let _ = FILE_GUARD.set(guard);
            }
            installed
        }
        None => builder.try_init(),
    };

    if result.is_err() {
        tracing::debug!("logging already initialised");
    }
}
