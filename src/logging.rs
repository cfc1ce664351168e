//! Structured logging setup, following the reference editor's
//! `configure_logging` pattern: a non-blocking rolling file writer driven by
//! `RUST_LOG`, with a `WorkerGuard` kept alive for the process lifetime.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;

/// Must be held for as long as log output is needed; dropping it flushes
/// and stops the background writer thread.
pub struct LogGuard(#[allow(dead_code)] WorkerGuard);

pub fn init(log_dir: &Path) -> LogGuard {
    let file_appender = tracing_appender::rolling::daily(log_dir, "citeflow.log");
    let (writer, guard) = tracing_appender::non_blocking(file_appender);

    let result = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(writer)
        .with_target(true)
        .try_init();

    if let Err(err) = result {
        eprintln!("tracing subscriber already installed: {err}");
    }

    install_panic_hook();
    LogGuard(guard)
}

fn install_panic_hook() {
    use std::sync::Once;
    static HOOK: Once = Once::new();
    HOOK.call_once(|| {
        let default_panic = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            tracing::error!(target: "citeflow.panic", ?info, "panic");
            default_panic(info);
        }));
    });
}
