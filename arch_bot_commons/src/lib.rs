//! Boilerplate shared between my bots, because every one of them
//! starts the same way and replies the same way.

use std::future::Future;

mod replies;
pub use replies::*;

/// Log level used if `RUST_LOG` is not set or is not valid unicode.
const DEFAULT_LOG_LEVEL: &str = "info";

/// Initialize logging and start the `closure` in an async runtime.
/// Logging is enabled by default on level `info` unless overridden
/// by environment variable `RUST_LOG`. This uses the crate
/// [pretty_env_logger][] internally, see its documentation for more details.
///
/// When running as a systemd service, timestamps are left out,
/// since the journal adds its own.
///
/// # Panics
/// Panics if the async runtime fails to build.
///
/// [pretty_env_logger]: https://docs.rs/pretty_env_logger
pub fn start_everything(closure: impl Future<Output = ()>) {
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string());

    let mut builder = if std::env::var_os("JOURNAL_STREAM").is_some() {
        pretty_env_logger::formatted_builder()
    } else {
        pretty_env_logger::formatted_timed_builder()
    };

    builder.parse_filters(&log_level);

    if builder.try_init().is_err() {
        log::error!("Tried to init logger twice!");
    }

    log::info!("Logger is up, starting the runtime...");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to build the async runtime!")
        .block_on(closure);
}
