//! Structured logging setup, following the teacher server crates'
//! `tracing` + `tracing-subscriber` convention: JSON output in release
//! builds, human-readable pretty output in debug, both driven by
//! `RUST_LOG`.

use tracing_subscriber::EnvFilter;

/// Initialize the global `tracing` subscriber. Must be called exactly once,
/// before any other component logs. Idempotent-on-failure: if a subscriber
/// is already installed (as happens across repeated test-binary setup) the
/// error is swallowed rather than panicking the process.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    let result = if cfg!(debug_assertions) {
        subscriber.pretty().try_init()
    } else {
        subscriber.json().try_init()
    };

    if let Err(err) = result {
        eprintln!("tracing subscriber already initialized: {err}");
    }
}
