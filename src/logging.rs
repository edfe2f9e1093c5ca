//! Purpose: Install the process-wide `tracing` subscriber.
//! Invariants: Safe to call more than once; later calls are no-ops.
//! Invariants: `RUST_LOG` overrides the default `info` filter.
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
