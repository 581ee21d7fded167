// DANS : src/monitoring/logging.rs
use tracing_subscriber::EnvFilter;

/// Logs JSON sur stderr, niveau piloté par RUST_LOG (`info` sinon).
/// stdout reste libre pour la ligne de progression et le bilan.
pub fn setup_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
