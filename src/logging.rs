use tracing_subscriber::EnvFilter;

/// Installs the global tracing subscriber. Safe to call more than once; only
/// the first call wins.
pub fn init() -> Result<(), tracing_subscriber::util::TryInitError> {
    use tracing_subscriber::util::SubscriberInitExt as _;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .finish()
        .try_init()
}
