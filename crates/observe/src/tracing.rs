use tracing_subscriber::EnvFilter;

/// Initializes the global tracing subscriber with the given filter string,
/// e.g. `info,backoffice=debug,sqlx=warn`. Must be called at most once.
pub fn initialize(filter: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(true)
        .init();
}

/// Variant for tests: never panics when a subscriber is already installed.
pub fn initialize_for_tests(filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_test_writer()
        .try_init();
}
