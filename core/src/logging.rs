/// Logging initialization: tracing-subscriber fmt to stderr, env-filterable.
///
/// Called once at the start of `SessionHandle::new()`, before anything else.
/// Repeated initialization (multiple handles in one process, tests) is a
/// no-op thanks to `try_init`.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "courier_core=debug,info".into()),
        )
        .try_init();
}
