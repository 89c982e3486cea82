use tracing_subscriber::EnvFilter;

const DEFAULT_LEVEL: &str = "info";
const QUIET_DEPENDENCIES: &[&str] = &["teloxide=warn", "reqwest=warn", "hyper=warn", "hyper_util=warn"];

/// `RUST_LOG` wins when set; otherwise `info` with chatty dependencies capped at `warn`.
pub fn setup_logger() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter());

    tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .with_ansi(true)
        .compact()
        .with_env_filter(filter)
        .init();
}

fn default_filter() -> EnvFilter {
    QUIET_DEPENDENCIES
        .iter()
        .filter_map(|directive| directive.parse().ok())
        .fold(EnvFilter::new(DEFAULT_LEVEL), |filter, directive| filter.add_directive(directive))
}
