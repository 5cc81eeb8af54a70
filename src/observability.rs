use tracing_subscriber::EnvFilter;

/// Logs to stderr, filtered by `RUST_LOG` with `elsync=info` as the baseline.
/// Stdout stays free for command output.
pub fn init_tracing() {
    let filter = EnvFilter::from_default_env().add_directive(
        "elsync=info"
            .parse()
            .unwrap_or_else(|_| tracing_subscriber::filter::LevelFilter::INFO.into()),
    );

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
