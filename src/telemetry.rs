//! Tracing subscriber setup.
//!
//! Events go to stderr through the fmt layer, filtered by `RUST_LOG`. Without
//! `RUST_LOG` the level is `warn`, or `debug` for flexlate's own events when
//! `--debug` is passed.

use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Calling it twice is harmless.
pub fn init(debug: bool) {
    use tracing_subscriber::layer::SubscriberExt as _;
    use tracing_subscriber::util::SubscriberInitExt as _;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(debug)));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .try_init();
}

fn default_directive(debug: bool) -> &'static str {
    if debug {
        "warn,flexlate=debug"
    } else {
        "warn"
    }
}
