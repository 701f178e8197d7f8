//! Logging setup for the `txt2kb` binary.
//!
//! Priority: `RUST_LOG` > `--verbose` > `info`. Output goes to stderr so
//! stdout stays parseable. Document text is never logged at any level.

use tracing_subscriber::EnvFilter;

pub fn init(verbose: bool) {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if verbose {
        EnvFilter::new("txt2kb=debug,info")
    } else {
        EnvFilter::new("info")
    };

    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .try_init();

    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "logging initialised");
}
