//! Process-wide tracing setup.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` controls the filter when set; otherwise everything logs at
/// `info`. With `json` the output is one structured object per line for
/// log shippers, else human-readable text. Calling this twice is a no-op
/// so tests and embedding applications need no coordination.
pub fn init(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        let _ = registry
            .with(fmt::layer().json().with_target(true).with_ansi(false))
            .try_init();
    } else {
        let _ = registry.with(fmt::layer().with_target(false)).try_init();
    }
}
