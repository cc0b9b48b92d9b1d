//! Log setup for the binary.

use std::sync::Once;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

static INIT: Once = Once::new();

const LOG_VAR: &str = "BEDTIME_LOG";
const DEFAULT_FILTER: &str = "bedtime=info,bedtime_core=info";
const VERBOSE_FILTER: &str = "bedtime=debug,bedtime_core=debug,claude=debug,ollama=debug";

/// Install the stderr subscriber. Safe to call more than once.
///
/// `BEDTIME_LOG` takes the usual `EnvFilter` syntax, e.g.
/// `BEDTIME_LOG=bedtime_core=debug,claude=warn`.
pub fn init(verbose: bool) {
    INIT.call_once(|| {
        let fallback = if verbose { VERBOSE_FILTER } else { DEFAULT_FILTER };
        let filter =
            EnvFilter::try_from_env(LOG_VAR).unwrap_or_else(|_| EnvFilter::new(fallback));

        // Story text goes to stdout; keep logs off it.
        let _ = tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
            .with(filter)
            .try_init();
    });
}
