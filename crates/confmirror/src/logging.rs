//! Log output setup.
//!
//! The library logs through the `log` facade and opens `tracing` spans; both
//! end up in one `tracing-subscriber` pipeline. `RUST_LOG` takes precedence
//! over the configured level:
//!
//! ```bash
//! RUST_LOG=confmirror=debug confmirror --path /srv/app
//! ```

use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingConfig;

/// HH:MM:SS.mmm in local time.
struct CompactTime;

impl FormatTime for CompactTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%H:%M:%S%.3f"))
    }
}

fn filter_for(config: &LoggingConfig) -> EnvFilter {
    if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Installs the global subscriber. Returns `false` if one was already set.
pub fn init(config: &LoggingConfig) -> bool {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_timer(CompactTime)
        .with_filter(filter_for(config));

    tracing_subscriber::registry()
        .with(fmt_layer)
        .try_init()
        .is_ok()
}
