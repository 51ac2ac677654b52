use anyhow::{Context, Result};
use time::{format_description, UtcOffset};
use tracing_log::LogTracer;
use tracing_subscriber::fmt::time::OffsetTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::Cli;

fn default_filter(debug: u8) -> &'static str {
    match debug {
        0 => "gangway=info",
        1 => "gangway=debug",
        2 => "gangway=debug,russh=debug",
        _ => "debug",
    }
}

/// One console layer whose shape depends on whether a human is watching:
/// compact and colored on a terminal, timestamped and plain when piped.
pub fn init_logging(cli: &Cli) -> Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", default_filter(cli.debug));
    }

    LogTracer::init().context("Failed to set up log-crate forwarding")?;

    let interactive = console::user_attended();
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);

    #[allow(clippy::unwrap_used)]
    let timer = OffsetTime::new(
        offset,
        format_description::parse(if interactive {
            "[hour]:[minute]:[second]"
        } else {
            "[year]-[month]-[day] [hour]:[minute]:[second]"
        })
        .unwrap(),
    );

    let console_layer: Box<dyn Layer<Registry> + Send + Sync> = if interactive {
        tracing_subscriber::fmt::layer()
            .compact()
            .with_target(false)
            .with_timer(timer)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_timer(timer)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(console_layer.with_filter(EnvFilter::from_default_env()))
        .init();
    Ok(())
}
