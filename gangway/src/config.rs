use std::path::Path;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use tracing::*;
use gangway_common::GangwayConfig;

pub fn load_config(path: &Path) -> Result<GangwayConfig> {
    let mut builder = Config::builder();
    if path.exists() {
        builder = builder.add_source(File::from(path));
    } else {
        warn!("Config file {} not found, using defaults", path.display());
    }

    let config: GangwayConfig = builder
        .add_source(Environment::with_prefix("GANGWAY").separator("__"))
        .build()
        .context("Could not assemble configuration")?
        .try_deserialize()
        .context("Could not parse configuration")?;

    config.validate()?;
    info!(
        "Using config: {} (target: {})",
        path.display(),
        config
            .ssh
            .host
            .as_deref()
            .unwrap_or("<chosen by client>"),
    );
    Ok(config)
}
