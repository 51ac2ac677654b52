use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Mutex;
use gangway_common::GangwayConfig;

use crate::{MetricsRegistry, State};

/// Shared handles passed to every server component. The config is
/// immutable for the process lifetime.
#[derive(Clone)]
pub struct Services {
    pub config: Arc<GangwayConfig>,
    pub state: Arc<Mutex<State>>,
    pub metrics: Arc<MetricsRegistry>,
}

impl Services {
    pub fn new(config: GangwayConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            state: State::new(),
            metrics: MetricsRegistry::new(),
        })
    }
}
