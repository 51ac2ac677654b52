mod auth_pipeline;
mod metrics;
mod services;
mod state;

pub use auth_pipeline::*;
pub use metrics::*;
pub use services::*;
pub use state::*;
