use anyhow::{Context, Result};
use tokio::time::timeout;

use crate::config::load_config;

pub(crate) async fn command(cli: &crate::Cli) -> Result<()> {
    let config = load_config(&cli.config)?;

    let url = format!("http://{}/healthz", config.http.listen.address());

    let client = reqwest::Client::builder().build()?;

    let response = timeout(std::time::Duration::from_secs(5), client.get(&url).send())
        .await
        .context("Timeout")?
        .context("Failed to send request")?;

    response.error_for_status()?;

    Ok(())
}
