use anyhow::Result;
use tracing::*;
use gangway_core::Services;
use gangway_web::GatewayServer;

use crate::config::load_config;

pub(crate) async fn command(cli: &crate::Cli) -> Result<()> {
    let version = env!("CARGO_PKG_VERSION");
    info!(%version, "Gangway");

    let config = load_config(&cli.config)?;
    let listen = config.http.listen;
    let services = Services::new(config)?;

    if console::user_attended() {
        info!("--------------------------------------------");
        info!("Gangway is now running.");
        info!("Serving the web terminal on http://{listen}/ssh/");
        info!("--------------------------------------------");
    }

    let server = GatewayServer::new(&services);

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, closing sessions");
            services.state.lock().await.close_all().await;
        }
        result = server.run() => {
            result?;
        }
    }

    info!("Exiting");
    Ok(())
}
