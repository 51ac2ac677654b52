mod common;
mod event;
mod logging;
mod pages;
mod session;
mod session_handle;
mod socket;

use std::fmt::Debug;

use anyhow::Result;
use poem::http::header;
use poem::listener::TcpListener;
use poem::middleware::{Cors, SetHeader};
use poem::session::{CookieConfig, MemoryStorage, ServerSession};
use poem::{get, EndpointExt, Route, Server};
use tracing::*;
use gangway_core::Services;

pub use common::{origin_allowed, parse_basic_auth, StoredSessionContext, PROTOCOL_NAME};
pub use event::{
    AuthenticatePayload, AuthenticationAction, ClientEvent, PromptSpec, ServerEvent,
    TerminalPayload,
};
pub use session::{
    ConnectorFactory, Session, SessionControl, SessionEvent, SessionInit, SessionStage,
};

/// The HTTP/WebSocket face of the gateway: landing pages, credential
/// capture, and the per-socket session engine.
pub struct GatewayServer {
    services: Services,
}

impl GatewayServer {
    pub fn new(services: &Services) -> Self {
        GatewayServer {
            services: services.clone(),
        }
    }

    pub async fn run(self) -> Result<()> {
        let address = self.services.config.http.listen.address();

        let cookie_config = CookieConfig::default()
            .name(self.services.config.session.name.clone())
            .secure(false);

        // Same origin patterns gate both CORS preflight and the WebSocket
        // upgrade.
        let origins = self.services.config.http.origins.clone();
        let cors = Cors::new()
            .allow_origins_fn(move |origin| origin_allowed(origin, &origins))
            .allow_credentials(true);

        let app = Route::new()
            .at("/ssh", get(pages::landing).post(pages::landing_post))
            .at("/ssh/", get(pages::landing).post(pages::landing_post))
            .at(
                "/ssh/host/:host",
                get(pages::landing_host).post(pages::landing_host_post),
            )
            .at("/ssh/reauth", get(pages::reauth))
            .at("/ssh/socket", get(socket::socket_endpoint))
            .at("/healthz", get(pages::healthz))
            .with(ServerSession::new(cookie_config, MemoryStorage::default()))
            .with(cors)
            .with(
                SetHeader::new()
                    .overriding(header::STRICT_TRANSPORT_SECURITY, "max-age=31536000"),
            )
            .data(self.services.clone());

        info!(?address, "Listening");
        Server::new(TcpListener::bind(address.to_string()))
            .run(app)
            .await?;
        Ok(())
    }
}

impl Debug for GatewayServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "GatewayServer")
    }
}
