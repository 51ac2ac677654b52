//! The WebSocket endpoint: upgrades the connection, spawns the session
//! engine, and pumps frames between the socket and the session queue.

use std::time::{Duration, Instant};

use futures::{SinkExt, StreamExt};
use poem::http::StatusCode;
use poem::session::Session as CookieSession;
use poem::web::websocket::{Message, WebSocket, WebSocketStream};
use poem::web::Data;
use poem::{handler, IntoResponse, Request, Response};
use tokio::sync::mpsc::unbounded_channel;
use tracing::*;
use gangway_common::SessionId;
use gangway_core::{AuthPipeline, Services, SessionStateInit};
use gangway_protocol_ssh::RemoteShell;

use crate::common::{origin_allowed, StoredSessionContext, SESSION_CONTEXT_KEY};
use crate::event::{encode_server_event, parse_client_event};
use crate::logging;
use crate::session::{ConnectorFactory, Session, SessionControl, SessionEvent, SessionInit};
use crate::session_handle::GatewaySessionHandle;

/// Client liveness: ping cadence and the silence threshold that counts as
/// a dead socket.
const PING_INTERVAL: Duration = Duration::from_secs(25);
const PONG_TIMEOUT: Duration = Duration::from_secs(60);

#[handler]
pub async fn socket_endpoint(
    ws: WebSocket,
    req: &Request,
    cookie_session: &CookieSession,
    Data(services): Data<&Services>,
) -> Response {
    if let Some(origin) = req.header("origin") {
        if !origin_allowed(origin, &services.config.http.origins) {
            warn!(%origin, "Rejected socket from disallowed origin");
            return StatusCode::FORBIDDEN.into_response();
        }
    }

    let context: StoredSessionContext = cookie_session.get(SESSION_CONTEXT_KEY).unwrap_or_default();
    let services = services.clone();
    let remote_address = req.remote_addr().as_socket_addr().cloned();

    ws.on_upgrade(move |socket| async move {
        let id = uuid::Uuid::new_v4();
        run_socket(id, socket, services, context, remote_address).await;
    })
    .into_response()
}

async fn run_socket(
    id: SessionId,
    socket: WebSocketStream,
    services: Services,
    context: StoredSessionContext,
    remote_address: Option<std::net::SocketAddr>,
) {
    let counters = services.metrics.session_started();

    let mut pipeline = AuthPipeline::new();
    for source in context.sources {
        pipeline.add_source(source);
    }

    let (outbound_tx, mut outbound_rx) = unbounded_channel();
    let (events_tx, events_rx) = unbounded_channel();
    let connector: ConnectorFactory = Box::new(RemoteShell::create);

    let entry = services.state.lock().await.register_session(
        id,
        SessionStateInit {
            remote_address,
            handle: Box::new(GatewaySessionHandle::new(events_tx.clone())),
        },
    );

    let header = context
        .header
        .or_else(|| services.config.header.text.clone());
    let header_background = context
        .header_background
        .or_else(|| Some(services.config.header.background.clone()));

    let session_task = Session::start(
        SessionInit {
            id,
            config: services.config.clone(),
            counters: counters.clone(),
            pipeline,
            term_override: context.term,
            env: context.env,
            header,
            header_background,
            outbound: outbound_tx,
            connector,
            entry: Some(entry),
        },
        events_tx.clone(),
        events_rx,
    );
    logging::socket_event(id, "connected", "Socket connected");

    let (mut sink, mut stream) = socket.split();
    let mut ping_interval = tokio::time::interval(PING_INTERVAL);
    let mut last_pong = Instant::now();
    let mut last_activity = Instant::now();
    let idle_timeout = services.config.session.timeout;

    loop {
        tokio::select! {
            message = stream.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => match parse_client_event(&text) {
                        Ok(event) => {
                            last_activity = Instant::now();
                            if events_tx.send(SessionEvent::Client(event)).is_err() {
                                break;
                            }
                        }
                        Err(error) => logging::bad_request(id, &error.to_string()),
                    },
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = sink.send(Message::Pong(payload)).await;
                    }
                    Some(Ok(Message::Pong(_))) => {
                        last_pong = Instant::now();
                    }
                    Some(Ok(Message::Binary(_))) => {
                        logging::bad_request(id, "unexpected binary frame");
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                        break;
                    }
                }
            }
            outbound = outbound_rx.recv() => {
                match outbound {
                    Some(event) => match encode_server_event(&event) {
                        Ok(text) => {
                            if sink.send(Message::Text(text)).await.is_err() {
                                break;
                            }
                        }
                        Err(error) => {
                            error!(session=%id, ?error, "Failed to encode outbound event");
                        }
                    },
                    // The session engine finished; close the socket politely.
                    None => {
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
            _ = ping_interval.tick() => {
                if last_pong.elapsed() > PONG_TIMEOUT {
                    logging::socket_event(id, "timeout", "Client stopped answering pings");
                    break;
                }
                if last_activity.elapsed() > idle_timeout {
                    logging::socket_event(id, "timeout", "Session idle timeout");
                    break;
                }
                if sink.send(Message::Ping(vec![])).await.is_err() {
                    break;
                }
            }
        }
    }

    let _ = events_tx.send(SessionEvent::Control(SessionControl::SocketClosed));
    let _ = session_task.await;

    services.state.lock().await.remove_session(id);
    services.metrics.session_closed(&counters);
    logging::socket_event(id, "disconnected", "Socket closed");
}
