//! Websocket transport for the JSON-RPC gateway.
//!
//! Each text frame is one request. Requests on a connection are dispatched
//! concurrently and answered in completion order through a single writer
//! task.

use super::dispatcher::Dispatcher;
use crate::config::ServerConfig;
use crate::gateway::GatewayContext;
use anyhow::{Context, Result};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Responses queued per connection before request tasks wait on the writer.
const OUTBOUND_BUFFER: usize = 64;

/// Requests one connection may have running before its frames stop being
/// read.
pub const MAX_IN_FLIGHT_REQUESTS: usize = 32;

#[derive(Clone)]
struct ServerState {
    dispatcher: Dispatcher,
    max_message_bytes: Option<usize>,
}

/// Routes `/` and `/rpc` to the websocket endpoint.
pub fn router(dispatcher: Dispatcher, max_message_bytes: Option<usize>) -> Router {
    Router::new()
        .route("/", get(ws_handler))
        .route("/rpc", get(ws_handler))
        .with_state(ServerState {
            dispatcher,
            max_message_bytes,
        })
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<ServerState>) -> Response {
    let ws = match state.max_message_bytes {
        Some(limit) => ws.max_message_size(limit),
        None => ws,
    };
    ws.on_upgrade(move |socket| handle_socket(socket, state.dispatcher))
}

async fn handle_socket(socket: WebSocket, dispatcher: Dispatcher) {
    let (sink, stream) = socket.split();
    run_connection(dispatcher, sink, stream).await;
}

/// Serves one client connection until it closes.
///
/// Requests still running when the client goes away complete normally (so
/// shared catalog fetches still populate the cache) but their responses are
/// discarded.
pub async fn run_connection<S, R, E>(dispatcher: Dispatcher, sink: S, stream: R)
where
    S: Sink<Message> + Unpin + Send + 'static,
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    run_limited_connection(dispatcher, sink, stream, MAX_IN_FLIGHT_REQUESTS).await;
}

async fn run_limited_connection<S, R, E>(
    dispatcher: Dispatcher,
    mut sink: S,
    mut stream: R,
    max_in_flight: usize,
) where
    S: Sink<Message> + Unpin + Send + 'static,
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let connection_id = Uuid::new_v4();
    let in_flight = Arc::new(Semaphore::new(max_in_flight));
    info!(%connection_id, "Client connected");

    let (outbound, mut queued) = mpsc::channel::<Message>(OUTBOUND_BUFFER);
    let writer = tokio::spawn(async move {
        while let Some(message) = queued.recv().await {
            if sink.send(message).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = stream.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(_) => {
                    warn!(%connection_id, "Dropping non-UTF-8 binary frame");
                    continue;
                }
            },
            Ok(Message::Ping(payload)) => {
                let _ = outbound.send(Message::Pong(payload)).await;
                continue;
            }
            Ok(Message::Pong(_)) => continue,
            Ok(Message::Close(_)) => break,
            Err(err) => {
                warn!(%connection_id, error = %err, "WebSocket error");
                break;
            }
        };

        let permit = match Arc::clone(&in_flight).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                debug!(%connection_id, max_in_flight, "Request limit reached; pausing reads");
                match Arc::clone(&in_flight).acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => break,
                }
            }
        };
        let dispatcher = dispatcher.clone();
        let outbound = outbound.clone();
        tokio::spawn(async move {
            let _permit = permit;
            let Some(response) = dispatcher.handle_message(&text).await else {
                return;
            };
            match serde_json::to_string(&response) {
                Ok(json) => {
                    if outbound.send(Message::Text(json)).await.is_err() {
                        debug!(%connection_id, "Connection closed before response was sent");
                    }
                }
                Err(err) => error!(%connection_id, error = %err, "Failed to serialize response"),
            }
        });
    }

    drop(outbound);
    writer.abort();
    info!(%connection_id, "Client disconnected");
}

/// Binds the configured address and serves until Ctrl-C.
pub async fn serve(context: Arc<GatewayContext>, config: &ServerConfig) -> Result<()> {
    let listener = TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;
    serve_listener(listener, context, config.max_message_bytes, shutdown_signal()).await
}

/// Serves on an already bound listener until `shutdown` resolves, then logs
/// the session out.
pub async fn serve_listener<F>(
    listener: TcpListener,
    context: Arc<GatewayContext>,
    max_message_bytes: Option<usize>,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener
        .local_addr()
        .context("Failed to read listener address")?;
    info!(%addr, "Catalog gateway listening on ws://{}", addr);

    let pump = context.spawn_event_pump();
    let app = router(Dispatcher::new(Arc::clone(&context)), max_message_bytes);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("Gateway server failed")?;

    pump.abort();
    context.logout().await;
    info!("Catalog gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown requested"),
        Err(err) => {
            error!(error = %err, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
#[path = "tests/server_tests.rs"]
mod tests;
