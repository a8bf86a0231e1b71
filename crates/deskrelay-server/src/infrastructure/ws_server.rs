//! WebSocket server: accept loop and per-connection task management.
//!
//! This module is responsible for:
//!
//! 1. Binding a TCP listener on the configured address.
//! 2. Upgrading each accepted connection to a WebSocket with the configured
//!    message size limit.
//! 3. Assigning the connection a [`ConnectionId`] and registering it with the
//!    broker and the [`ConnectionHub`].
//! 4. Running two halves per connection:
//!    - **Reader**: text frames go through the broker and the resulting
//!      deliveries are queued on the addressees' hub queues.
//!    - **Writer**: drains this connection's queue onto the socket and sends
//!      a ping every `ping_interval`.
//! 5. Running the broker's disconnect cascade when the connection ends for
//!    any reason, including a panic inside its task.
//! 6. Stopping the accept loop when the `running` flag is cleared.
//!
//! # Liveness
//!
//! A connection that sends nothing at all (frames or pongs) for
//! `ping_timeout` is closed with reason `ping timeout`.  Browsers answer the
//! server's pings automatically, so an idle but healthy peer never times out.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use deskrelay_broker::{deliver_all, Broker};
use deskrelay_core::protocol::messages::DisconnectReason;
use deskrelay_core::{ConnectionId, OutboundEvent};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_tungstenite::{
    accept_async_with_config,
    tungstenite::{protocol::WebSocketConfig, Message as WsMessage},
    WebSocketStream,
};
use tracing::{debug, error, info, warn};

use crate::application::{encode_frame, process_text_frame};
use crate::domain::config::ServerConfig;
use crate::infrastructure::hub::ConnectionHub;

type WsSink = SplitSink<WebSocketStream<TcpStream>, WsMessage>;

/// Close reasons reported to the disconnect cascade.
pub mod close_reason {
    pub const PING_TIMEOUT: &str = "ping timeout";
    pub const TRANSPORT_CLOSE: &str = "transport close";
    pub const TRANSPORT_ERROR: &str = "transport error";
    pub const SERVER_ERROR: &str = "server error";
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Binds `config.listen_addr` and serves until `running` is set to `false`.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot be bound (e.g., the port is
/// already in use or the process lacks permission to bind).
pub async fn run_server(
    config: ServerConfig,
    broker: Arc<Broker>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind WebSocket listener on {}", config.listen_addr))?;

    info!("DeskRelay broker listening on {}", config.listen_addr);
    serve(listener, config, broker, running).await
}

/// Runs the accept loop on an already bound listener.
///
/// Each accepted connection is handed off to a dedicated Tokio task so that
/// one slow peer never blocks others.
pub async fn serve(
    listener: TcpListener,
    config: ServerConfig,
    broker: Arc<Broker>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let config = Arc::new(config);
    let hub = Arc::new(ConnectionHub::new());

    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping accept loop");
            break;
        }

        // Short timeout so the loop notices the shutdown flag even when nobody
        // is connecting.
        let accept_result = timeout(Duration::from_millis(200), listener.accept()).await;

        match accept_result {
            Ok(Ok((stream, peer_addr))) => {
                debug!("new connection from {peer_addr}");
                let (cfg, broker, hub) = (Arc::clone(&config), Arc::clone(&broker), Arc::clone(&hub));
                tokio::spawn(async move {
                    handle_connection(stream, peer_addr, cfg, broker, hub).await;
                });
            }
            Ok(Err(e)) => {
                // Transient accept error (e.g., too many open file descriptors).
                error!("accept error: {e}");
            }
            Err(_) => {}
        }
    }

    Ok(())
}

// ── Per-connection handler ────────────────────────────────────────────────────

/// Lifecycle of one connection: handshake, register, run, cascade.
///
/// The session itself runs in a nested task so that a panic inside it is
/// caught here as a `JoinError`; the cascade runs either way.
async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    config: Arc<ServerConfig>,
    broker: Arc<Broker>,
    hub: Arc<ConnectionHub>,
) {
    let ws_config = WebSocketConfig {
        max_message_size: Some(config.max_message_size),
        max_frame_size: Some(config.max_message_size),
        ..WebSocketConfig::default()
    };
    let ws = match accept_async_with_config(stream, Some(ws_config)).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake with {peer_addr} failed: {e}");
            return;
        }
    };

    let id = ConnectionId::new();
    let outbound = hub.register(id, config.outbound_capacity).await;
    broker.connect(id).await;
    info!("{peer_addr} connected as {id}");

    let session = tokio::spawn(run_session(
        ws,
        id,
        Arc::clone(&config),
        Arc::clone(&broker),
        Arc::clone(&hub),
        outbound,
    ));
    let reason = match session.await {
        Ok(reason) => reason,
        Err(e) => {
            error!("connection {id} task failed: {e}");
            close_reason::SERVER_ERROR.to_string()
        }
    };

    hub.unregister(id).await;
    let notices = broker
        .disconnect(id, DisconnectReason::TransportClosed(reason.clone()))
        .await;
    deliver_all(hub.as_ref(), notices).await;
    info!("{id} ({peer_addr}) disconnected: {reason}");
}

/// Reads frames until the connection ends; returns the close reason.
async fn run_session(
    ws: WebSocketStream<TcpStream>,
    id: ConnectionId,
    config: Arc<ServerConfig>,
    broker: Arc<Broker>,
    hub: Arc<ConnectionHub>,
    outbound: mpsc::Receiver<OutboundEvent>,
) -> String {
    let (sink, mut stream) = ws.split();
    let mut writer = tokio::spawn(write_loop(sink, outbound, config.ping_interval, id));

    let reason = loop {
        let next = tokio::select! {
            next = timeout(config.ping_timeout, stream.next()) => next,
            _ = &mut writer => break close_reason::TRANSPORT_ERROR,
        };

        let frame = match next {
            Err(_) => break close_reason::PING_TIMEOUT,
            Ok(None) => break close_reason::TRANSPORT_CLOSE,
            Ok(Some(Err(e))) => {
                debug!("{id}: WebSocket error: {e}");
                break close_reason::TRANSPORT_ERROR;
            }
            Ok(Some(Ok(frame))) => frame,
        };

        match frame {
            WsMessage::Text(text) => {
                let deliveries = process_text_frame(&broker, id, &text).await;
                deliver_all(hub.as_ref(), deliveries).await;
            }
            WsMessage::Binary(_) => {
                // The catalogue is JSON text only.
                warn!("{id}: unexpected binary frame (ignored)");
            }
            // Pong replies to client pings are queued by tungstenite itself.
            WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => {}
            WsMessage::Close(_) => break close_reason::TRANSPORT_CLOSE,
        }
    };

    writer.abort();
    reason.to_string()
}

/// Owns the socket's write half: queued events out, periodic pings.
async fn write_loop(
    mut sink: WsSink,
    mut outbound: mpsc::Receiver<OutboundEvent>,
    ping_interval: Duration,
    id: ConnectionId,
) {
    let mut ticker = interval(ping_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        let message = tokio::select! {
            event = outbound.recv() => match event {
                Some(event) => match encode_frame(&event) {
                    Some(text) => WsMessage::Text(text),
                    None => continue,
                },
                None => break,
            },
            _ = ticker.tick() => WsMessage::Ping(Vec::new()),
        };

        if let Err(e) = sink.send(message).await {
            debug!("{id}: WebSocket send failed: {e}");
            return;
        }
    }

    if let Err(e) = sink.close().await {
        debug!("{id}: WebSocket close failed: {e}");
    }
}
