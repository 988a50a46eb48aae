//! OCPP 1.6 WebSocket server
//!
//! Accepts charge-point connections at `ws://<host>:<port>/ws?id={charge_point_id}`.
//! Each connection runs in its own task: frames from the charge point are
//! dispatched one at a time and answered in order, while frames queued
//! through the session registry are written in between.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::{Sink, SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, error, info, warn};

use crate::application::events::{
    ChargePointConnectedEvent, ChargePointDisconnectedEvent, Event, SharedEventBus,
};
use crate::application::SharedActionDispatcher;
use crate::config::AppConfig;
use crate::ocpp::{ErrorCode, OcppFrame};
use crate::session::{Connection, SharedSessionRegistry};
use crate::support::shutdown::ShutdownSignal;

use super::handshake;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("WebSocket handshake failed: {0}")]
    Handshake(#[from] tungstenite::Error),
    #[error("WebSocket handshake timed out")]
    HandshakeTimeout,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// OCPP WebSocket Server
#[derive(Clone)]
pub struct OcppServer {
    config: Arc<AppConfig>,
    dispatcher: SharedActionDispatcher,
    session_registry: SharedSessionRegistry,
    event_bus: SharedEventBus,
    shutdown_signal: ShutdownSignal,
}

impl OcppServer {
    pub fn new(
        config: AppConfig,
        dispatcher: SharedActionDispatcher,
        session_registry: SharedSessionRegistry,
        event_bus: SharedEventBus,
    ) -> Self {
        Self {
            config: Arc::new(config),
            dispatcher,
            session_registry,
            event_bus,
            shutdown_signal: ShutdownSignal::new(),
        }
    }

    /// Set the shutdown signal for graceful shutdown
    pub fn with_shutdown(mut self, signal: ShutdownSignal) -> Self {
        self.shutdown_signal = signal;
        self
    }

    pub fn session_registry(&self) -> &SharedSessionRegistry {
        &self.session_registry
    }

    /// Bind the configured WebSocket address.
    pub async fn bind(&self) -> Result<TcpListener, GatewayError> {
        let addr = self.config.ws_addr();
        TcpListener::bind(&addr)
            .await
            .map_err(|source| GatewayError::Bind { addr, source })
    }

    /// Bind and serve until shutdown.
    pub async fn run(self) -> Result<(), GatewayError> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until shutdown.
    ///
    /// On shutdown the listener is closed, every session is closed and
    /// connection tasks get `shutdown_timeout` to finish before they are
    /// aborted.
    pub async fn serve(self, listener: TcpListener) -> Result<(), GatewayError> {
        let local_addr = listener.local_addr()?;
        info!("🔌 OCPP 1.6 gateway started on ws://{}", local_addr);
        info!(
            "   Charge points should connect to: ws://{}{}?{}={{charge_point_id}}",
            local_addr, self.config.server.ws_path, self.config.server.identity_param
        );

        let mut tasks = JoinSet::new();

        loop {
            let shutdown = self.shutdown_signal.notified();
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let server = self.clone();
                            tasks.spawn(async move {
                                if let Err(e) = server.handle_connection(stream, addr).await {
                                    match e {
                                        GatewayError::Handshake(tungstenite::Error::Http(_)) => {
                                            debug!(remote_addr = %addr, "Upgrade rejected")
                                        }
                                        e => warn!(remote_addr = %addr, error = %e, "Connection error"),
                                    }
                                }
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
                Some(joined) = tasks.join_next() => {
                    log_task_result(joined);
                }
                _ = shutdown.wait() => {
                    info!("🛑 WebSocket server received shutdown signal");
                    break;
                }
            }
        }

        drop(listener);
        self.graceful_shutdown(tasks).await;
        Ok(())
    }

    async fn graceful_shutdown(&self, mut tasks: JoinSet<()>) {
        let closed = self.session_registry.close_all();
        info!(
            sessions = closed,
            tasks = tasks.len(),
            "📢 Closing charge point connections"
        );

        let timeout = self.config.shutdown_timeout();
        let drained = tokio::time::timeout(timeout, async {
            while let Some(joined) = tasks.join_next().await {
                log_task_result(joined);
            }
        })
        .await;

        if drained.is_err() {
            warn!(
                remaining = tasks.len(),
                "Connection tasks did not finish within {:?}, aborting", timeout
            );
            tasks.shutdown().await;
        }

        info!("✅ WebSocket server shutdown complete");
    }

    /// Handle a single WebSocket connection
    async fn handle_connection(self, stream: TcpStream, addr: SocketAddr) -> Result<(), GatewayError> {
        debug!(remote_addr = %addr, "New TCP connection");

        // Subscribed before the handshake so a trigger during it is not missed.
        let shutdown = self.shutdown_signal.notified().wait();
        tokio::pin!(shutdown);

        let ws_path = self.config.server.ws_path.as_str();
        let identity_param = self.config.server.identity_param.as_str();
        let mut identity: Option<String> = None;

        let callback = |req: &Request, response: Response| -> Result<Response, ErrorResponse> {
            let (response, id) = handshake::accept(req, response, ws_path, identity_param)?;
            identity = Some(id);
            Ok(response)
        };

        let ws_stream = tokio::time::timeout(
            self.config.ocpp.handshake_timeout(),
            tokio_tungstenite::accept_hdr_async(stream, callback),
        )
        .await
        .map_err(|_| GatewayError::HandshakeTimeout)??;

        let Some(charge_point_id) = identity else {
            return Ok(());
        };

        let connection_id = self.session_registry.next_connection_id();
        let (connection, mut receiver) =
            Connection::new(charge_point_id.clone(), connection_id, Some(addr));
        self.session_registry.add(connection);
        let _guard = SessionGuard {
            registry: self.session_registry.clone(),
            charge_point_id: charge_point_id.clone(),
            connection_id,
        };

        let (mut sink, mut stream) = ws_stream.split();

        if self.shutdown_signal.is_triggered() {
            info!(
                charge_point_id = charge_point_id.as_str(),
                connection_id, "Server is shutting down, closing new connection"
            );
            let _ = sink.close().await;
            return Ok(());
        }

        metrics::counter!("ocpp_connections_total").increment(1);
        info!(
            charge_point_id = charge_point_id.as_str(),
            connection_id,
            remote_addr = %addr,
            "Charge point connected"
        );
        self.event_bus
            .publish(Event::ChargePointConnected(ChargePointConnectedEvent {
                charge_point_id: charge_point_id.clone(),
                connection_id,
                remote_addr: Some(addr.to_string()),
                timestamp: Utc::now(),
            }));

        let idle_timeout = self.config.ocpp.idle_timeout();
        let write_timeout = self.config.ocpp.write_timeout();
        let closed = receiver.close.closed();
        tokio::pin!(closed);
        // Only inbound frames move the deadline.
        let idle = tokio::time::sleep(idle_timeout);
        tokio::pin!(idle);

        let reason = loop {
            tokio::select! {
                _ = &mut closed => break "session closed by server",
                _ = &mut shutdown => break "server shutdown",
                Some(outbound) = receiver.outbound.recv() => {
                    debug!(charge_point_id = charge_point_id.as_str(), "-> {}", outbound);
                    if let Err(e) = send_text(&mut sink, outbound, write_timeout).await {
                        warn!(charge_point_id = charge_point_id.as_str(), error = %e, "Send error");
                        break "write failed";
                    }
                }
                _ = &mut idle => break "idle timeout",
                read = stream.next() => {
                    idle.as_mut().reset(Instant::now() + idle_timeout);
                    let text = match read {
                        None => break "connection closed",
                        Some(Err(e)) => {
                            warn!(charge_point_id = charge_point_id.as_str(), error = %e, "WebSocket error");
                            break "read error";
                        }
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                            Ok(text) => text,
                            Err(_) => {
                                let reply = OcppFrame::error(
                                    "",
                                    ErrorCode::FormationViolation,
                                    "Binary frame is not valid UTF-8",
                                );
                                if send_text(&mut sink, reply.serialize(), write_timeout).await.is_err() {
                                    break "write failed";
                                }
                                continue;
                            }
                        },
                        Some(Ok(Message::Close(frame))) => {
                            debug!(charge_point_id = charge_point_id.as_str(), ?frame, "Close frame received");
                            break "close frame received";
                        }
                        Some(Ok(_)) => continue,
                    };

                    debug!(charge_point_id = charge_point_id.as_str(), "<- {}", text);
                    self.session_registry.touch(&charge_point_id, connection_id);

                    let response = self.dispatcher.handle_text(&charge_point_id, &text).await;
                    debug!(charge_point_id = charge_point_id.as_str(), "-> {}", response);
                    if let Err(e) = send_text(&mut sink, response, write_timeout).await {
                        warn!(charge_point_id = charge_point_id.as_str(), error = %e, "Failed to send response");
                        break "write failed";
                    }
                }
            }
        };

        let _ = tokio::time::timeout(write_timeout, sink.close()).await;

        info!(
            charge_point_id = charge_point_id.as_str(),
            connection_id, reason, "Charge point disconnected"
        );
        self.event_bus
            .publish(Event::ChargePointDisconnected(ChargePointDisconnectedEvent {
                charge_point_id,
                connection_id,
                reason: reason.to_string(),
                timestamp: Utc::now(),
            }));

        Ok(())
    }
}

/// Removes the session when the connection task ends, panics included.
struct SessionGuard {
    registry: SharedSessionRegistry,
    charge_point_id: String,
    connection_id: u64,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.registry.remove(&self.charge_point_id, self.connection_id);
    }
}

async fn send_text<S>(sink: &mut S, text: String, write_timeout: Duration) -> Result<(), GatewayError>
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    match tokio::time::timeout(write_timeout, sink.send(Message::Text(text))).await {
        Ok(result) => result.map_err(GatewayError::from),
        Err(_) => Err(GatewayError::Io(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "write timed out",
        ))),
    }
}

fn log_task_result(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        if e.is_panic() {
            error!(error = %e, "Connection task panicked");
        }
    }
}
