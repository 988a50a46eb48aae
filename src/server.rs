//! Reusable OCPP gateway runtime.
//!
//! Provides [`ServerHandle`] that encapsulates the full gateway lifecycle:
//! metrics, the charge point service, the OCPP WebSocket server and graceful
//! shutdown. The CLI binary and the integration tests both start the
//! gateway through it.

use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};

use tracing::{error, info, warn};

use crate::application::{create_event_bus, ActionDispatcher, SharedEventBus};
use crate::config::AppConfig;
use crate::domain::ChargePointService;
use crate::infrastructure::InMemoryChargePointService;
use crate::interfaces::ws::{GatewayError, OcppServer};
use crate::session::{SessionRegistry, SharedSessionRegistry};
use crate::support::shutdown::{listen_for_shutdown_signals, ShutdownSignal};

// ── Options ────────────────────────────────────────────────────────

/// Options for starting the gateway.
#[derive(Default)]
pub struct ServerOptions {
    /// Application configuration.
    pub config: AppConfig,
    /// Charge point service; an in-memory one is used when `None`.
    pub service: Option<Arc<dyn ChargePointService>>,
}

impl From<AppConfig> for ServerOptions {
    fn from(config: AppConfig) -> Self {
        Self {
            config,
            service: None,
        }
    }
}

// ── ServerHandle ───────────────────────────────────────────────────

/// Handle to a running gateway.
///
/// # Examples
///
/// ```rust,no_run
/// use ocpp_gateway::server::{ServerHandle, ServerOptions};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let handle = ServerHandle::start(ServerOptions::default()).await?;
///     handle.install_signal_handler();
///     handle.wait().await;
///     Ok(())
/// }
/// ```
pub struct ServerHandle {
    /// Shared event bus for gateway events.
    pub event_bus: SharedEventBus,
    /// Active WebSocket session registry.
    pub session_registry: SharedSessionRegistry,
    /// Charge point service the dispatcher talks to.
    pub service: Arc<dyn ChargePointService>,
    /// The configuration the gateway was started with.
    pub config: AppConfig,
    /// Address the WebSocket listener is bound to.
    pub ws_addr: SocketAddr,

    shutdown: ShutdownSignal,
    ws_task: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    /// Start the gateway.
    ///
    /// The listener is bound before this returns, so a bind failure is
    /// reported here rather than from the background task.
    pub async fn start(opts: ServerOptions) -> Result<Self, GatewayError> {
        let config = opts.config;

        info!("Starting OCPP gateway...");

        if config.metrics.enabled {
            install_prometheus_exporter(&config);
        }

        let service = opts.service.unwrap_or_else(|| {
            Arc::new(InMemoryChargePointService::new()) as Arc<dyn ChargePointService>
        });

        let event_bus = create_event_bus();
        let session_registry = SessionRegistry::shared();
        let dispatcher = Arc::new(ActionDispatcher::with_default_handlers(
            service.clone(),
            event_bus.clone(),
            config.ocpp.heartbeat_interval,
        ));
        info!(actions = ?dispatcher.actions(), "Action handlers registered");

        let shutdown = ShutdownSignal::new();
        let server = OcppServer::new(
            config.clone(),
            dispatcher,
            session_registry.clone(),
            event_bus.clone(),
        )
        .with_shutdown(shutdown.clone());

        let listener = server.bind().await?;
        let ws_addr = listener.local_addr()?;

        let ws_task = tokio::spawn(async move {
            if let Err(e) = server.serve(listener).await {
                error!("WebSocket server error: {}", e);
            }
        });

        info!("🚀 Gateway started.");

        Ok(Self {
            event_bus,
            session_registry,
            service,
            config,
            ws_addr,
            shutdown,
            ws_task,
        })
    }

    /// Get a cloneable shutdown signal.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Install OS signal listeners (SIGTERM, SIGINT) that trigger shutdown.
    pub fn install_signal_handler(&self) {
        tokio::spawn(listen_for_shutdown_signals(self.shutdown.clone()));
    }

    /// Trigger graceful shutdown (non-blocking).
    pub fn trigger_shutdown(&self) {
        self.shutdown.trigger();
    }

    /// Wait for the gateway to stop after shutdown has been triggered.
    pub async fn wait(self) {
        info!("⏳ Waiting for server tasks to complete...");

        match self.ws_task.await {
            Ok(()) => info!("WebSocket server stopped"),
            Err(e) => error!("WebSocket server task panicked: {}", e),
        }

        if !self.session_registry.is_empty() {
            warn!(
                sessions = self.session_registry.count(),
                "Sessions still registered after shutdown"
            );
        }

        info!("👋 OCPP gateway shutdown complete");
    }

    /// Trigger shutdown and wait for completion.
    pub async fn shutdown(self) {
        info!("🛑 Shutting down OCPP gateway...");
        self.trigger_shutdown();
        self.wait().await;
    }
}

// ── Helpers ────────────────────────────────────────────────────────

/// Install the Prometheus recorder and HTTP listener.
///
/// The global recorder can only be installed once per process; later calls
/// (stop + start in the same process) keep the first exporter.
fn install_prometheus_exporter(config: &AppConfig) {
    static INSTALLED: OnceLock<()> = OnceLock::new();

    let addr = match config.metrics_addr() {
        Ok(addr) => addr,
        Err(e) => {
            warn!(error = %e, "Metrics exporter disabled");
            return;
        }
    };

    INSTALLED.get_or_init(|| {
        match metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
        {
            Ok(()) => info!("📊 Prometheus metrics available on http://{}/metrics", addr),
            Err(e) => warn!(error = %e, "Failed to install Prometheus exporter"),
        }
    });
}

/// Initialize tracing (logging) from the application config.
///
/// Call this once at process startup (before [`ServerHandle::start`]).
pub fn init_tracing(config: &AppConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    match config.logging.format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }
}
