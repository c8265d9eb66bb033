//! HTTP server around the diagnostic endpoint.

use super::endpoint::{DiagnosticEndpoint, EndpointOutcome, EndpointResponse};
use super::store::{DiagnosticStore, FileStore};
use crate::config::CollectorConfig;
use crate::error::{Error, Result};
use crate::event::{create_collector_channel, CollectorEvent, CollectorEventsChannel, CollectorEventsSender};
use std::io::Read;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// How often the request worker checks for shutdown.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Builder for the diagnostic collector.
pub struct CollectorBuilder {
    config: CollectorConfig,
    store: Option<Arc<dyn DiagnosticStore>>,
}

impl CollectorBuilder {
    /// Create a new collector builder with the given configuration.
    #[must_use]
    pub fn new(config: CollectorConfig) -> Self {
        Self { config, store: None }
    }

    /// Use a custom store instead of the file store under `data_dir`.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn DiagnosticStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Bind the listening socket.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Network`] if the address cannot be bound.
    pub fn build(self) -> Result<RunningCollector> {
        info!(
            "Building payguard collector on {} (path {}, data dir {})",
            self.config.listen,
            self.config.path,
            self.config.data_dir.display()
        );
        if self.config.token.is_empty() {
            warn!("No access token configured, every diagnostic will be refused");
        }

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(FileStore::new(self.config.store_path())));
        let server = tiny_http::Server::http(self.config.listen)
            .map_err(|e| Error::Network(format!("failed to bind {}: {e}", self.config.listen)))?;
        let local_addr = server
            .server_addr()
            .to_ip()
            .ok_or_else(|| Error::Network("collector is not bound to an IP address".to_string()))?;

        let endpoint = DiagnosticEndpoint::new(self.config.path.clone(), self.config.token.clone(), store.clone());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (events_tx, _) = create_collector_channel();

        Ok(RunningCollector {
            config: self.config,
            server: Arc::new(server),
            endpoint: Arc::new(endpoint),
            store,
            local_addr,
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
            events_tx,
        })
    }
}

/// Cloneable handle that stops a running collector.
#[derive(Clone)]
pub struct CollectorHandle {
    shutdown_tx: Arc<watch::Sender<bool>>,
}

impl CollectorHandle {
    /// Request the collector to shut down.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// A bound diagnostic collector.
pub struct RunningCollector {
    config: CollectorConfig,
    server: Arc<tiny_http::Server>,
    endpoint: Arc<DiagnosticEndpoint>,
    store: Arc<dyn DiagnosticStore>,
    local_addr: SocketAddr,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
    events_tx: CollectorEventsSender,
}

impl RunningCollector {
    /// Address the collector listens on.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The diagnostic store.
    #[must_use]
    pub fn store(&self) -> Arc<dyn DiagnosticStore> {
        Arc::clone(&self.store)
    }

    /// A handle to stop the collector from another task.
    #[must_use]
    pub fn handle(&self) -> CollectorHandle {
        CollectorHandle {
            shutdown_tx: Arc::clone(&self.shutdown_tx),
        }
    }

    /// Subscribe to collector events.
    #[must_use]
    pub fn subscribe_events(&self) -> CollectorEventsChannel {
        self.events_tx.subscribe()
    }

    /// Serve requests until shutdown is requested.
    ///
    /// # Errors
    ///
    /// Returns an error if the request worker panicked.
    pub async fn run(&mut self) -> Result<()> {
        info!(
            "Starting payguard collector on http://{}{}",
            self.local_addr, self.config.path
        );
        let _ = self.events_tx.send(CollectorEvent::Started {
            addr: self.local_addr,
        });

        let server = Arc::clone(&self.server);
        let endpoint = Arc::clone(&self.endpoint);
        let events_tx = self.events_tx.clone();
        let stop = self.shutdown_rx.clone();
        let max_body = self.config.max_body_bytes;
        let worker = tokio::task::spawn_blocking(move || {
            serve(&server, &endpoint, &events_tx, &stop, max_body);
        });

        loop {
            tokio::select! {
                _ = self.shutdown_rx.changed() => {
                    if *self.shutdown_rx.borrow() {
                        info!("Shutdown signal received");
                        break;
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Ctrl-C received, initiating shutdown");
                    self.shutdown();
                    break;
                }
            }
        }

        let _ = self.events_tx.send(CollectorEvent::ShuttingDown);
        self.server.unblock();
        worker
            .await
            .map_err(|e| Error::Network(format!("collector worker failed: {e}")))?;
        info!("Collector shutdown complete");
        Ok(())
    }

    /// Request the collector to shut down.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

fn serve(
    server: &tiny_http::Server,
    endpoint: &DiagnosticEndpoint,
    events_tx: &CollectorEventsSender,
    stop: &watch::Receiver<bool>,
    max_body: usize,
) {
    while !*stop.borrow() {
        match server.recv_timeout(POLL_INTERVAL) {
            Ok(Some(request)) => handle_request(request, endpoint, events_tx, max_body),
            Ok(None) => {}
            Err(e) => {
                debug!("request loop stopped: {e}");
                break;
            }
        }
    }
}

fn handle_request(
    mut request: tiny_http::Request,
    endpoint: &DiagnosticEndpoint,
    events_tx: &CollectorEventsSender,
    max_body: usize,
) {
    let method = request.method().as_str().to_string();
    let path = request
        .url()
        .split('?')
        .next()
        .unwrap_or_default()
        .to_string();
    let limit = u64::try_from(max_body).unwrap_or(u64::MAX).saturating_add(1);
    let mut body = Vec::new();
    let read = request.as_reader().take(limit).read_to_end(&mut body);

    let response = match read {
        Err(e) => {
            debug!("failed to read request body: {e}");
            EndpointResponse::error(400, "invalid_json")
        }
        Ok(_) if body.len() > max_body => EndpointResponse::error(413, "payload_too_large"),
        Ok(_) => endpoint.handle(&method, &path, &body),
    };
    debug!("{method} {path} -> {}", response.status);

    let event = match &response.outcome {
        EndpointOutcome::Stored { reason } => CollectorEvent::DiagnosticStored {
            reason: reason.clone(),
        },
        EndpointOutcome::Ignored => CollectorEvent::DiagnosticIgnored,
        EndpointOutcome::Rejected => CollectorEvent::Rejected {
            status: response.status,
            error: response.error_code().unwrap_or_default().to_string(),
        },
    };
    let _ = events_tx.send(event);

    let mut reply = tiny_http::Response::from_string(response.body.to_string())
        .with_status_code(response.status);
    if let Ok(header) = tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]) {
        reply = reply.with_header(header);
    }
    if let Err(e) = request.respond(reply) {
        warn!("failed to send response: {e}");
    }
}
