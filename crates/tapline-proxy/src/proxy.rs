//! MITM proxy server.
//!
//! Wires the capture [`Pipeline`] into a hudsucker proxy listening on a local
//! address.

use std::net::SocketAddr;

use hudsucker::rustls::crypto::aws_lc_rs::default_provider;
use hudsucker::Proxy;
use tokio::sync::broadcast;

use crate::ca::CaManager;
use crate::error::{ProxyError, Result};
use crate::handler::CaptureHandler;
use crate::pipeline::Pipeline;

/// Proxy server configuration.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Address to bind the proxy to.
    pub addr: SocketAddr,
    /// The CA manager for certificate generation.
    pub ca_manager: CaManager,
}

impl ProxyConfig {
    /// Creates a configuration listening on localhost at `port`, with the CA
    /// in the default data directory.
    pub fn new(port: u16) -> Result<Self> {
        let ca_manager = CaManager::with_default_dir()?;
        Ok(Self {
            addr: SocketAddr::from(([127, 0, 0, 1], port)),
            ca_manager,
        })
    }

    /// Sets the listen address.
    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    /// Sets the port (uses 127.0.0.1 as host).
    pub fn with_port(mut self, port: u16) -> Self {
        self.addr = SocketAddr::from(([127, 0, 0, 1], port));
        self
    }

    /// Sets the CA manager.
    pub fn with_ca_manager(mut self, ca_manager: CaManager) -> Self {
        self.ca_manager = ca_manager;
        self
    }
}

/// MITM proxy server for capturing generative-API traffic.
pub struct ProxyServer {
    config: ProxyConfig,
    pipeline: Pipeline,
}

impl ProxyServer {
    /// Creates a new proxy server. Generates the CA if it is missing.
    pub fn new(config: ProxyConfig, pipeline: Pipeline) -> Result<Self> {
        config.ca_manager.ensure_ca()?;
        Ok(Self { config, pipeline })
    }

    /// Returns the address the proxy is configured to listen on.
    pub fn addr(&self) -> SocketAddr {
        self.config.addr
    }

    /// Returns the CA certificate path for client trust setup.
    pub fn ca_cert_path(&self) -> std::path::PathBuf {
        self.config.ca_manager.cert_path()
    }

    /// Returns the shared pipeline.
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Runs the proxy until it fails.
    pub async fn run(self) -> Result<()> {
        let authority = self.config.ca_manager.ensure_ca()?;
        let handler = CaptureHandler::new(self.pipeline.clone());

        tracing::info!("Starting capture proxy on {}", self.config.addr);
        tracing::info!("CA certificate: {:?}", self.ca_cert_path());

        let proxy = Proxy::builder()
            .with_addr(self.config.addr)
            .with_ca(authority)
            .with_rustls_connector(default_provider())
            .with_http_handler(handler)
            .build()
            .map_err(|e| ProxyError::Proxy(e.to_string()))?;

        proxy
            .start()
            .await
            .map_err(|e| ProxyError::Proxy(e.to_string()))?;

        tracing::info!("Proxy server stopped");
        Ok(())
    }

    /// Starts the proxy in a background task.
    ///
    /// Returns a handle that can be used to stop the server.
    pub fn start(self) -> Result<ProxyHandle> {
        let (shutdown_tx, _) = broadcast::channel::<()>(1);
        let mut shutdown_rx = shutdown_tx.subscribe();
        let addr = self.config.addr;

        // Load the authority before spawning so CA errors surface here.
        let authority = self.config.ca_manager.ensure_ca()?;
        let handler = CaptureHandler::new(self.pipeline.clone());

        tracing::info!("Starting capture proxy on {}", addr);
        tracing::info!("CA certificate: {:?}", self.ca_cert_path());

        let handle = tokio::spawn(async move {
            let proxy = match Proxy::builder()
                .with_addr(addr)
                .with_ca(authority)
                .with_rustls_connector(default_provider())
                .with_http_handler(handler)
                .build()
            {
                Ok(p) => p,
                Err(e) => {
                    tracing::error!("Failed to build proxy: {}", e);
                    return;
                }
            };

            tokio::select! {
                result = proxy.start() => {
                    if let Err(e) = result {
                        tracing::error!("Proxy error: {}", e);
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("Proxy shutdown signal received");
                }
            };
        });

        Ok(ProxyHandle {
            shutdown_tx,
            addr,
            handle,
        })
    }
}

/// Handle for controlling a running proxy server.
pub struct ProxyHandle {
    shutdown_tx: broadcast::Sender<()>,
    addr: SocketAddr,
    handle: tokio::task::JoinHandle<()>,
}

impl ProxyHandle {
    /// Returns the address the proxy is listening on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Returns true once the proxy task has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Signals the proxy to shut down.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Waits for the proxy to finish.
    pub async fn wait(self) {
        let _ = self.handle.await;
    }

    /// Shuts down the proxy and waits for it to finish.
    pub async fn stop(self) {
        self.shutdown();
        self.wait().await;
    }
}
