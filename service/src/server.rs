//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Proxy server
//!
//! The ProxyServer is the entry point of the proxy. It owns the listening
//! socket, accepts clients, refuses banned addresses and coordinates
//! shutdown of every connection.

use crate::capability::CapabilityRegistry;
use crate::client::ClientConnection;
use crate::types::ProxySnapshot;
use crate::{Proxy, ProxyConfig, ProxyError, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

/// MUD proxy server
///
/// # Example
///
/// ```no_run
/// use mudproxy_service::{ProxyConfig, ProxyServer};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = ProxyConfig::default().with_mud("mud.example.com", 4000);
///     let server = ProxyServer::new(config).await?;
///
///     server.start()?;
///
///     // Server is now running, wait for shutdown signal
///     tokio::signal::ctrl_c().await?;
///     server.shutdown().await?;
///
///     Ok(())
/// }
/// ```
pub struct ProxyServer {
    /// Shared proxy state
    proxy: Arc<Proxy>,
    /// Named capabilities over the proxy
    capabilities: CapabilityRegistry,
    /// TCP listener (shared with the accept loop)
    listener: Arc<tokio::sync::Mutex<TcpListener>>,
    /// Actual bind address
    bind_address: SocketAddr,
    /// Server start time
    started_at: Instant,
    /// Running flag
    running: Arc<AtomicBool>,
    /// Shutdown notification
    shutdown_notify: Arc<Notify>,
}

impl ProxyServer {
    /// Create a new server with the given configuration
    ///
    /// This validates the configuration and binds the listening socket but
    /// does not accept clients. Call `start()` to begin accepting.
    pub async fn new(config: ProxyConfig) -> Result<Self> {
        config.validate()?;
        Self::with_proxy(Arc::new(Proxy::new(config))).await
    }

    /// Create a server around an existing proxy
    pub async fn with_proxy(proxy: Arc<Proxy>) -> Result<Self> {
        let listener = TcpListener::bind(proxy.config().listen_address).await?;
        let bind_address = listener.local_addr()?;
        info!(%bind_address, mud = %proxy.config().mud_address(), "Mud proxy bound");

        Ok(Self {
            capabilities: CapabilityRegistry::for_proxy(&proxy),
            proxy,
            listener: Arc::new(tokio::sync::Mutex::new(listener)),
            bind_address,
            started_at: Instant::now(),
            running: Arc::new(AtomicBool::new(false)),
            shutdown_notify: Arc::new(Notify::new()),
        })
    }

    /// Start accepting clients
    ///
    /// Connects to the mud first if the configuration asks for it; a failed
    /// connection is logged and retried when the next client logs in.
    pub fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ProxyError::ServerAlreadyRunning);
        }
        info!(bind_address = %self.bind_address, "Starting mud proxy");

        let listener = Arc::clone(&self.listener);
        let proxy = Arc::clone(&self.proxy);
        let running = Arc::clone(&self.running);
        let shutdown_notify = Arc::clone(&self.shutdown_notify);
        self.proxy.tasks().spawn("accept-loop", async move {
            accept_loop(listener, proxy, running, shutdown_notify).await;
            Ok(())
        });

        if self.proxy.config().connect_mud_at_startup {
            let proxy = Arc::clone(&self.proxy);
            self.proxy.tasks().spawn("mud-connect", async move {
                if let Err(err) = proxy.connect_mud().await {
                    warn!(error = %err, "Could not connect to the mud at startup");
                }
                Ok(())
            });
        }
        Ok(())
    }

    /// Shutdown the server gracefully
    ///
    /// Stops accepting, tells every client the proxy is going away, closes
    /// the mud connection and waits up to the configured shutdown timeout
    /// for every task to finish before aborting the rest.
    pub async fn shutdown(&self) -> Result<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Err(ProxyError::ServerNotRunning);
        }
        info!("Shutting down mud proxy");

        self.shutdown_notify.notify_one();
        let courtesy = Some(self.proxy.courtesy("The proxy is shutting down."));
        let closed = self.proxy.clients().close_all(courtesy);
        self.proxy.disconnect_mud();
        self.proxy
            .tasks()
            .shutdown(self.proxy.config().shutdown_timeout)
            .await;

        info!(closed, "Mud proxy shutdown complete");
        Ok(())
    }

    /// Check if the server is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Get the server's bind address
    pub fn bind_address(&self) -> SocketAddr {
        self.bind_address
    }

    /// Shared proxy state
    pub fn proxy(&self) -> &Arc<Proxy> {
        &self.proxy
    }

    /// Named capabilities over the proxy
    pub fn capabilities(&self) -> &CapabilityRegistry {
        &self.capabilities
    }

    /// Get a snapshot of the server state
    pub fn snapshot(&self) -> ProxySnapshot {
        let clients = self.proxy.clients();
        ProxySnapshot {
            clients: clients.len(),
            logged_in: clients.logged_in_count(),
            mud_connected: self.proxy.connected_mud().is_some(),
            bind_address: self.bind_address,
            uptime: self.started_at.elapsed(),
        }
    }
}

async fn accept_loop(
    listener: Arc<tokio::sync::Mutex<TcpListener>>,
    proxy: Arc<Proxy>,
    running: Arc<AtomicBool>,
    shutdown_notify: Arc<Notify>,
) {
    let listener = listener.lock().await;
    while running.load(Ordering::SeqCst) {
        let accepted = tokio::select! {
            result = listener.accept() => result,
            () = shutdown_notify.notified() => break,
        };

        match accepted {
            Ok((socket, peer_addr)) => admit(socket, peer_addr, &proxy).await,
            Err(err) => {
                error!(error = %err, "Failed to accept connection");
                // Back off on errors to avoid tight loop
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
    info!("Accept loop terminated");
}

async fn admit(mut socket: TcpStream, peer_addr: SocketAddr, proxy: &Arc<Proxy>) {
    if proxy.bans().is_banned(peer_addr.ip()) {
        info!(%peer_addr, "Refusing banned address");
        let refusal = proxy.courtesy("You are banned from this proxy.");
        let _ = socket.write_all(&refusal).await;
        let _ = socket.shutdown().await;
        return;
    }

    let id = proxy.clients().next_client_id();
    let (client, outbound) = ClientConnection::new(id, peer_addr);
    let client = Arc::new(client);
    proxy.clients().insert(Arc::clone(&client));
    debug!(client_id = %id, %peer_addr, "Accepted client");

    let task_proxy = Arc::clone(proxy);
    proxy
        .tasks()
        .spawn(format!("client-{}", id.as_u64()), client.run(socket, outbound, task_proxy));
}

impl std::fmt::Debug for ProxyServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyServer")
            .field("bind_address", &self.bind_address())
            .field("running", &self.is_running())
            .field("clients", &self.proxy.clients().len())
            .field("uptime", &self.started_at.elapsed())
            .finish_non_exhaustive()
    }
}

impl Drop for ProxyServer {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("ProxyServer dropped while running; call shutdown() first");
            self.shutdown_notify.notify_one();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_config() -> ProxyConfig {
        ProxyConfig::new("127.0.0.1:0".parse().unwrap())
    }

    #[tokio::test]
    async fn test_server_lifecycle() {
        let server = ProxyServer::new(local_config()).await.unwrap();
        assert!(!server.is_running());
        assert_ne!(server.bind_address().port(), 0);

        server.start().unwrap();
        assert!(server.is_running());
        assert!(matches!(server.start(), Err(ProxyError::ServerAlreadyRunning)));

        server.shutdown().await.unwrap();
        assert!(!server.is_running());
        assert!(matches!(server.shutdown().await, Err(ProxyError::ServerNotRunning)));
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let config = local_config().with_reader_batch_size(0);
        assert!(matches!(
            ProxyServer::new(config).await,
            Err(ProxyError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_snapshot() {
        let server = ProxyServer::new(local_config()).await.unwrap();
        let snapshot = server.snapshot();
        assert_eq!(snapshot.clients, 0);
        assert!(!snapshot.mud_connected);
        assert_eq!(snapshot.bind_address, server.bind_address());
        assert_eq!(server.capabilities().names().len(), 7);
    }
}
