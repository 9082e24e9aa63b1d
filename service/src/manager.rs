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

//! Client registry
//!
//! The ClientManager tracks every accepted client connection, hands out
//! monotonically increasing client ids and keeps the client metrics current
//! as connections come and go.

use crate::client::ClientConnection;
use crate::metrics::ProxyMetrics;
use crate::types::{ClientId, ClientInfo};
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Registry of connected clients
pub struct ClientManager {
    /// Active clients (lock-free concurrent map)
    clients: DashMap<ClientId, Arc<ClientConnection>>,
    /// Next client ID (monotonically increasing)
    next_id: AtomicU64,
    /// Proxy metrics
    metrics: Arc<ProxyMetrics>,
}

impl ClientManager {
    /// Create an empty manager
    pub fn new(metrics: Arc<ProxyMetrics>) -> Self {
        Self {
            clients: DashMap::new(),
            next_id: AtomicU64::new(1),
            metrics,
        }
    }

    /// Reserve the id of the next client
    pub fn next_client_id(&self) -> ClientId {
        ClientId::new(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Track a newly accepted client
    pub fn insert(&self, client: Arc<ClientConnection>) {
        self.clients.insert(client.id(), client);
        self.metrics.client_connected();
    }

    /// Stop tracking a client; returns it if it was tracked
    pub fn remove(&self, id: ClientId) -> Option<Arc<ClientConnection>> {
        let (_, client) = self.clients.remove(&id)?;
        self.metrics.client_disconnected(client.info().duration());
        Some(client)
    }

    /// Get a client by ID
    pub fn get(&self, id: ClientId) -> Option<Arc<ClientConnection>> {
        self.clients.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// Every tracked client in id order
    pub fn clients(&self) -> Vec<Arc<ClientConnection>> {
        let mut clients: Vec<_> = self
            .clients
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        clients.sort_by_key(|client| client.id());
        clients
    }

    /// Info snapshots of every tracked client in id order
    pub fn infos(&self) -> Vec<ClientInfo> {
        self.clients().iter().map(|client| client.info()).collect()
    }

    /// Number of tracked clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Whether no clients are tracked
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Number of clients that gave a password
    pub fn logged_in_count(&self) -> usize {
        self.clients
            .iter()
            .filter(|entry| entry.value().is_logged_in())
            .count()
    }

    /// Whether the client exists and has logged in
    pub fn is_logged_in(&self, id: ClientId) -> bool {
        self.clients
            .get(&id)
            .is_some_and(|entry| entry.value().is_logged_in())
    }

    /// Ask every client to close after its queued output, writing `courtesy`
    /// last. Returns how many accepted the request.
    pub fn close_all(&self, courtesy: Option<Bytes>) -> usize {
        self.clients()
            .iter()
            .filter(|client| client.close(courtesy.clone()))
            .count()
    }
}

impl std::fmt::Debug for ClientManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientManager")
            .field("client_count", &self.len())
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .finish()
    }
}
