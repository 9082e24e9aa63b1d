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

//! Shared state of a running proxy

use crate::bans::{BanList, MemoryBanList};
use crate::hooks::HookRegistry;
use crate::manager::ClientManager;
use crate::metrics::ProxyMetrics;
use crate::mud::MudConnection;
use crate::pipeline::{Addressing, ProcessToClient, ProcessToMud};
use crate::tasks::TaskSupervisor;
use crate::types::ClientId;
use crate::{ProxyConfig, ProxyError, Result};
use bytes::Bytes;
use mudproxy_records::{
    LineStyle, Origin, RecordContext, RecordRegistry, TrackedRecord, WireBatch, WireLine,
};
use mudproxy_telnetcodec::ResponseTable;
use std::net::IpAddr;
use std::sync::{Arc, OnceLock};
use tracing::warn;

/// Everything the connections and pipeline stages share
///
/// One `Proxy` exists per server. It owns the client registry, the lazily
/// created mud connection, the record registry, the hooks and the ban list,
/// and offers the operations that route lines between them.
#[derive(Debug)]
pub struct Proxy {
    config: ProxyConfig,
    style: LineStyle,
    responses: ResponseTable,
    records: Arc<RecordRegistry>,
    hooks: HookRegistry,
    clients: ClientManager,
    mud: OnceLock<Arc<MudConnection>>,
    bans: Arc<dyn BanList>,
    metrics: Arc<ProxyMetrics>,
    tasks: TaskSupervisor,
}

impl Proxy {
    /// Create a proxy that keeps bans in memory
    pub fn new(config: ProxyConfig) -> Self {
        Self::with_ban_list(config, Arc::new(MemoryBanList::new()))
    }

    /// Create a proxy backed by the given ban list
    pub fn with_ban_list(config: ProxyConfig, bans: Arc<dyn BanList>) -> Self {
        let metrics = Arc::new(ProxyMetrics::new());
        Self {
            style: config.line_style(),
            responses: config.response_table(),
            records: Arc::new(RecordRegistry::new(
                config.registry_capacity,
                config.update_log_capacity,
            )),
            hooks: HookRegistry::new(),
            clients: ClientManager::new(Arc::clone(&metrics)),
            mud: OnceLock::new(),
            bans,
            metrics,
            tasks: TaskSupervisor::new(),
            config,
        }
    }

    /// Proxy configuration
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Style applied to lines sent to clients
    pub fn line_style(&self) -> &LineStyle {
        &self.style
    }

    /// Answers to client option requests
    pub fn responses(&self) -> &ResponseTable {
        &self.responses
    }

    /// Registry of every tracked record
    pub fn records(&self) -> &Arc<RecordRegistry> {
        &self.records
    }

    /// Pipeline hooks
    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    /// Connected clients
    pub fn clients(&self) -> &ClientManager {
        &self.clients
    }

    /// Banned addresses
    pub fn bans(&self) -> &Arc<dyn BanList> {
        &self.bans
    }

    /// Proxy metrics
    pub fn metrics(&self) -> &Arc<ProxyMetrics> {
        &self.metrics
    }

    /// Supervisor of the proxy's tasks
    pub fn tasks(&self) -> &TaskSupervisor {
        &self.tasks
    }

    /// The mud connection, created on first use
    pub fn mud(&self) -> &Arc<MudConnection> {
        self.mud
            .get_or_init(|| Arc::new(MudConnection::new(self.config.mud_address())))
    }

    /// The mud connection if it is up
    pub fn connected_mud(&self) -> Option<&Arc<MudConnection>> {
        self.mud.get().filter(|mud| mud.is_connected())
    }

    /// Connect to the mud unless already connected
    pub async fn connect_mud(self: &Arc<Self>) -> Result<()> {
        let mud = Arc::clone(self.mud());
        mud.connect(self).await
    }

    /// Close the mud connection; returns false if it was not connected
    pub fn disconnect_mud(&self) -> bool {
        self.mud.get().is_some_and(|mud| mud.disconnect())
    }

    /// A record context owned by `owner` with no parent
    pub fn context(&self, owner: &str) -> RecordContext {
        RecordContext::new(Arc::clone(&self.records), owner)
    }

    /// An empty batch owned by `owner`
    pub fn new_batch(&self, owner: &str) -> WireBatch {
        WireBatch::new(&self.context(owner))
    }

    /// Run a batch through [`ProcessToMud`]
    pub async fn send_to_mud(&self, batch: WireBatch, source: Option<ClientId>) -> Result<()> {
        let context = self.context(batch.header().owner_id());
        let mut stage = ProcessToMud::new(&context, batch, source);
        stage.invoke(self).await
    }

    /// Run a batch through [`ProcessToClient`]
    pub async fn send_batch_to_clients(&self, batch: WireBatch, addressing: Addressing) -> Result<()> {
        let context = self.context(batch.header().owner_id());
        let mut stage = ProcessToClient::new(&context, batch, addressing);
        stage.invoke(self).await
    }

    /// Send a proxy message to one client, whether or not it logged in
    pub async fn send_to_client(&self, id: ClientId, text: &str) -> Result<()> {
        if self.clients.get(id).is_none() {
            return Err(ProxyError::ClientNotFound(id));
        }
        let mut batch = self.new_batch("proxy");
        let context = batch.context().clone();
        batch.push(WireLine::io(&context, text, Origin::Internal).with_prelogin(true))?;
        self.send_batch_to_clients(batch, Addressing::only([id])).await
    }

    /// Send a proxy message to every logged in client except `except`
    pub async fn announce(&self, text: &str, except: Option<ClientId>) -> Result<()> {
        let mut batch = self.new_batch("proxy");
        batch.push_text(text, Origin::Internal)?;
        let addressing = match except {
            Some(id) => Addressing::except(id),
            None => Addressing::all(),
        };
        self.send_batch_to_clients(batch, addressing).await
    }

    /// Ban an address and close every client connected from it
    ///
    /// Returns the number of clients closed.
    pub fn ban_address(&self, address: IpAddr, reason: &str) -> usize {
        self.bans.ban(address, reason);
        self.metrics.banned();
        let courtesy = Some(self.courtesy("You have been banned."));
        let closed = self
            .clients
            .clients()
            .iter()
            .filter(|client| client.peer_addr().ip() == address)
            .filter(|client| client.close(courtesy.clone()))
            .count();
        warn!(%address, reason, closed, "Closed clients of banned address");
        closed
    }

    /// A proxy message formatted for writing straight to a socket
    pub fn courtesy(&self, text: &str) -> Bytes {
        let mut line = WireLine::io(&self.context("proxy"), text, Origin::Internal);
        line.lock();
        line.format(&self.style)
    }
}
