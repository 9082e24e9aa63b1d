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

//! # MUD Proxy Service
//!
//! The connection and pipeline layer of a proxy that keeps one connection to
//! a MUD open while any number of Telnet clients come and go:
//!
//! - **Connections**: one [`MudConnection`] for the upstream link and one
//!   [`ClientConnection`] per accepted socket, each with a reader task, a
//!   writer task and an outbound queue of formatted lines.
//! - **Pipeline**: mud output passes through [`ProcessToClient`] and
//!   [`SendToClient`]; client input through [`ProcessToMud`] and
//!   [`SendToMud`]. Each stage is a tracked record, and [`LineHook`]s may
//!   change, veto or observe every line.
//! - **Login**: clients give a password (or a view-only password) before
//!   their input is forwarded; repeated failures ban the address.
//! - **Supervision**: every task runs under a [`TaskSupervisor`] that logs
//!   faults and drains tasks on shutdown.
//!
//! # Architecture
//!
//! ```text
//! ProxyServer
//!     ↓
//! Proxy ── ClientManager ── ClientConnection ─┐
//!   │                                         ↓
//!   ├── MudConnection ── ProcessToClient → SendToClient
//!   │                                         ↑
//!   └── ClientConnection ── ProcessToMud → SendToMud → MudConnection
//! ```
//!
//! # Example
//!
//! ```no_run
//! use mudproxy_service::{HookError, HookEvent, LineHook, ProxyConfig, ProxyServer, DEFAULT_PRIORITY};
//! use mudproxy_records::WireLine;
//! use async_trait::async_trait;
//! use std::sync::Arc;
//!
//! struct Mute;
//!
//! #[async_trait]
//! impl LineHook for Mute {
//!     async fn modify(&self, _event: HookEvent, line: &mut WireLine) -> Result<(), HookError> {
//!         if line.text().contains("shouts") {
//!             line.set_send(false)?;
//!         }
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ProxyConfig::default().with_mud("mud.example.com", 4000);
//!     let server = ProxyServer::new(config).await?;
//!     server.proxy().hooks().register("mute", DEFAULT_PRIORITY, Arc::new(Mute));
//!     server.start()?;
//!     tokio::signal::ctrl_c().await?;
//!     server.shutdown().await?;
//!     Ok(())
//! }
//! ```

#![warn(
    clippy::cargo,
    missing_docs,
    clippy::pedantic,
    future_incompatible,
    rust_2018_idioms
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]

mod bans;
pub mod capability;
mod client;
mod config;
mod error;
mod hooks;
mod manager;
mod metrics;
mod mud;
pub mod pipeline;
mod proxy;
mod result;
mod server;
mod tasks;
mod types;
mod worker;

pub use bans::{BanEntry, BanList, MemoryBanList};
pub use capability::{CapabilityError, CapabilityRegistry, Value};
pub use client::{ClientConnection, InputOutcome};
pub use config::ProxyConfig;
pub use error::{ProxyError, Result};
pub use hooks::{DEFAULT_PRIORITY, HookError, HookEvent, HookRegistry, LineHook};
pub use manager::ClientManager;
pub use metrics::{MetricsSnapshot, ProxyMetrics};
pub use mud::MudConnection;
pub use pipeline::{Addressing, ProcessToClient, ProcessToMud, SendToClient, SendToMud, StageState};
pub use proxy::Proxy;
pub use result::{ConnectionError, ConnectionResult};
pub use server::ProxyServer;
pub use tasks::TaskSupervisor;
pub use types::{ClientId, ClientInfo, ConnectionState, Outbound, ProxySnapshot};
