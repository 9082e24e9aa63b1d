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

//! Named capabilities other subsystems call into the proxy through
//!
//! A capability is an async function registered under a stable dotted name
//! such as `clients:send-to-client`. Callers pass a list of [`Value`]s and get
//! a [`Value`] back, or a [`CapabilityError`] when the name is unknown or the
//! arguments do not fit.

use crate::Proxy;
use crate::mud::MudConnection;
use crate::types::{ClientId, ClientInfo};
use dashmap::DashMap;
use futures::FutureExt;
use futures::future::BoxFuture;
use mudproxy_records::{RecordHeader, RecordId};
use std::fmt;
use std::future::Future;
use std::net::IpAddr;
use std::sync::{Arc, Weak};
use thiserror::Error;
use tracing::debug;

/// Returns the mud connection
pub const GET_MUD_CONNECTION: &str = "proxy:get-mud-connection";
/// `[client]` → whether the client has logged in
pub const IS_LOGGED_IN: &str = "clients:is-logged-in";
/// `[client, text]` → sends a proxy message to one client
pub const SEND_TO_CLIENT: &str = "clients:send-to-client";
/// Returns info on every connected client
pub const GET_ALL_CLIENTS: &str = "clients:get-all-clients";
/// `[address, reason]` → bans the address, returns the number of clients closed
pub const BAN_ADDRESS: &str = "clients:ban-address";
/// `[record]` → the archived header of a record, if still retained
pub const GET_RECORD: &str = "records:get";
/// `[record]` → ids of every descendant of a record
pub const GET_ALL_CHILDREN: &str = "records:get-all-children";

/// Argument or result of a capability
#[derive(Debug, Clone)]
pub enum Value {
    /// Nothing
    Unit,
    /// A flag
    Bool(bool),
    /// A count or numeric id
    Number(u64),
    /// Free text
    Text(String),
    /// A client
    Client(ClientId),
    /// Client snapshots
    Clients(Vec<ClientInfo>),
    /// A network address
    Address(IpAddr),
    /// The mud connection
    Mud(Arc<MudConnection>),
    /// A record header, if it is still retained
    Record(Option<Box<RecordHeader>>),
    /// Record ids
    Records(Vec<RecordId>),
}

impl Value {
    /// The flag, if this is a [`Value::Bool`]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// The number, if this is a [`Value::Number`]
    pub fn as_number(&self) -> Option<u64> {
        match self {
            Value::Number(value) => Some(*value),
            _ => None,
        }
    }

    /// The text, if this is a [`Value::Text`]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(value) => Some(value),
            _ => None,
        }
    }
}

/// Errors raised by capability calls
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CapabilityError {
    /// No capability is registered under the name
    #[error("No capability named {0}")]
    NotFound(String),

    /// The arguments do not fit the capability
    #[error("Invalid arguments for {name}: {reason}")]
    InvalidArguments {
        /// Capability name
        name: String,
        /// What was wrong
        reason: String,
    },

    /// The proxy behind the capability has shut down
    #[error("The proxy is no longer running")]
    Unavailable,

    /// The capability ran and failed
    #[error("{0}")]
    Failed(String),
}

type Handler =
    Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, Result<Value, CapabilityError>> + Send + Sync>;

/// String-keyed registry of capabilities
#[derive(Default)]
pub struct CapabilityRegistry {
    handlers: DashMap<String, Handler>,
}

impl CapabilityRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a capability, replacing any earlier one of the same name
    pub fn register<F, Fut>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, CapabilityError>> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |args| handler(args).boxed());
        self.handlers.insert(name.into(), handler);
    }

    /// Call a capability by name
    pub async fn call(&self, name: &str, args: Vec<Value>) -> Result<Value, CapabilityError> {
        let handler = self
            .handlers
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| CapabilityError::NotFound(name.to_string()))?;
        debug!(capability = name, args = args.len(), "Calling capability");
        handler(args).await
    }

    /// Whether a capability is registered under the name
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Every registered name, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    /// A registry holding the proxy's own capabilities
    ///
    /// The capabilities hold the proxy weakly and fail with
    /// [`CapabilityError::Unavailable`] once it is gone.
    pub fn for_proxy(proxy: &Arc<Proxy>) -> Self {
        let registry = Self::new();

        let weak = Arc::downgrade(proxy);
        registry.register(GET_MUD_CONNECTION, move |_args| {
            let proxy = upgrade(&weak);
            async move { Ok(Value::Mud(Arc::clone(proxy?.mud()))) }
        });

        let weak = Arc::downgrade(proxy);
        registry.register(IS_LOGGED_IN, move |args| {
            let proxy = upgrade(&weak);
            async move {
                let id = client_arg(IS_LOGGED_IN, &args, 0)?;
                Ok(Value::Bool(proxy?.clients().is_logged_in(id)))
            }
        });

        let weak = Arc::downgrade(proxy);
        registry.register(SEND_TO_CLIENT, move |args| {
            let proxy = upgrade(&weak);
            async move {
                let id = client_arg(SEND_TO_CLIENT, &args, 0)?;
                let text = text_arg(SEND_TO_CLIENT, &args, 1)?;
                proxy?
                    .send_to_client(id, text)
                    .await
                    .map_err(|err| CapabilityError::Failed(err.to_string()))?;
                Ok(Value::Unit)
            }
        });

        let weak = Arc::downgrade(proxy);
        registry.register(GET_ALL_CLIENTS, move |_args| {
            let proxy = upgrade(&weak);
            async move { Ok(Value::Clients(proxy?.clients().infos())) }
        });

        let weak = Arc::downgrade(proxy);
        registry.register(BAN_ADDRESS, move |args| {
            let proxy = upgrade(&weak);
            async move {
                let address = address_arg(BAN_ADDRESS, &args, 0)?;
                let reason = match args.get(1) {
                    Some(Value::Text(reason)) => reason.as_str(),
                    _ => "banned by request",
                };
                let closed = proxy?.ban_address(address, reason);
                Ok(Value::Number(closed as u64))
            }
        });

        let weak = Arc::downgrade(proxy);
        registry.register(GET_RECORD, move |args| {
            let proxy = upgrade(&weak);
            async move {
                let id = record_arg(GET_RECORD, &args, 0)?;
                Ok(Value::Record(proxy?.records().get(id).map(Box::new)))
            }
        });

        let weak = Arc::downgrade(proxy);
        registry.register(GET_ALL_CHILDREN, move |args| {
            let proxy = upgrade(&weak);
            async move {
                let id = record_arg(GET_ALL_CHILDREN, &args, 0)?;
                Ok(Value::Records(proxy?.records().all_children(id)))
            }
        });

        registry
    }
}

impl fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("capabilities", &self.names())
            .finish()
    }
}

fn upgrade(proxy: &Weak<Proxy>) -> Result<Arc<Proxy>, CapabilityError> {
    proxy.upgrade().ok_or(CapabilityError::Unavailable)
}

fn invalid(name: &str, reason: &str) -> CapabilityError {
    CapabilityError::InvalidArguments {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

fn client_arg(name: &str, args: &[Value], index: usize) -> Result<ClientId, CapabilityError> {
    match args.get(index) {
        Some(Value::Client(id)) => Ok(*id),
        Some(Value::Number(id)) => Ok(ClientId::new(*id)),
        _ => Err(invalid(name, &format!("argument {index} must be a client id"))),
    }
}

fn text_arg<'a>(name: &str, args: &'a [Value], index: usize) -> Result<&'a str, CapabilityError> {
    match args.get(index) {
        Some(Value::Text(text)) => Ok(text),
        _ => Err(invalid(name, &format!("argument {index} must be text"))),
    }
}

fn address_arg(name: &str, args: &[Value], index: usize) -> Result<IpAddr, CapabilityError> {
    match args.get(index) {
        Some(Value::Address(address)) => Ok(*address),
        Some(Value::Text(text)) => text
            .parse()
            .map_err(|_| invalid(name, &format!("{text:?} is not an address"))),
        _ => Err(invalid(name, &format!("argument {index} must be an address"))),
    }
}

fn record_arg(name: &str, args: &[Value], index: usize) -> Result<RecordId, CapabilityError> {
    match args.get(index) {
        Some(Value::Number(id)) => Ok(RecordId::from_u64(*id)),
        _ => Err(invalid(name, &format!("argument {index} must be a record id"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProxyConfig;
    use mudproxy_records::{Origin, TrackedRecord};

    fn proxy() -> Arc<Proxy> {
        Arc::new(Proxy::new(ProxyConfig::default()))
    }

    #[tokio::test]
    async fn test_unknown_capability() {
        let registry = CapabilityRegistry::new();
        let err = registry.call("events:raise", Vec::new()).await.unwrap_err();
        assert_eq!(err, CapabilityError::NotFound("events:raise".to_string()));
    }

    #[tokio::test]
    async fn test_proxy_capabilities_are_registered() {
        let registry = CapabilityRegistry::for_proxy(&proxy());
        for name in [
            GET_MUD_CONNECTION,
            IS_LOGGED_IN,
            SEND_TO_CLIENT,
            GET_ALL_CLIENTS,
            BAN_ADDRESS,
            GET_RECORD,
            GET_ALL_CHILDREN,
        ] {
            assert!(registry.contains(name), "{name} missing");
        }
        assert_eq!(registry.names().len(), 7);
    }

    #[tokio::test]
    async fn test_argument_shapes_are_checked() {
        let registry = CapabilityRegistry::for_proxy(&proxy());
        let err = registry
            .call(IS_LOGGED_IN, vec![Value::Text("nobody".to_string())])
            .await
            .unwrap_err();
        assert!(matches!(err, CapabilityError::InvalidArguments { .. }));

        let answer = registry
            .call(IS_LOGGED_IN, vec![Value::Number(42)])
            .await
            .unwrap();
        assert_eq!(answer.as_bool(), Some(false));
    }

    #[tokio::test]
    async fn test_ban_address_by_text() {
        let proxy = proxy();
        let registry = CapabilityRegistry::for_proxy(&proxy);
        let closed = registry
            .call(BAN_ADDRESS, vec![Value::Text("10.1.2.3".to_string())])
            .await
            .unwrap();
        assert_eq!(closed.as_number(), Some(0));
        assert!(proxy.bans().is_banned("10.1.2.3".parse().unwrap()));
    }

    #[tokio::test]
    async fn test_record_capabilities() {
        let proxy = proxy();
        let registry = CapabilityRegistry::for_proxy(&proxy);
        let mut batch = proxy.new_batch("test");
        batch.push_text("one", Origin::Mud).unwrap();
        batch.push_text("two", Origin::Mud).unwrap();
        let id = batch.id().as_u64();

        let children = registry
            .call(GET_ALL_CHILDREN, vec![Value::Number(id)])
            .await
            .unwrap();
        assert!(matches!(children, Value::Records(ids) if ids.len() == 2));

        let record = registry.call(GET_RECORD, vec![Value::Number(id)]).await.unwrap();
        assert!(matches!(record, Value::Record(Some(header)) if header.owner_id() == "test"));
    }

    #[tokio::test]
    async fn test_capabilities_outlived_by_registry() {
        let proxy = proxy();
        let registry = CapabilityRegistry::for_proxy(&proxy);
        drop(proxy);
        let err = registry.call(GET_ALL_CLIENTS, Vec::new()).await.unwrap_err();
        assert_eq!(err, CapabilityError::Unavailable);
    }
}
