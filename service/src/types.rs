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

//! Core types shared by the proxy connections

use bytes::Bytes;
use mudproxy_records::WireLine;
use std::fmt;
use std::net::SocketAddr;
use std::time::{Duration, SystemTime};

/// Unique identifier for a client connection (monotonically increasing, never reused)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

impl ClientId {
    /// Create a new client ID
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the underlying u64 value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// Connection state (stored as atomic u8 for lock-free state management)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// Connection is being established
    Connecting = 0,
    /// Reader and writer are running
    Active = 1,
    /// Teardown in progress
    Closing = 2,
    /// Connection is closed
    Closed = 3,
}

impl ConnectionState {
    /// Convert from u8 (for atomic operations)
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Active,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }

    /// Convert to u8 (for atomic operations)
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Check if the connection is in a terminal state
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closing | Self::Closed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Active => write!(f, "active"),
            Self::Closing => write!(f, "closing"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Item on a connection's outbound queue
#[derive(Debug)]
pub enum Outbound {
    /// A formatted line to write
    Line(WireLine),
    /// Stop writing after everything queued before this, then write the
    /// optional courtesy bytes and close
    Close(Option<Bytes>),
}

/// Client information snapshot (for non-blocking queries)
#[derive(Debug, Clone)]
pub struct ClientInfo {
    /// Client ID
    pub id: ClientId,
    /// Current state
    pub state: ConnectionState,
    /// Peer address
    pub peer_addr: SocketAddr,
    /// When the client connected
    pub connected_at: SystemTime,
    /// Whether the client gave a password
    pub logged_in: bool,
    /// Whether the client only watches
    pub view_only: bool,
    /// Failed password attempts so far
    pub login_attempts: u32,
}

impl ClientInfo {
    /// How long the client has been connected
    pub fn duration(&self) -> Duration {
        self.connected_at.elapsed().unwrap_or_default()
    }
}

/// Proxy snapshot for non-blocking debug information
#[derive(Debug, Clone)]
pub struct ProxySnapshot {
    /// Number of connected clients
    pub clients: usize,
    /// Number of logged in clients
    pub logged_in: usize,
    /// Whether the mud is connected
    pub mud_connected: bool,
    /// Proxy listen address
    pub bind_address: SocketAddr,
    /// Proxy uptime
    pub uptime: Duration,
}

impl fmt::Display for ProxySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MudProxy {{ clients: {}, logged_in: {}, mud: {}, addr: {}, uptime: {:?} }}",
            self.clients,
            self.logged_in,
            if self.mud_connected { "connected" } else { "disconnected" },
            self.bind_address,
            self.uptime
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_id() {
        let id1 = ClientId::new(1);
        let id2 = ClientId::new(2);

        assert_eq!(id1.as_u64(), 1);
        assert!(id1 < id2);
        assert_eq!(id2.to_string(), "client-2");
    }

    #[test]
    fn test_connection_state_conversion() {
        for state in [
            ConnectionState::Connecting,
            ConnectionState::Active,
            ConnectionState::Closing,
            ConnectionState::Closed,
        ] {
            assert_eq!(ConnectionState::from_u8(state.as_u8()), state);
        }
        assert_eq!(ConnectionState::from_u8(200), ConnectionState::Closed);
    }

    #[test]
    fn test_connection_state_terminal() {
        assert!(!ConnectionState::Connecting.is_terminal());
        assert!(!ConnectionState::Active.is_terminal());
        assert!(ConnectionState::Closing.is_terminal());
        assert!(ConnectionState::Closed.is_terminal());
    }
}
