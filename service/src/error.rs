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

//! Error types for the proxy

use crate::result::ConnectionError;
use crate::types::ClientId;
use mudproxy_records::{RecordError, RecordId};
use thiserror::Error;

/// Result type for proxy operations
pub type Result<T> = std::result::Result<T, ProxyError>;

/// Proxy error types
#[derive(Debug, Error)]
pub enum ProxyError {
    /// I/O error from the underlying TCP stream
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error from the wire codec
    #[error("Protocol error: {0}")]
    Protocol(#[from] mudproxy_telnetcodec::CodecError),

    /// A record rejected an operation
    #[error("Record error: {0}")]
    Record(#[from] RecordError),

    /// A connection rejected an operation
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// Client with the given ID was not found
    #[error("Client {0} not found")]
    ClientNotFound(ClientId),

    /// The mud is not connected
    #[error("Not connected to the mud")]
    MudNotConnected,

    /// A pipeline stage was invoked a second time
    #[error("Stage {stage} ({id}) was already invoked")]
    StageAlreadyInvoked {
        /// Stage name
        stage: &'static str,
        /// Stage record
        id: RecordId,
    },

    /// Configuration is not usable
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Server is already running
    #[error("Server already running")]
    ServerAlreadyRunning,

    /// Server is not running
    #[error("Server not running")]
    ServerNotRunning,
}

impl ProxyError {
    /// Check if the error is recoverable
    ///
    /// Recoverable errors are those that don't indicate a fatal condition
    /// and where retrying the operation might succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ProxyError::Io(_)
                | ProxyError::Connection(ConnectionError::Closed)
                | ProxyError::MudNotConnected
        )
    }

    /// Check if the error is a connection error
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            ProxyError::Io(_)
                | ProxyError::Connection(_)
                | ProxyError::ClientNotFound(_)
                | ProxyError::MudNotConnected
        )
    }

    /// Check if the error indicates a caller passed malformed data
    pub fn is_shape_error(&self) -> bool {
        matches!(self, ProxyError::Record(RecordError::InvalidPayload(_)))
    }
}
