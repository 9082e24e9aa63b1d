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

//! Error types and result aliases for connection operations

use mudproxy_records::RecordId;

/// Result type for connection operations
///
/// ```
/// use mudproxy_service::ConnectionResult;
///
/// fn example() -> ConnectionResult<()> {
///     Ok(())
/// }
/// ```
pub type ConnectionResult<T> = Result<T, ConnectionError>;

/// Errors raised when handing data to a connection
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// An I/O error occurred
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection is closed, or its writer has stopped
    #[error("Connection closed")]
    Closed,

    /// A line was queued before the send stage formatted it
    #[error("Line {0} was not formatted")]
    Unformatted(RecordId),
}
