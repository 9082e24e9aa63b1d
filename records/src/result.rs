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

//! Error types for tracked records

use crate::RecordId;

/// Result type for record operations
pub type RecordResult<T> = Result<T, RecordError>;

/// Errors raised by tracked records
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    /// An attribute was written after the record was locked for sending
    #[error("Attribute '{attribute}' of {id} is locked")]
    Locked {
        /// Record that rejected the write
        id: RecordId,
        /// Name of the attribute
        attribute: &'static str,
    },

    /// A payload did not have the shape its line kind requires
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}
