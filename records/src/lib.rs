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

//! # MUD Proxy Records
//!
//! Every piece of data moving through the proxy is wrapped in a tracked
//! record. A record carries an id, an owner, its creation time, the call and
//! event stacks at creation, a parent, and a capped log of every change made
//! to it. Records are entered into a bounded [`RecordRegistry`] so that the
//! history of a line can be inspected after it was sent.
//!
//! Provenance is explicit: a [`RecordContext`] is passed down the call chain
//! and names the parent of any record created from it.
//!
//! ```rust
//! use mudproxy_records::{Origin, RecordContext, RecordRegistry, TrackedRecord, WireBatch};
//! use std::sync::Arc;
//!
//! let registry = Arc::new(RecordRegistry::default());
//! let context = RecordContext::new(registry.clone(), "client-1");
//! let mut batch = WireBatch::new(&context);
//! batch.push_text("look", Origin::Client).unwrap();
//! assert_eq!(registry.all_children(batch.id()).len(), 1);
//! ```

#![warn(
    clippy::cargo,
    missing_docs,
    clippy::pedantic,
    future_incompatible,
    rust_2018_idioms
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]

mod batch;
mod id;
mod line;
mod registry;
mod result;
mod tracked;
mod update;

pub use self::batch::WireBatch;
pub use self::id::{RecordId, RecordKind};
pub use self::line::{LineKind, LineStyle, Origin, Payload, WireLine};
pub use self::registry::{DEFAULT_REGISTRY_CAPACITY, RecordRegistry};
pub use self::result::{RecordError, RecordResult};
pub use self::tracked::{RecordContext, RecordHeader, TrackedRecord};
pub use self::update::{
    DEFAULT_UPDATE_CAPACITY, UpdateEntry, UpdateFlag, UpdateLog, capture_stack,
};
