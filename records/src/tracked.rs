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

//! The tracked-record substrate shared by every unit of work.

use crate::registry::RecordRegistry;
use crate::update::{UpdateEntry, UpdateFlag, UpdateLog, capture_stack};
use crate::{RecordId, RecordKind};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

///
/// Provenance context passed down the call chain.
///
/// A record created from a context takes the context's `parent` as its own
/// parent and snapshots its event stack. Contexts are cheap to clone.
///
#[derive(Debug, Clone)]
pub struct RecordContext {
    registry: Arc<RecordRegistry>,
    owner: Arc<str>,
    parent: Option<RecordId>,
    events: Arc<[String]>,
}

impl RecordContext {
    /// A root context with no parent and no events in flight
    pub fn new(registry: Arc<RecordRegistry>, owner: impl AsRef<str>) -> Self {
        Self {
            registry,
            owner: Arc::from(owner.as_ref()),
            parent: None,
            events: Arc::from(Vec::new()),
        }
    }

    /// Same context, with `parent` as the parent of new records
    pub fn child_of(&self, parent: RecordId) -> Self {
        Self {
            parent: Some(parent),
            ..self.clone()
        }
    }

    /// Same context, with a different owner
    pub fn with_owner(&self, owner: impl AsRef<str>) -> Self {
        Self {
            owner: Arc::from(owner.as_ref()),
            ..self.clone()
        }
    }

    /// Same context, with `event` pushed onto the event stack
    pub fn with_event(&self, event: impl Into<String>) -> Self {
        let mut events = self.events.to_vec();
        events.push(event.into());
        Self {
            events: Arc::from(events),
            ..self.clone()
        }
    }

    /// The registry new records are entered into
    pub fn registry(&self) -> &Arc<RecordRegistry> {
        &self.registry
    }

    /// Owner recorded on new records
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Parent of new records
    pub fn parent(&self) -> Option<RecordId> {
        self.parent
    }

    /// Events in flight, outermost first
    pub fn events(&self) -> &[String] {
        &self.events
    }
}

///
/// Identity, ownership, provenance and mutation history of one record.
///
#[derive(Debug, Clone)]
pub struct RecordHeader {
    id: RecordId,
    kind: RecordKind,
    owner_id: String,
    created_at: SystemTime,
    call_stack: Option<Arc<str>>,
    event_stack: Vec<String>,
    parent: Option<RecordId>,
    execution_time: Option<Duration>,
    updates: UpdateLog,
}

impl RecordHeader {
    /// Create a header and enter it into the context's registry
    pub fn new(context: &RecordContext, kind: RecordKind) -> Self {
        let header = Self {
            id: RecordId::next(),
            kind,
            owner_id: context.owner().to_string(),
            created_at: SystemTime::now(),
            call_stack: capture_stack(None),
            event_stack: context.events().to_vec(),
            parent: context.parent(),
            execution_time: None,
            updates: UpdateLog::with_capacity(context.registry().update_capacity()),
        };
        context.registry().register(&header);
        header
    }

    /// Record identifier
    pub fn id(&self) -> RecordId {
        self.id
    }

    /// Record kind
    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    /// Who created or owns the record
    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    /// Creation time
    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    /// Call stack at creation, when backtraces are enabled
    pub fn call_stack(&self) -> Option<&str> {
        self.call_stack.as_deref()
    }

    /// Events that were in flight at creation
    pub fn event_stack(&self) -> &[String] {
        &self.event_stack
    }

    /// Record that was active when this one was created
    pub fn parent(&self) -> Option<RecordId> {
        self.parent
    }

    /// How long the record's invocation took, once it ran
    pub fn execution_time(&self) -> Option<Duration> {
        self.execution_time
    }

    /// Mutation log
    pub fn updates(&self) -> &UpdateLog {
        &self.updates
    }

    /// Append an entry to the mutation log
    pub fn add_update(&mut self, entry: UpdateEntry) {
        self.updates.push(entry);
    }

    /// Shorthand for an informational entry
    pub fn info(&mut self, action: impl Into<String>) {
        self.add_update(UpdateEntry::new(UpdateFlag::Info, action));
    }

    /// Store the elapsed time of the record's invocation
    pub fn set_execution_time(&mut self, elapsed: Duration) {
        self.execution_time = Some(elapsed);
    }

    /// Run `f`, storing how long it took
    pub fn timed<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        let start = Instant::now();
        let result = f(self);
        self.execution_time = Some(start.elapsed());
        result
    }
}

///
/// Implemented by every record type built on [`RecordHeader`].
///
pub trait TrackedRecord {
    /// The record's header
    fn header(&self) -> &RecordHeader;

    /// Mutable access to the record's header
    fn header_mut(&mut self) -> &mut RecordHeader;

    /// Record identifier
    fn id(&self) -> RecordId {
        self.header().id()
    }

    /// Append an update entry
    fn add_update(&mut self, entry: UpdateEntry) {
        self.header_mut().add_update(entry);
    }

    /// Store the record's current state in the registry for later inspection
    fn archive(&self, registry: &RecordRegistry) {
        registry.archive(self.header());
    }
}

impl TrackedRecord for RecordHeader {
    fn header(&self) -> &RecordHeader {
        self
    }

    fn header_mut(&mut self) -> &mut RecordHeader {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_captures_context() {
        let registry = Arc::new(RecordRegistry::default());
        let root = RecordContext::new(registry.clone(), "proxy");
        let parent = RecordHeader::new(&root, RecordKind::WIRE_BATCH);

        let context = root
            .child_of(parent.id())
            .with_owner("client-1")
            .with_event("ev_to_mud_data_modify");
        let child = RecordHeader::new(&context, RecordKind::WIRE_LINE);

        assert_eq!(child.parent(), Some(parent.id()));
        assert_eq!(child.owner_id(), "client-1");
        assert_eq!(child.event_stack(), ["ev_to_mud_data_modify".to_string()]);
        assert_eq!(registry.children(parent.id()), vec![child.id()]);
        assert!(parent.parent().is_none());
    }

    #[test]
    fn timed_sets_execution_time() {
        let registry = Arc::new(RecordRegistry::default());
        let mut header =
            RecordHeader::new(&RecordContext::new(registry, "test"), RecordKind::WIRE_LINE);
        assert!(header.execution_time().is_none());
        let value = header.timed(|h| {
            h.info("ran");
            42
        });
        assert_eq!(value, 42);
        assert!(header.execution_time().is_some());
        assert_eq!(header.updates().len(), 1);
    }
}
