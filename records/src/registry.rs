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

//! Bounded registry of tracked records
//!
//! Every record header is entered here at construction. The registry keeps a
//! FIFO history per [`RecordKind`]; inserting past the capacity evicts the
//! oldest record of that kind from the id table and the children index in
//! the same step.

use crate::update::DEFAULT_UPDATE_CAPACITY;
use crate::{RecordHeader, RecordId, RecordKind};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::trace;

/// Default number of records kept per kind
pub const DEFAULT_REGISTRY_CAPACITY: usize = 5000;

#[derive(Debug, Default)]
struct RegistryInner {
    order: HashMap<RecordKind, VecDeque<RecordId>>,
    by_id: HashMap<RecordId, RecordHeader>,
    children: HashMap<RecordId, Vec<RecordId>>,
    /// Parents added through `link`, by child
    linked: HashMap<RecordId, Vec<RecordId>>,
}

impl RegistryInner {
    fn detach(&mut self, parent: RecordId, child: RecordId) {
        if let Some(siblings) = self.children.get_mut(&parent) {
            siblings.retain(|sibling| *sibling != child);
            if siblings.is_empty() {
                self.children.remove(&parent);
            }
        }
    }

    fn evict(&mut self, id: RecordId) {
        if let Some(parent) = self.by_id.remove(&id).and_then(|header| header.parent()) {
            self.detach(parent, id);
        }
        for parent in self.linked.remove(&id).unwrap_or_default() {
            self.detach(parent, id);
        }
        for child in self.children.remove(&id).unwrap_or_default() {
            if let Some(parents) = self.linked.get_mut(&child) {
                parents.retain(|parent| *parent != id);
                if parents.is_empty() {
                    self.linked.remove(&child);
                }
            }
        }
        trace!(record = %id, "Evicted record");
    }
}

///
/// Process-wide, bounded lookup of tracked records by id, with an explicit
/// parent to children index.
///
#[derive(Debug)]
pub struct RecordRegistry {
    inner: Mutex<RegistryInner>,
    capacity: usize,
    update_capacity: usize,
}

impl Default for RecordRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_REGISTRY_CAPACITY, DEFAULT_UPDATE_CAPACITY)
    }
}

impl RecordRegistry {
    /// Create a registry keeping `capacity` records per kind, whose records
    /// keep `update_capacity` update entries each
    pub fn new(capacity: usize, update_capacity: usize) -> Self {
        Self {
            inner: Mutex::new(RegistryInner::default()),
            capacity: capacity.max(1),
            update_capacity: update_capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records kept per kind
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Update entries kept per record
    pub fn update_capacity(&self) -> usize {
        self.update_capacity
    }

    /// Enter a new record, evicting the oldest record of the same kind when full
    pub fn register(&self, header: &RecordHeader) {
        let mut inner = self.lock();
        let id = header.id();
        if inner.by_id.insert(id, header.clone()).is_some() {
            return;
        }
        if let Some(parent) = header.parent() {
            inner.children.entry(parent).or_default().push(id);
        }
        let queue = inner.order.entry(header.kind()).or_default();
        queue.push_back(id);
        let evicted = if queue.len() > self.capacity {
            queue.pop_front()
        } else {
            None
        };
        if let Some(oldest) = evicted {
            inner.evict(oldest);
        }
    }

    /// Replace the stored snapshot of a record that is still resolvable
    pub fn archive(&self, header: &RecordHeader) {
        let mut inner = self.lock();
        if let Some(stored) = inner.by_id.get_mut(&header.id()) {
            *stored = header.clone();
        }
    }

    /// Record `child` as a child of `parent` in addition to its creation parent
    pub fn link(&self, parent: RecordId, child: RecordId) {
        if parent == child {
            return;
        }
        let mut inner = self.lock();
        if !inner.by_id.contains_key(&parent) || !inner.by_id.contains_key(&child) {
            return;
        }
        let children = inner.children.entry(parent).or_default();
        if children.contains(&child) {
            return;
        }
        children.push(child);
        inner.linked.entry(child).or_default().push(parent);
    }

    /// Snapshot of a record, if it has not been evicted
    pub fn get(&self, id: RecordId) -> Option<RecordHeader> {
        self.lock().by_id.get(&id).cloned()
    }

    /// Whether a record is still resolvable
    pub fn contains(&self, id: RecordId) -> bool {
        self.lock().by_id.contains_key(&id)
    }

    /// Direct children of a record, in creation order
    pub fn children(&self, id: RecordId) -> Vec<RecordId> {
        self.lock().children.get(&id).cloned().unwrap_or_default()
    }

    /// Every descendant of a record, depth first
    pub fn all_children(&self, id: RecordId) -> Vec<RecordId> {
        let inner = self.lock();
        let mut found = Vec::new();
        let mut visited = HashSet::from([id]);
        let mut stack: Vec<RecordId> = inner
            .children
            .get(&id)
            .map(|children| children.iter().rev().copied().collect())
            .unwrap_or_default();
        while let Some(next) = stack.pop() {
            if !visited.insert(next) {
                continue;
            }
            found.push(next);
            if let Some(children) = inner.children.get(&next) {
                stack.extend(children.iter().rev().copied());
            }
        }
        found
    }

    /// Number of resolvable records
    pub fn len(&self) -> usize {
        self.lock().by_id.len()
    }

    /// Whether no records are resolvable
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of resolvable records of one kind
    pub fn len_of(&self, kind: RecordKind) -> usize {
        self.lock().order.get(&kind).map_or(0, VecDeque::len)
    }
}
