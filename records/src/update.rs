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

//! Mutation log of a tracked record
//!
//! Entries exist for forensic replay and debugging only; nothing in the
//! proxy makes decisions based on them.

use std::backtrace::{Backtrace, BacktraceStatus};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

/// Default number of entries kept per record
pub const DEFAULT_UPDATE_CAPACITY: usize = 1000;

/// Frames kept in the short stack attached to an update
const SHORT_STACK_FRAMES: usize = 12;

/// What an update entry describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateFlag {
    /// Data was changed
    Modify,
    /// A control flag was set
    SetFlag,
    /// Informational note
    Info,
}

impl fmt::Display for UpdateFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateFlag::Modify => write!(f, "Modify"),
            UpdateFlag::SetFlag => write!(f, "Set Flag"),
            UpdateFlag::Info => write!(f, "Info"),
        }
    }
}

/// Capture the current call stack, if backtraces are enabled for the process.
///
/// Controlled by `RUST_BACKTRACE` / `RUST_LIB_BACKTRACE`, so the default cost
/// is a single environment check.
pub fn capture_stack(max_frames: Option<usize>) -> Option<Arc<str>> {
    let backtrace = Backtrace::capture();
    if backtrace.status() != BacktraceStatus::Captured {
        return None;
    }
    let rendered = backtrace.to_string();
    let text = match max_frames {
        // Each frame renders as a name line followed by a location line
        Some(frames) => rendered
            .lines()
            .take(frames * 2)
            .collect::<Vec<_>>()
            .join("\n"),
        None => rendered,
    };
    Some(Arc::from(text))
}

/// One entry of a record's mutation log
#[derive(Debug, Clone)]
pub struct UpdateEntry {
    flag: UpdateFlag,
    action: String,
    actor: Option<String>,
    extra: BTreeMap<String, String>,
    timestamp: SystemTime,
    call_stack: Option<Arc<str>>,
}

impl UpdateEntry {
    /// Create an entry stamped with the current time and a short stack
    pub fn new(flag: UpdateFlag, action: impl Into<String>) -> Self {
        Self {
            flag,
            action: action.into(),
            actor: None,
            extra: BTreeMap::new(),
            timestamp: SystemTime::now(),
            call_stack: capture_stack(Some(SHORT_STACK_FRAMES)),
        }
    }

    /// Set who performed the update
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    /// Attach a piece of structured data
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Update flag
    pub fn flag(&self) -> UpdateFlag {
        self.flag
    }

    /// Human description
    pub fn action(&self) -> &str {
        &self.action
    }

    /// Who performed the update
    pub fn actor(&self) -> Option<&str> {
        self.actor.as_deref()
    }

    /// Structured extra data
    pub fn extra(&self) -> &BTreeMap<String, String> {
        &self.extra
    }

    /// When the update happened
    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    /// Short call stack, when backtraces are enabled
    pub fn call_stack(&self) -> Option<&str> {
        self.call_stack.as_deref()
    }
}

impl fmt::Display for UpdateEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.flag, self.action)?;
        if let Some(actor) = &self.actor {
            write!(f, " (by {actor})")?;
        }
        for (key, value) in &self.extra {
            write!(f, " {key}={value}")?;
        }
        Ok(())
    }
}

///
/// Append-only, capacity-bounded log. Once full, the oldest entry is
/// discarded for every new one.
///
#[derive(Debug, Clone)]
pub struct UpdateLog {
    entries: VecDeque<UpdateEntry>,
    capacity: usize,
}

impl Default for UpdateLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_UPDATE_CAPACITY)
    }
}

impl UpdateLog {
    /// Create a log holding at most `capacity` entries
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Append an entry
    pub fn push(&mut self, entry: UpdateEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Number of entries kept
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of entries
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &UpdateEntry> {
        self.entries.iter()
    }

    /// Most recent entry
    pub fn last(&self) -> Option<&UpdateEntry> {
        self.entries.back()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_is_capped() {
        let mut log = UpdateLog::with_capacity(3);
        for index in 0..5 {
            log.push(UpdateEntry::new(UpdateFlag::Info, format!("entry {index}")));
        }
        assert_eq!(log.len(), 3);
        let actions: Vec<&str> = log.iter().map(UpdateEntry::action).collect();
        assert_eq!(actions, vec!["entry 2", "entry 3", "entry 4"]);
    }

    #[test]
    fn entry_display() {
        let entry = UpdateEntry::new(UpdateFlag::SetFlag, "send set to false")
            .with_actor("plugin.filter")
            .with_extra("reason", "spam");
        assert_eq!(
            entry.to_string(),
            "[Set Flag] send set to false (by plugin.filter) reason=spam"
        );
    }
}
