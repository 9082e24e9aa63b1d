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

//! Extension hooks raised by the pipeline stages
//!
//! Each direction raises two events: a modify event before a line is sent,
//! where hooks may change or veto it, and a read event after it was sent,
//! where hooks only observe. Hooks run in ascending priority order; hooks
//! with equal priority run in registration order.

use async_trait::async_trait;
use futures::FutureExt;
use mudproxy_records::{RecordError, TrackedRecord, WireLine};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{error, trace};

/// Priority given to hooks that do not care about ordering
pub const DEFAULT_PRIORITY: i32 = 50;

/// The points at which the pipeline calls into hooks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookEvent {
    /// A line from a client is about to be sent to the mud
    ToMudModify,
    /// A line was sent to the mud
    ToMudRead,
    /// A line is about to be sent to clients
    ToClientModify,
    /// A line was sent to clients
    ToClientRead,
}

impl HookEvent {
    /// Stable event name
    pub fn name(self) -> &'static str {
        match self {
            HookEvent::ToMudModify => "to-mud:modify",
            HookEvent::ToMudRead => "to-mud:read",
            HookEvent::ToClientModify => "to-client:modify",
            HookEvent::ToClientRead => "to-client:read",
        }
    }
}

impl fmt::Display for HookEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned by a hook
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    /// The hook could not do its work
    #[error("{0}")]
    Failed(String),

    /// The hook tried an operation the line refused
    #[error(transparent)]
    Record(#[from] RecordError),
}

/// Hook trait
///
/// Implement this trait to take part in the pipeline. Both methods have
/// default implementations that do nothing.
///
/// # Example
///
/// ```
/// use async_trait::async_trait;
/// use mudproxy_records::WireLine;
/// use mudproxy_service::{HookError, HookEvent, LineHook};
///
/// struct Gag;
///
/// #[async_trait]
/// impl LineHook for Gag {
///     async fn modify(&self, _event: HookEvent, line: &mut WireLine) -> Result<(), HookError> {
///         if line.text().contains("spam") {
///             line.set_send(false)?;
///         }
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait LineHook: Send + Sync + 'static {
    /// Called before a line is sent; may change the line or veto it with
    /// `set_send(false)`
    ///
    /// An error restores the line to what it was before this hook ran.
    async fn modify(&self, _event: HookEvent, _line: &mut WireLine) -> Result<(), HookError> {
        Ok(())
    }

    /// Called after a line was sent
    async fn observe(&self, _event: HookEvent, _line: &WireLine) {}
}

struct RegisteredHook {
    name: Arc<str>,
    priority: i32,
    sequence: u64,
    hook: Arc<dyn LineHook>,
}

/// Priority-ordered set of hooks
#[derive(Default)]
pub struct HookRegistry {
    hooks: RwLock<Vec<RegisteredHook>>,
    next_sequence: AtomicU64,
    faults: AtomicU64,
}

impl HookRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a hook under a name
    pub fn register(&self, name: impl AsRef<str>, priority: i32, hook: Arc<dyn LineHook>) {
        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        let mut hooks = self.hooks.write().unwrap_or_else(PoisonError::into_inner);
        hooks.push(RegisteredHook {
            name: Arc::from(name.as_ref()),
            priority,
            sequence,
            hook,
        });
        hooks.sort_by_key(|entry| (entry.priority, entry.sequence));
    }

    /// Remove every hook registered under a name; returns whether any was removed
    pub fn unregister(&self, name: &str) -> bool {
        let mut hooks = self.hooks.write().unwrap_or_else(PoisonError::into_inner);
        let before = hooks.len();
        hooks.retain(|entry| &*entry.name != name);
        hooks.len() != before
    }

    /// Number of registered hooks
    pub fn len(&self) -> usize {
        self.hooks.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether no hooks are registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hooks that failed or panicked since start
    pub fn faults(&self) -> u64 {
        self.faults.load(Ordering::Relaxed)
    }

    fn snapshot(&self) -> Vec<(Arc<str>, Arc<dyn LineHook>)> {
        self.hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|entry| (entry.name.clone(), entry.hook.clone()))
            .collect()
    }

    /// Run every hook's `modify` on a line.
    ///
    /// A hook that fails or panics is logged and its changes are discarded;
    /// the remaining hooks still run. Returns the number of faults.
    pub async fn modify(&self, event: HookEvent, line: &mut WireLine) -> usize {
        let mut faults = 0;
        for (name, hook) in self.snapshot() {
            let before = line.clone();
            let outcome = AssertUnwindSafe(hook.modify(event, line)).catch_unwind().await;
            let fault = match outcome {
                Ok(Ok(())) => {
                    trace!(hook = %name, %event, record = %line.id(), "Hook ran");
                    continue;
                }
                Ok(Err(err)) => err.to_string(),
                Err(_) => "hook panicked".to_string(),
            };
            error!(
                hook = %name,
                %event,
                record = %line.id(),
                owner = line.header().owner_id(),
                payload = %line.text(),
                error = %fault,
                "Hook failed, line restored"
            );
            *line = before;
            faults += 1;
        }
        self.faults.fetch_add(faults as u64, Ordering::Relaxed);
        faults
    }

    /// Run every hook's `observe` on a line that was sent
    pub async fn observe(&self, event: HookEvent, line: &WireLine) -> usize {
        let mut faults = 0;
        for (name, hook) in self.snapshot() {
            if AssertUnwindSafe(hook.observe(event, line))
                .catch_unwind()
                .await
                .is_err()
            {
                error!(hook = %name, %event, record = %line.id(), "Hook panicked");
                faults += 1;
            }
        }
        self.faults.fetch_add(faults as u64, Ordering::Relaxed);
        faults
    }
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<Arc<str>> = self.snapshot().into_iter().map(|(name, _)| name).collect();
        f.debug_struct("HookRegistry")
            .field("hooks", &names)
            .field("faults", &self.faults())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mudproxy_records::{Origin, RecordContext, RecordRegistry};
    use std::sync::Mutex;
    use tracing_test::traced_test;

    struct Append(&'static str);

    #[async_trait]
    impl LineHook for Append {
        async fn modify(&self, _event: HookEvent, line: &mut WireLine) -> Result<(), HookError> {
            let text = format!("{}{}", line.text(), self.0);
            line.set_payload(text)?;
            Ok(())
        }
    }

    struct Broken;

    #[async_trait]
    impl LineHook for Broken {
        async fn modify(&self, _event: HookEvent, line: &mut WireLine) -> Result<(), HookError> {
            line.set_payload("garbage")?;
            Err(HookError::Failed("broken".to_string()))
        }
    }

    struct Panics;

    #[async_trait]
    impl LineHook for Panics {
        async fn modify(&self, _event: HookEvent, line: &mut WireLine) -> Result<(), HookError> {
            line.set_send(false)?;
            panic!("hook bug");
        }
    }

    #[derive(Default)]
    struct Seen(Mutex<Vec<String>>);

    #[async_trait]
    impl LineHook for Seen {
        async fn observe(&self, event: HookEvent, line: &WireLine) {
            self.0
                .lock()
                .unwrap()
                .push(format!("{event} {}", line.text()));
        }
    }

    fn line(text: &str) -> WireLine {
        let context = RecordContext::new(Arc::new(RecordRegistry::default()), "test");
        WireLine::io(&context, text, Origin::Client)
    }

    #[tokio::test]
    async fn hooks_run_in_priority_order() {
        let registry = HookRegistry::new();
        registry.register("late", 90, Arc::new(Append("-late")));
        registry.register("early", 10, Arc::new(Append("-early")));
        registry.register("default", DEFAULT_PRIORITY, Arc::new(Append("-default")));

        let mut line = line("look");
        assert_eq!(registry.modify(HookEvent::ToMudModify, &mut line).await, 0);
        assert_eq!(line.text(), "look-early-default-late");
    }

    #[tokio::test]
    async fn failing_hooks_are_rolled_back() {
        let registry = HookRegistry::new();
        registry.register("first", 10, Arc::new(Append("!")));
        registry.register("broken", 20, Arc::new(Broken));
        registry.register("panics", 30, Arc::new(Panics));
        registry.register("last", 40, Arc::new(Append("?")));

        let mut line = line("say hi");
        assert_eq!(registry.modify(HookEvent::ToClientModify, &mut line).await, 2);
        assert_eq!(line.text(), "say hi!?");
        assert!(line.send());
        assert_eq!(registry.faults(), 2);
    }

    #[tokio::test]
    #[traced_test]
    async fn failures_are_logged_with_the_hook_name() {
        let registry = HookRegistry::new();
        registry.register("broken", DEFAULT_PRIORITY, Arc::new(Broken));

        let mut line = line("kill rat");
        assert_eq!(registry.modify(HookEvent::ToMudModify, &mut line).await, 1);
        assert_eq!(line.text(), "kill rat");
        assert!(logs_contain("Hook failed, line restored"));
        assert!(logs_contain("broken"));
    }

    #[tokio::test]
    async fn observers_see_lines() {
        let registry = HookRegistry::new();
        let seen = Arc::new(Seen::default());
        registry.register("seen", DEFAULT_PRIORITY, seen.clone());
        registry.observe(HookEvent::ToMudRead, &line("north")).await;
        assert_eq!(*seen.0.lock().unwrap(), vec!["to-mud:read north".to_string()]);

        assert!(registry.unregister("seen"));
        assert!(registry.is_empty());
    }
}
