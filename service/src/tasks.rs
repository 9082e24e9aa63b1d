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

//! Supervision of the proxy's long-lived tasks
//!
//! Every task the proxy spawns (the accept loop, each client, the mud
//! connection) runs under a [`TaskSupervisor`]. A task that returns an error
//! or panics is logged when it completes; nothing propagates to the runtime.
//! On shutdown the supervisor stops accepting new tasks, gives the running
//! ones a grace period to finish, aborts the rest and waits for them, treating
//! cancellation as a normal outcome.

use crate::Result;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{Instrument, debug, error, info_span, warn};

/// Owner of the proxy's spawned tasks
#[derive(Debug, Default)]
pub struct TaskSupervisor {
    tasks: Mutex<JoinSet<()>>,
    closed: AtomicBool,
}

impl TaskSupervisor {
    /// Create a supervisor with no tasks
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawn a named task on the current runtime
    ///
    /// Once [`TaskSupervisor::shutdown`] has started the task is dropped
    /// without running.
    pub fn spawn<F>(&self, name: impl Into<String>, task: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let name = name.into();
        let span = info_span!("task", task = %name);
        let supervised = async move {
            match AssertUnwindSafe(task).catch_unwind().await {
                Ok(Ok(())) => debug!("Task finished"),
                Ok(Err(err)) => error!(error = %err, "Task failed"),
                Err(panic) => error!(panic = %panic_message(panic.as_ref()), "Task panicked"),
            }
        }
        .instrument(span);

        let mut tasks = self.lock();
        if self.is_closed() {
            warn!(task = %name, "Supervisor closed, task not started");
            return;
        }
        // Reap finished tasks so the set does not grow without bound
        while tasks.try_join_next().is_some() {}
        tasks.spawn(supervised);
    }

    /// Number of tasks not yet reaped
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no tasks are tracked
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether shutdown has started
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Wait up to `grace` for every task to finish, then abort the rest and
    /// wait for them to unwind
    pub async fn shutdown(&self, grace: Duration) {
        let mut tasks = {
            let mut guard = self.lock();
            self.closed.store(true, Ordering::Release);
            std::mem::take(&mut *guard)
        };

        let drained = tokio::time::timeout(grace, async {
            while let Some(result) = tasks.join_next().await {
                log_join(result);
            }
        })
        .await;

        if drained.is_err() {
            warn!(remaining = tasks.len(), "Tasks still running after grace period, aborting");
            tasks.abort_all();
            while let Some(result) = tasks.join_next().await {
                log_join(result);
            }
        }
    }
}

fn log_join(result: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(err) = result {
        if err.is_cancelled() {
            debug!("Task cancelled");
        } else {
            error!(error = %err, "Task ended abnormally");
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
