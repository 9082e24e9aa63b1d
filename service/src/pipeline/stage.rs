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

//! Bookkeeping shared by the four pipeline stages

use crate::{ProxyError, Result};
use mudproxy_records::{
    RecordContext, RecordHeader, RecordId, RecordKind, TrackedRecord, WireBatch,
};
use std::fmt;
use std::time::Instant;
use tracing::warn;

/// Record kind of [`ProcessToMud`](crate::ProcessToMud)
pub const PROCESS_TO_MUD: RecordKind = RecordKind::new("ProcessToMud");
/// Record kind of [`SendToMud`](crate::SendToMud)
pub const SEND_TO_MUD: RecordKind = RecordKind::new("SendToMud");
/// Record kind of [`ProcessToClient`](crate::ProcessToClient)
pub const PROCESS_TO_CLIENT: RecordKind = RecordKind::new("ProcessToClient");
/// Record kind of [`SendToClient`](crate::SendToClient)
pub const SEND_TO_CLIENT: RecordKind = RecordKind::new("SendToClient");

/// Lifecycle of a stage. A stage runs at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    /// Built, not yet invoked
    Constructed,
    /// Invocation in progress
    Running,
    /// Invocation finished
    Done,
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageState::Constructed => write!(f, "constructed"),
            StageState::Running => write!(f, "running"),
            StageState::Done => write!(f, "done"),
        }
    }
}

#[derive(Debug)]
pub(crate) struct StageCore {
    header: RecordHeader,
    context: RecordContext,
    state: StageState,
    started: Option<Instant>,
}

impl StageCore {
    pub(crate) fn new(context: &RecordContext, kind: RecordKind, batch: &WireBatch) -> Self {
        let header = RecordHeader::new(context, kind);
        context.registry().link(header.id(), batch.id());
        let context = context.child_of(header.id());
        Self {
            header,
            context,
            state: StageState::Constructed,
            started: None,
        }
    }

    pub(crate) fn id(&self) -> RecordId {
        self.header.id()
    }

    pub(crate) fn state(&self) -> StageState {
        self.state
    }

    pub(crate) fn header(&self) -> &RecordHeader {
        &self.header
    }

    pub(crate) fn header_mut(&mut self) -> &mut RecordHeader {
        &mut self.header
    }

    /// Context for records created by the stage
    pub(crate) fn context(&self) -> &RecordContext {
        &self.context
    }

    pub(crate) fn begin(&mut self) -> Result<()> {
        if self.state != StageState::Constructed {
            let stage = self.header.kind().name();
            warn!(stage, record = %self.id(), state = %self.state, "Stage invoked twice");
            return Err(ProxyError::StageAlreadyInvoked {
                stage,
                id: self.id(),
            });
        }
        self.state = StageState::Running;
        self.started = Some(Instant::now());
        self.header.info("invoked");
        Ok(())
    }

    pub(crate) fn finish(&mut self) {
        self.state = StageState::Done;
        if let Some(started) = self.started {
            self.header.set_execution_time(started.elapsed());
        }
        self.header.archive(self.context.registry());
    }
}

/// Implements [`TrackedRecord`] and the common accessors for a stage type
macro_rules! stage_record {
    ($stage:ty) => {
        impl $stage {
            /// Where the stage is in its lifecycle
            pub fn state(&self) -> $crate::pipeline::StageState {
                self.core.state()
            }
        }

        impl mudproxy_records::TrackedRecord for $stage {
            fn header(&self) -> &mudproxy_records::RecordHeader {
                self.core.header()
            }

            fn header_mut(&mut self) -> &mut mudproxy_records::RecordHeader {
                self.core.header_mut()
            }
        }
    };
}

pub(crate) use stage_record;

#[cfg(test)]
mod tests {
    use super::*;
    use mudproxy_records::RecordRegistry;
    use std::sync::Arc;

    #[test]
    fn stage_runs_at_most_once() {
        let context = RecordContext::new(Arc::new(RecordRegistry::default()), "test");
        let batch = WireBatch::new(&context);
        let mut core = StageCore::new(&context, SEND_TO_CLIENT, &batch);
        assert_eq!(core.state(), StageState::Constructed);
        assert_eq!(context.registry().children(core.id()), vec![batch.id()]);

        core.begin().unwrap();
        assert_eq!(core.state(), StageState::Running);
        assert!(matches!(
            core.begin(),
            Err(ProxyError::StageAlreadyInvoked { stage: "SendToClient", .. })
        ));

        core.finish();
        assert_eq!(core.state(), StageState::Done);
        assert!(core.header().execution_time().is_some());
        assert!(context.registry().contains(core.id()));
        assert!(matches!(
            core.begin(),
            Err(ProxyError::StageAlreadyInvoked { .. })
        ));
    }
}
