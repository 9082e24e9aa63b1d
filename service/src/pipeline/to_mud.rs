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

//! Stages carrying client input to the mud

use super::stage::{PROCESS_TO_MUD, SEND_TO_MUD, StageCore, stage_record};
use super::{Addressing, ProcessToClient, split_batch};
use crate::hooks::HookEvent;
use crate::types::ClientId;
use crate::{Proxy, ProxyError, Result};
use mudproxy_records::{
    LineStyle, Origin, RecordContext, TrackedRecord, WireBatch, WireLine,
};
use tracing::{debug, instrument, warn};

/// Splits, hooks and forwards a batch of client input
///
/// Each line is split on the configured separator, every client-origin IO
/// line passes through the [`HookEvent::ToMudModify`] hooks, and the result
/// is handed to a child [`SendToMud`].
#[derive(Debug)]
pub struct ProcessToMud {
    core: StageCore,
    batch: Option<WireBatch>,
    source: Option<ClientId>,
}

stage_record!(ProcessToMud);

impl ProcessToMud {
    /// Build the stage around `batch`, sent by `source` if it came from a client
    pub fn new(context: &RecordContext, batch: WireBatch, source: Option<ClientId>) -> Self {
        Self {
            core: StageCore::new(context, PROCESS_TO_MUD, &batch),
            batch: Some(batch),
            source,
        }
    }

    /// Client the batch came from
    pub fn source(&self) -> Option<ClientId> {
        self.source
    }

    /// Run the stage. Fails if it already ran.
    #[instrument(skip_all, fields(stage = %self.core.id()))]
    pub async fn invoke(&mut self, proxy: &Proxy) -> Result<()> {
        self.core.begin()?;
        let result = self.run(proxy).await;
        self.core.finish();
        result
    }

    async fn run(&mut self, proxy: &Proxy) -> Result<()> {
        let Some(mut batch) = self.batch.take() else {
            return Ok(());
        };
        split_batch(&mut batch, proxy.config().separator)?;

        let mut faults = 0;
        for line in batch
            .iter_mut()
            .filter(|line| line.is_io() && line.origin() == Origin::Client)
        {
            faults += proxy.hooks().modify(HookEvent::ToMudModify, line).await;
        }
        proxy.metrics().hook_faults(faults as u64);

        let mut send = SendToMud::new(self.core.context(), batch, self.source);
        send.invoke(proxy).await
    }
}

/// Locks a batch and writes every sendable line to the mud
#[derive(Debug)]
pub struct SendToMud {
    core: StageCore,
    batch: WireBatch,
    source: Option<ClientId>,
}

stage_record!(SendToMud);

impl SendToMud {
    /// Build the stage around `batch`
    pub fn new(context: &RecordContext, batch: WireBatch, source: Option<ClientId>) -> Self {
        Self {
            core: StageCore::new(context, SEND_TO_MUD, &batch),
            batch,
            source,
        }
    }

    /// The batch being sent. Locked once the stage has run.
    pub fn batch(&self) -> &WireBatch {
        &self.batch
    }

    /// Run the stage. Fails if it already ran.
    ///
    /// Returns [`ProxyError::MudNotConnected`] when sendable lines were
    /// dropped because no mud connection was up.
    #[instrument(skip_all, fields(stage = %self.core.id()))]
    pub async fn invoke(&mut self, proxy: &Proxy) -> Result<()> {
        self.core.begin()?;
        let result = self.run(proxy).await;
        self.batch.archive();
        self.core.finish();
        result
    }

    async fn run(&mut self, proxy: &Proxy) -> Result<()> {
        self.batch.lock();
        let mud = proxy.connected_mud();
        let plain = LineStyle::plain();

        let mut sent = 0u64;
        let mut dropped = 0usize;
        for line in self.batch.iter_mut() {
            if !line.send() {
                debug!(record = %line.id(), "Line withheld from the mud");
                continue;
            }
            line.format(&plain);
            let Some(mud) = mud else {
                dropped += 1;
                continue;
            };
            match mud.send_to(line.clone()) {
                Ok(()) => {
                    line.mark_sent();
                    sent += 1;
                }
                Err(err) => {
                    warn!(record = %line.id(), error = %err, "Failed to queue line for the mud");
                    dropped += 1;
                }
            }
        }
        proxy.metrics().lines_to_mud(sent);

        let mut faults = 0;
        for line in self.batch.iter().filter(|line| line.was_sent()) {
            faults += proxy.hooks().observe(HookEvent::ToMudRead, line).await;
        }
        proxy.metrics().hook_faults(faults as u64);

        if proxy.config().echo_commands_to_clients {
            self.echo(proxy).await?;
        }

        if dropped > 0 {
            warn!(dropped, "Not connected to the mud, input dropped");
            return Err(ProxyError::MudNotConnected);
        }
        Ok(())
    }

    /// Show the sent input to every other client
    async fn echo(&self, proxy: &Proxy) -> Result<()> {
        let Some(source) = self.source else {
            return Ok(());
        };
        let mut echo = WireBatch::new(self.core.context());
        let context = echo.context().clone();
        for line in self
            .batch
            .iter()
            .filter(|line| line.was_sent() && line.is_io() && line.origin() == Origin::Client)
        {
            let text = line.text().into_owned();
            echo.push(WireLine::io(&context, text, Origin::Internal).with_command_echo(true))?;
        }
        if echo.is_empty() {
            return Ok(());
        }
        let mut stage = ProcessToClient::new(self.core.context(), echo, Addressing::except(source));
        stage.invoke(proxy).await
    }
}
