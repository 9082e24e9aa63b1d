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

//! Stages carrying mud output and proxy messages to clients

use super::stage::{PROCESS_TO_CLIENT, SEND_TO_CLIENT, StageCore, stage_record};
use crate::hooks::HookEvent;
use crate::types::ClientId;
use crate::{Proxy, Result};
use mudproxy_records::{RecordContext, WireBatch};
use tracing::{instrument, trace};

/// Which clients a batch goes to
///
/// A client on the deny list never receives the batch, even when it is also
/// on the allow list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Addressing {
    allow: Option<Vec<ClientId>>,
    deny: Vec<ClientId>,
}

impl Addressing {
    /// Every connected client
    pub fn all() -> Self {
        Self::default()
    }

    /// Only the listed clients
    pub fn only(ids: impl IntoIterator<Item = ClientId>) -> Self {
        Self {
            allow: Some(ids.into_iter().collect()),
            deny: Vec::new(),
        }
    }

    /// Every client but one
    pub fn except(id: ClientId) -> Self {
        Self::all().deny(id)
    }

    /// Additionally exclude `id`
    #[must_use]
    pub fn deny(mut self, id: ClientId) -> Self {
        self.deny.push(id);
        self
    }

    /// Whether `id` should receive the batch
    pub fn allows(&self, id: ClientId) -> bool {
        if self.deny.contains(&id) {
            return false;
        }
        self.allow.as_ref().is_none_or(|allow| allow.contains(&id))
    }
}

/// Hooks a batch bound for the clients and hands it to [`SendToClient`]
#[derive(Debug)]
pub struct ProcessToClient {
    core: StageCore,
    batch: Option<WireBatch>,
    addressing: Addressing,
}

stage_record!(ProcessToClient);

impl ProcessToClient {
    /// Build the stage around `batch`
    pub fn new(context: &RecordContext, batch: WireBatch, addressing: Addressing) -> Self {
        Self {
            core: StageCore::new(context, PROCESS_TO_CLIENT, &batch),
            batch: Some(batch),
            addressing,
        }
    }

    /// Clients the batch is addressed to
    pub fn addressing(&self) -> &Addressing {
        &self.addressing
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

        let mut faults = 0;
        for line in batch.iter_mut().filter(|line| line.is_io()) {
            faults += proxy.hooks().modify(HookEvent::ToClientModify, line).await;
        }
        proxy.metrics().hook_faults(faults as u64);

        let mut send = SendToClient::new(self.core.context(), batch, self.addressing.clone());
        send.invoke(proxy).await
    }
}

/// Locks a batch, formats it and queues it on every addressed client
///
/// Clients that have not logged in only receive lines flagged `prelogin`.
/// View-only clients never receive echoed commands.
#[derive(Debug)]
pub struct SendToClient {
    core: StageCore,
    batch: WireBatch,
    addressing: Addressing,
}

stage_record!(SendToClient);

impl SendToClient {
    /// Build the stage around `batch`
    pub fn new(context: &RecordContext, batch: WireBatch, addressing: Addressing) -> Self {
        Self {
            core: StageCore::new(context, SEND_TO_CLIENT, &batch),
            batch,
            addressing,
        }
    }

    /// The batch being sent. Locked once the stage has run.
    pub fn batch(&self) -> &WireBatch {
        &self.batch
    }

    /// Run the stage. Fails if it already ran.
    #[instrument(skip_all, fields(stage = %self.core.id()))]
    pub async fn invoke(&mut self, proxy: &Proxy) -> Result<()> {
        self.core.begin()?;
        self.run(proxy).await;
        self.batch.archive();
        self.core.finish();
        Ok(())
    }

    async fn run(&mut self, proxy: &Proxy) {
        self.batch.lock();
        let targets: Vec<_> = proxy
            .clients()
            .clients()
            .into_iter()
            .filter(|client| self.addressing.allows(client.id()))
            .collect();

        let mut sent = 0u64;
        for line in self.batch.iter_mut() {
            if !line.send() {
                continue;
            }
            line.format(proxy.line_style());
            let mut delivered = 0usize;
            for client in &targets {
                if !client.accepts(line) {
                    continue;
                }
                match client.send_to(line.clone()) {
                    Ok(()) => delivered += 1,
                    Err(err) => trace!(client = %client.id(), error = %err, "Client skipped"),
                }
            }
            if delivered > 0 {
                line.mark_sent();
                sent += 1;
            }
        }
        proxy.metrics().lines_to_client(sent);

        let mut faults = 0;
        for line in self.batch.iter().filter(|line| line.was_sent()) {
            faults += proxy.hooks().observe(HookEvent::ToClientRead, line).await;
        }
        proxy.metrics().hook_faults(faults as u64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientConnection;
    use crate::hooks::{DEFAULT_PRIORITY, HookError, LineHook};
    use crate::pipeline::StageState;
    use crate::types::Outbound;
    use crate::{ProxyConfig, ProxyError};
    use async_trait::async_trait;
    use mudproxy_records::{Origin, WireLine};
    use std::sync::Arc;
    use tokio::sync::mpsc::UnboundedReceiver;

    struct Gag(&'static str);

    #[async_trait]
    impl LineHook for Gag {
        async fn modify(
            &self,
            _event: HookEvent,
            line: &mut WireLine,
        ) -> std::result::Result<(), HookError> {
            if line.text().contains(self.0) {
                line.set_send(false)?;
            }
            Ok(())
        }
    }

    fn logged_in(proxy: &Proxy) -> UnboundedReceiver<Outbound> {
        let addr = "127.0.0.1:40000".parse().unwrap();
        let (client, rx) = ClientConnection::new(proxy.clients().next_client_id(), addr);
        client.set_logged_in(false);
        proxy.clients().insert(Arc::new(client));
        rx
    }

    fn received(rx: &mut UnboundedReceiver<Outbound>) -> Vec<String> {
        let mut texts = Vec::new();
        while let Ok(item) = rx.try_recv() {
            if let Outbound::Line(line) = item {
                texts.push(line.text().into_owned());
            }
        }
        texts
    }

    #[tokio::test]
    async fn vetoed_lines_do_not_reach_clients() {
        let proxy = Proxy::new(ProxyConfig::default());
        proxy.hooks().register("gag", DEFAULT_PRIORITY, Arc::new(Gag("spam")));
        let mut first = logged_in(&proxy);
        let mut second = logged_in(&proxy);

        let mut batch = proxy.new_batch("mud");
        batch.push_text("A rat arrives.", Origin::Mud).unwrap();
        batch.push_text("Buy spam now!", Origin::Mud).unwrap();
        batch.push_text("The rat squeaks.", Origin::Mud).unwrap();
        let mut stage = ProcessToClient::new(&proxy.context("mud"), batch, Addressing::all());
        stage.invoke(&proxy).await.unwrap();

        let expected = vec!["A rat arrives.".to_string(), "The rat squeaks.".to_string()];
        assert_eq!(received(&mut first), expected);
        assert_eq!(received(&mut second), expected);
        assert_eq!(proxy.metrics().snapshot().lines_to_client, 2);
    }

    #[tokio::test]
    async fn send_stage_runs_once() {
        let proxy = Proxy::new(ProxyConfig::default());
        let mut rx = logged_in(&proxy);

        let mut batch = proxy.new_batch("mud");
        batch.push_text("Hello.", Origin::Mud).unwrap();
        let mut stage = SendToClient::new(&proxy.context("mud"), batch, Addressing::all());
        stage.invoke(&proxy).await.unwrap();
        assert!(matches!(
            stage.invoke(&proxy).await,
            Err(ProxyError::StageAlreadyInvoked { stage: "SendToClient", .. })
        ));
        assert_eq!(stage.state(), StageState::Done);
        assert_eq!(received(&mut rx), vec!["Hello.".to_string()]);
    }

    #[test]
    fn addressing_all_allows_everyone() {
        let addressing = Addressing::all();
        assert!(addressing.allows(ClientId::new(1)));
        assert!(addressing.allows(ClientId::new(99)));
    }

    #[test]
    fn addressing_only_restricts() {
        let addressing = Addressing::only([ClientId::new(1), ClientId::new(2)]);
        assert!(addressing.allows(ClientId::new(2)));
        assert!(!addressing.allows(ClientId::new(3)));
    }

    #[test]
    fn addressing_deny_wins_over_allow() {
        let addressing = Addressing::only([ClientId::new(1)]).deny(ClientId::new(1));
        assert!(!addressing.allows(ClientId::new(1)));
        assert!(!Addressing::except(ClientId::new(4)).allows(ClientId::new(4)));
    }
}
