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

//! Downstream client connections

use crate::pipeline::Addressing;
use crate::result::{ConnectionError, ConnectionResult};
use crate::types::{ClientId, ClientInfo, ConnectionState, Outbound};
use crate::worker::{ReadEnd, drive, write_queue};
use crate::{Proxy, ProxyError, Result};
use bytes::Bytes;
use futures::StreamExt;
use mudproxy_records::{Origin, RecordContext, RecordResult, TrackedRecord, WireLine};
use mudproxy_telnetcodec::{
    MudLineCodec, advertise_features, echo_off, echo_on, handle_opcodes,
    split_opcodes_from_input,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, Ordering};
use std::time::SystemTime;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_util::codec::FramedRead;
use tracing::{debug, error, info, instrument, warn};

const PASSWORD_PROMPT: &str = "Password: ";

/// What became of one line of client input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputOutcome {
    /// Handed to the mud pipeline
    Forwarded,
    /// Handed to the mud pipeline, but no mud was connected
    MudUnavailable,
    /// The proxy password was given
    LoggedIn,
    /// The view-only password was given
    LoggedInViewOnly,
    /// A wrong password was given; the client stays connected
    Refused {
        /// Failed attempts so far
        attempts: u32,
    },
    /// Too many wrong passwords; the address is banned and the client is closing
    Banned,
    /// A view-only client tried to send input
    ViewOnlyRejected,
}

/// One accepted client socket
///
/// The connection owns the client's login state and its outbound queue.
/// Lines reach the queue only through [`send_to`](Self::send_to), after the
/// send stage has formatted them; [`run`](Self::run) drives the socket.
#[derive(Debug)]
pub struct ClientConnection {
    id: ClientId,
    peer_addr: SocketAddr,
    state: AtomicU8,
    logged_in: AtomicBool,
    view_only: AtomicBool,
    login_attempts: AtomicU32,
    connected_at: SystemTime,
    outbound: UnboundedSender<Outbound>,
}

impl ClientConnection {
    /// Create a connection and the receiving end of its outbound queue
    pub fn new(id: ClientId, peer_addr: SocketAddr) -> (Self, UnboundedReceiver<Outbound>) {
        let (outbound, rx) = mpsc::unbounded_channel();
        let client = Self {
            id,
            peer_addr,
            state: AtomicU8::new(ConnectionState::Connecting.as_u8()),
            logged_in: AtomicBool::new(false),
            view_only: AtomicBool::new(false),
            login_attempts: AtomicU32::new(0),
            connected_at: SystemTime::now(),
            outbound,
        };
        (client, rx)
    }

    /// Client ID
    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Remote address of the client
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Current state
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    /// Whether the client gave a password
    pub fn is_logged_in(&self) -> bool {
        self.logged_in.load(Ordering::Acquire)
    }

    /// Whether the client only watches
    pub fn is_view_only(&self) -> bool {
        self.view_only.load(Ordering::Acquire)
    }

    /// Failed password attempts so far
    pub fn login_attempts(&self) -> u32 {
        self.login_attempts.load(Ordering::Acquire)
    }

    pub(crate) fn set_logged_in(&self, view_only: bool) {
        self.view_only.store(view_only, Ordering::Release);
        self.logged_in.store(true, Ordering::Release);
    }

    /// Owner id of records this client creates
    pub fn owner(&self) -> String {
        self.id.to_string()
    }

    /// Info snapshot
    pub fn info(&self) -> ClientInfo {
        ClientInfo {
            id: self.id,
            state: self.state(),
            peer_addr: self.peer_addr,
            connected_at: self.connected_at,
            logged_in: self.is_logged_in(),
            view_only: self.is_view_only(),
            login_attempts: self.login_attempts(),
        }
    }

    /// Whether this client may see a line
    ///
    /// Clients that have not logged in only see prelogin lines, and view-only
    /// clients never see commands echoed from other clients.
    pub fn accepts(&self, line: &WireLine) -> bool {
        if !self.is_logged_in() && !line.prelogin() {
            return false;
        }
        !(self.is_view_only() && line.command_echo())
    }

    /// Queue a formatted line for writing
    pub fn send_to(&self, line: WireLine) -> ConnectionResult<()> {
        if self.state().is_terminal() {
            return Err(ConnectionError::Closed);
        }
        if line.wire_bytes().is_none() {
            return Err(ConnectionError::Unformatted(line.id()));
        }
        self.outbound
            .send(Outbound::Line(line))
            .map_err(|_| ConnectionError::Closed)
    }

    /// Close after everything already queued is written, then write
    /// `courtesy`. Returns false if the client was already closing.
    pub fn close(&self, courtesy: Option<Bytes>) -> bool {
        let state = self.state();
        if state.is_terminal() {
            return false;
        }
        self.set_state(ConnectionState::Closing);
        debug!(client_id = %self.id, "Client close requested");
        self.outbound.send(Outbound::Close(courtesy)).is_ok()
    }

    /// Drive the client socket until either side stops
    ///
    /// The client is greeted with the advertised Telnet features and a
    /// password prompt. Transport faults end the connection and are logged;
    /// they are not returned.
    #[instrument(skip_all, fields(client_id = %self.id, peer_addr = %self.peer_addr))]
    pub async fn run(
        self: Arc<Self>,
        stream: TcpStream,
        mut outbound: UnboundedReceiver<Outbound>,
        proxy: Arc<Proxy>,
    ) -> Result<()> {
        let (read_half, mut write_half) = stream.into_split();
        if !self.state().is_terminal() {
            self.set_state(ConnectionState::Active);
        }
        info!("Client connected");

        if let Err(err) = self.greet(&proxy).await {
            warn!(error = %err, "Failed to greet client");
        }

        let yield_every = proxy.config().writer_yield_interval;
        let mut teardown = drive(
            self.read_loop(read_half, &proxy),
            write_queue(&mut write_half, &mut outbound, yield_every),
        )
        .await;

        self.set_state(ConnectionState::Closing);
        proxy.clients().remove(self.id);
        match &teardown.read {
            Some(Err(err)) if err.is_connection_error() => {
                debug!(error = %err, "Client read ended");
            }
            Some(Err(err)) => warn!(error = %err, "Client read failed"),
            _ => {}
        }
        if let Some(Err(err)) = &teardown.write {
            debug!(error = %err, "Client write failed");
        }
        if let Some(courtesy) = teardown.courtesy() {
            let _ = write_half.write_all(&courtesy).await;
        }
        let _ = write_half.shutdown().await;

        self.set_state(ConnectionState::Closed);
        info!(duration = ?self.info().duration(), "Client disconnected");
        Ok(())
    }

    async fn greet(&self, proxy: &Proxy) -> Result<()> {
        let config = proxy.config();
        let mut batch = proxy.new_batch(&self.owner());
        let context = batch.context().clone();
        if !config.features.is_empty() {
            batch.push(prelogin_command(&context, advertise_features(&config.features))?)?;
        }
        batch.push(password_prompt(&context))?;
        batch.push(prelogin_command(&context, echo_on())?)?;
        proxy
            .send_batch_to_clients(batch, Addressing::only([self.id]))
            .await
    }

    async fn read_loop<R>(&self, reader: R, proxy: &Arc<Proxy>) -> Result<ReadEnd>
    where
        R: AsyncRead + Unpin,
    {
        let mut frames = FramedRead::new(reader, MudLineCodec::telnet_aware());
        while let Some(frame) = frames.next().await {
            let frame = frame?;
            let split = split_opcodes_from_input(&frame.line);
            if !split.opcodes.is_empty() {
                self.answer_opcodes(proxy, &split.opcodes).await?;
                if split.input.is_empty() {
                    continue;
                }
            }
            if split.input.is_empty() && !frame.terminator.is_line_ending() {
                continue;
            }
            match self.handle_input(proxy, &split.input).await {
                Ok(InputOutcome::Banned) => return Ok(ReadEnd::Closing),
                Ok(_) => {}
                Err(err) if err.is_shape_error() => {
                    error!(client_id = %self.id, error = %err, "Client input rejected");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(ReadEnd::Eof)
    }

    async fn answer_opcodes(&self, proxy: &Proxy, opcodes: &[u8]) -> Result<()> {
        let responses = handle_opcodes(opcodes, proxy.responses());
        if responses.is_empty() {
            return Ok(());
        }
        let mut batch = proxy.new_batch(&self.owner());
        let context = batch.context().clone();
        for response in responses {
            batch.push(prelogin_command(&context, response)?)?;
        }
        proxy
            .send_batch_to_clients(batch, Addressing::only([self.id]))
            .await
    }

    /// Act on one line of input from this client
    ///
    /// Before login the line is checked against the proxy and view-only
    /// passwords. After login it goes to the mud, unless the client is view
    /// only, in which case it gets a single rejection line back.
    pub async fn handle_input(&self, proxy: &Arc<Proxy>, text: &str) -> Result<InputOutcome> {
        if !self.is_logged_in() {
            return self.login(proxy, text).await;
        }
        if self.is_view_only() {
            debug!(client_id = %self.id, "Input from view-only client rejected");
            proxy
                .send_to_client(self.id, "You are logged in as view-only; input is not sent to the mud.")
                .await?;
            return Ok(InputOutcome::ViewOnlyRejected);
        }

        let mut batch = proxy.new_batch(&self.owner());
        batch.push_text(text, Origin::Client)?;
        match proxy.send_to_mud(batch, Some(self.id)).await {
            Ok(()) => Ok(InputOutcome::Forwarded),
            Err(ProxyError::MudNotConnected) => {
                proxy
                    .send_to_client(self.id, "Not connected to the mud.")
                    .await?;
                Ok(InputOutcome::MudUnavailable)
            }
            Err(err) => Err(err),
        }
    }

    async fn login(&self, proxy: &Arc<Proxy>, text: &str) -> Result<InputOutcome> {
        let config = proxy.config();
        let attempt = text.trim();
        if attempt == config.password {
            self.complete_login(proxy, false).await?;
            return Ok(InputOutcome::LoggedIn);
        }
        if config.view_password.as_deref() == Some(attempt) {
            self.complete_login(proxy, true).await?;
            return Ok(InputOutcome::LoggedInViewOnly);
        }

        let attempts = self.login_attempts.fetch_add(1, Ordering::AcqRel) + 1;
        proxy.metrics().login_failed();
        if attempts > config.max_login_attempts {
            warn!(client_id = %self.id, peer_addr = %self.peer_addr, attempts, "Too many failed logins");
            proxy.ban_address(self.peer_addr.ip(), "too many failed login attempts");
            return Ok(InputOutcome::Banned);
        }

        warn!(client_id = %self.id, peer_addr = %self.peer_addr, attempts, "Login refused");
        let mut batch = proxy.new_batch(&self.owner());
        let context = batch.context().clone();
        batch.push(WireLine::io(&context, "Incorrect password.", Origin::Internal).with_prelogin(true))?;
        batch.push(password_prompt(&context))?;
        proxy
            .send_batch_to_clients(batch, Addressing::only([self.id]))
            .await?;
        Ok(InputOutcome::Refused { attempts })
    }

    async fn complete_login(&self, proxy: &Arc<Proxy>, view_only: bool) -> Result<()> {
        self.set_logged_in(view_only);
        info!(client_id = %self.id, peer_addr = %self.peer_addr, view_only, "Client logged in");

        let mut batch = proxy.new_batch(&self.owner());
        let context = batch.context().clone();
        batch.push(prelogin_command(&context, echo_off())?)?;
        let welcome = if view_only {
            "Logged in as view-only."
        } else {
            "Logged in."
        };
        batch.push(WireLine::io(&context, welcome, Origin::Internal))?;
        proxy
            .send_batch_to_clients(batch, Addressing::only([self.id]))
            .await?;

        let kind = if view_only { "view-only client" } else { "client" };
        proxy
            .announce(
                &format!("A {kind} logged in from {}.", self.peer_addr.ip()),
                Some(self.id),
            )
            .await?;

        if !proxy.mud().is_connected() {
            if let Err(err) = proxy.connect_mud().await {
                warn!(error = %err, "Could not connect to the mud");
                proxy
                    .send_to_client(self.id, &format!("Could not connect to the mud: {err}"))
                    .await?;
            }
        }
        Ok(())
    }
}

fn prelogin_command(context: &RecordContext, bytes: Bytes) -> RecordResult<WireLine> {
    Ok(WireLine::command(context, bytes, Origin::Internal)?.with_prelogin(true))
}

fn password_prompt(context: &RecordContext) -> WireLine {
    WireLine::io(context, PASSWORD_PROMPT, Origin::Internal)
        .with_preamble(false)
        .with_line_endings(false)
        .with_prompt(true)
        .with_prelogin(true)
}
