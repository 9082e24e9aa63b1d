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

//! The upstream mud connection

use crate::pipeline::Addressing;
use crate::result::{ConnectionError, ConnectionResult};
use crate::types::{ConnectionState, Outbound};
use crate::worker::{ReadEnd, drive, write_queue};
use crate::{Proxy, Result};
use bytes::Bytes;
use futures::{FutureExt, StreamExt};
use mudproxy_records::{Origin, TrackedRecord, WireBatch, WireLine};
use mudproxy_telnetcodec::{LineFrame, MudLineCodec, TelnetSegment, Terminator, split_telnet_segments};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_util::codec::FramedRead;
use tracing::{debug, info, instrument, warn};

const OWNER: &str = "mud";

#[derive(Debug, Default)]
struct Link {
    outbound: Option<UnboundedSender<Outbound>>,
    peer_addr: Option<SocketAddr>,
    connected_at: Option<SystemTime>,
}

/// The single upstream link to the mud
///
/// The proxy creates one on first use and keeps it for its lifetime; the
/// link itself may be connected and disconnected any number of times and
/// survives every client coming and going.
#[derive(Debug)]
pub struct MudConnection {
    address: String,
    state: AtomicU8,
    link: Mutex<Link>,
    connecting: tokio::sync::Mutex<()>,
}

impl MudConnection {
    /// Create a disconnected link to `address` (`host:port`)
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            state: AtomicU8::new(ConnectionState::Closed.as_u8()),
            link: Mutex::new(Link::default()),
            connecting: tokio::sync::Mutex::new(()),
        }
    }

    fn link(&self) -> MutexGuard<'_, Link> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Address the link connects to
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Current state
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    /// Whether lines can be sent to the mud
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Active
    }

    /// Resolved address of the connected mud
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.link().peer_addr
    }

    /// When the current connection was made
    pub fn connected_at(&self) -> Option<SystemTime> {
        self.link().connected_at
    }

    /// Open the link and start reading from the mud
    ///
    /// Does nothing if the link is already up. Clients are told once the
    /// connection is made.
    pub async fn connect(self: &Arc<Self>, proxy: &Arc<Proxy>) -> Result<()> {
        let _connecting = self.connecting.lock().await;
        if self.is_connected() {
            return Ok(());
        }

        self.set_state(ConnectionState::Connecting);
        let stream = match TcpStream::connect(self.address.as_str()).await {
            Ok(stream) => stream,
            Err(err) => {
                self.set_state(ConnectionState::Closed);
                warn!(mud = %self.address, error = %err, "Failed to connect to the mud");
                return Err(err.into());
            }
        };

        let (outbound, rx) = mpsc::unbounded_channel();
        {
            let mut link = self.link();
            link.outbound = Some(outbound);
            link.peer_addr = stream.peer_addr().ok();
            link.connected_at = Some(SystemTime::now());
        }
        self.set_state(ConnectionState::Active);
        proxy.metrics().mud_connected();
        info!(mud = %self.address, "Connected to the mud");

        let mud = Arc::clone(self);
        let task_proxy = Arc::clone(proxy);
        proxy
            .tasks()
            .spawn("mud-connection", async move { mud.run(stream, rx, task_proxy).await });

        proxy.announce("Connected to the mud.", None).await
    }

    /// Queue a formatted line for the mud
    pub fn send_to(&self, line: WireLine) -> ConnectionResult<()> {
        if line.wire_bytes().is_none() {
            return Err(ConnectionError::Unformatted(line.id()));
        }
        let link = self.link();
        let outbound = link.outbound.as_ref().ok_or(ConnectionError::Closed)?;
        outbound
            .send(Outbound::Line(line))
            .map_err(|_| ConnectionError::Closed)
    }

    /// Close the link after everything already queued is written. Returns
    /// false if it was not connected.
    pub fn disconnect(&self) -> bool {
        let Some(outbound) = self.link().outbound.take() else {
            return false;
        };
        self.set_state(ConnectionState::Closing);
        debug!(mud = %self.address, "Mud disconnect requested");
        outbound.send(Outbound::Close(None)).is_ok()
    }

    #[instrument(skip_all, fields(mud = %self.address))]
    async fn run(
        self: Arc<Self>,
        stream: TcpStream,
        mut outbound: UnboundedReceiver<Outbound>,
        proxy: Arc<Proxy>,
    ) -> Result<()> {
        let (read_half, mut write_half) = stream.into_split();
        let yield_every = proxy.config().writer_yield_interval;
        let teardown = drive(
            self.read_loop(read_half, &proxy),
            write_queue(&mut write_half, &mut outbound, yield_every),
        )
        .await;

        let requested = self.state() == ConnectionState::Closing;
        self.set_state(ConnectionState::Closing);
        *self.link() = Link::default();
        if let Some(Err(err)) = &teardown.read {
            warn!(error = %err, "Mud read failed");
        }
        if let Some(Err(err)) = &teardown.write {
            warn!(error = %err, "Mud write failed");
        }
        let _ = write_half.shutdown().await;
        self.set_state(ConnectionState::Closed);
        proxy.metrics().mud_disconnected();

        if requested {
            info!("Disconnected from the mud");
            proxy.announce("Disconnected from the mud.", None).await
        } else {
            info!("Lost connection to the mud");
            proxy.announce("Lost connection to the mud.", None).await
        }
    }

    /// Read mud lines in batches of at most `reader_batch_size`
    ///
    /// A batch ends early when no further frame is ready without waiting.
    /// The reader yields after handing each batch on.
    async fn read_loop<R>(&self, reader: R, proxy: &Proxy) -> Result<ReadEnd>
    where
        R: AsyncRead + Unpin,
    {
        let mut frames = FramedRead::new(reader, MudLineCodec::telnet_aware());
        let limit = proxy.config().reader_batch_size.max(1);
        loop {
            let Some(first) = frames.next().await else {
                return Ok(ReadEnd::Eof);
            };
            let mut batch = proxy.new_batch(OWNER);
            push_frame(&mut batch, first?)?;

            let mut eof = false;
            let mut count = 1;
            while count < limit {
                match frames.next().now_or_never() {
                    Some(Some(frame)) => {
                        push_frame(&mut batch, frame?)?;
                        count += 1;
                    }
                    Some(None) => {
                        eof = true;
                        break;
                    }
                    None => break,
                }
            }

            if !batch.is_empty() {
                proxy
                    .send_batch_to_clients(batch, Addressing::all())
                    .await?;
            }
            if eof {
                return Ok(ReadEnd::Eof);
            }
            tokio::task::yield_now().await;
        }
    }
}

/// Turn one mud frame into lines, in wire order
///
/// Every command sequence becomes a command line. Text before a command
/// becomes an IO line without a line ending; the text after the last
/// command carries the frame's terminator.
fn push_frame(batch: &mut WireBatch, frame: LineFrame) -> Result<()> {
    let context = batch.context().clone();
    let mut tail = Bytes::new();
    for segment in split_telnet_segments(&frame.line) {
        match segment {
            TelnetSegment::Text(bytes) => tail = bytes,
            TelnetSegment::Command(bytes) => {
                if !tail.is_empty() {
                    let text = std::mem::take(&mut tail);
                    batch.push(WireLine::io(&context, text, Origin::Mud).with_line_endings(false))?;
                }
                batch.push(WireLine::command(&context, bytes, Origin::Mud)?)?;
            }
        }
    }
    if tail.is_empty() && frame.terminator == Terminator::Eof {
        return Ok(());
    }
    let line = WireLine::io(&context, tail, Origin::Mud)
        .with_line_endings(frame.terminator.is_line_ending())
        .with_prompt(frame.terminator.is_prompt());
    batch.push(line)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProxyConfig;
    use mudproxy_records::{RecordContext, RecordRegistry};
    use mudproxy_telnetcodec::consts::{GA, IAC, WILL};

    fn batch() -> WireBatch {
        WireBatch::new(&RecordContext::new(Arc::new(RecordRegistry::default()), OWNER))
    }

    fn frame(line: &[u8], terminator: Terminator) -> LineFrame {
        LineFrame {
            line: Bytes::copy_from_slice(line),
            terminator,
        }
    }

    #[test]
    fn test_frame_with_text_only() {
        let mut batch = batch();
        push_frame(&mut batch, frame(b"You see a dragon.", Terminator::CrLf)).unwrap();
        assert_eq!(batch.len(), 1);
        let line = batch.iter().next().unwrap();
        assert!(line.is_io());
        assert!(line.had_line_endings());
        assert!(!line.is_prompt());
        assert_eq!(line.text(), "You see a dragon.");
    }

    #[test]
    fn test_frame_with_commands_and_text() {
        let mut batch = batch();
        let mut raw = vec![IAC, WILL, 1];
        raw.extend_from_slice(b"HP: 100> ");
        push_frame(&mut batch, frame(&raw, Terminator::GoAhead)).unwrap();

        let lines: Vec<_> = batch.iter().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].is_command());
        assert_eq!(lines[0].payload().as_bytes(), &[IAC, WILL, 1]);
        assert!(lines[1].is_prompt());
        assert!(!lines[1].had_line_endings());

        let mut prompt = lines[1].clone();
        let wire = prompt.format(&mudproxy_records::LineStyle::plain());
        assert_eq!(&wire[..], b"HP: 100> \xff\xf9");
        assert_eq!(wire[wire.len() - 1], GA);
    }

    #[test]
    fn test_frame_keeps_wire_order() {
        let mut batch = batch();
        let raw = [b'a', b'b', b'c', IAC, WILL, 1, b'd', b'e', b'f'];
        push_frame(&mut batch, frame(&raw, Terminator::CrLf)).unwrap();

        let style = mudproxy_records::LineStyle::plain();
        let wire: Vec<u8> = batch
            .iter()
            .flat_map(|line| line.clone().format(&style).to_vec())
            .collect();
        assert_eq!(wire, vec![97, 98, 99, 255, 251, 1, 100, 101, 102, 13, 10]);

        let lines: Vec<_> = batch.iter().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].is_io() && !lines[0].had_line_endings());
        assert!(lines[1].is_command());
        assert!(lines[2].is_io() && lines[2].had_line_endings());
    }

    #[test]
    fn test_frame_ending_in_command_keeps_its_line_ending() {
        let mut batch = batch();
        push_frame(&mut batch, frame(&[b'x', IAC, WILL, 1], Terminator::CrLf)).unwrap();
        let lines: Vec<_> = batch.iter().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].text(), "x");
        assert!(lines[1].is_command());
        assert_eq!(lines[2].text(), "");
        assert!(lines[2].had_line_endings());
    }

    #[test]
    fn test_frame_blank_line_kept_but_trailing_eof_dropped() {
        let mut batch = batch();
        push_frame(&mut batch, frame(b"", Terminator::Lf)).unwrap();
        push_frame(&mut batch, frame(b"", Terminator::Eof)).unwrap();
        assert_eq!(batch.len(), 1);
    }

    #[test]
    fn test_send_requires_connection() {
        let proxy = Proxy::new(ProxyConfig::default());
        let mud = MudConnection::new("127.0.0.1:1");
        assert!(!mud.is_connected());
        assert!(!mud.disconnect());

        let mut line = WireLine::io(&proxy.context("test"), "look", Origin::Client);
        line.format(proxy.line_style());
        assert!(matches!(mud.send_to(line), Err(ConnectionError::Closed)));
    }

    #[tokio::test]
    async fn test_connect_failure_leaves_link_closed() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let proxy = Arc::new(Proxy::new(ProxyConfig::default().with_mud("127.0.0.1", port)));
        assert!(proxy.mud().connect(&proxy).await.is_err());
        assert_eq!(proxy.mud().state(), ConnectionState::Closed);
    }
}
