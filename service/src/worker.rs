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

//! Reader and writer plumbing shared by client and mud connections
//!
//! Every connection splits its socket in two. The writer drains an unbounded
//! queue of formatted lines, yielding to the scheduler every few writes. The
//! reader is connection specific. [`drive`] runs both and decides which one
//! gets to finish when the other stops.

use crate::Result;
use crate::types::Outbound;
use bytes::Bytes;
use std::future::Future;
use std::io;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::select;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{trace, warn};

/// Why a reader stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReadEnd {
    /// The peer closed its side
    Eof,
    /// The reader queued a close and the writer should drain first
    Closing,
}

/// Why a writer stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum WriteEnd {
    /// A close was dequeued, with the bytes to send last
    Close(Option<Bytes>),
    /// Every sender went away
    Drained,
}

/// Outcome of [`drive`]
#[derive(Debug)]
pub(crate) struct Teardown {
    pub(crate) read: Option<Result<ReadEnd>>,
    pub(crate) write: Option<io::Result<WriteEnd>>,
}

impl Teardown {
    /// Bytes to write before shutting the socket down
    pub(crate) fn courtesy(&mut self) -> Option<Bytes> {
        match self.write.take() {
            Some(Ok(WriteEnd::Close(courtesy))) => courtesy,
            _ => None,
        }
    }
}

/// Write queued lines until a close is dequeued or the queue is dropped
pub(crate) async fn write_queue<W>(
    writer: &mut W,
    queue: &mut UnboundedReceiver<Outbound>,
    yield_every: usize,
) -> io::Result<WriteEnd>
where
    W: AsyncWrite + Unpin,
{
    let mut written = 0usize;
    while let Some(item) = queue.recv().await {
        match item {
            Outbound::Line(line) => {
                let Some(bytes) = line.wire_bytes() else {
                    warn!(record = %line, "Dropping unformatted line");
                    continue;
                };
                writer.write_all(bytes).await?;
                written += 1;
                if yield_every > 0 && written % yield_every == 0 {
                    writer.flush().await?;
                    tokio::task::yield_now().await;
                }
            }
            Outbound::Close(courtesy) => {
                trace!(written, "Writer closing");
                writer.flush().await?;
                return Ok(WriteEnd::Close(courtesy));
            }
        }
    }
    writer.flush().await?;
    Ok(WriteEnd::Drained)
}

/// Run a reader and a writer until one stops
///
/// A reader ending with [`ReadEnd::Closing`] waits for the writer to drain.
/// Any other end drops the half still running.
pub(crate) async fn drive<R, W>(reader: R, writer: W) -> Teardown
where
    R: Future<Output = Result<ReadEnd>>,
    W: Future<Output = io::Result<WriteEnd>>,
{
    tokio::pin!(reader);
    tokio::pin!(writer);
    select! {
        read = &mut reader => {
            if matches!(read, Ok(ReadEnd::Closing)) {
                let write = writer.await;
                Teardown { read: Some(read), write: Some(write) }
            } else {
                Teardown { read: Some(read), write: None }
            }
        }
        write = &mut writer => Teardown { read: None, write: Some(write) },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mudproxy_records::{LineStyle, Origin, RecordContext, RecordRegistry, WireLine};
    use std::sync::Arc;
    use tokio::io::AsyncReadExt;
    use tokio::sync::mpsc;

    fn formatted(text: &str) -> WireLine {
        let context = RecordContext::new(Arc::new(RecordRegistry::default()), "test");
        let mut line = WireLine::io(&context, text, Origin::Mud);
        line.format(&LineStyle::plain());
        line
    }

    #[tokio::test]
    async fn writer_drains_until_close() {
        let (mut near, mut far) = tokio::io::duplex(1024);
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(Outbound::Line(formatted("one"))).unwrap();
        tx.send(Outbound::Line(formatted("two"))).unwrap();
        tx.send(Outbound::Close(Some(Bytes::from_static(b"bye")))).unwrap();
        tx.send(Outbound::Line(formatted("never"))).unwrap();

        let end = write_queue(&mut near, &mut rx, 1).await.unwrap();
        assert_eq!(end, WriteEnd::Close(Some(Bytes::from_static(b"bye"))));
        drop(near);

        let mut received = Vec::new();
        far.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"one\r\ntwo\r\n");
    }

    #[tokio::test]
    async fn writer_stops_when_senders_drop() {
        let (mut near, _far) = tokio::io::duplex(64);
        let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();
        drop(tx);
        let end = write_queue(&mut near, &mut rx, 10).await.unwrap();
        assert_eq!(end, WriteEnd::Drained);
    }

    #[tokio::test]
    async fn closing_reader_waits_for_writer() {
        let reader = async { Ok::<_, crate::ProxyError>(ReadEnd::Closing) };
        let writer = async {
            tokio::task::yield_now().await;
            Ok::<_, io::Error>(WriteEnd::Close(None))
        };
        let teardown = drive(reader, writer).await;
        assert!(matches!(teardown.read, Some(Ok(ReadEnd::Closing))));
        assert!(matches!(teardown.write, Some(Ok(WriteEnd::Close(None)))));
    }

    #[tokio::test]
    async fn eof_drops_writer() {
        let reader = async { Ok::<_, crate::ProxyError>(ReadEnd::Eof) };
        let writer = std::future::pending::<io::Result<WriteEnd>>();
        let teardown = drive(reader, writer).await;
        assert!(matches!(teardown.read, Some(Ok(ReadEnd::Eof))));
        assert!(teardown.write.is_none());
    }
}
