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

//! Ordered batches of lines

use crate::{
    Origin, Payload, RecordContext, RecordError, RecordHeader, RecordKind, RecordResult,
    TrackedRecord, WireLine,
};
use tracing::warn;

const IAC: u8 = 255;

///
/// An ordered sequence of [`WireLine`]s. Order of insertion is the order of
/// transmission.
///
/// Every line pushed is linked to the batch in the registry, and lines the
/// batch creates itself take the batch as their parent.
///
#[derive(Debug)]
pub struct WireBatch {
    header: RecordHeader,
    context: RecordContext,
    lines: Vec<WireLine>,
    locked: bool,
}

impl WireBatch {
    /// Create an empty batch
    pub fn new(context: &RecordContext) -> Self {
        let header = RecordHeader::new(context, RecordKind::WIRE_BATCH);
        let context = context.child_of(header.id());
        Self {
            header,
            context,
            lines: Vec::new(),
            locked: false,
        }
    }

    /// Context for records created on behalf of this batch
    pub fn context(&self) -> &RecordContext {
        &self.context
    }

    fn check_unlocked(&self) -> RecordResult<()> {
        if self.locked {
            warn!(record = %self.id(), "Push to locked batch rejected");
            return Err(RecordError::Locked {
                id: self.id(),
                attribute: "lines",
            });
        }
        Ok(())
    }

    /// Append a line
    pub fn push(&mut self, line: WireLine) -> RecordResult<()> {
        self.check_unlocked()?;
        self.context.registry().link(self.id(), line.id());
        self.lines.push(line);
        Ok(())
    }

    /// Wrap a payload into a line and append it.
    ///
    /// Bytes starting with IAC become a telnet command, anything else IO.
    pub fn push_payload(
        &mut self,
        payload: impl Into<Payload>,
        origin: Origin,
    ) -> RecordResult<()> {
        self.check_unlocked()?;
        let payload = payload.into();
        let is_command = matches!(&payload, Payload::Bytes(bytes) if bytes.first() == Some(&IAC));
        let line = if is_command {
            WireLine::command(&self.context, payload, origin)?
        } else {
            WireLine::io(&self.context, payload, origin)
        };
        self.push(line)
    }

    /// Wrap text into an IO line and append it
    pub fn push_text(&mut self, text: impl Into<String>, origin: Origin) -> RecordResult<()> {
        self.push_payload(Payload::Text(text.into()), origin)
    }

    /// Freeze the batch and every line in it
    pub fn lock(&mut self) {
        if !self.locked {
            self.locked = true;
            for line in &mut self.lines {
                line.lock();
            }
            self.header.info("locked");
        }
    }

    /// Whether the batch is frozen
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Number of lines
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Whether the batch is empty
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Lines in order
    pub fn iter(&self) -> std::slice::Iter<'_, WireLine> {
        self.lines.iter()
    }

    /// Mutable lines in order. Locked lines still refuse writes.
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, WireLine> {
        self.lines.iter_mut()
    }

    /// Remove every line from an unlocked batch
    pub fn take_lines(&mut self) -> RecordResult<Vec<WireLine>> {
        self.check_unlocked()?;
        Ok(std::mem::take(&mut self.lines))
    }

    /// Replace the contents of an unlocked batch
    pub fn replace_lines(&mut self, lines: Vec<WireLine>) -> RecordResult<()> {
        self.check_unlocked()?;
        self.lines.clear();
        for line in lines {
            self.push(line)?;
        }
        Ok(())
    }

    /// Consume the batch, returning its lines
    pub fn into_lines(self) -> Vec<WireLine> {
        self.lines
    }

    /// Store the batch and its lines in the registry as they are now
    pub fn archive(&self) {
        let registry = self.context.registry();
        registry.archive(&self.header);
        for line in &self.lines {
            line.archive(registry);
        }
    }
}

impl TrackedRecord for WireBatch {
    fn header(&self) -> &RecordHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut RecordHeader {
        &mut self.header
    }
}

impl<'a> IntoIterator for &'a WireBatch {
    type Item = &'a WireLine;
    type IntoIter = std::slice::Iter<'a, WireLine>;

    fn into_iter(self) -> Self::IntoIter {
        self.lines.iter()
    }
}

impl IntoIterator for WireBatch {
    type Item = WireLine;
    type IntoIter = std::vec::IntoIter<WireLine>;

    fn into_iter(self) -> Self::IntoIter {
        self.lines.into_iter()
    }
}
