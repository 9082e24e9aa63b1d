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

//! A single line of data moving through the proxy

use crate::update::{UpdateEntry, UpdateFlag};
use crate::{RecordContext, RecordError, RecordHeader, RecordKind, RecordResult, TrackedRecord};
use bytes::{BufMut, Bytes, BytesMut};
use std::borrow::Cow;
use std::fmt;
use tracing::{error, warn};

const IAC: u8 = 255;
const GA: u8 = 249;

/// Line data, either decoded text or raw bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// UTF-8 text
    Text(String),
    /// Raw bytes, as read off the wire
    Bytes(Bytes),
}

impl Payload {
    /// Payload as bytes
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Payload::Text(text) => text.as_bytes(),
            Payload::Bytes(bytes) => bytes,
        }
    }

    /// Payload as text, replacing invalid UTF-8
    pub fn to_text(&self) -> Cow<'_, str> {
        match self {
            Payload::Text(text) => Cow::Borrowed(text),
            Payload::Bytes(bytes) => String::from_utf8_lossy(bytes),
        }
    }

    /// Whether the payload holds text
    pub fn is_text(&self) -> bool {
        matches!(self, Payload::Text(_))
    }

    /// Length in bytes
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Payload::Text(value)
    }
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Payload::Text(value.to_string())
    }
}

impl From<Bytes> for Payload {
    fn from(value: Bytes) -> Self {
        Payload::Bytes(value)
    }
}

impl From<&[u8]> for Payload {
    fn from(value: &[u8]) -> Self {
        Payload::Bytes(Bytes::copy_from_slice(value))
    }
}

impl From<Vec<u8>> for Payload {
    fn from(value: Vec<u8>) -> Self {
        Payload::Bytes(Bytes::from(value))
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

/// Where a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    /// Read from the mud
    Mud,
    /// Read from a client
    Client,
    /// Generated by the proxy itself
    Internal,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Mud => write!(f, "mud"),
            Origin::Client => write!(f, "client"),
            Origin::Internal => write!(f, "internal"),
        }
    }
}

/// What a line carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LineKind {
    /// Text for a human
    Io,
    /// A telnet command sequence, sent verbatim
    TelnetCommand,
}

/// Presentation settings applied when a line is formatted for the wire
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineStyle {
    /// Tag prepended to lines flagged with a preamble
    pub preamble: String,
    /// 256-color index of the preamble
    pub preamble_color: u8,
}

impl LineStyle {
    /// Style with a preamble
    pub fn new(preamble: impl Into<String>, preamble_color: u8) -> Self {
        Self {
            preamble: preamble.into(),
            preamble_color,
        }
    }

    /// Style that adds nothing, used towards the mud
    pub fn plain() -> Self {
        Self::default()
    }
}

fn has_terminator(bytes: &[u8]) -> bool {
    bytes.iter().any(|byte| matches!(byte, b'\r' | b'\n'))
}

fn push_colored(out: &mut BytesMut, color: u8, body: &[u8]) {
    out.put_slice(format!("\x1b[38;5;{color}m").as_bytes());
    out.put_slice(body);
    out.put_slice(b"\x1b[0m");
}

///
/// One logical line of data, wrapped in a tracked record.
///
/// Control flags may be changed freely until [`WireLine::lock`] is called by
/// the send stage; after that every setter returns [`RecordError::Locked`].
///
#[derive(Debug, Clone)]
pub struct WireLine {
    header: RecordHeader,
    payload: Payload,
    original: Payload,
    origin: Origin,
    kind: LineKind,
    had_line_endings: bool,
    preamble: bool,
    prelogin: bool,
    color: Option<u8>,
    command_echo: bool,
    send: bool,
    is_prompt: bool,
    was_sent: bool,
    locked: bool,
    formatted: Option<Bytes>,
}

impl WireLine {
    fn build(context: &RecordContext, payload: Payload, origin: Origin, kind: LineKind) -> Self {
        let internal = origin == Origin::Internal;
        Self {
            header: RecordHeader::new(context, RecordKind::WIRE_LINE),
            original: payload.clone(),
            payload,
            origin,
            kind,
            had_line_endings: true,
            preamble: internal,
            prelogin: false,
            color: None,
            command_echo: false,
            send: true,
            is_prompt: false,
            was_sent: false,
            locked: false,
            formatted: None,
        }
    }

    /// A line of text or data.
    ///
    /// A line read from a peer must already have had its terminator removed;
    /// one that still contains `\r` or `\n` is logged as an error but kept.
    pub fn io(context: &RecordContext, payload: impl Into<Payload>, origin: Origin) -> Self {
        let line = Self::build(context, payload.into(), origin, LineKind::Io);
        if origin != Origin::Internal && has_terminator(line.payload.as_bytes()) {
            error!(
                record = %line.id(),
                %origin,
                payload = %line.payload,
                "Line contains embedded line endings"
            );
        }
        line
    }

    /// A telnet command line. The payload must be bytes starting with IAC.
    pub fn command(
        context: &RecordContext,
        payload: impl Into<Payload>,
        origin: Origin,
    ) -> RecordResult<Self> {
        match payload.into() {
            Payload::Bytes(bytes) if bytes.first() == Some(&IAC) => {
                let mut line =
                    Self::build(context, Payload::Bytes(bytes), origin, LineKind::TelnetCommand);
                line.had_line_endings = false;
                line.preamble = false;
                Ok(line)
            }
            Payload::Bytes(_) => Err(RecordError::InvalidPayload(
                "telnet command must start with IAC".to_string(),
            )),
            Payload::Text(_) => Err(RecordError::InvalidPayload(
                "telnet command must be raw bytes".to_string(),
            )),
        }
    }

    /// Whether the line ended with a terminator when it was read
    #[must_use]
    pub fn with_line_endings(mut self, had_line_endings: bool) -> Self {
        self.had_line_endings = had_line_endings;
        self
    }

    /// Whether the proxy preamble is prepended
    #[must_use]
    pub fn with_preamble(mut self, preamble: bool) -> Self {
        self.preamble = preamble;
        self
    }

    /// Whether clients that have not logged in may receive the line
    #[must_use]
    pub fn with_prelogin(mut self, prelogin: bool) -> Self {
        self.prelogin = prelogin;
        self
    }

    /// Override color of the text
    #[must_use]
    pub fn with_color(mut self, color: Option<u8>) -> Self {
        self.color = color;
        self
    }

    /// Mark the line as an echo of a command another client typed
    #[must_use]
    pub fn with_command_echo(mut self, command_echo: bool) -> Self {
        self.command_echo = command_echo;
        self
    }

    /// Mark the line as a prompt
    #[must_use]
    pub fn with_prompt(mut self, is_prompt: bool) -> Self {
        self.is_prompt = is_prompt;
        self
    }

    /// Current payload
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Payload as it was when the line was created
    pub fn original(&self) -> &Payload {
        &self.original
    }

    /// Current payload as text
    pub fn text(&self) -> Cow<'_, str> {
        self.payload.to_text()
    }

    /// Where the line came from
    pub fn origin(&self) -> Origin {
        self.origin
    }

    /// What the line carries
    pub fn kind(&self) -> LineKind {
        self.kind
    }

    /// Whether this is plain IO
    pub fn is_io(&self) -> bool {
        self.kind == LineKind::Io
    }

    /// Whether this is a telnet command
    pub fn is_command(&self) -> bool {
        self.kind == LineKind::TelnetCommand
    }

    /// Whether the line ended with a terminator when it was read
    pub fn had_line_endings(&self) -> bool {
        self.had_line_endings
    }

    /// Whether the proxy preamble is prepended
    pub fn preamble(&self) -> bool {
        self.preamble
    }

    /// Whether clients that have not logged in may receive the line
    pub fn prelogin(&self) -> bool {
        self.prelogin
    }

    /// Override color
    pub fn color(&self) -> Option<u8> {
        self.color
    }

    /// Whether the line echoes another client's command
    pub fn command_echo(&self) -> bool {
        self.command_echo
    }

    /// Whether the line will be transmitted
    pub fn send(&self) -> bool {
        self.send
    }

    /// Whether the line is a prompt
    pub fn is_prompt(&self) -> bool {
        self.is_prompt
    }

    /// Whether the line was handed to a connection
    pub fn was_sent(&self) -> bool {
        self.was_sent
    }

    /// Whether the line is frozen
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    fn check_unlocked(&self, attribute: &'static str) -> RecordResult<()> {
        if self.locked {
            warn!(record = %self.id(), attribute, "Write to locked line rejected");
            return Err(RecordError::Locked {
                id: self.id(),
                attribute,
            });
        }
        Ok(())
    }

    /// Replace the payload
    pub fn set_payload(&mut self, payload: impl Into<Payload>) -> RecordResult<()> {
        self.check_unlocked("payload")?;
        let payload = payload.into();
        if payload != self.payload {
            self.header.add_update(
                UpdateEntry::new(UpdateFlag::Modify, "payload changed")
                    .with_extra("from", self.payload.to_text())
                    .with_extra("to", payload.to_text()),
            );
            self.payload = payload;
        }
        Ok(())
    }

    /// Allow or veto transmission
    pub fn set_send(&mut self, send: bool) -> RecordResult<()> {
        self.check_unlocked("send")?;
        self.set_flag("send", send);
        self.send = send;
        Ok(())
    }

    /// Set the override color
    pub fn set_color(&mut self, color: Option<u8>) -> RecordResult<()> {
        self.check_unlocked("color")?;
        self.header.add_update(UpdateEntry::new(
            UpdateFlag::SetFlag,
            format!("color set to {color:?}"),
        ));
        self.color = color;
        Ok(())
    }

    /// Set whether the proxy preamble is prepended
    pub fn set_preamble(&mut self, preamble: bool) -> RecordResult<()> {
        self.check_unlocked("preamble")?;
        self.set_flag("preamble", preamble);
        self.preamble = preamble;
        Ok(())
    }

    /// Set whether clients that have not logged in may receive the line
    pub fn set_prelogin(&mut self, prelogin: bool) -> RecordResult<()> {
        self.check_unlocked("prelogin")?;
        self.set_flag("prelogin", prelogin);
        self.prelogin = prelogin;
        Ok(())
    }

    /// Set whether the line is a prompt
    pub fn set_is_prompt(&mut self, is_prompt: bool) -> RecordResult<()> {
        self.check_unlocked("is_prompt")?;
        self.set_flag("is_prompt", is_prompt);
        self.is_prompt = is_prompt;
        Ok(())
    }

    fn set_flag(&mut self, name: &str, value: bool) {
        self.header.add_update(UpdateEntry::new(
            UpdateFlag::SetFlag,
            format!("{name} set to {value}"),
        ));
    }

    /// Freeze payload and control flags
    pub fn lock(&mut self) {
        if !self.locked {
            self.locked = true;
            self.header.info("locked");
        }
    }

    /// Render the line as it goes on the wire and keep the result.
    ///
    /// Commands are sent verbatim. IO lines get IAC doubled, the preamble,
    /// the override color, `\r\n` when the line had an ending and IAC GA
    /// when it is a prompt.
    pub fn format(&mut self, style: &LineStyle) -> Bytes {
        let bytes = match self.kind {
            LineKind::TelnetCommand => Bytes::copy_from_slice(self.payload.as_bytes()),
            LineKind::Io => self.format_io(style),
        };
        self.formatted = Some(bytes.clone());
        bytes
    }

    fn format_io(&self, style: &LineStyle) -> Bytes {
        let raw = self.payload.as_bytes();
        let mut body = BytesMut::with_capacity(raw.len() + 2);
        for &byte in raw {
            if byte == IAC {
                body.put_u8(IAC);
            }
            body.put_u8(byte);
        }

        let mut out = BytesMut::with_capacity(body.len() + style.preamble.len() + 32);
        if self.preamble && !style.preamble.is_empty() {
            push_colored(&mut out, style.preamble_color, style.preamble.as_bytes());
            out.put_u8(b' ');
        }
        match self.color {
            Some(color) => push_colored(&mut out, color, &body),
            None => out.put_slice(&body),
        }
        if self.had_line_endings {
            out.put_slice(b"\r\n");
        }
        if self.is_prompt {
            out.put_slice(&[IAC, GA]);
        }
        out.freeze()
    }

    /// Bytes produced by the last [`WireLine::format`]
    pub fn wire_bytes(&self) -> Option<&Bytes> {
        self.formatted.as_ref()
    }

    /// Record that the line was handed to a connection
    pub fn mark_sent(&mut self) {
        self.was_sent = true;
        self.header.info("sent");
    }
}

impl TrackedRecord for WireLine {
    fn header(&self) -> &RecordHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut RecordHeader {
        &mut self.header
    }
}

impl fmt::Display for WireLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            LineKind::Io => write!(f, "{}", self.payload),
            LineKind::TelnetCommand => write!(f, "{:?}", self.payload.as_bytes()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RecordRegistry;
    use std::sync::Arc;
    use tracing_test::traced_test;

    fn context() -> RecordContext {
        RecordContext::new(Arc::new(RecordRegistry::default()), "test")
    }

    #[test]
    fn io_line_defaults() {
        let line = WireLine::io(&context(), "look", Origin::Client);
        assert!(line.is_io());
        assert!(line.send());
        assert!(line.had_line_endings());
        assert!(!line.preamble());
        assert!(!line.was_sent());
        assert_eq!(line.text(), "look");

        let internal = WireLine::io(&context(), "Welcome", Origin::Internal);
        assert!(internal.preamble());
    }

    #[test]
    fn command_requires_iac_bytes() {
        let ctx = context();
        assert!(WireLine::command(&ctx, vec![IAC, GA], Origin::Mud).is_ok());
        assert!(matches!(
            WireLine::command(&ctx, "look", Origin::Mud),
            Err(RecordError::InvalidPayload(_))
        ));
        assert!(matches!(
            WireLine::command(&ctx, vec![b'x'], Origin::Mud),
            Err(RecordError::InvalidPayload(_))
        ));
    }

    #[test]
    fn writes_after_lock_are_rejected() {
        let mut line = WireLine::io(&context(), "north", Origin::Client);
        line.set_payload("south").unwrap();
        line.lock();
        let err = line.set_send(false).unwrap_err();
        assert!(matches!(err, RecordError::Locked { attribute: "send", .. }));
        assert!(line.set_payload("east").is_err());
        assert!(line.send());
        assert_eq!(line.text(), "south");
        assert_eq!(line.original().to_text(), "north");
    }

    #[test]
    fn payload_changes_are_logged() {
        let mut line = WireLine::io(&context(), "a", Origin::Mud);
        line.set_payload("b").unwrap();
        line.set_payload("b").unwrap();
        let entry = line.header().updates().last().unwrap();
        assert_eq!(entry.flag(), UpdateFlag::Modify);
        assert_eq!(line.header().updates().len(), 1);
    }

    #[test]
    fn format_io() {
        let mut line = WireLine::io(&context(), &b"a\xffb"[..], Origin::Mud);
        assert_eq!(line.format(&LineStyle::plain()).as_ref(), b"a\xff\xffb\r\n");

        let mut prompt = WireLine::io(&context(), "HP:10>", Origin::Mud)
            .with_line_endings(false)
            .with_prompt(true);
        assert_eq!(prompt.format(&LineStyle::plain()).as_ref(), b"HP:10>\xff\xf9");
    }

    #[test]
    fn format_preamble_and_color() {
        let style = LineStyle::new("#BP", 39);
        let mut line = WireLine::io(&context(), "hello", Origin::Internal).with_color(Some(2));
        assert_eq!(
            line.format(&style).as_ref(),
            b"\x1b[38;5;39m#BP\x1b[0m \x1b[38;5;2mhello\x1b[0m\r\n"
        );
        assert!(line.wire_bytes().is_some());
    }

    #[test]
    fn format_command_is_verbatim() {
        let mut line = WireLine::command(&context(), vec![IAC, 251, 1], Origin::Internal).unwrap();
        assert_eq!(line.format(&LineStyle::new("#BP", 39)).as_ref(), &[IAC, 251, 1]);
    }

    #[traced_test]
    #[test]
    fn embedded_line_endings_are_logged_not_rejected() {
        let line = WireLine::io(&context(), "two\r\nlines", Origin::Mud);
        assert_eq!(line.text(), "two\r\nlines");
        assert!(logs_contain("Line contains embedded line endings"));
    }

    #[traced_test]
    #[test]
    fn internal_lines_may_contain_line_endings() {
        WireLine::io(&context(), "one\r\ntwo", Origin::Internal);
        assert!(!logs_contain("embedded line endings"));
    }

    #[traced_test]
    #[test]
    fn locked_writes_are_logged() {
        let mut line = WireLine::io(&context(), "say hi", Origin::Client);
        line.lock();
        assert_eq!(
            line.set_color(Some(1)),
            Err(RecordError::Locked {
                id: line.id(),
                attribute: "color"
            })
        );
        assert!(logs_contain("Write to locked line rejected"));
    }
}
