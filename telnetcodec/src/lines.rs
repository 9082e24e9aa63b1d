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

//! Line assembly for MUD-style streams.
//!
//! MUD servers and clients disagree about line endings. [`MudLineCodec`]
//! accepts all five conventions seen in the wild (`\r\n`, `\n\r`, `\r\0`, a
//! bare `\r` and a bare `\n`) and emits one [`LineFrame`] per logical line.
//!
//! When several delimiters could end the current line the earliest one wins,
//! and at the same position the longest one wins, so `\r\n` is never read as
//! a bare `\r` followed by an empty line. A partial line still buffered at
//! end of stream is delivered by [`Decoder::decode_eof`] instead of being
//! dropped.

use crate::CodecError;
use crate::consts::{self, CR, LF, NUL};
use crate::input::command_length;
use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::Decoder;

/// What ended a [`LineFrame`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Terminator {
    /// `\r\n`
    CrLf,
    /// `\n\r`
    LfCr,
    /// `\r\0`
    CrNul,
    /// A bare `\r`
    Cr,
    /// A bare `\n`
    Lf,
    /// `IAC GA`, only in telnet-aware mode
    GoAhead,
    /// `IAC EOR`, only in telnet-aware mode
    EndOfRecord,
    /// End of stream with no delimiter
    Eof,
}

impl Terminator {
    /// Whether the line was ended by a line ending (as opposed to a prompt
    /// marker or the end of the stream).
    pub fn is_line_ending(self) -> bool {
        matches!(
            self,
            Terminator::CrLf | Terminator::LfCr | Terminator::CrNul | Terminator::Cr | Terminator::Lf
        )
    }

    /// Whether the line was a prompt (`IAC GA` or `IAC EOR`).
    pub fn is_prompt(self) -> bool {
        matches!(self, Terminator::GoAhead | Terminator::EndOfRecord)
    }

    /// The byte that would have completed a two byte delimiter, if a split
    /// read could have cut one in half.
    fn completions(self) -> &'static [u8] {
        match self {
            Terminator::Cr => &[LF, NUL],
            Terminator::Lf => &[CR],
            _ => &[],
        }
    }

    fn len(self) -> usize {
        match self {
            Terminator::Cr | Terminator::Lf => 1,
            Terminator::Eof => 0,
            _ => 2,
        }
    }
}

/// One logical line, without its delimiter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineFrame {
    /// Line content
    pub line: Bytes,
    /// What ended the line
    pub terminator: Terminator,
}

enum Scan {
    Found(usize, Terminator),
    Pending(usize),
}

///
/// A [`Decoder`] yielding [`LineFrame`]s.
///
/// In telnet-aware mode (used on the mud side) complete `IAC` sequences are
/// skipped while searching for delimiters, so option bytes inside a
/// subnegotiation never end a line, and `IAC GA` / `IAC EOR` end a prompt.
///
#[derive(Clone, Debug, Default)]
pub struct MudLineCodec {
    telnet_aware: bool,
    next_index: usize,
    pending: Option<Terminator>,
}

impl MudLineCodec {
    /// A plain line reader, used for client input.
    pub fn new() -> Self {
        Self::default()
    }

    /// A reader that understands Telnet command sequences and prompt markers.
    pub fn telnet_aware() -> Self {
        Self {
            telnet_aware: true,
            ..Self::default()
        }
    }

    /// Whether this codec skips Telnet command sequences.
    pub fn is_telnet_aware(&self) -> bool {
        self.telnet_aware
    }

    fn scan(&self, buf: &[u8]) -> Scan {
        let mut index = self.next_index;
        while index < buf.len() {
            match buf[index] {
                CR => {
                    let terminator = match buf.get(index + 1) {
                        Some(&LF) => Terminator::CrLf,
                        Some(&NUL) => Terminator::CrNul,
                        _ => Terminator::Cr,
                    };
                    return Scan::Found(index, terminator);
                }
                LF => {
                    let terminator = match buf.get(index + 1) {
                        Some(&CR) => Terminator::LfCr,
                        _ => Terminator::Lf,
                    };
                    return Scan::Found(index, terminator);
                }
                consts::IAC if self.telnet_aware => match buf.get(index + 1) {
                    None => return Scan::Pending(index),
                    Some(&consts::GA) => return Scan::Found(index, Terminator::GoAhead),
                    Some(&consts::EOR) => return Scan::Found(index, Terminator::EndOfRecord),
                    Some(&consts::IAC) => index += 2,
                    Some(_) => match command_length(&buf[index..]) {
                        Some(length) => index += length,
                        None => return Scan::Pending(index),
                    },
                },
                _ => index += 1,
            }
        }
        Scan::Pending(buf.len())
    }
}

impl Decoder for MudLineCodec {
    type Item = LineFrame;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<LineFrame>, CodecError> {
        if let Some(previous) = self.pending {
            match src.first() {
                None => return Ok(None),
                Some(byte) => {
                    if previous.completions().contains(byte) {
                        src.advance(1);
                    }
                    self.pending = None;
                }
            }
        }

        match self.scan(src) {
            Scan::Found(position, terminator) => {
                let line = src.split_to(position).freeze();
                src.advance(terminator.len());
                self.next_index = 0;
                if src.is_empty() && !terminator.completions().is_empty() {
                    self.pending = Some(terminator);
                }
                Ok(Some(LineFrame { line, terminator }))
            }
            Scan::Pending(resume) => {
                self.next_index = resume;
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<LineFrame>, CodecError> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        self.next_index = 0;
        self.pending = None;
        if src.is_empty() {
            Ok(None)
        } else {
            Ok(Some(LineFrame {
                line: src.split().freeze(),
                terminator: Terminator::Eof,
            }))
        }
    }
}
