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

//! Separation of Telnet command bytes from printable input.

use crate::consts;
use bytes::{BufMut, Bytes, BytesMut};

///
/// Client input split into Telnet opcodes and printable text.
///
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SplitInput {
    /// Every byte that belonged to a Telnet command sequence
    pub opcodes: Bytes,
    /// Printable ASCII text, with everything else dropped
    pub input: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ScanState {
    Normal,
    Command,
    Option,
    Subnegotiate,
    SubnegotiateIAC,
}

#[inline]
fn is_printable(byte: u8) -> bool {
    byte == b'\t' || (0x20..=0x7E).contains(&byte)
}

/// Split raw input into opcode bytes and printable input.
///
/// The scan never fails. Bytes inside a command sequence (including the
/// option byte after a negotiation verb and the body of a subnegotiation) go
/// to `opcodes` even when they happen to be printable; printable bytes outside
/// of one go to `input`; everything else is dropped. An escaped `IAC IAC` is a
/// data byte and is not printable, so it is dropped as well.
pub fn split_opcodes_from_input(data: &[u8]) -> SplitInput {
    let mut opcodes = BytesMut::new();
    let mut input = String::with_capacity(data.len());
    let mut state = ScanState::Normal;

    for &byte in data {
        state = match (state, byte) {
            (ScanState::Normal, consts::IAC) => {
                opcodes.put_u8(byte);
                ScanState::Command
            }
            (ScanState::Normal, _) if consts::is_command(byte) => {
                opcodes.put_u8(byte);
                ScanState::Normal
            }
            (ScanState::Normal, _) => {
                if is_printable(byte) {
                    input.push(char::from(byte));
                }
                ScanState::Normal
            }
            (ScanState::Command, consts::IAC) => {
                opcodes.truncate(opcodes.len() - 1);
                ScanState::Normal
            }
            (ScanState::Command, consts::SB) => {
                opcodes.put_u8(byte);
                ScanState::Subnegotiate
            }
            (ScanState::Command, _) if consts::is_negotiation(byte) => {
                opcodes.put_u8(byte);
                ScanState::Option
            }
            (ScanState::Command, _) => {
                opcodes.put_u8(byte);
                ScanState::Normal
            }
            (ScanState::Option, _) => {
                opcodes.put_u8(byte);
                ScanState::Normal
            }
            (ScanState::Subnegotiate, consts::IAC) => {
                opcodes.put_u8(byte);
                ScanState::SubnegotiateIAC
            }
            (ScanState::Subnegotiate, _) => {
                opcodes.put_u8(byte);
                ScanState::Subnegotiate
            }
            (ScanState::SubnegotiateIAC, consts::SE) => {
                opcodes.put_u8(byte);
                ScanState::Normal
            }
            (ScanState::SubnegotiateIAC, _) => {
                opcodes.put_u8(byte);
                ScanState::Subnegotiate
            }
        };
    }

    SplitInput {
        opcodes: opcodes.freeze(),
        input,
    }
}

///
/// A run of text or one complete Telnet command sequence.
///
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TelnetSegment {
    /// Data bytes with `IAC IAC` already collapsed to a single `0xFF`
    Text(Bytes),
    /// One command sequence, starting with `IAC`
    Command(Bytes),
}

/// Length of the command sequence starting at `data[0] == IAC`, or the rest
/// of the slice when the sequence is incomplete.
pub(crate) fn command_length(data: &[u8]) -> Option<usize> {
    match data.get(1) {
        None => None,
        Some(&consts::SB) => {
            let mut index = 2;
            while index + 1 < data.len() {
                if data[index] == consts::IAC {
                    if data[index + 1] == consts::SE {
                        return Some(index + 2);
                    }
                    index += 2;
                } else {
                    index += 1;
                }
            }
            None
        }
        Some(&verb) if consts::is_negotiation(verb) => {
            if data.len() >= 3 {
                Some(3)
            } else {
                None
            }
        }
        Some(_) => Some(2),
    }
}

/// Break a mud line into text runs and command sequences, in order.
///
/// Incomplete trailing sequences are returned as a command segment so no byte
/// is ever lost.
pub fn split_telnet_segments(data: &[u8]) -> Vec<TelnetSegment> {
    let mut segments = Vec::new();
    let mut text = BytesMut::new();
    let mut index = 0;

    while index < data.len() {
        if data[index] != consts::IAC {
            text.put_u8(data[index]);
            index += 1;
            continue;
        }
        if data.get(index + 1) == Some(&consts::IAC) {
            text.put_u8(consts::IAC);
            index += 2;
            continue;
        }
        if !text.is_empty() {
            segments.push(TelnetSegment::Text(text.split().freeze()));
        }
        let length = command_length(&data[index..]).unwrap_or(data.len() - index);
        segments.push(TelnetSegment::Command(Bytes::copy_from_slice(
            &data[index..index + length],
        )));
        index += length;
    }

    if !text.is_empty() {
        segments.push(TelnetSegment::Text(text.freeze()));
    }
    segments
}
