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

//! Builders for Telnet command and subnegotiation byte sequences.

use crate::{TelnetOption, consts};
use bytes::{BufMut, Bytes, BytesMut};
use std::collections::BTreeMap;
use tracing::{debug, trace};

///
/// One piece of a Telnet command sequence.
///
/// `u8` values are emitted as raw bytes so option codes land on the wire
/// unchanged, while wider integers are written as ASCII digits the way MSSP
/// and similar text-valued subnegotiations expect them.
///
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandPart<'a> {
    /// A single raw byte
    Byte(u8),
    /// An integer written as ASCII digits
    Number(u32),
    /// ASCII/UTF-8 text
    Text(&'a str),
    /// Raw bytes copied verbatim
    Raw(&'a [u8]),
}

impl CommandPart<'_> {
    fn write_to(&self, dst: &mut BytesMut) {
        match self {
            CommandPart::Byte(byte) => dst.put_u8(*byte),
            CommandPart::Number(number) => dst.put_slice(number.to_string().as_bytes()),
            CommandPart::Text(text) => dst.put_slice(text.as_bytes()),
            CommandPart::Raw(raw) => dst.put_slice(raw),
        }
    }
}

impl From<u8> for CommandPart<'_> {
    fn from(value: u8) -> Self {
        CommandPart::Byte(value)
    }
}

impl From<u16> for CommandPart<'_> {
    fn from(value: u16) -> Self {
        CommandPart::Number(u32::from(value))
    }
}

impl From<u32> for CommandPart<'_> {
    fn from(value: u32) -> Self {
        CommandPart::Number(value)
    }
}

impl From<TelnetOption> for CommandPart<'_> {
    fn from(value: TelnetOption) -> Self {
        CommandPart::Byte(value.code())
    }
}

impl<'a> From<&'a str> for CommandPart<'a> {
    fn from(value: &'a str) -> Self {
        CommandPart::Text(value)
    }
}

impl<'a> From<&'a [u8]> for CommandPart<'a> {
    fn from(value: &'a [u8]) -> Self {
        CommandPart::Raw(value)
    }
}

/// Concatenate `parts` behind a leading `IAC`.
///
/// ```
/// use mudproxy_telnetcodec::{build_command, consts};
///
/// let cmd = build_command(&[consts::WILL.into(), consts::option::NAWS.into()]);
/// assert_eq!(&cmd[..], &[255, 251, 31]);
/// ```
pub fn build_command(parts: &[CommandPart<'_>]) -> Bytes {
    let mut dst = BytesMut::with_capacity(1 + parts.len() * 2);
    dst.put_u8(consts::IAC);
    for part in parts {
        part.write_to(&mut dst);
    }
    dst.freeze()
}

/// Wrap `parts` in `IAC SB ... IAC SE`.
pub fn build_subnegotiation(parts: &[CommandPart<'_>]) -> Bytes {
    let mut dst = BytesMut::with_capacity(4 + parts.len() * 2);
    dst.put_slice(&[consts::IAC, consts::SB]);
    for part in parts {
        part.write_to(&mut dst);
    }
    dst.put_slice(&[consts::IAC, consts::SE]);
    dst.freeze()
}

/// `IAC WILL ECHO`: the proxy takes over echoing, so the client hides input.
pub fn echo_on() -> Bytes {
    Bytes::from_static(&[consts::IAC, consts::WILL, consts::option::ECHO])
}

/// `IAC WONT ECHO`: hand local echo back to the client.
pub fn echo_off() -> Bytes {
    Bytes::from_static(&[consts::IAC, consts::WONT, consts::option::ECHO])
}

/// `IAC GA`
pub fn go_ahead() -> Bytes {
    Bytes::from_static(&[consts::IAC, consts::GA])
}

/// Emit `IAC WILL <code>` once for every feature, in order.
pub fn advertise_features(features: &[TelnetOption]) -> Bytes {
    let mut dst = BytesMut::with_capacity(features.len() * 3);
    for feature in features {
        trace!(feature = %feature, "Advertising feature");
        dst.put_slice(&[consts::IAC, consts::WILL, feature.code()]);
    }
    dst.freeze()
}

///
/// Subnegotiation bodies the proxy sends when a peer asks `IAC DO <option>`.
///
#[derive(Clone, Debug, Default)]
pub struct ResponseTable {
    entries: BTreeMap<u8, Bytes>,
}

impl ResponseTable {
    /// An empty table; every request is ignored.
    pub fn new() -> Self {
        Self::default()
    }

    /// A table answering MSSP requests with the proxy name.
    pub fn with_mssp_name(name: &str) -> Self {
        let mut body = BytesMut::new();
        body.put_u8(consts::mssp::VAR);
        body.put_slice(b"NAME");
        body.put_u8(consts::mssp::VAL);
        body.put_slice(name.as_bytes());
        let mut table = Self::new();
        table.insert(TelnetOption::MSSP, body.freeze());
        table
    }

    /// Register the body sent in reply to `IAC DO <option>`.
    pub fn insert(&mut self, option: TelnetOption, body: Bytes) {
        self.entries.insert(option.code(), body);
    }

    /// Look up the body registered for an option code.
    pub fn get(&self, code: u8) -> Option<&Bytes> {
        self.entries.get(&code)
    }

    /// Number of registered options
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no options are registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Answer the opcode bytes received from a peer.
///
/// The input is split on `IAC`; every chunk of the form `DO <option>` whose
/// option has a table entry produces one `IAC SB <option> <body> IAC SE`
/// response. Chunks that are empty, malformed or unknown are skipped.
pub fn handle_opcodes(opcodes: &[u8], table: &ResponseTable) -> Vec<Bytes> {
    opcodes
        .split(|byte| *byte == consts::IAC)
        .filter_map(|chunk| match chunk {
            [consts::DO, option, ..] => match table.get(*option) {
                Some(body) => {
                    debug!(option = %TelnetOption::from(*option), "Answering option request");
                    Some(build_subnegotiation(&[
                        CommandPart::Byte(*option),
                        CommandPart::Raw(body),
                    ]))
                }
                None => None,
            },
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_has_leading_iac() {
        let cmd = build_command(&[consts::DO.into(), TelnetOption::TerminalType.into()]);
        assert_eq!(&cmd[..], &[255, 253, 24]);
    }

    #[test]
    fn subnegotiation_framing() {
        let sb = build_subnegotiation(&[24u8.into(), "abc".into()]);
        assert_eq!(&sb[..2], &[255, 250]);
        assert_eq!(&sb[sb.len() - 2..], &[255, 240]);
        assert_eq!(&sb[2..sb.len() - 2], &[24, b'a', b'b', b'c']);
    }

    #[test]
    fn numbers_are_ascii_digits() {
        let sb = build_subnegotiation(&[70u8.into(), 4000u32.into()]);
        assert_eq!(&sb[2..sb.len() - 2], b"F4000");
    }

    #[test]
    fn fixed_sequences() {
        assert_eq!(&echo_on()[..], &[255, 251, 1]);
        assert_eq!(&echo_off()[..], &[255, 252, 1]);
        assert_eq!(&go_ahead()[..], &[255, 249]);
    }

    #[test]
    fn advertise_each_feature_once() {
        let adv = advertise_features(&[TelnetOption::NAWS, TelnetOption::MSSP]);
        assert_eq!(&adv[..], &[255, 251, 31, 255, 251, 70]);
        assert!(advertise_features(&[]).is_empty());
    }

    #[test]
    fn handle_opcodes_answers_known_requests() {
        let table = ResponseTable::with_mssp_name("proxy");
        let responses = handle_opcodes(
            &[consts::IAC, consts::DO, 70, consts::IAC, consts::DO, 31],
            &table,
        );
        assert_eq!(responses.len(), 1);
        let mut expected = vec![255u8, 250, 70, 1];
        expected.extend_from_slice(b"NAME");
        expected.push(2);
        expected.extend_from_slice(b"proxy");
        expected.extend_from_slice(&[255, 240]);
        assert_eq!(&responses[0][..], &expected[..]);
    }

    #[test]
    fn handle_opcodes_skips_garbage() {
        let table = ResponseTable::with_mssp_name("proxy");
        assert!(handle_opcodes(&[], &table).is_empty());
        assert!(handle_opcodes(&[consts::IAC], &table).is_empty());
        assert!(handle_opcodes(&[consts::IAC, consts::DO], &table).is_empty());
        assert!(handle_opcodes(&[consts::IAC, consts::WILL, 70], &table).is_empty());
    }
}
