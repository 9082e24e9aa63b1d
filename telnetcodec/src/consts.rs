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

//! Telnet protocol byte values used on the wire.

/// Interpret As Command
pub const IAC: u8 = 255;
/// Don't
pub const DONT: u8 = 254;
/// Do
pub const DO: u8 = 253;
/// Won't
pub const WONT: u8 = 252;
/// Will
pub const WILL: u8 = 251;
/// Subnegotiation Begin
pub const SB: u8 = 250;
/// Go Ahead
pub const GA: u8 = 249;
/// Erase Line
pub const EL: u8 = 248;
/// Erase Character
pub const EC: u8 = 247;
/// Are You There
pub const AYT: u8 = 246;
/// Abort Output
pub const AO: u8 = 245;
/// Interrupt Process
pub const IP: u8 = 244;
/// Break
pub const BRK: u8 = 243;
/// Data Mark
pub const DM: u8 = 242;
/// No Operation
pub const NOP: u8 = 241;
/// Subnegotiation End
pub const SE: u8 = 240;
/// End of Record (command form, RFC 885)
pub const EOR: u8 = 239;

/// Carriage Return
pub const CR: u8 = b'\r';
/// Line Feed
pub const LF: u8 = b'\n';
/// Null
pub const NUL: u8 = 0;

/// Returns true for bytes that are Telnet command codes (`EOR` through `IAC`).
#[inline]
pub fn is_command(byte: u8) -> bool {
    byte >= EOR
}

/// Returns true for the four option negotiation verbs.
#[inline]
pub fn is_negotiation(byte: u8) -> bool {
    matches!(byte, WILL | WONT | DO | DONT)
}

/// Telnet option codes
pub mod option {
    /// Echo [RFC857](https://tools.ietf.org/html/rfc857)
    pub const ECHO: u8 = 1;
    /// Suppress Go Ahead [RFC858](https://tools.ietf.org/html/rfc858)
    pub const SGA: u8 = 3;
    /// Terminal Type [RFC1091](http://www.iana.org/go/rfc1091)
    pub const TTYPE: u8 = 24;
    /// End of Record [RFC885](http://www.iana.org/go/rfc885)
    pub const EOR: u8 = 25;
    /// Negotiate About Window Size [RFC1073](http://www.iana.org/go/rfc1073)
    pub const NAWS: u8 = 31;
    /// Charset [RFC2066](http://www.iana.org/go/rfc2066)
    pub const CHARSET: u8 = 42;
    /// MUD Server Status Protocol
    pub const MSSP: u8 = 70;
}

/// MSSP subnegotiation markers
pub mod mssp {
    /// Marks the start of a variable name
    pub const VAR: u8 = 1;
    /// Marks the start of a variable value
    pub const VAL: u8 = 2;
}
