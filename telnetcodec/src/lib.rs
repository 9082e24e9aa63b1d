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

//! # MUD Proxy Telnet Codec
//!
//! Wire-level building blocks for a proxy that sits between one MUD server and
//! any number of Telnet clients:
//!
//! - **Command builders**: [`build_command`], [`build_subnegotiation`],
//!   [`advertise_features`] and the fixed [`echo_on`], [`echo_off`] and
//!   [`go_ahead`] sequences.
//! - **Input splitting**: [`split_opcodes_from_input`] separates Telnet
//!   opcodes from printable client input, [`split_telnet_segments`] breaks a
//!   mud line into text runs and command sequences.
//! - **Option answers**: [`handle_opcodes`] replies to `IAC DO <option>`
//!   requests from a [`ResponseTable`].
//! - **Line reading**: [`MudLineCodec`] is a `tokio_util` [`Decoder`] that
//!   understands every line ending MUDs use.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use mudproxy_telnetcodec::{MudLineCodec, split_opcodes_from_input};
//! use tokio::net::TcpStream;
//! use tokio_util::codec::FramedRead;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let stream = TcpStream::connect("127.0.0.1:4000").await?;
//! let mut lines = FramedRead::new(stream, MudLineCodec::new());
//! while let Some(frame) = lines.next().await {
//!     let frame = frame?;
//!     let split = split_opcodes_from_input(&frame.line);
//!     println!("{}", split.input);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! [`Decoder`]: tokio_util::codec::Decoder

#![warn(
    clippy::cargo,
    missing_docs,
    clippy::pedantic,
    future_incompatible,
    rust_2018_idioms
)]
#![allow(
    clippy::option_if_let_else,
    clippy::module_name_repetitions,
    clippy::missing_errors_doc
)]

mod command;
pub mod consts;
mod input;
mod lines;
mod options;
mod result;

pub use self::command::{
    CommandPart, ResponseTable, advertise_features, build_command, build_subnegotiation, echo_off,
    echo_on, go_ahead, handle_opcodes,
};
pub use self::input::{SplitInput, TelnetSegment, split_opcodes_from_input, split_telnet_segments};
pub use self::lines::{LineFrame, MudLineCodec, Terminator};
pub use self::options::TelnetOption;
pub use self::result::{CodecError, CodecResult};
