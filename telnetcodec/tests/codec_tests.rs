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

//! Wire codec tests against the public API

use mudproxy_telnetcodec::{
    CommandPart, ResponseTable, TelnetOption, TelnetSegment, advertise_features, build_command,
    build_subnegotiation, consts, handle_opcodes, split_opcodes_from_input, split_telnet_segments,
};

#[test]
fn subnegotiation_wraps_option_and_text() {
    let sb = build_subnegotiation(&[24u8.into(), "abc".into()]);
    assert_eq!(&sb[..], &[255, 250, 24, b'a', b'b', b'c', 255, 240]);
}

#[test]
fn command_parts_mix() {
    let cmd = build_command(&[
        CommandPart::Byte(consts::SB),
        CommandPart::Byte(consts::option::MSSP),
        CommandPart::Byte(consts::mssp::VAR),
        CommandPart::Text("PLAYERS"),
        CommandPart::Byte(consts::mssp::VAL),
        CommandPart::Number(12),
        CommandPart::Raw(&[consts::IAC, consts::SE]),
    ]);
    let mut expected = vec![255u8, 250, 70, 1];
    expected.extend_from_slice(b"PLAYERS");
    expected.push(2);
    expected.extend_from_slice(b"12");
    expected.extend_from_slice(&[255, 240]);
    assert_eq!(&cmd[..], &expected[..]);
}

#[test]
fn advertised_features_parse_from_names() {
    let features: Vec<TelnetOption> = ["TTYPE", "NAWS", "CHARSET", "EOR", "MSSP"]
        .iter()
        .map(|name| name.parse().unwrap())
        .collect();
    let adv = advertise_features(&features);
    assert_eq!(
        &adv[..],
        &[255, 251, 24, 255, 251, 31, 255, 251, 42, 255, 251, 25, 255, 251, 70]
    );
}

#[test]
fn client_negotiation_round() {
    // A client line carrying a request and some typed text
    let mut data = vec![consts::IAC, consts::DO, consts::option::MSSP];
    data.extend_from_slice(b"score");
    let split = split_opcodes_from_input(&data);
    assert_eq!(split.input, "score");

    let responses = handle_opcodes(&split.opcodes, &ResponseTable::with_mssp_name("mudproxy"));
    assert_eq!(responses.len(), 1);
    assert!(responses[0].starts_with(&[255, 250, 70, 1]));
    assert!(responses[0].ends_with(&[255, 240]));
}

#[test]
fn mud_line_segments() {
    let segments = split_telnet_segments(b"\xff\xfb\x01Password: ");
    assert_eq!(segments.len(), 2);
    assert!(matches!(&segments[0], TelnetSegment::Command(cmd) if &cmd[..] == [255, 251, 1]));
    assert!(matches!(&segments[1], TelnetSegment::Text(text) if &text[..] == b"Password: "));
}
