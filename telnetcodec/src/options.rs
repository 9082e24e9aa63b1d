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

use crate::consts;
use std::fmt;
use std::str::FromStr;

///
/// Telnet options the proxy knows how to advertise and answer for.
///
/// [Telnet Options](https://www.iana.org/assignments/telnet-options/telnet-options.xhtml)
///
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum TelnetOption {
    /// [`consts::option::ECHO`] Telnet Echo Option
    Echo,
    /// [`consts::option::SGA`] Suppress Go Ahead
    SuppressGoAhead,
    /// [`consts::option::TTYPE`] Terminal Type
    TerminalType,
    /// [`consts::option::EOR`] End of Record
    EndOfRecord,
    /// [`consts::option::NAWS`] Negotiate About Window Size
    NAWS,
    /// [`consts::option::CHARSET`] Charset
    Charset,
    /// [`consts::option::MSSP`] MUD Server Status Protocol
    MSSP,
    /// Any other option code
    Unknown(u8),
}

impl TelnetOption {
    /// The option code sent on the wire.
    pub fn code(self) -> u8 {
        u8::from(self)
    }

    /// The canonical feature name used in configuration.
    pub fn name(self) -> &'static str {
        match self {
            TelnetOption::Echo => "ECHO",
            TelnetOption::SuppressGoAhead => "SGA",
            TelnetOption::TerminalType => "TTYPE",
            TelnetOption::EndOfRecord => "EOR",
            TelnetOption::NAWS => "NAWS",
            TelnetOption::Charset => "CHARSET",
            TelnetOption::MSSP => "MSSP",
            TelnetOption::Unknown(_) => "UNKNOWN",
        }
    }
}

impl From<u8> for TelnetOption {
    fn from(value: u8) -> Self {
        match value {
            consts::option::ECHO => TelnetOption::Echo,
            consts::option::SGA => TelnetOption::SuppressGoAhead,
            consts::option::TTYPE => TelnetOption::TerminalType,
            consts::option::EOR => TelnetOption::EndOfRecord,
            consts::option::NAWS => TelnetOption::NAWS,
            consts::option::CHARSET => TelnetOption::Charset,
            consts::option::MSSP => TelnetOption::MSSP,
            other => TelnetOption::Unknown(other),
        }
    }
}

impl From<TelnetOption> for u8 {
    fn from(value: TelnetOption) -> Self {
        match value {
            TelnetOption::Echo => consts::option::ECHO,
            TelnetOption::SuppressGoAhead => consts::option::SGA,
            TelnetOption::TerminalType => consts::option::TTYPE,
            TelnetOption::EndOfRecord => consts::option::EOR,
            TelnetOption::NAWS => consts::option::NAWS,
            TelnetOption::Charset => consts::option::CHARSET,
            TelnetOption::MSSP => consts::option::MSSP,
            TelnetOption::Unknown(code) => code,
        }
    }
}

impl FromStr for TelnetOption {
    type Err = crate::CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ECHO" => Ok(TelnetOption::Echo),
            "SGA" => Ok(TelnetOption::SuppressGoAhead),
            "TTYPE" => Ok(TelnetOption::TerminalType),
            "EOR" => Ok(TelnetOption::EndOfRecord),
            "NAWS" => Ok(TelnetOption::NAWS),
            "CHARSET" => Ok(TelnetOption::Charset),
            "MSSP" => Ok(TelnetOption::MSSP),
            _ => Err(crate::CodecError::UnknownFeature(s.to_string())),
        }
    }
}

impl fmt::Display for TelnetOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelnetOption::Unknown(code) => write!(f, "UNKNOWN({code})"),
            other => f.write_str(other.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::TelnetOption;

    #[test]
    fn option_codes() {
        assert_eq!(TelnetOption::Echo.code(), 1);
        assert_eq!(TelnetOption::TerminalType.code(), 24);
        assert_eq!(TelnetOption::EndOfRecord.code(), 25);
        assert_eq!(TelnetOption::NAWS.code(), 31);
        assert_eq!(TelnetOption::Charset.code(), 42);
        assert_eq!(TelnetOption::MSSP.code(), 70);
        assert_eq!(TelnetOption::from(99), TelnetOption::Unknown(99));
    }

    #[test]
    fn option_names_parse() {
        assert_eq!("naws".parse::<TelnetOption>().unwrap(), TelnetOption::NAWS);
        assert_eq!(" MSSP ".parse::<TelnetOption>().unwrap(), TelnetOption::MSSP);
        assert!("GMCPX".parse::<TelnetOption>().is_err());
    }
}
