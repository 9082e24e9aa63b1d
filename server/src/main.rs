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

//! Command line entry point of the MUD proxy

#![warn(clippy::pedantic, future_incompatible, rust_2018_idioms)]

use clap::Parser;
use mudproxy_service::{ProxyConfig, ProxyServer};
use mudproxy_telnetcodec::TelnetOption;
use std::net::SocketAddr;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Keeps one connection to a MUD open and shares it with any number of
/// Telnet clients
#[derive(Debug, Parser)]
#[command(name = "mudproxy", version, about)]
struct Args {
    /// Address clients connect to
    #[arg(long, default_value = "0.0.0.0:9999")]
    listen: SocketAddr,

    /// Mud host name or address
    #[arg(long, default_value = "localhost")]
    mud_host: String,

    /// Mud port
    #[arg(long, default_value_t = 4000)]
    mud_port: u16,

    /// Password clients give to control the proxy
    #[arg(long, env = "MUDPROXY_PASSWORD", default_value = "defaultpass")]
    password: String,

    /// Password clients give to watch without sending input
    #[arg(long, env = "MUDPROXY_VIEW_PASSWORD")]
    view_password: Option<String>,

    /// Splits one line of input into several commands
    #[arg(long, default_value_t = '|')]
    separator: char,

    /// Tag prepended to messages from the proxy
    #[arg(long, default_value = "#BP")]
    preamble: String,

    /// 256-color index of the preamble
    #[arg(long, default_value_t = 39)]
    preamble_color: u8,

    /// Failed logins allowed before the address is banned
    #[arg(long, default_value_t = 3)]
    max_login_attempts: u32,

    /// Telnet options advertised to clients
    #[arg(long, value_delimiter = ',', default_value = "TTYPE,NAWS,CHARSET,EOR,MSSP")]
    features: Vec<TelnetOption>,

    /// Name reported to clients asking for MSSP
    #[arg(long, default_value = "mudproxy")]
    mssp_name: String,

    /// Echo each client's commands to the other clients
    #[arg(long)]
    echo_commands: bool,

    /// Connect to the mud at startup instead of on the first login
    #[arg(long)]
    connect_at_startup: bool,

    /// Seconds shutdown waits for connections to drain
    #[arg(long, default_value_t = 5)]
    shutdown_timeout: u64,
}

impl Args {
    fn into_config(self) -> ProxyConfig {
        ProxyConfig::new(self.listen)
            .with_mud(self.mud_host, self.mud_port)
            .with_password(self.password)
            .with_view_password(self.view_password)
            .with_separator(self.separator)
            .with_preamble(self.preamble, self.preamble_color)
            .with_max_login_attempts(self.max_login_attempts)
            .with_features(self.features)
            .with_mssp_name(self.mssp_name)
            .with_command_echo(self.echo_commands)
            .with_connect_at_startup(self.connect_at_startup)
            .with_shutdown_timeout(Duration::from_secs(self.shutdown_timeout))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Args::parse().into_config();
    tracing::info!("mudproxy v{} starting", env!("CARGO_PKG_VERSION"));

    let server = ProxyServer::new(config).await?;
    server.start()?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Signal received, shutting down");
    server.shutdown().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_config_defaults() {
        let config = Args::try_parse_from(["mudproxy"]).unwrap().into_config();
        let defaults = ProxyConfig::default();
        assert_eq!(config.listen_address, defaults.listen_address);
        assert_eq!(config.mud_address(), defaults.mud_address());
        assert_eq!(config.separator, defaults.separator);
        assert_eq!(config.features, defaults.features);
        assert_eq!(config.shutdown_timeout, defaults.shutdown_timeout);
    }

    #[test]
    fn test_flags_map_onto_config() {
        let args = Args::try_parse_from([
            "mudproxy",
            "--listen",
            "127.0.0.1:7000",
            "--mud-host",
            "mud.example.com",
            "--mud-port",
            "23",
            "--separator",
            ";",
            "--features",
            "NAWS,MSSP",
            "--echo-commands",
        ])
        .unwrap();
        let config = args.into_config();
        assert_eq!(config.mud_address(), "mud.example.com:23");
        assert_eq!(config.separator, ';');
        assert_eq!(config.features, vec![TelnetOption::NAWS, TelnetOption::MSSP]);
        assert!(config.echo_commands_to_clients);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_feature_is_rejected() {
        assert!(Args::try_parse_from(["mudproxy", "--features", "BOGUS"]).is_err());
    }
}
