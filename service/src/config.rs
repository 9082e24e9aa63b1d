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

//! Proxy configuration

use crate::{ProxyError, Result};
use mudproxy_records::{DEFAULT_REGISTRY_CAPACITY, DEFAULT_UPDATE_CAPACITY, LineStyle};
use mudproxy_telnetcodec::{ResponseTable, TelnetOption};
use std::net::SocketAddr;
use std::time::Duration;

/// Proxy configuration
///
/// This structure contains every option of the proxy. Use the builder
/// pattern methods to customize the configuration.
///
/// # Example
///
/// ```
/// use mudproxy_service::ProxyConfig;
///
/// let config = ProxyConfig::default()
///     .with_mud("mud.example.com", 4000)
///     .with_password("secret")
///     .with_view_password(Some("watch".to_string()))
///     .with_separator(';');
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Address clients connect to
    pub listen_address: SocketAddr,

    /// Mud host name or address
    pub mud_host: String,

    /// Mud port
    pub mud_port: u16,

    /// Password a client gives to control the proxy
    pub password: String,

    /// Password a client gives to watch without sending input
    pub view_password: Option<String>,

    /// Splits one line of client input into several commands.
    ///
    /// A doubled separator is sent as one literal separator.
    pub separator: char,

    /// Tag prepended to lines generated by the proxy
    pub preamble: String,

    /// 256-color index of the preamble
    pub preamble_color: u8,

    /// Failed password attempts a client may make; the next one bans it
    pub max_login_attempts: u32,

    /// Most lines the mud reader collects before handing them on
    pub reader_batch_size: usize,

    /// Writes between cooperative yields of a connection writer
    pub writer_yield_interval: usize,

    /// Records of each kind kept for inspection
    pub registry_capacity: usize,

    /// Mutation log entries kept per record
    pub update_log_capacity: usize,

    /// Telnet options advertised to clients on connect
    pub features: Vec<TelnetOption>,

    /// Name reported to clients asking for MSSP
    pub mssp_name: String,

    /// Echo the commands of one client to the others
    pub echo_commands_to_clients: bool,

    /// Connect to the mud as soon as the proxy starts
    pub connect_mud_at_startup: bool,

    /// How long shutdown waits for connections to drain before aborting them
    pub shutdown_timeout: Duration,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen_address: SocketAddr::from(([0, 0, 0, 0], 9999)),
            mud_host: "localhost".to_string(),
            mud_port: 4000,
            password: "defaultpass".to_string(),
            view_password: None,
            separator: '|',
            preamble: "#BP".to_string(),
            preamble_color: 39,
            max_login_attempts: 3,
            reader_batch_size: 50,
            writer_yield_interval: 10,
            registry_capacity: DEFAULT_REGISTRY_CAPACITY,
            update_log_capacity: DEFAULT_UPDATE_CAPACITY,
            features: vec![
                TelnetOption::TerminalType,
                TelnetOption::NAWS,
                TelnetOption::Charset,
                TelnetOption::EndOfRecord,
                TelnetOption::MSSP,
            ],
            mssp_name: "mudproxy".to_string(),
            echo_commands_to_clients: false,
            connect_mud_at_startup: false,
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl ProxyConfig {
    /// Create a new configuration with the given listen address
    ///
    /// All other settings will use their default values.
    pub fn new(listen_address: SocketAddr) -> Self {
        Self {
            listen_address,
            ..Default::default()
        }
    }

    /// Set the mud address
    pub fn with_mud(mut self, host: impl Into<String>, port: u16) -> Self {
        self.mud_host = host.into();
        self.mud_port = port;
        self
    }

    /// Set the proxy password
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    /// Set the view-only password
    pub fn with_view_password(mut self, password: Option<String>) -> Self {
        self.view_password = password;
        self
    }

    /// Set the command separator
    pub fn with_separator(mut self, separator: char) -> Self {
        self.separator = separator;
        self
    }

    /// Set the preamble and its color
    pub fn with_preamble(mut self, preamble: impl Into<String>, color: u8) -> Self {
        self.preamble = preamble.into();
        self.preamble_color = color;
        self
    }

    /// Set the number of failed logins tolerated before a ban
    pub fn with_max_login_attempts(mut self, attempts: u32) -> Self {
        self.max_login_attempts = attempts;
        self
    }

    /// Set the mud reader batch size
    pub fn with_reader_batch_size(mut self, size: usize) -> Self {
        self.reader_batch_size = size;
        self
    }

    /// Set the writer yield interval
    pub fn with_writer_yield_interval(mut self, writes: usize) -> Self {
        self.writer_yield_interval = writes;
        self
    }

    /// Set the record registry capacity per kind
    pub fn with_registry_capacity(mut self, capacity: usize) -> Self {
        self.registry_capacity = capacity;
        self
    }

    /// Set the advertised Telnet options
    pub fn with_features(mut self, features: Vec<TelnetOption>) -> Self {
        self.features = features;
        self
    }

    /// Set the MSSP name
    pub fn with_mssp_name(mut self, name: impl Into<String>) -> Self {
        self.mssp_name = name.into();
        self
    }

    /// Enable or disable command echo to other clients
    pub fn with_command_echo(mut self, enabled: bool) -> Self {
        self.echo_commands_to_clients = enabled;
        self
    }

    /// Enable or disable connecting to the mud at startup
    pub fn with_connect_at_startup(mut self, enabled: bool) -> Self {
        self.connect_mud_at_startup = enabled;
        self
    }

    /// Set the shutdown timeout duration
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// `host:port` of the mud
    pub fn mud_address(&self) -> String {
        format!("{}:{}", self.mud_host, self.mud_port)
    }

    /// Style applied to lines sent to clients
    pub fn line_style(&self) -> LineStyle {
        LineStyle::new(self.preamble.clone(), self.preamble_color)
    }

    /// Answers to client option requests
    pub fn response_table(&self) -> ResponseTable {
        ResponseTable::with_mssp_name(&self.mssp_name)
    }

    /// Validate the configuration
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        let invalid =
            |reason: &str| -> Result<()> { Err(ProxyError::InvalidConfig(reason.to_string())) };

        if self.password.is_empty() {
            return invalid("password must not be empty");
        }

        if let Some(view) = &self.view_password {
            if view.is_empty() {
                return invalid("view password must not be empty");
            }
            if *view == self.password {
                return invalid("view password must differ from the password");
            }
        }

        if self.separator.is_whitespace() || self.separator.is_control() {
            return invalid("separator must be a visible character");
        }

        if self.mud_host.is_empty() || self.mud_port == 0 {
            return invalid("mud address must have a host and a port");
        }

        if self.reader_batch_size == 0 {
            return invalid("reader_batch_size must be greater than 0");
        }

        if self.writer_yield_interval == 0 {
            return invalid("writer_yield_interval must be greater than 0");
        }

        if self.registry_capacity == 0 || self.update_log_capacity == 0 {
            return invalid("record capacities must be greater than 0");
        }

        Ok(())
    }
}
