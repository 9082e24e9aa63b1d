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

//! Address bans

use dashmap::DashMap;
use std::fmt;
use std::net::IpAddr;
use std::time::SystemTime;
use tracing::{info, warn};

/// One banned address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BanEntry {
    /// Banned address
    pub address: IpAddr,
    /// Why it was banned
    pub reason: String,
    /// When it was banned
    pub banned_at: SystemTime,
}

/// Storage of banned addresses. Connections from a banned address are
/// refused when they are accepted.
pub trait BanList: Send + Sync + fmt::Debug + 'static {
    /// Whether the address is banned
    fn is_banned(&self, address: IpAddr) -> bool;

    /// Ban an address. Banning an address twice keeps the first entry.
    fn ban(&self, address: IpAddr, reason: &str);

    /// Lift a ban; returns whether the address was banned
    fn unban(&self, address: IpAddr) -> bool;

    /// Every current ban
    fn banned(&self) -> Vec<BanEntry>;
}

/// Ban list kept in memory for the lifetime of the process
#[derive(Debug, Default)]
pub struct MemoryBanList {
    entries: DashMap<IpAddr, BanEntry>,
}

impl MemoryBanList {
    /// Create an empty ban list
    pub fn new() -> Self {
        Self::default()
    }
}

impl BanList for MemoryBanList {
    fn is_banned(&self, address: IpAddr) -> bool {
        self.entries.contains_key(&address)
    }

    fn ban(&self, address: IpAddr, reason: &str) {
        self.entries.entry(address).or_insert_with(|| {
            warn!(%address, reason, "Address banned");
            BanEntry {
                address,
                reason: reason.to_string(),
                banned_at: SystemTime::now(),
            }
        });
    }

    fn unban(&self, address: IpAddr) -> bool {
        let removed = self.entries.remove(&address).is_some();
        if removed {
            info!(%address, "Ban lifted");
        }
        removed
    }

    fn banned(&self) -> Vec<BanEntry> {
        let mut entries: Vec<BanEntry> = self.entries.iter().map(|e| e.value().clone()).collect();
        entries.sort_by_key(|entry| entry.banned_at);
        entries
    }
}
