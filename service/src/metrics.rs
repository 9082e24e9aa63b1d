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

//! Lock-free metrics for the proxy
//!
//! Every update is mirrored to the `metrics` facade so an installed recorder
//! sees the same numbers as [`ProxyMetrics::snapshot`].

use metrics::{counter, gauge};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Lock-free proxy metrics
///
/// All metrics are stored as atomics and can be accessed concurrently
/// without locks. Use the `snapshot()` method to get a consistent view
/// of all metrics at a point in time.
#[derive(Debug)]
pub struct ProxyMetrics {
    // Clients
    total_clients: AtomicU64,
    active_clients: AtomicU64,
    total_client_duration_ns: AtomicU64,

    // Mud
    mud_connects: AtomicU64,

    // Throughput
    lines_to_mud: AtomicU64,
    lines_to_client: AtomicU64,

    // Security
    failed_logins: AtomicU64,
    bans: AtomicU64,

    // Errors
    hook_faults: AtomicU64,

    started_at: Instant,
}

impl Default for ProxyMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ProxyMetrics {
    /// Create a new metrics instance
    pub fn new() -> Self {
        Self {
            total_clients: AtomicU64::new(0),
            active_clients: AtomicU64::new(0),
            total_client_duration_ns: AtomicU64::new(0),
            mud_connects: AtomicU64::new(0),
            lines_to_mud: AtomicU64::new(0),
            lines_to_client: AtomicU64::new(0),
            failed_logins: AtomicU64::new(0),
            bans: AtomicU64::new(0),
            hook_faults: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    /// Record a client connecting
    pub fn client_connected(&self) {
        self.total_clients.fetch_add(1, Ordering::Relaxed);
        self.active_clients.fetch_add(1, Ordering::Relaxed);
        counter!("mudproxy.clients.total").increment(1);
        gauge!("mudproxy.clients.active").increment(1.0);
    }

    /// Record a client disconnecting
    pub fn client_disconnected(&self, duration: Duration) {
        self.active_clients.fetch_sub(1, Ordering::Relaxed);
        self.total_client_duration_ns.fetch_add(
            u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX),
            Ordering::Relaxed,
        );
        gauge!("mudproxy.clients.active").decrement(1.0);
    }

    /// Get the current number of connected clients
    pub fn active_clients(&self) -> u64 {
        self.active_clients.load(Ordering::Relaxed)
    }

    /// Get the total number of clients since start
    pub fn total_clients(&self) -> u64 {
        self.total_clients.load(Ordering::Relaxed)
    }

    /// Record the mud connecting
    pub fn mud_connected(&self) {
        self.mud_connects.fetch_add(1, Ordering::Relaxed);
        gauge!("mudproxy.mud.connected").set(1.0);
    }

    /// Record the mud disconnecting
    pub fn mud_disconnected(&self) {
        gauge!("mudproxy.mud.connected").set(0.0);
    }

    /// Record lines handed to the mud
    pub fn lines_to_mud(&self, count: u64) {
        self.lines_to_mud.fetch_add(count, Ordering::Relaxed);
        counter!("mudproxy.lines.to_mud").increment(count);
    }

    /// Record lines handed to clients (once per line, not per client)
    pub fn lines_to_client(&self, count: u64) {
        self.lines_to_client.fetch_add(count, Ordering::Relaxed);
        counter!("mudproxy.lines.to_client").increment(count);
    }

    /// Record a wrong password
    pub fn login_failed(&self) {
        self.failed_logins.fetch_add(1, Ordering::Relaxed);
        counter!("mudproxy.logins.failed").increment(1);
    }

    /// Record an address being banned
    pub fn banned(&self) {
        self.bans.fetch_add(1, Ordering::Relaxed);
        counter!("mudproxy.bans").increment(1);
    }

    /// Record hooks failing or panicking
    pub fn hook_faults(&self, count: u64) {
        if count > 0 {
            self.hook_faults.fetch_add(count, Ordering::Relaxed);
            counter!("mudproxy.hooks.faults").increment(count);
        }
    }

    /// Get a consistent snapshot of all metrics
    ///
    /// The snapshot may not be perfectly consistent if metrics are being
    /// updated concurrently, but it is close enough for monitoring.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_clients: self.total_clients.load(Ordering::Relaxed),
            active_clients: self.active_clients.load(Ordering::Relaxed),
            mud_connects: self.mud_connects.load(Ordering::Relaxed),
            lines_to_mud: self.lines_to_mud.load(Ordering::Relaxed),
            lines_to_client: self.lines_to_client.load(Ordering::Relaxed),
            failed_logins: self.failed_logins.load(Ordering::Relaxed),
            bans: self.bans.load(Ordering::Relaxed),
            hook_faults: self.hook_faults.load(Ordering::Relaxed),
            uptime: self.started_at.elapsed(),
            avg_client_duration: self.average_client_duration(),
        }
    }

    fn average_client_duration(&self) -> Duration {
        let total = self.total_clients.load(Ordering::Relaxed);
        if total == 0 {
            return Duration::ZERO;
        }
        let total_ns = self.total_client_duration_ns.load(Ordering::Relaxed);
        Duration::from_nanos(total_ns / total)
    }
}

/// A snapshot of proxy metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    /// Clients since start
    pub total_clients: u64,
    /// Clients connected now
    pub active_clients: u64,
    /// Times the mud was connected
    pub mud_connects: u64,
    /// Lines handed to the mud
    pub lines_to_mud: u64,
    /// Lines handed to clients
    pub lines_to_client: u64,
    /// Wrong passwords
    pub failed_logins: u64,
    /// Addresses banned
    pub bans: u64,
    /// Hooks that failed or panicked
    pub hook_faults: u64,
    /// Proxy uptime
    pub uptime: Duration,
    /// Average client session length
    pub avg_client_duration: Duration,
}

impl MetricsSnapshot {
    /// Lines to the mud per second of uptime
    #[allow(clippy::cast_precision_loss)]
    pub fn lines_to_mud_per_sec(&self) -> f64 {
        if self.uptime.is_zero() {
            return 0.0;
        }
        self.lines_to_mud as f64 / self.uptime.as_secs_f64()
    }

    /// Lines to clients per second of uptime
    #[allow(clippy::cast_precision_loss)]
    pub fn lines_to_client_per_sec(&self) -> f64 {
        if self.uptime.is_zero() {
            return 0.0;
        }
        self.lines_to_client as f64 / self.uptime.as_secs_f64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_client_tracking() {
        let metrics = ProxyMetrics::new();
        assert_eq!(metrics.active_clients(), 0);

        metrics.client_connected();
        metrics.client_connected();
        assert_eq!(metrics.active_clients(), 2);

        metrics.client_disconnected(Duration::from_secs(10));
        assert_eq!(metrics.active_clients(), 1);
        assert_eq!(metrics.total_clients(), 2);
        assert_eq!(metrics.snapshot().avg_client_duration, Duration::from_secs(5));
    }

    #[test]
    fn test_line_and_security_tracking() {
        let metrics = ProxyMetrics::new();
        metrics.lines_to_mud(3);
        metrics.lines_to_client(5);
        metrics.login_failed();
        metrics.banned();
        metrics.hook_faults(1);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.lines_to_mud, 3);
        assert_eq!(snapshot.lines_to_client, 5);
        assert_eq!(snapshot.failed_logins, 1);
        assert_eq!(snapshot.bans, 1);
        assert_eq!(snapshot.hook_faults, 1);
    }

    #[test]
    fn test_concurrent_updates() {
        let metrics = std::sync::Arc::new(ProxyMetrics::new());
        let handles: Vec<_> = (0..10)
            .map(|_| {
                let metrics = metrics.clone();
                thread::spawn(move || {
                    for _ in 0..100 {
                        metrics.lines_to_client(1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(metrics.snapshot().lines_to_client, 1000);
    }
}
