//! Network throughput and connection counts from /proc/net/.

use crate::error::{InitError, SampleError};
use crate::export::round2;
use crate::probes::Probe;
use crate::rate::RateTracker;
use serde::Serialize;
use std::fs;
use std::time::Instant;

const PROC_NET_DEV: &str = "/proc/net/dev";

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone, Serialize, Default)]
pub struct NetworkReading {
    /// Aggregate receive throughput in MB/s.
    #[serde(rename = "downloadSpeed", serialize_with = "round2")]
    pub download_speed: f64,
    /// Aggregate transmit throughput in MB/s.
    #[serde(rename = "uploadSpeed", serialize_with = "round2")]
    pub upload_speed: f64,
    /// Established TCP connections, IPv4 and IPv6.
    #[serde(rename = "activeConnections")]
    pub active_connections: u64,
}

/// Network probe feeding the host-wide cumulative octet sums through one
/// RateTracker per direction.
#[derive(Debug, Default)]
pub struct NetworkProbe {
    rx: RateTracker,
    tx: RateTracker,
}

impl NetworkProbe {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Probe for NetworkProbe {
    type Reading = NetworkReading;

    const DOMAIN: &'static str = "network";

    fn initialize(&mut self) -> Result<(), InitError> {
        fs::read_to_string(PROC_NET_DEV)
            .map_err(|e| InitError::new(Self::DOMAIN, SampleError::read(PROC_NET_DEV, e)))?;
        Ok(())
    }

    fn sample(&mut self, now: Instant) -> Result<NetworkReading, SampleError> {
        let content = fs::read_to_string(PROC_NET_DEV)
            .map_err(|e| SampleError::read(PROC_NET_DEV, e))?;
        let (rx_total, tx_total) = sum_interface_octets(&content);

        let download_speed = self.rx.observe(rx_total, now) / BYTES_PER_MB;
        let upload_speed = self.tx.observe(tx_total, now) / BYTES_PER_MB;

        Ok(NetworkReading {
            download_speed,
            upload_speed,
            active_connections: count_established_connections(),
        })
    }
}

/// Sum cumulative rx/tx octets across non-loopback interfaces.
fn sum_interface_octets(netdev: &str) -> (u64, u64) {
    let mut rx_total = 0u64;
    let mut tx_total = 0u64;

    // First two lines are headers.
    for line in netdev.lines().skip(2) {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 10 {
            continue;
        }

        let interface = parts[0].trim_end_matches(':');
        if interface == "lo" {
            continue;
        }

        rx_total += parts[1].parse::<u64>().unwrap_or(0);
        tx_total += parts[9].parse::<u64>().unwrap_or(0);
    }

    (rx_total, tx_total)
}

/// Point-in-time count of established TCP connections. A missing table
/// (e.g. IPv6 disabled) contributes zero rather than failing the probe.
fn count_established_connections() -> u64 {
    let tcp = fs::read_to_string("/proc/net/tcp").unwrap_or_default();
    let tcp6 = fs::read_to_string("/proc/net/tcp6").unwrap_or_default();
    count_established(&tcp) + count_established(&tcp6)
}

fn count_established(table: &str) -> u64 {
    table
        .lines()
        .skip(1)
        .filter(|line| {
            // Socket state is the hex field after local/remote address;
            // 01 = ESTABLISHED.
            line.split_whitespace().nth(3) == Some("01")
        })
        .count() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    const NET_DEV: &str = "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
    lo: 9999999    1000    0    0    0     0          0         0  9999999    1000    0    0    0     0       0          0
  eth0: 1000000    2000    0    0    0     0          0         0   500000    1500    0    0    0     0       0          0
 wlan0: 2500000    3000    0    0    0     0          0         0   250000     800    0    0    0     0       0          0
";

    #[test]
    fn sums_octets_excluding_loopback() {
        let (rx, tx) = sum_interface_octets(NET_DEV);
        assert_eq!(rx, 3_500_000);
        assert_eq!(tx, 750_000);
    }

    #[test]
    fn malformed_lines_are_ignored() {
        let (rx, tx) = sum_interface_octets("header\nheader\ngarbage line\n");
        assert_eq!((rx, tx), (0, 0));
    }

    #[test]
    fn counts_only_established_sockets() {
        let table = "\
  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid
   0: 0100007F:1F90 00000000:0000 0A 00000000:00000000 00:00000000 00000000  1000
   1: 0100007F:A3E2 5DB8D822:01BB 01 00000000:00000000 00:00000000 00000000  1000
   2: 0100007F:A3E4 5DB8D822:01BB 01 00000000:00000000 00:00000000 00000000  1000
   3: 0100007F:B412 5DB8D822:01BB 06 00000000:00000000 00:00000000 00000000  1000
";
        assert_eq!(count_established(table), 2);
    }
}
