// System probe implementation
// reason: sysinfo for cross-platform CPU/memory/network counters
use async_trait::async_trait;
use std::sync::{Mutex, PoisonError};
use sysinfo::{Networks, System};
use tracing::debug;

use perfagent_core::domain::{HostSnapshot, IoCounters};
use perfagent_core::port::system_probe::SystemProbe;

const DISKSTATS_PATH: &str = "/proc/diskstats";
const SECTOR_BYTES: u64 = 512;

/// System probe implementation using sysinfo
///
/// CPU usage is computed by sysinfo between two refreshes, so the very first
/// reading after construction can be 0.
pub struct SystemProbeImpl {
    state: Mutex<ProbeState>,
}

struct ProbeState {
    system: System,
    networks: Networks,
}

impl SystemProbeImpl {
    /// Create a new system probe
    ///
    /// # Example
    /// ```ignore
    /// let probe = SystemProbeImpl::new();
    /// let baseline = probe.snapshot().await.counters;
    /// ```
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu();
        system.refresh_memory();
        Self {
            state: Mutex::new(ProbeState {
                system,
                networks: Networks::new_with_refreshed_list(),
            }),
        }
    }
}

impl Default for SystemProbeImpl {
    fn default() -> Self {
        Self::new()
    }
}

/// Sum sectors read/written over whole block devices in /proc/diskstats.
///
/// Partitions are skipped when their parent device is listed (`sda1` under
/// `sda`, `nvme0n1p1` under `nvme0n1`) so bytes are not counted twice.
/// Loop and ram devices are ignored.
pub fn parse_diskstats(content: &str) -> (u64, u64) {
    let devices: Vec<(&str, u64, u64)> = content
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 10 {
                return None;
            }
            let sectors_read = fields[5].parse::<u64>().ok()?;
            let sectors_written = fields[9].parse::<u64>().ok()?;
            Some((fields[2], sectors_read, sectors_written))
        })
        .filter(|(name, _, _)| !name.starts_with("loop") && !name.starts_with("ram"))
        .collect();

    let names: Vec<&str> = devices.iter().map(|(name, _, _)| *name).collect();
    devices
        .iter()
        .filter(|(name, _, _)| {
            !names
                .iter()
                .any(|parent| parent != name && name.starts_with(parent))
        })
        .fold((0, 0), |(read, written), (_, r, w)| {
            (
                read + r.saturating_mul(SECTOR_BYTES),
                written + w.saturating_mul(SECTOR_BYTES),
            )
        })
}

/// Host-wide disk bytes, from /proc/diskstats when available, otherwise the
/// sum of per-process disk usage reported by sysinfo
fn disk_counters(system: &mut System) -> (u64, u64) {
    if let Ok(content) = std::fs::read_to_string(DISKSTATS_PATH) {
        return parse_diskstats(&content);
    }
    system.refresh_processes();
    system.processes().values().fold((0, 0), |(read, written), process| {
        let usage = process.disk_usage();
        (
            read + usage.total_read_bytes,
            written + usage.total_written_bytes,
        )
    })
}

#[async_trait]
impl SystemProbe for SystemProbeImpl {
    async fn snapshot(&self) -> HostSnapshot {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let ProbeState { system, networks } = &mut *state;

        system.refresh_cpu();
        system.refresh_memory();
        networks.refresh();

        let cpu_pct = system.global_cpu_info().cpu_usage();
        let total_memory = system.total_memory();
        let mem_pct = if total_memory == 0 {
            0.0
        } else {
            (system.used_memory() as f64 / total_memory as f64 * 100.0) as f32
        };

        let (net_sent_bytes, net_recv_bytes) =
            networks
                .iter()
                .fold((0u64, 0u64), |(sent, recv), (_, data)| {
                    (
                        sent + data.total_transmitted(),
                        recv + data.total_received(),
                    )
                });
        let (disk_read_bytes, disk_write_bytes) = disk_counters(system);

        debug!(
            cpu = %cpu_pct,
            mem = %mem_pct,
            disk_read_bytes,
            disk_write_bytes,
            net_sent_bytes,
            net_recv_bytes,
            "Host snapshot collected"
        );

        HostSnapshot {
            cpu_pct,
            mem_pct,
            counters: IoCounters {
                disk_read_bytes,
                disk_write_bytes,
                net_sent_bytes,
                net_recv_bytes,
            },
        }
    }
}
