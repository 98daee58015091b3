// Host resource metrics

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Cumulative host I/O counters (bytes since boot)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IoCounters {
    pub disk_read_bytes: u64,
    pub disk_write_bytes: u64,
    pub net_sent_bytes: u64,
    pub net_recv_bytes: u64,
}

impl IoCounters {
    /// Per-field difference against a baseline, clamped at zero.
    ///
    /// Counters can go backwards (interface reset, process exit on platforms
    /// that sum per-process usage); a delta is never reported negative.
    pub fn delta_since(&self, baseline: &IoCounters) -> IoCounters {
        IoCounters {
            disk_read_bytes: self.disk_read_bytes.saturating_sub(baseline.disk_read_bytes),
            disk_write_bytes: self.disk_write_bytes.saturating_sub(baseline.disk_write_bytes),
            net_sent_bytes: self.net_sent_bytes.saturating_sub(baseline.net_sent_bytes),
            net_recv_bytes: self.net_recv_bytes.saturating_sub(baseline.net_recv_bytes),
        }
    }
}

/// One raw reading of the host
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HostSnapshot {
    pub cpu_pct: f32,
    pub mem_pct: f32,
    pub counters: IoCounters,
}

/// One entry of a job's metric series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub timestamp: DateTime<Utc>,
    pub cpu_pct: f32,
    pub mem_pct: f32,
    pub disk_read_delta: u64,
    pub disk_write_delta: u64,
    pub net_sent_delta: u64,
    pub net_recv_delta: u64,
}

impl MetricSample {
    /// Build a sample from a reading and the counters captured at sampler start
    pub fn from_snapshot(
        timestamp: DateTime<Utc>,
        snapshot: &HostSnapshot,
        baseline: &IoCounters,
    ) -> Self {
        let delta = snapshot.counters.delta_since(baseline);
        Self {
            timestamp,
            cpu_pct: snapshot.cpu_pct,
            mem_pct: snapshot.mem_pct,
            disk_read_delta: delta.disk_read_bytes,
            disk_write_delta: delta.disk_write_bytes,
            net_sent_delta: delta.net_sent_bytes,
            net_recv_delta: delta.net_recv_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delta_is_clamped_at_zero() {
        let baseline = IoCounters {
            disk_read_bytes: 500,
            disk_write_bytes: 100,
            net_sent_bytes: 10,
            net_recv_bytes: 10,
        };
        let later = IoCounters {
            disk_read_bytes: 700,
            disk_write_bytes: 50, // counter went backwards
            net_sent_bytes: 10,
            net_recv_bytes: 42,
        };

        let delta = later.delta_since(&baseline);
        assert_eq!(delta.disk_read_bytes, 200);
        assert_eq!(delta.disk_write_bytes, 0);
        assert_eq!(delta.net_sent_bytes, 0);
        assert_eq!(delta.net_recv_bytes, 32);
    }

    #[test]
    fn test_sample_against_own_baseline_is_zero() {
        let snapshot = HostSnapshot {
            cpu_pct: 12.5,
            mem_pct: 40.0,
            counters: IoCounters {
                disk_read_bytes: 1 << 40,
                disk_write_bytes: 1 << 39,
                net_sent_bytes: 1 << 30,
                net_recv_bytes: 1 << 31,
            },
        };

        let sample = MetricSample::from_snapshot(Utc::now(), &snapshot, &snapshot.counters);
        assert_eq!(sample.disk_read_delta, 0);
        assert_eq!(sample.disk_write_delta, 0);
        assert_eq!(sample.net_sent_delta, 0);
        assert_eq!(sample.net_recv_delta, 0);
        assert_eq!(sample.cpu_pct, 12.5);
    }
}
