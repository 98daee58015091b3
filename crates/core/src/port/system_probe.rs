// System resource monitoring port
use crate::domain::{HostSnapshot, IoCounters};
use async_trait::async_trait;

/// System probe port for host resource sampling
#[async_trait]
pub trait SystemProbe: Send + Sync {
    /// Read current CPU/memory percentages and cumulative I/O counters
    ///
    /// # Example
    /// ```text
    /// let baseline = probe.snapshot().await.counters;
    /// // ... later
    /// let delta = probe.snapshot().await.counters.delta_since(&baseline);
    /// ```
    async fn snapshot(&self) -> HostSnapshot;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Mock SystemProbe: counters grow by a fixed step on every call
    pub struct MockSystemProbe {
        snapshot: Mutex<HostSnapshot>,
        step: IoCounters,
        calls: AtomicUsize,
    }

    impl MockSystemProbe {
        pub fn new(cpu_pct: f32, start: IoCounters, step: IoCounters) -> Self {
            Self {
                snapshot: Mutex::new(HostSnapshot {
                    cpu_pct,
                    mem_pct: 50.0,
                    counters: start,
                }),
                step,
                calls: AtomicUsize::new(0),
            }
        }

        /// Counters start high (prior host activity) and grow by 1 KiB per read
        pub fn busy_host() -> Self {
            Self::new(
                25.0,
                IoCounters {
                    disk_read_bytes: 10_000_000,
                    disk_write_bytes: 20_000_000,
                    net_sent_bytes: 30_000_000,
                    net_recv_bytes: 40_000_000,
                },
                IoCounters {
                    disk_read_bytes: 1024,
                    disk_write_bytes: 1024,
                    net_sent_bytes: 1024,
                    net_recv_bytes: 1024,
                },
            )
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SystemProbe for MockSystemProbe {
        async fn snapshot(&self) -> HostSnapshot {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut current = self.snapshot.lock().unwrap();
            let result = *current;
            current.counters.disk_read_bytes += self.step.disk_read_bytes;
            current.counters.disk_write_bytes += self.step.disk_write_bytes;
            current.counters.net_sent_bytes += self.step.net_sent_bytes;
            current.counters.net_recv_bytes += self.step.net_recv_bytes;
            result
        }
    }
}
