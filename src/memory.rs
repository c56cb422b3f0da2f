//! Process memory sampling around the load and execute stages.

use log::{debug, info, warn};
use serde::Serialize;
use sysinfo::System;

use crate::config::Config;

/// Resident memory of the current process before and after a stage, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MemorySample {
    pub before: u64,
    pub after: u64,
    pub delta: i64,
}

#[derive(Debug, Clone)]
pub struct MemoryMonitor {
    enabled: bool,
    threshold_bytes: u64,
}

impl MemoryMonitor {
    pub fn new(config: &Config) -> Self {
        Self {
            enabled: config.enable_memory_monitoring,
            threshold_bytes: config.memory_warning_threshold_bytes(),
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            threshold_bytes: u64::MAX,
        }
    }

    /// Resident set size of this process, when the platform reports it.
    pub fn current_usage() -> Option<u64> {
        let pid = sysinfo::get_current_pid().ok()?;
        let mut sys = System::new();
        sys.refresh_process(pid);
        sys.process(pid).map(|process| process.memory())
    }

    /// Runs `stage` and samples memory around it; the stage's output is returned untouched.
    pub fn track<T, F>(&self, label: &str, stage: F) -> (T, Option<MemorySample>)
    where
        F: FnOnce() -> T,
    {
        if !self.enabled {
            return (stage(), None);
        }
        let before = Self::current_usage();
        let output = stage();
        let after = Self::current_usage();
        let sample = match (before, after) {
            (Some(before), Some(after)) => {
                let delta = after as i64 - before as i64;
                Some(MemorySample {
                    before,
                    after,
                    delta,
                })
            }
            _ => {
                debug!("Memory usage unavailable for stage '{label}'");
                None
            }
        };
        if let Some(sample) = &sample {
            self.report(label, sample);
        }
        (output, sample)
    }

    fn report(&self, label: &str, sample: &MemorySample) {
        info!(
            "Memory after {label}: {:.1} MB (delta {:+.1} MB)",
            to_mb(sample.after),
            sample.delta as f64 / (1024.0 * 1024.0)
        );
        if sample.delta > 0 && sample.delta as u64 > self.threshold_bytes {
            warn!(
                "Stage '{label}' grew memory by {:.1} MB, above the {:.0} MB warning threshold",
                sample.delta as f64 / (1024.0 * 1024.0),
                to_mb(self.threshold_bytes)
            );
        } else if sample.after > self.threshold_bytes {
            warn!(
                "Process memory {:.1} MB after '{label}' exceeds the {:.0} MB warning threshold",
                to_mb(sample.after),
                to_mb(self.threshold_bytes)
            );
        }
    }
}

fn to_mb(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_monitor_passes_output_through() {
        let (value, sample) = MemoryMonitor::disabled().track("noop", || 41 + 1);
        assert_eq!(value, 42);
        assert!(sample.is_none());
    }

    #[test]
    fn enabled_monitor_never_changes_output() {
        let monitor = MemoryMonitor::new(&Config::default());
        let (value, sample) = monitor.track("alloc", || vec![0u8; 1024].len());
        assert_eq!(value, 1024);
        if let Some(sample) = sample {
            assert_eq!(sample.delta, sample.after as i64 - sample.before as i64);
        }
    }
}
