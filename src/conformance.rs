use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};

use crate::types::config::ConformanceConfig;
use crate::types::conformance::{ConformanceCounters, FaultCategory};
use crate::types::telemetry::FaultEvent;

/// Maps a raw analyzer tag onto a fault category.
pub trait FaultPolicy: Send + Sync {
    /// `None` means the tag is not a conformance fault and is dropped.
    fn classify(&self, tag: &str) -> Option<FaultCategory>;
}

/// TR 101 290 style tags as emitted by transport-stream analyzers.
#[derive(Debug, Default, Clone, Copy)]
pub struct Tr101290Policy;

impl FaultPolicy for Tr101290Policy {
    fn classify(&self, tag: &str) -> Option<FaultCategory> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "ts_sync_lost" | "sync_byte_error" | "sync_loss" => Some(FaultCategory::Sync),
            "continuity_count" | "continuity_count_error" | "cc_error" => {
                Some(FaultCategory::Continuity)
            }
            "transport_error" | "crc_error" => Some(FaultCategory::Transport),
            "pid_error" | "pat_error" | "pmt_error" | "unreferenced_pid" => Some(FaultCategory::Pid),
            "pcr_error" | "pcr_discontinuity" | "pcr_accuracy_error" | "pcr_repetition_error" => {
                Some(FaultCategory::Pcr)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct WindowEntry {
    at: DateTime<Utc>,
    category: FaultCategory,
    count: u32,
}

/// True sliding-window fault counts for one stream.
#[derive(Debug, Clone)]
pub struct ConformanceAnalyzer {
    window: Duration,
    entries: VecDeque<WindowEntry>,
    counters: ConformanceCounters,
}

impl ConformanceAnalyzer {
    pub fn new(stream_id: &str, config: &ConformanceConfig, now: DateTime<Utc>) -> Self {
        let window = Duration::seconds(config.window_secs.max(1));
        Self {
            window,
            entries: VecDeque::new(),
            counters: ConformanceCounters::new(stream_id, now - window),
        }
    }

    pub fn reconfigure(&mut self, config: &ConformanceConfig) {
        self.window = Duration::seconds(config.window_secs.max(1));
    }

    /// Adds a classified fault. Faults that already fell out of the window
    /// are ignored.
    pub fn record(&mut self, fault: &FaultEvent) {
        if fault.count == 0 || fault.timestamp < self.counters.window_start {
            return;
        }
        let slot = self.counters.slot_mut(fault.category);
        *slot = slot.saturating_add(fault.count);
        self.entries.push_back(WindowEntry {
            at: fault.timestamp,
            category: fault.category,
            count: fault.count,
        });
    }

    /// Slides the window to end at `now`, expiring every older entry.
    pub fn advance(&mut self, now: DateTime<Utc>) {
        let boundary = now - self.window;
        if boundary > self.counters.window_start {
            self.counters.window_start = boundary;
        }
        let boundary = self.counters.window_start;
        // Entries are not strictly ordered: ingest tolerates slight backdating.
        let counters = &mut self.counters;
        self.entries.retain(|entry| {
            if entry.at >= boundary {
                return true;
            }
            let slot = counters.slot_mut(entry.category);
            *slot = slot.saturating_sub(entry.count);
            false
        });
    }

    pub fn counters(&self) -> &ConformanceCounters {
        &self.counters
    }
}
