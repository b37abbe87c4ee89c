use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Closed set of transport-stream fault categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultCategory {
    Sync,
    Continuity,
    Transport,
    Pid,
    Pcr,
}

impl FaultCategory {
    pub const ALL: [FaultCategory; 5] = [
        FaultCategory::Sync,
        FaultCategory::Continuity,
        FaultCategory::Transport,
        FaultCategory::Pid,
        FaultCategory::Pcr,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FaultCategory::Sync => "sync",
            FaultCategory::Continuity => "continuity",
            FaultCategory::Transport => "transport",
            FaultCategory::Pid => "pid",
            FaultCategory::Pcr => "pcr",
        }
    }
}

/// Fault counts inside the current sliding window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConformanceCounters {
    pub stream_id: String,
    pub window_start: DateTime<Utc>,
    pub sync_byte_errors: u32,
    pub continuity_errors: u32,
    pub transport_errors: u32,
    pub pid_errors: u32,
    pub pcr_errors: u32,
}

impl ConformanceCounters {
    pub fn new(stream_id: impl Into<String>, window_start: DateTime<Utc>) -> Self {
        Self {
            stream_id: stream_id.into(),
            window_start,
            sync_byte_errors: 0,
            continuity_errors: 0,
            transport_errors: 0,
            pid_errors: 0,
            pcr_errors: 0,
        }
    }

    pub fn get(&self, category: FaultCategory) -> u32 {
        match category {
            FaultCategory::Sync => self.sync_byte_errors,
            FaultCategory::Continuity => self.continuity_errors,
            FaultCategory::Transport => self.transport_errors,
            FaultCategory::Pid => self.pid_errors,
            FaultCategory::Pcr => self.pcr_errors,
        }
    }

    pub(crate) fn slot_mut(&mut self, category: FaultCategory) -> &mut u32 {
        match category {
            FaultCategory::Sync => &mut self.sync_byte_errors,
            FaultCategory::Continuity => &mut self.continuity_errors,
            FaultCategory::Transport => &mut self.transport_errors,
            FaultCategory::Pid => &mut self.pid_errors,
            FaultCategory::Pcr => &mut self.pcr_errors,
        }
    }

    pub fn total(&self) -> u64 {
        FaultCategory::ALL
            .iter()
            .map(|c| u64::from(self.get(*c)))
            .sum()
    }

    pub fn is_clean(&self) -> bool {
        self.total() == 0
    }
}
