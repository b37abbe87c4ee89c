use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq)]
pub enum CollectorState {
    Stopped,
    Starting,
    Running,
    Crashed { restart_count: u32 },
}

struct Inner {
    state: CollectorState,
    /// Crashes since the collector last ran stably. Survives restarts.
    restarts: u32,
}

pub struct CollectorSupervisor {
    inner: Arc<Mutex<Inner>>,
    max_restarts: u32,
}

impl CollectorSupervisor {
    pub fn new(max_restarts: u32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: CollectorState::Stopped,
                restarts: 0,
            })),
            max_restarts,
        }
    }

    pub fn state(&self) -> CollectorState {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .state
            .clone()
    }

    pub fn is_running(&self) -> bool {
        self.state() == CollectorState::Running
    }

    pub fn restart_count(&self) -> u32 {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).restarts
    }

    pub fn should_restart(&self) -> bool {
        match self.state() {
            CollectorState::Crashed { restart_count } => restart_count <= self.max_restarts,
            _ => false,
        }
    }

    pub fn record_starting(&self) {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).state = CollectorState::Starting;
    }

    /// Ignored once stopped on purpose.
    pub fn record_crash(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.state == CollectorState::Stopped {
            return;
        }
        inner.restarts += 1;
        inner.state = CollectorState::Crashed {
            restart_count: inner.restarts,
        };
    }

    pub fn record_started(&self) {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).state = CollectorState::Running;
    }

    /// The collector stayed up long enough that earlier crashes no longer count.
    pub fn record_stable(&self) {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).restarts = 0;
    }

    pub fn record_stopped(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.state = CollectorState::Stopped;
        inner.restarts = 0;
    }
}
