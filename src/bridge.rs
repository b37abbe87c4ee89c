use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::alerts::notifier::calculate_backoff;
use crate::bridge_pending::PendingRequestTracker;
use crate::conformance::FaultPolicy;
use crate::jsonrpc::{IncomingMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use crate::supervisor::{CollectorState, CollectorSupervisor};
use crate::types::config::RetryPolicy;
use crate::types::stream::StreamConfig;
use crate::types::telemetry::{FaultEvent, TelemetryEvent};

const MAX_RESTARTS: u32 = 5;
const STABLE_AFTER: Duration = Duration::from_secs(60);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Collector notification methods.
pub mod methods {
    pub const SEGMENT: &str = "telemetry:segment";
    pub const LOUDNESS: &str = "telemetry:loudness";
    pub const SIGNAL: &str = "telemetry:signal";
    pub const FAULT: &str = "telemetry:fault";
    pub const FETCH_FAILED: &str = "telemetry:fetch-failed";
    pub const MANIFEST: &str = "telemetry:manifest";
    pub const MONITOR_START: &str = "monitor:start";
    pub const MONITOR_STOP: &str = "monitor:stop";
}

/// Fault as the collector reports it, before classification.
#[derive(Debug, Deserialize)]
struct RawFault {
    stream_id: String,
    timestamp: DateTime<Utc>,
    tag: String,
    #[serde(default = "one")]
    count: u32,
}

fn one() -> u32 {
    1
}

/// Turns a collector notification into a telemetry event. `Ok(None)` means
/// the notification is valid but carries nothing to ingest.
pub fn parse_telemetry(
    method: &str,
    params: Option<Value>,
    policy: &dyn FaultPolicy,
) -> Result<Option<TelemetryEvent>, String> {
    let params = params.unwrap_or(Value::Null);
    let decode_err = |e: serde_json::Error| format!("bad {method} params: {e}");
    let event = match method {
        methods::SEGMENT => TelemetryEvent::Segment(serde_json::from_value(params).map_err(decode_err)?),
        methods::LOUDNESS => {
            TelemetryEvent::Loudness(serde_json::from_value(params).map_err(decode_err)?)
        }
        methods::SIGNAL => TelemetryEvent::Signal(serde_json::from_value(params).map_err(decode_err)?),
        methods::FETCH_FAILED => {
            TelemetryEvent::FetchFailed(serde_json::from_value(params).map_err(decode_err)?)
        }
        methods::MANIFEST => {
            TelemetryEvent::Manifest(serde_json::from_value(params).map_err(decode_err)?)
        }
        methods::FAULT => {
            let raw: RawFault = serde_json::from_value(params).map_err(decode_err)?;
            let Some(category) = policy.classify(&raw.tag) else {
                debug!(stream_id = %raw.stream_id, tag = %raw.tag, "unclassified fault tag dropped");
                return Ok(None);
            };
            TelemetryEvent::Fault(FaultEvent {
                stream_id: raw.stream_id,
                timestamp: raw.timestamp,
                category,
                count: raw.count,
            })
        }
        other => return Err(format!("unknown notification method: {other}")),
    };
    Ok(Some(event))
}

struct BridgeInner {
    command: Vec<String>,
    supervisor: CollectorSupervisor,
    child: Mutex<Option<Child>>,
    stdin: Mutex<Option<ChildStdin>>,
    pending: PendingRequestTracker,
    policy: Arc<dyn FaultPolicy>,
    events: mpsc::Sender<TelemetryEvent>,
    /// stream_id -> manifest_url, re-announced after every (re)start.
    monitored: Mutex<HashMap<String, String>>,
}

/// Runs the external collector process and speaks newline-delimited
/// JSON-RPC with it. Telemetry notifications go to `events`.
pub struct CollectorBridge {
    inner: Arc<BridgeInner>,
}

impl CollectorBridge {
    pub fn new(
        command: Vec<String>,
        policy: Arc<dyn FaultPolicy>,
        events: mpsc::Sender<TelemetryEvent>,
    ) -> Self {
        Self {
            inner: Arc::new(BridgeInner {
                command,
                supervisor: CollectorSupervisor::new(MAX_RESTARTS),
                child: Mutex::new(None),
                stdin: Mutex::new(None),
                pending: PendingRequestTracker::new(),
                policy,
                events,
                monitored: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.supervisor.is_running()
    }

    pub fn state(&self) -> CollectorState {
        self.inner.supervisor.state()
    }

    pub fn spawn(&self) -> Result<(), String> {
        if self.is_running() {
            return Err("Collector already running".to_string());
        }
        BridgeInner::spawn(&self.inner)
    }

    /// Sends a request and waits for the matching response.
    pub async fn request(&self, method: &str, params: Value) -> Result<JsonRpcResponse, String> {
        if !self.is_running() {
            return Err("Collector not running".to_string());
        }
        let request = JsonRpcRequest::new(method, Some(params));
        let rx = self.inner.pending.register(request.id, method);
        let line = request.to_line().map_err(|e| e.to_string())?;
        if let Err(e) = self.inner.write_line(&line) {
            self.inner.pending.cancel(request.id);
            return Err(e);
        }
        match tokio::time::timeout(REQUEST_TIMEOUT, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err("collector dropped the request".to_string()),
            Err(_) => {
                self.inner.pending.cancel(request.id);
                Err(format!("{method} timed out after {REQUEST_TIMEOUT:?}"))
            }
        }
    }

    /// Records the stream and, if the collector is up, asks it to start
    /// polling. A stopped collector picks the stream up when it starts.
    pub async fn start_monitoring(&self, stream: &StreamConfig) -> Result<(), String> {
        self.inner
            .monitored
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(stream.id.clone(), stream.manifest_url.clone());
        if !self.is_running() {
            return Ok(());
        }
        let response = self
            .request(methods::MONITOR_START, start_params(&stream.id, &stream.manifest_url))
            .await?;
        match response.error_message() {
            Some(message) => Err(message),
            None => Ok(()),
        }
    }

    pub async fn stop_monitoring(&self, stream_id: &str) -> Result<(), String> {
        let known = self
            .inner
            .monitored
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(stream_id)
            .is_some();
        if !known || !self.is_running() {
            return Ok(());
        }
        let response = self
            .request(methods::MONITOR_STOP, json!({ "streamId": stream_id }))
            .await?;
        match response.error_message() {
            Some(message) => Err(message),
            None => Ok(()),
        }
    }

    /// Stops the collector for good; it will not be restarted.
    pub fn kill(&self) -> Result<(), String> {
        self.inner.supervisor.record_stopped();
        let child = self
            .inner
            .child
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        *self.inner.stdin.lock().unwrap_or_else(|e| e.into_inner()) = None;
        if let Some(mut child) = child {
            child.kill().map_err(|e| format!("Failed to kill: {e}"))?;
            child.wait().map_err(|e| format!("Failed to wait: {e}"))?;
        }
        self.inner.pending.fail_all("collector stopped");
        Ok(())
    }
}

fn start_params(stream_id: &str, manifest_url: &str) -> Value {
    json!({ "streamId": stream_id, "manifestUrl": manifest_url })
}

impl BridgeInner {
    fn spawn(self: &Arc<Self>) -> Result<(), String> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or("No collector command configured")?;

        self.supervisor.record_starting();
        let mut child = match Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                self.supervisor.record_stopped();
                return Err(format!("Failed to spawn collector: {e}"));
            }
        };

        let stdin = child.stdin.take().ok_or("Failed to get stdin")?;
        let stdout = child.stdout.take().ok_or("Failed to get stdout")?;
        let stderr = child.stderr.take().ok_or("Failed to get stderr")?;

        info!(pid = child.id(), program = %program, "collector started");
        *self.stdin.lock().unwrap_or_else(|e| e.into_inner()) = Some(stdin);
        *self.child.lock().unwrap_or_else(|e| e.into_inner()) = Some(child);

        thread::spawn(move || {
            let reader = BufReader::new(stderr);
            for line in reader.lines() {
                match line {
                    Ok(text) => debug!(target: "streamwatch::collector", "{text}"),
                    Err(_) => break,
                }
            }
        });

        self.supervisor.record_started();

        let inner = Arc::clone(self);
        thread::spawn(move || {
            let started = Instant::now();
            inner.read_stdout(stdout);
            inner.on_exit(started);
        });

        self.announce_monitored();
        Ok(())
    }

    fn read_stdout(&self, stdout: std::process::ChildStdout) {
        let reader = BufReader::new(stdout);
        for line in reader.lines() {
            let text = match line {
                Ok(text) => text,
                Err(e) => {
                    warn!(error = %e, "collector stdout read error");
                    break;
                }
            };
            if text.trim().is_empty() {
                continue;
            }
            match IncomingMessage::from_line(&text) {
                Ok(IncomingMessage::Response(response)) => {
                    self.pending.resolve(response);
                }
                Ok(IncomingMessage::Notification(note)) => {
                    match parse_telemetry(&note.method, note.params, self.policy.as_ref()) {
                        Ok(Some(event)) => {
                            if self.events.blocking_send(event).is_err() {
                                debug!("telemetry receiver closed, stopping reader");
                                break;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => warn!(method = %note.method, error = %e, "dropped collector notification"),
                    }
                }
                Err(_) => {
                    let preview: String = text.chars().take(200).collect();
                    debug!(line = %preview, "non-JSON collector output");
                }
            }
        }
    }

    fn on_exit(self: &Arc<Self>, started: Instant) {
        self.pending.fail_all("collector exited");
        *self.stdin.lock().unwrap_or_else(|e| e.into_inner()) = None;
        let child = self.child.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(mut child) = child {
            match child.wait() {
                Ok(status) => info!(%status, "collector exited"),
                Err(e) => warn!(error = %e, "failed to reap collector"),
            }
        }

        if self.supervisor.state() == CollectorState::Stopped {
            return;
        }
        if started.elapsed() >= STABLE_AFTER {
            self.supervisor.record_stable();
        }
        self.supervisor.record_crash();
        if !self.supervisor.should_restart() {
            error!(
                restarts = self.supervisor.restart_count(),
                "collector keeps crashing, giving up"
            );
            return;
        }

        let policy = RetryPolicy {
            max_attempts: MAX_RESTARTS,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            ..RetryPolicy::default()
        };
        let attempt = self.supervisor.restart_count();
        let delay = calculate_backoff(&policy, attempt);
        warn!(attempt, "collector crashed, restarting in {delay:?}");
        thread::sleep(delay);

        // Stopped while we were waiting.
        if !matches!(self.supervisor.state(), CollectorState::Crashed { .. }) {
            return;
        }
        if let Err(e) = self.spawn() {
            error!(error = %e, "collector restart failed");
        }
    }

    fn write_line(&self, line: &str) -> Result<(), String> {
        let mut guard = self.stdin.lock().unwrap_or_else(|e| e.into_inner());
        let stdin = guard.as_mut().ok_or("Stdin not available")?;
        stdin
            .write_all(line.as_bytes())
            .map_err(|e| format!("Failed to write to stdin: {e}"))?;
        stdin
            .flush()
            .map_err(|e| format!("Failed to flush stdin: {e}"))
    }

    /// `monitor:start` for every known stream, sent as notifications so no
    /// reply is awaited or tracked.
    fn announce_monitored(&self) {
        let streams: Vec<(String, String)> = self
            .monitored
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(id, url)| (id.clone(), url.clone()))
            .collect();
        for (stream_id, manifest_url) in streams {
            let notification = JsonRpcNotification::new(
                methods::MONITOR_START,
                Some(start_params(&stream_id, &manifest_url)),
            );
            let sent = notification
                .to_line()
                .map_err(|e| e.to_string())
                .and_then(|line| self.write_line(&line));
            if let Err(e) = sent {
                warn!(%stream_id, error = %e, "failed to announce stream to collector");
            }
        }
    }
}
