//! Supervised per-stream workers.
//!
//! Every stream runs in its own task that owns its `StreamMonitor`. Commands
//! reach it through a bounded queue; readers get the latest `StreamView`
//! from a watch channel without touching the worker.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::alerts::notifier::{WebhookEnvelope, WebhookNotifier, WebhookPayload};
use crate::error::{AlertError, RegistryError};
use crate::events::{emit_event, PushMessage, PushPayload};
use crate::monitor::{Outcome, StreamMonitor, StreamView};
use crate::types::alert::Alert;
use crate::types::config::MonitorConfig;
use crate::types::health::StreamStatus;
use crate::types::stream::StreamConfig;
use crate::types::telemetry::TelemetryEvent;
use crate::types::webhook::{DeliveryOutcome, WebhookEvent};

const PUSH_CAPACITY: usize = 256;

type AlertReply = oneshot::Sender<Result<Alert, AlertError>>;

pub enum WorkerCommand {
    Ingest(TelemetryEvent),
    Acknowledge { alert_id: String, reply: AlertReply },
    Resolve { alert_id: String, reply: AlertReply },
}

struct StreamHandle {
    stream: StreamConfig,
    commands: mpsc::Sender<WorkerCommand>,
    view: watch::Receiver<Arc<StreamView>>,
    push: broadcast::Sender<PushMessage>,
    shutdown: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

pub struct StreamRegistry {
    workers: RwLock<HashMap<String, StreamHandle>>,
    notifier: Arc<WebhookNotifier>,
    /// Every worker holds a receiver; updates never wait on a command queue.
    settings: watch::Sender<MonitorConfig>,
}

impl StreamRegistry {
    pub fn new(settings: MonitorConfig, notifier: Arc<WebhookNotifier>) -> Self {
        let (settings, _) = watch::channel(settings);
        Self {
            workers: RwLock::new(HashMap::new()),
            notifier,
            settings,
        }
    }

    pub fn settings(&self) -> MonitorConfig {
        self.settings.borrow().clone()
    }

    /// Starts a worker for `stream`. Must be called inside a tokio runtime.
    pub fn add_stream(&self, stream: StreamConfig) -> Result<Arc<StreamView>, RegistryError> {
        // Subscribe before reading so no update can fall in between.
        let mut settings_rx = self.settings.subscribe();
        let settings = settings_rx.borrow_and_update().clone();
        let mut workers = self.workers.write().unwrap_or_else(|e| e.into_inner());
        if workers.contains_key(&stream.id) {
            return Err(RegistryError::AlreadyExists(stream.id));
        }

        let monitor = StreamMonitor::new(stream.clone(), settings.clone(), Utc::now());
        let initial = Arc::new(monitor.view());
        let (view_tx, view_rx) = watch::channel(initial.clone());
        let (command_tx, command_rx) = mpsc::channel(settings.queue_capacity.max(1));
        let (push_tx, _) = broadcast::channel(PUSH_CAPACITY);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let worker = Worker {
            monitor,
            view: view_tx,
            push: push_tx.clone(),
            notifier: self.notifier.clone(),
            deliveries: JoinSet::new(),
        };
        let task = tokio::spawn(worker.run(command_rx, shutdown_rx, settings_rx));

        info!(stream_id = %stream.id, name = %stream.name, "stream worker started");
        workers.insert(
            stream.id.clone(),
            StreamHandle {
                stream,
                commands: command_tx,
                view: view_rx,
                push: push_tx,
                shutdown: shutdown_tx,
                task,
            },
        );
        Ok(initial)
    }

    /// Removes the stream and waits until its worker has released all state.
    pub async fn remove_stream(&self, stream_id: &str) -> Result<(), RegistryError> {
        let handle = self
            .workers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(stream_id)
            .ok_or_else(|| RegistryError::UnknownStream(stream_id.to_string()))?;
        stop_worker(handle).await;
        info!(stream_id, "stream worker stopped");
        Ok(())
    }

    pub async fn shutdown_all(&self) {
        let handles: Vec<StreamHandle> = self
            .workers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .drain()
            .map(|(_, handle)| handle)
            .collect();
        let count = handles.len();
        for handle in handles {
            stop_worker(handle).await;
        }
        info!(count, "all stream workers stopped");
    }

    pub fn contains(&self, stream_id: &str) -> bool {
        self.workers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(stream_id)
    }

    pub fn streams(&self) -> Vec<StreamConfig> {
        let mut streams: Vec<StreamConfig> = self
            .workers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .map(|h| h.stream.clone())
            .collect();
        streams.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        streams
    }

    /// Latest published view; may trail the worker by one event.
    pub fn view(&self, stream_id: &str) -> Result<Arc<StreamView>, RegistryError> {
        let workers = self.workers.read().unwrap_or_else(|e| e.into_inner());
        let handle = workers
            .get(stream_id)
            .ok_or_else(|| RegistryError::UnknownStream(stream_id.to_string()))?;
        let view = handle.view.borrow().clone();
        Ok(view)
    }

    pub fn views(&self) -> Vec<Arc<StreamView>> {
        self.streams()
            .iter()
            .filter_map(|s| self.view(&s.id).ok())
            .collect()
    }

    pub fn watch(&self, stream_id: &str) -> Result<watch::Receiver<Arc<StreamView>>, RegistryError> {
        let workers = self.workers.read().unwrap_or_else(|e| e.into_inner());
        workers
            .get(stream_id)
            .map(|h| h.view.clone())
            .ok_or_else(|| RegistryError::UnknownStream(stream_id.to_string()))
    }

    /// Subscribes to a stream's push channel. The returned `connected`
    /// message carries the current health and is not broadcast.
    pub fn subscribe(
        &self,
        stream_id: &str,
    ) -> Result<(PushMessage, broadcast::Receiver<PushMessage>), RegistryError> {
        let workers = self.workers.read().unwrap_or_else(|e| e.into_inner());
        let handle = workers
            .get(stream_id)
            .ok_or_else(|| RegistryError::UnknownStream(stream_id.to_string()))?;
        let health = handle.view.borrow().health.clone();
        let connected = PushMessage::new(stream_id, PushPayload::Connected { health });
        Ok((connected, handle.push.subscribe()))
    }

    /// Answers a client ping on the stream's push channel.
    pub fn ping(&self, stream_id: &str) -> Result<usize, RegistryError> {
        let workers = self.workers.read().unwrap_or_else(|e| e.into_inner());
        let handle = workers
            .get(stream_id)
            .ok_or_else(|| RegistryError::UnknownStream(stream_id.to_string()))?;
        Ok(emit_event(
            &handle.push,
            PushMessage::new(stream_id, PushPayload::Pong),
        ))
    }

    /// Queues an event for its stream, waiting if the queue is full.
    pub async fn ingest(&self, event: TelemetryEvent) -> Result<(), RegistryError> {
        let stream_id = event.stream_id().to_string();
        let commands = self.sender(&stream_id)?;
        commands
            .send(WorkerCommand::Ingest(event))
            .await
            .map_err(|_| RegistryError::WorkerGone(stream_id))
    }

    /// Queues an event without waiting. A full queue rejects the event.
    pub fn try_ingest(&self, event: TelemetryEvent) -> Result<(), RegistryError> {
        let stream_id = event.stream_id().to_string();
        let commands = self.sender(&stream_id)?;
        commands
            .try_send(WorkerCommand::Ingest(event))
            .map_err(|err| match err {
                TrySendError::Full(_) => RegistryError::QueueFull(stream_id),
                TrySendError::Closed(_) => RegistryError::WorkerGone(stream_id),
            })
    }

    pub async fn acknowledge(&self, stream_id: &str, alert_id: &str) -> Result<Alert, RegistryError> {
        let (reply, rx) = oneshot::channel();
        self.request(
            stream_id,
            WorkerCommand::Acknowledge {
                alert_id: alert_id.to_string(),
                reply,
            },
            rx,
        )
        .await
    }

    pub async fn resolve(&self, stream_id: &str, alert_id: &str) -> Result<Alert, RegistryError> {
        let (reply, rx) = oneshot::channel();
        self.request(
            stream_id,
            WorkerCommand::Resolve {
                alert_id: alert_id.to_string(),
                reply,
            },
            rx,
        )
        .await
    }

    /// Stores new settings; running workers pick them up on their next turn.
    pub fn reconfigure(&self, settings: MonitorConfig) {
        self.notifier.set_policy(settings.webhooks.clone());
        self.settings.send_replace(settings);
    }

    /// Feeds collector telemetry into the workers until `events` closes.
    /// A stream whose queue is full loses the event; other streams are not
    /// held up by it.
    pub async fn forward(self: Arc<Self>, mut events: mpsc::Receiver<TelemetryEvent>) {
        let mut forwarded = 0u64;
        let mut dropped = 0u64;
        while let Some(event) = events.recv().await {
            match self.try_ingest(event) {
                Ok(()) => forwarded += 1,
                Err(RegistryError::UnknownStream(stream_id)) => {
                    debug!(%stream_id, "telemetry for unknown stream dropped");
                }
                Err(RegistryError::QueueFull(stream_id)) => {
                    dropped += 1;
                    warn!(%stream_id, dropped, "stream queue full, telemetry dropped");
                }
                Err(err) => warn!(error = %err, "telemetry not delivered"),
            }
        }
        info!(forwarded, dropped, "telemetry channel closed");
    }

    fn sender(&self, stream_id: &str) -> Result<mpsc::Sender<WorkerCommand>, RegistryError> {
        self.workers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(stream_id)
            .map(|h| h.commands.clone())
            .ok_or_else(|| RegistryError::UnknownStream(stream_id.to_string()))
    }

    async fn request(
        &self,
        stream_id: &str,
        command: WorkerCommand,
        rx: oneshot::Receiver<Result<Alert, AlertError>>,
    ) -> Result<Alert, RegistryError> {
        let gone = || RegistryError::WorkerGone(stream_id.to_string());
        self.sender(stream_id)?
            .send(command)
            .await
            .map_err(|_| gone())?;
        rx.await.map_err(|_| gone())?.map_err(RegistryError::from)
    }
}

async fn stop_worker(handle: StreamHandle) {
    let StreamHandle {
        stream,
        shutdown,
        task,
        ..
    } = handle;
    // Err only means the worker already exited.
    let _ = shutdown.send(());
    if let Err(err) = task.await {
        warn!(stream_id = %stream.id, error = %err, "stream worker ended abnormally");
    }
}

fn tick_period(settings: &MonitorConfig) -> Duration {
    Duration::from_secs(settings.tick_interval_secs.max(1))
}

struct Worker {
    monitor: StreamMonitor,
    view: watch::Sender<Arc<StreamView>>,
    push: broadcast::Sender<PushMessage>,
    notifier: Arc<WebhookNotifier>,
    deliveries: JoinSet<DeliveryOutcome>,
}

impl Worker {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<WorkerCommand>,
        mut shutdown: broadcast::Receiver<()>,
        mut settings: watch::Receiver<MonitorConfig>,
    ) {
        let mut tick_every = tick_period(&settings.borrow());
        let mut ticker = interval(tick_every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut settings_open = true;

        loop {
            tokio::select! {
                result = shutdown.recv() => {
                    match result {
                        Ok(()) | Err(broadcast::error::RecvError::Closed) => break,
                        Err(broadcast::error::RecvError::Lagged(_)) => {}
                    }
                }

                command = commands.recv() => {
                    let Some(command) = command else { break };
                    self.handle(command);
                }

                changed = settings.changed(), if settings_open => {
                    if changed.is_err() {
                        settings_open = false;
                    } else {
                        let next = settings.borrow_and_update().clone();
                        let period = tick_period(&next);
                        self.monitor.reconfigure(next);
                        if period != tick_every {
                            tick_every = period;
                            ticker = interval(period);
                            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                        }
                    }
                }

                _ = ticker.tick() => {
                    let outcome = self.monitor.tick(Utc::now());
                    self.publish(outcome);
                }

                Some(joined) = self.deliveries.join_next(), if !self.deliveries.is_empty() => {
                    match joined {
                        Ok(outcome) if !outcome.success => {
                            warn!(webhook_id = %outcome.webhook_id, attempts = outcome.attempts, "webhook gave up");
                        }
                        Ok(_) => {}
                        Err(err) if err.is_cancelled() => {}
                        Err(err) => warn!(error = %err, "webhook delivery task failed"),
                    }
                }
            }
        }

        // Teardown: no more ticks, no more commands, no in-flight deliveries.
        drop(ticker);
        commands.close();
        let mut dropped = 0usize;
        while commands.try_recv().is_ok() {
            dropped += 1;
        }
        self.deliveries.abort_all();
        while self.deliveries.join_next().await.is_some() {}
        debug!(
            stream_id = %self.monitor.stream().id,
            dropped,
            "worker drained and released"
        );
    }

    fn handle(&mut self, command: WorkerCommand) {
        match command {
            WorkerCommand::Ingest(event) => {
                if let Ok(outcome) = self.monitor.ingest(event, Utc::now()) {
                    self.publish(outcome);
                }
            }
            WorkerCommand::Acknowledge { alert_id, reply } => {
                let result = self.monitor.acknowledge(&alert_id);
                if result.is_ok() {
                    self.publish(Outcome::default());
                }
                let _ = reply.send(result);
            }
            WorkerCommand::Resolve { alert_id, reply } => {
                let result = match self.monitor.resolve(&alert_id, Utc::now()) {
                    Ok((alert, outcome)) => {
                        self.publish(outcome);
                        Ok(alert)
                    }
                    Err(err) => Err(err),
                };
                let _ = reply.send(result);
            }
        }
    }

    fn publish(&mut self, outcome: Outcome) {
        let stream_id = self.monitor.stream().id.clone();
        self.view.send_replace(Arc::new(self.monitor.view()));

        for payload in outcome.push {
            emit_event(&self.push, PushMessage::new(&stream_id, payload));
        }

        for transition in &outcome.transitions {
            self.notify(
                transition.webhook_event(),
                WebhookPayload::Alert(transition.alert().clone()),
            );
        }

        if let Some((previous, current)) = outcome.status_change {
            let event = match (previous, current) {
                (_, StreamStatus::Offline) => Some(WebhookEvent::StreamDown),
                (StreamStatus::Offline | StreamStatus::Error, StreamStatus::Online) => {
                    Some(WebhookEvent::StreamUp)
                }
                _ => None,
            };
            info!(%stream_id, from = previous.as_str(), to = current.as_str(), "stream status changed");
            if let Some(event) = event {
                let stream = self.monitor.stream();
                let payload = WebhookPayload::StreamStatus {
                    stream_id: stream.id.clone(),
                    stream_name: stream.name.clone(),
                    status: current,
                    previous,
                };
                self.notify(event, payload);
            }
        }
    }

    fn notify(&mut self, event: WebhookEvent, payload: WebhookPayload) {
        let subscribers = self.notifier.subscribers(event);
        if subscribers.is_empty() {
            return;
        }
        let envelope = Arc::new(WebhookEnvelope {
            event_type: event,
            timestamp: Utc::now(),
            payload,
        });
        for subscription in subscribers {
            let notifier = self.notifier.clone();
            let envelope = envelope.clone();
            self.deliveries
                .spawn(async move { notifier.deliver(&subscription, &envelope).await });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::alert::AlertType;
    use crate::types::config::RetryPolicy;
    use crate::types::segment::SegmentMetric;
    use crate::types::telemetry::{FetchFailure, FetchTarget};
    use crate::types::webhook::WebhookSubscription;
    use chrono::Duration as ChronoDuration;
    use tokio::io::AsyncReadExt;

    fn registry() -> StreamRegistry {
        let notifier = Arc::new(WebhookNotifier::new(RetryPolicy::default()).unwrap());
        StreamRegistry::new(MonitorConfig::default(), notifier)
    }

    fn stream(id: &str) -> StreamConfig {
        StreamConfig {
            id: id.into(),
            name: format!("Stream {id}"),
            manifest_url: format!("https://cdn.example.com/{id}/master.m3u8"),
            enabled: true,
            tags: vec![],
            created_at: Utc::now(),
        }
    }

    fn segment(stream_id: &str, seq: u64) -> TelemetryEvent {
        TelemetryEvent::Segment(SegmentMetric {
            stream_id: stream_id.into(),
            sequence_number: seq,
            uri: format!("seg_{seq}.ts"),
            resolution: Some("1280x720".into()),
            bandwidth: Some(3_000_000),
            codecs: None,
            actual_bitrate: 2.9,
            download_speed: 25.0,
            segment_duration: 6.0,
            ttfb: 70.0,
            download_time: 600.0,
            segment_size_bytes: 2_175_000,
            timestamp: Utc::now() + ChronoDuration::milliseconds(seq as i64),
        })
    }

    async fn wait_for<F>(rx: &mut watch::Receiver<Arc<StreamView>>, pred: F)
    where
        F: Fn(&StreamView) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if pred(&rx.borrow_and_update()) {
                    return;
                }
                rx.changed().await.unwrap();
            }
        })
        .await
        .expect("view never reached expected state");
    }

    #[tokio::test]
    async fn ingest_reaches_published_view() {
        let registry = registry();
        registry.add_stream(stream("s1")).unwrap();
        let mut rx = registry.watch("s1").unwrap();

        registry.ingest(segment("s1", 1)).await.unwrap();
        registry.ingest(segment("s1", 2)).await.unwrap();
        wait_for(&mut rx, |v| v.segments.len() == 2).await;

        let view = registry.view("s1").unwrap();
        assert_eq!(view.health.status, StreamStatus::Online);
        assert_eq!(view.summary().current_metrics.unwrap().sequence_number, 2);
        registry.shutdown_all().await;
    }

    #[tokio::test]
    async fn streams_are_isolated() {
        let registry = registry();
        registry.add_stream(stream("a")).unwrap();
        registry.add_stream(stream("b")).unwrap();
        let mut rx = registry.watch("a").unwrap();

        registry.ingest(segment("a", 1)).await.unwrap();
        wait_for(&mut rx, |v| v.segments.len() == 1).await;
        assert!(registry.view("b").unwrap().segments.is_empty());
        registry.shutdown_all().await;
    }

    #[tokio::test]
    async fn duplicate_and_unknown_streams_are_rejected() {
        let registry = registry();
        registry.add_stream(stream("s1")).unwrap();
        assert!(matches!(
            registry.add_stream(stream("s1")),
            Err(RegistryError::AlreadyExists(_))
        ));
        assert!(matches!(
            registry.ingest(segment("nope", 1)).await,
            Err(RegistryError::UnknownStream(_))
        ));
        registry.shutdown_all().await;
    }

    #[tokio::test]
    async fn remove_stream_tears_down_worker() {
        let registry = registry();
        registry.add_stream(stream("s1")).unwrap();
        let (connected, mut push) = registry.subscribe("s1").unwrap();
        assert_eq!(connected.payload.name(), "connected");

        registry.remove_stream("s1").await.unwrap();
        assert!(!registry.contains("s1"));
        assert!(matches!(
            registry.view("s1"),
            Err(RegistryError::UnknownStream(_))
        ));
        assert!(matches!(
            registry.remove_stream("s1").await,
            Err(RegistryError::UnknownStream(_))
        ));

        // Every sender is gone once the worker has exited.
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match push.recv().await {
                    Err(broadcast::error::RecvError::Closed) => break,
                    _ => continue,
                }
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn alert_commands_round_trip_through_worker() {
        let registry = registry();
        registry.add_stream(stream("s1")).unwrap();
        let start = Utc::now();
        for i in 0..3 {
            registry
                .ingest(TelemetryEvent::FetchFailed(FetchFailure {
                    stream_id: "s1".into(),
                    timestamp: start + ChronoDuration::milliseconds(i),
                    target: FetchTarget::Manifest,
                    message: Some("HTTP 404".into()),
                }))
                .await
                .unwrap();
        }

        let id = "s1:manifest_unreachable:1";
        let acked = registry.acknowledge("s1", id).await.unwrap();
        assert!(acked.acknowledged);
        assert_eq!(acked.alert_type, AlertType::ManifestUnreachable);

        let resolved = registry.resolve("s1", id).await.unwrap();
        assert!(resolved.resolved);
        assert!(matches!(
            registry.resolve("s1", id).await,
            Err(RegistryError::Alert(AlertError::AlreadyResolved(_)))
        ));
        assert!(matches!(
            registry.acknowledge("s1", "s1:stale_data:9").await,
            Err(RegistryError::Alert(AlertError::NotFound(_)))
        ));
        registry.shutdown_all().await;
    }

    #[tokio::test]
    async fn forward_routes_by_stream_and_drops_unknown() {
        let registry = Arc::new(registry());
        registry.add_stream(stream("s1")).unwrap();
        let mut rx = registry.watch("s1").unwrap();

        let (tx, events) = mpsc::channel(8);
        let forwarder = tokio::spawn(registry.clone().forward(events));
        tx.send(segment("ghost", 1)).await.unwrap();
        tx.send(segment("s1", 1)).await.unwrap();
        drop(tx);
        forwarder.await.unwrap();

        wait_for(&mut rx, |v| v.segments.len() == 1).await;
        registry.shutdown_all().await;
    }

    #[tokio::test]
    async fn ping_answers_on_push_channel() {
        let registry = registry();
        registry.add_stream(stream("s1")).unwrap();
        let (_, mut push) = registry.subscribe("s1").unwrap();
        assert_eq!(registry.ping("s1").unwrap(), 1);
        let msg = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let msg = push.recv().await.unwrap();
                if msg.payload.name() == "pong" {
                    return msg;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(msg.stream_id, "s1");
        registry.shutdown_all().await;
    }
    /// Registers a stream whose queue nobody drains.
    fn stalled_stream(registry: &StreamRegistry, id: &str) -> mpsc::Receiver<WorkerCommand> {
        let (commands, rx) = mpsc::channel(1);
        let monitor = StreamMonitor::new(stream(id), MonitorConfig::default(), Utc::now());
        let (_, view) = watch::channel(Arc::new(monitor.view()));
        let handle = StreamHandle {
            stream: stream(id),
            commands,
            view,
            push: broadcast::channel(1).0,
            shutdown: broadcast::channel(1).0,
            task: tokio::spawn(async {}),
        };
        registry
            .workers
            .write()
            .unwrap()
            .insert(id.to_string(), handle);
        rx
    }

    fn manifest_failure(stream_id: &str, offset_ms: i64) -> TelemetryEvent {
        TelemetryEvent::FetchFailed(FetchFailure {
            stream_id: stream_id.into(),
            timestamp: Utc::now() + ChronoDuration::milliseconds(offset_ms),
            target: FetchTarget::Manifest,
            message: Some("HTTP 503".into()),
        })
    }

    #[tokio::test]
    async fn full_queue_does_not_hold_up_other_streams() {
        let registry = Arc::new(registry());
        let mut stalled = stalled_stream(&registry, "slow");
        registry.add_stream(stream("fast")).unwrap();
        let mut rx = registry.watch("fast").unwrap();

        let (tx, events) = mpsc::channel(16);
        for seq in 1..=4 {
            tx.send(segment("slow", seq)).await.unwrap();
        }
        tx.send(segment("fast", 1)).await.unwrap();
        drop(tx);

        let forwarder = tokio::spawn(registry.clone().forward(events));
        tokio::time::timeout(Duration::from_secs(5), forwarder)
            .await
            .expect("forwarder blocked on a full queue")
            .unwrap();
        wait_for(&mut rx, |v| v.segments.len() == 1).await;

        // Only the first event fit; the rest were dropped.
        assert!(matches!(stalled.try_recv(), Ok(WorkerCommand::Ingest(_))));
        assert!(stalled.try_recv().is_err());

        registry.try_ingest(segment("slow", 5)).unwrap();
        assert!(matches!(
            registry.try_ingest(segment("slow", 6)),
            Err(RegistryError::QueueFull(_))
        ));

        // Settings do not travel through the stalled queue.
        let mut settings = MonitorConfig::default();
        settings.tick_interval_secs = 2;
        registry.reconfigure(settings.clone());
        assert_eq!(registry.settings(), settings);
        registry.shutdown_all().await;
    }

    #[tokio::test]
    async fn remove_stream_cancels_in_flight_webhooks() {
        // Reads requests, never answers, reports when the client hangs up.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (accepted_tx, mut accepted) = mpsc::channel(8);
        let (closed_tx, mut closed) = mpsc::channel(8);
        let server = tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let accepted_tx = accepted_tx.clone();
                let closed_tx = closed_tx.clone();
                tokio::spawn(async move {
                    let _ = accepted_tx.send(()).await;
                    let mut buf = [0u8; 1024];
                    while let Ok(n) = socket.read(&mut buf).await {
                        if n == 0 {
                            break;
                        }
                    }
                    let _ = closed_tx.send(()).await;
                });
            }
        });

        let notifier = Arc::new(
            WebhookNotifier::new(RetryPolicy {
                timeout_secs: 60,
                ..RetryPolicy::default()
            })
            .unwrap(),
        );
        notifier.replace_subscriptions(vec![WebhookSubscription {
            id: "wh-1".into(),
            name: "ops".into(),
            url: format!("http://{addr}/hook"),
            enabled: true,
            events: vec![WebhookEvent::AlertRaised],
            headers: HashMap::new(),
            created_at: Utc::now(),
        }]);
        let registry = StreamRegistry::new(MonitorConfig::default(), notifier);
        registry.add_stream(stream("s1")).unwrap();
        for i in 0..3 {
            registry.ingest(manifest_failure("s1", i)).await.unwrap();
        }

        tokio::time::timeout(Duration::from_secs(5), accepted.recv())
            .await
            .expect("no webhook delivery started")
            .unwrap();
        tokio::time::timeout(Duration::from_secs(5), registry.remove_stream("s1"))
            .await
            .expect("teardown waited on a delivery")
            .unwrap();
        tokio::time::timeout(Duration::from_secs(5), closed.recv())
            .await
            .expect("delivery still connected after teardown")
            .unwrap();
        server.abort();
    }
    #[tokio::test]
    async fn reconfigure_reaches_running_workers() {
        let registry = registry();
        registry.add_stream(stream("s1")).unwrap();
        let mut rx = registry.watch("s1").unwrap();

        let mut settings = MonitorConfig::default();
        settings.tick_interval_secs = 1;
        settings.alerts.manifest_failures = 1;
        registry.reconfigure(settings);
        registry.ingest(manifest_failure("s1", 0)).await.unwrap();

        wait_for(&mut rx, |v| {
            v.alerts
                .iter()
                .any(|a| a.alert_type == AlertType::ManifestUnreachable && a.is_open())
        })
        .await;
        registry.shutdown_all().await;
    }
}
