//! Engine façade and task
//!
//! A single tokio task owns every piece of mutable engine state. The
//! [`Engine`] handle feeds it commands over a channel, and timers and the
//! transport feed internal events into the same queue, so no two runs ever
//! overlap and nothing needs a lock. Reads are served from a published
//! snapshot.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};

use tapvolt_protocol::{
    parse_server_frame, validate_action, Action, AuthPayload, ClientMessage, ErrorCode,
    ErrorNotice, ExecutionResult, ResultStatus, ServerFrame, Step, PROTOCOL_VERSION,
};

use crate::clock::epoch_millis;
use crate::config::EngineConfig;
use crate::dispatcher::ActionTracker;
use crate::identity::IdentityProvider;
use crate::lifecycle::LifecycleEvent;
use crate::observer::EngineObserver;
use crate::state::ConnectionState;
use crate::timer::TimerHandle;
use crate::transport::{Channel, Connector, EventSink, TransportEvent};

/// Read-only view published after every engine step.
#[derive(Debug, Clone)]
pub struct EngineSnapshot {
    pub state: ConnectionState,
    pub reconnect_attempt: u32,
    /// Epoch millis of the last observed liveness signal
    pub last_heartbeat: Option<u64>,
}

enum Command {
    Connect {
        address: String,
    },
    Authenticate {
        client_name: String,
        reply: oneshot::Sender<bool>,
    },
    SendAction {
        step: Step,
        reply: oneshot::Sender<Option<String>>,
    },
    Disconnect,
    Lifecycle(LifecycleEvent),
    Shutdown,
}

enum Event {
    Command(Command),
    Transport {
        generation: u64,
        event: TransportEvent,
    },
    ReconnectDue,
    HeartbeatTick,
    ActionDeadline {
        id: String,
    },
    IdentityResolved {
        client_name: String,
        outcome: tapvolt_utils::Result<String>,
        reply: oneshot::Sender<bool>,
    },
}

/// Handle to a running engine task.
///
/// Cheap to pass by reference into higher layers; dropping it shuts the
/// task down.
pub struct Engine {
    events_tx: mpsc::UnboundedSender<Event>,
    snapshot_rx: watch::Receiver<EngineSnapshot>,
}

impl Engine {
    /// Spawns the engine task with its collaborators. The observer is wired
    /// once, here, and owned by the task for its whole life.
    pub fn spawn(
        config: EngineConfig,
        connector: Arc<dyn Connector>,
        identity: Arc<dyn IdentityProvider>,
        observer: Box<dyn EngineObserver>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(EngineSnapshot {
            state: ConnectionState::Disconnected,
            reconnect_attempt: 0,
            last_heartbeat: None,
        });

        let tracker = ActionTracker::new(config.completed_window);
        let task = EngineTask {
            config,
            connector,
            identity,
            observer,
            events_tx: events_tx.clone(),
            snapshot_tx,
            state: ConnectionState::Disconnected,
            target: None,
            suspended: false,
            reconnect_attempt: 0,
            reconnect_timer: None,
            heartbeat_timer: None,
            last_liveness: None,
            last_heartbeat_ms: None,
            channel: None,
            generation: 0,
            tracker,
            credentials: None,
        };
        tokio::spawn(task.run(events_rx));

        Self {
            events_tx,
            snapshot_rx,
        }
    }

    /// Records `address` as the session target and opens a fresh channel.
    pub fn connect(&self, address: &str) {
        self.command(Command::Connect {
            address: address.to_string(),
        });
    }

    /// Authenticates with the host under `client_name`; resolves to true
    /// once AUTH is on the wire.
    pub async fn authenticate(&self, client_name: &str) -> bool {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command(Command::Authenticate {
            client_name: client_name.to_string(),
            reply: reply_tx,
        });
        reply_rx.await.unwrap_or(false)
    }

    /// Dispatches a single-step action; resolves to its id once the frame
    /// is on the wire, or `None` when it was rejected.
    pub async fn send_action(&self, step: Step) -> Option<String> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command(Command::SendAction {
            step,
            reply: reply_tx,
        });
        reply_rx.await.unwrap_or(None)
    }

    /// Tears the session down and forgets the target endpoint.
    pub fn disconnect(&self) {
        self.command(Command::Disconnect);
    }

    /// Feeds one host process lifecycle event into the engine.
    pub fn lifecycle(&self, event: LifecycleEvent) {
        self.command(Command::Lifecycle(event));
    }

    pub fn state(&self) -> ConnectionState {
        self.snapshot_rx.borrow().state
    }

    pub fn reconnect_attempt(&self) -> u32 {
        self.snapshot_rx.borrow().reconnect_attempt
    }

    /// Epoch millis of the last liveness signal, if any session saw one.
    pub fn last_heartbeat(&self) -> Option<u64> {
        self.snapshot_rx.borrow().last_heartbeat
    }

    fn command(&self, command: Command) {
        let _ = self.events_tx.send(Event::Command(command));
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        let _ = self.events_tx.send(Event::Command(Command::Shutdown));
    }
}

/// Prepends `ws://` when the input lacks a websocket scheme.
fn normalize_address(input: &str) -> String {
    if input.starts_with("ws://") || input.starts_with("wss://") {
        input.to_string()
    } else {
        format!("ws://{input}")
    }
}

struct EngineTask {
    config: EngineConfig,
    connector: Arc<dyn Connector>,
    identity: Arc<dyn IdentityProvider>,
    observer: Box<dyn EngineObserver>,
    events_tx: mpsc::UnboundedSender<Event>,
    snapshot_tx: watch::Sender<EngineSnapshot>,

    state: ConnectionState,
    /// Normalized target endpoint of the current session, if any
    target: Option<String>,
    /// Disables the reconnect scheduler (explicit disconnect or background)
    suspended: bool,
    reconnect_attempt: u32,
    reconnect_timer: Option<TimerHandle>,
    heartbeat_timer: Option<TimerHandle>,
    /// Runtime-clock instant of the last liveness signal
    last_liveness: Option<tokio::time::Instant>,
    /// Wall-clock mirror of the same, for observers and reads
    last_heartbeat_ms: Option<u64>,
    channel: Option<Box<dyn Channel>>,
    /// Bumped per channel open; events from older channels are dropped
    generation: u64,
    tracker: ActionTracker,
    /// Remembered (client name, device id) for automatic re-auth
    credentials: Option<(String, String)>,
}

impl EngineTask {
    async fn run(mut self, mut events: mpsc::UnboundedReceiver<Event>) {
        while let Some(event) = events.recv().await {
            let shutting_down = matches!(&event, Event::Command(Command::Shutdown));
            self.handle(event);
            self.publish();
            if shutting_down {
                break;
            }
        }
        tracing::debug!("engine task stopped");
    }

    fn handle(&mut self, event: Event) {
        match event {
            Event::Command(command) => self.handle_command(command),
            Event::Transport { generation, event } => {
                if generation != self.generation {
                    tracing::trace!(generation, "dropping event from a superseded channel");
                    return;
                }
                self.handle_transport(event);
            }
            Event::ReconnectDue => self.handle_reconnect_due(),
            Event::HeartbeatTick => self.handle_heartbeat_tick(),
            Event::ActionDeadline { id } => self.handle_action_deadline(id),
            Event::IdentityResolved {
                client_name,
                outcome,
                reply,
            } => self.handle_identity_resolved(client_name, outcome, reply),
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect { address } => self.handle_connect(address),
            Command::Authenticate { client_name, reply } => {
                self.handle_authenticate(client_name, reply)
            }
            Command::SendAction { step, reply } => {
                let id = self.dispatch_action(step);
                let _ = reply.send(id);
            }
            Command::Disconnect | Command::Shutdown => self.handle_disconnect(),
            Command::Lifecycle(LifecycleEvent::Backgrounded) => self.handle_backgrounded(),
            Command::Lifecycle(LifecycleEvent::Foregrounded) => self.handle_foregrounded(),
        }
    }

    // ---- state machine ----

    /// Applies a guarded transition. A forbidden one leaves state untouched
    /// and surfaces a CLIENT_ERROR instead.
    fn transition(&mut self, next: ConnectionState) -> bool {
        if !self.state.can_transition_to(next) {
            self.emit_error(
                ErrorCode::ClientError,
                format!("Illegal state transition: {} -> {}", self.state, next),
            );
            return false;
        }

        let previous = self.state;
        self.state = next;
        tracing::debug!(%previous, state = %next, attempt = self.reconnect_attempt, "state transition");

        if previous == ConnectionState::Connected && next != ConnectionState::Connected {
            self.stop_heartbeat();
        }
        if next == ConnectionState::Connected && previous != ConnectionState::Connected {
            self.start_heartbeat();
        }
        if matches!(
            next,
            ConnectionState::Disconnected | ConnectionState::Error
        ) {
            self.reconnect_timer = None;
        }

        self.observer.on_state_change(next, self.reconnect_attempt);
        true
    }

    fn emit_error(&mut self, code: ErrorCode, message: impl Into<String>) {
        let notice = ErrorNotice::new(code, message);
        tracing::warn!(code = %notice.code, message = %notice.message, "engine error");
        self.observer.on_error(notice);
    }

    fn publish(&self) {
        let _ = self.snapshot_tx.send(EngineSnapshot {
            state: self.state,
            reconnect_attempt: self.reconnect_attempt,
            last_heartbeat: self.last_heartbeat_ms,
        });
    }

    // ---- intents ----

    fn handle_connect(&mut self, address: String) {
        let trimmed = address.trim();
        if trimmed.is_empty() {
            self.emit_error(ErrorCode::ClientError, "IP address is required.");
            self.transition(ConnectionState::Error);
            return;
        }

        let target = normalize_address(trimmed);
        tracing::info!(target = %target, "connecting");

        self.target = Some(target.clone());
        self.suspended = false;
        self.reconnect_attempt = 0;
        self.reconnect_timer = None;
        self.tracker.clear_pending();

        // CONNECTED/RECONNECTING cannot enter CONNECTING directly; step down
        if matches!(
            self.state,
            ConnectionState::Connected | ConnectionState::Reconnecting
        ) {
            self.transition(ConnectionState::Disconnected);
        }
        if !self.transition(ConnectionState::Connecting) {
            return;
        }
        self.open_channel(&target);
    }

    fn handle_authenticate(&mut self, client_name: String, reply: oneshot::Sender<bool>) {
        let trimmed = client_name.trim().to_string();
        if trimmed.is_empty() {
            self.emit_error(ErrorCode::ClientError, "Client ID is required.");
            let _ = reply.send(false);
            return;
        }
        if self.state != ConnectionState::Connected {
            self.emit_error(ErrorCode::ClientError, "WebSocket is not connected.");
            let _ = reply.send(false);
            return;
        }

        // resolve off-task; the engine keeps processing events while the
        // identity store is busy, and re-checks state when the result lands
        let identity = self.identity.clone();
        let events_tx = self.events_tx.clone();
        tokio::spawn(async move {
            let outcome = identity.resolve_or_create_device_id().await;
            let _ = events_tx.send(Event::IdentityResolved {
                client_name: trimmed,
                outcome,
                reply,
            });
        });
    }

    fn handle_identity_resolved(
        &mut self,
        client_name: String,
        outcome: tapvolt_utils::Result<String>,
        reply: oneshot::Sender<bool>,
    ) {
        let device_id = match outcome {
            Ok(id) => id,
            Err(error) => {
                tracing::error!(%error, "device identity resolution failed");
                self.emit_error(ErrorCode::ClientError, "Failed to load device identity.");
                let _ = reply.send(false);
                return;
            }
        };

        // state may have moved while the resolver ran
        if self.state != ConnectionState::Connected {
            self.emit_error(ErrorCode::ClientError, "WebSocket is not connected.");
            let _ = reply.send(false);
            return;
        }

        self.credentials = Some((client_name, device_id));
        let sent = self.send_auth();
        let _ = reply.send(sent);
    }

    fn dispatch_action(&mut self, step: Step) -> Option<String> {
        let id = self.tracker.mint_id();
        let is_command = matches!(step, Step::Command { .. });
        let action = Action {
            id: id.clone(),
            steps: vec![step],
        };

        if let Err(error) = validate_action(&action) {
            self.emit_error(error.code(), error.to_string());
            return None;
        }

        if is_command {
            self.observer.on_warning(Some(
                "Command execution may be disabled on desktop.".to_string(),
            ));
        } else {
            self.observer.on_warning(None);
        }

        let message = ClientMessage::ExecuteAction {
            timestamp: epoch_millis(),
            payload: action,
        };
        if !self.send_frame(&message) {
            self.emit_error(ErrorCode::ClientError, "WebSocket is not connected.");
            return None;
        }

        let events_tx = self.events_tx.clone();
        let deadline_id = id.clone();
        let timer = TimerHandle::once(self.config.action_timeout, move || {
            let _ = events_tx.send(Event::ActionDeadline { id: deadline_id });
        });
        self.tracker.insert_pending(id.clone(), timer);

        tracing::debug!(action = %id, "action dispatched");
        Some(id)
    }

    fn handle_disconnect(&mut self) {
        tracing::info!("disconnecting");
        self.suspended = true;
        self.reconnect_timer = None;
        self.tracker.clear_pending();
        self.target = None;
        self.reconnect_attempt = 0;
        if let Some(channel) = self.channel.take() {
            channel.close(1000, "client disconnect");
        }
        self.transition(ConnectionState::Disconnected);
    }

    // ---- lifecycle gate ----

    fn handle_backgrounded(&mut self) {
        tracing::info!("host backgrounded, dropping session");
        self.suspended = true;
        self.reconnect_timer = None;
        self.tracker.clear_pending();
        if let Some(channel) = self.channel.take() {
            channel.close(1000, "backgrounded");
        }
        self.transition(ConnectionState::Disconnected);
    }

    fn handle_foregrounded(&mut self) {
        let Some(target) = self.target.clone() else {
            return;
        };
        tracing::info!("host foregrounded, resuming session");
        self.suspended = false;
        self.reconnect_attempt = 0;
        if !self.transition(ConnectionState::Connecting) {
            return;
        }
        self.open_channel(&target);
    }

    // ---- transport ----

    /// Replaces the live channel; at most one is alive at any time.
    fn open_channel(&mut self, address: &str) {
        if let Some(previous) = self.channel.take() {
            previous.close(1000, "superseded");
        }
        self.generation += 1;
        let generation = self.generation;
        let events_tx = self.events_tx.clone();
        let sink: EventSink = Box::new(move |event| {
            let _ = events_tx.send(Event::Transport { generation, event });
        });
        self.channel = Some(self.connector.open(address, sink));
    }

    fn handle_transport(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Opened => self.handle_opened(),
            TransportEvent::Closed { code, reason } => self.handle_closed(code, reason),
            TransportEvent::Errored { message } => {
                tracing::warn!(%message, "transport error");
                self.emit_error(ErrorCode::SocketError, "WebSocket connection error.");
                self.transition(ConnectionState::Error);
            }
            TransportEvent::Message { text } => self.handle_frame(text),
        }
    }

    fn handle_opened(&mut self) {
        self.reconnect_attempt = 0;
        if !self.transition(ConnectionState::Connected) {
            return;
        }
        self.observer.on_connected();
        if self.credentials.is_some() {
            tracing::debug!("re-authenticating with remembered identity");
            self.send_auth();
        }
    }

    fn handle_closed(&mut self, code: Option<u16>, reason: String) {
        tracing::info!(?code, %reason, "transport closed");
        self.channel = None;
        self.observer.on_disconnected();
        if self.suspended {
            self.transition(ConnectionState::Disconnected);
        } else {
            self.schedule_reconnect();
        }
    }

    fn send_auth(&mut self) -> bool {
        let Some((client_name, device_id)) = self.credentials.clone() else {
            return false;
        };
        let message = ClientMessage::Auth {
            payload: AuthPayload {
                client_id: client_name,
                device_id,
                protocol_version: PROTOCOL_VERSION.to_string(),
            },
        };
        self.send_frame(&message)
    }

    fn send_frame(&mut self, message: &ClientMessage) -> bool {
        let frame = match message.to_frame() {
            Ok(frame) => frame,
            Err(error) => {
                tracing::error!(%error, "failed to serialize outbound frame");
                return false;
            }
        };
        match &self.channel {
            Some(channel) => channel.send(frame),
            None => false,
        }
    }

    // ---- reconnect scheduler ----

    fn schedule_reconnect(&mut self) {
        if self.target.is_none() {
            self.transition(ConnectionState::Disconnected);
            return;
        }
        if self.reconnect_attempt >= self.config.max_reconnect_attempts {
            self.emit_error(
                ErrorCode::ClientError,
                format!(
                    "Reconnect failed after {} attempts.",
                    self.config.max_reconnect_attempts
                ),
            );
            self.transition(ConnectionState::Error);
            return;
        }

        self.reconnect_attempt += 1;
        let delay = self.config.reconnect_delay(self.reconnect_attempt);
        tracing::info!(
            attempt = self.reconnect_attempt,
            delay_ms = delay.as_millis() as u64,
            "scheduling reconnect"
        );
        if !self.transition(ConnectionState::Reconnecting) {
            return;
        }
        let events_tx = self.events_tx.clone();
        self.reconnect_timer = Some(TimerHandle::once(delay, move || {
            let _ = events_tx.send(Event::ReconnectDue);
        }));
    }

    fn handle_reconnect_due(&mut self) {
        self.reconnect_timer = None;
        if self.suspended || self.state != ConnectionState::Reconnecting {
            return;
        }
        let Some(target) = self.target.clone() else {
            return;
        };
        // a re-open stays in RECONNECTING until the channel reports
        self.open_channel(&target);
    }

    // ---- heartbeat monitor ----

    fn start_heartbeat(&mut self) {
        self.last_liveness = Some(tokio::time::Instant::now());
        self.last_heartbeat_ms = Some(epoch_millis());
        let events_tx = self.events_tx.clone();
        let handle = TimerHandle::every(self.config.heartbeat_check_interval, move || {
            let _ = events_tx.send(Event::HeartbeatTick);
        });
        // replacement drops (cancels) any previous monitor
        self.heartbeat_timer = Some(handle);
    }

    fn stop_heartbeat(&mut self) {
        self.heartbeat_timer = None;
        self.last_liveness = None;
    }

    fn handle_heartbeat_tick(&mut self) {
        if self.state != ConnectionState::Connected {
            return;
        }
        let Some(last) = self.last_liveness else {
            return;
        };
        if last.elapsed() <= self.config.heartbeat_staleness {
            return;
        }

        // the staleness error precedes the state change
        self.emit_error(ErrorCode::ClientError, "Heartbeat timeout. Reconnecting.");
        if let Some(channel) = self.channel.take() {
            channel.close(
                self.config.heartbeat_close_code,
                EngineConfig::HEARTBEAT_CLOSE_REASON,
            );
        }
        self.schedule_reconnect();
    }

    fn handle_ping(&mut self) {
        let now = epoch_millis();
        self.last_liveness = Some(tokio::time::Instant::now());
        self.last_heartbeat_ms = Some(now);
        self.observer.on_heartbeat(now);
        self.send_frame(&ClientMessage::Pong { timestamp: now });
    }

    // ---- inbound dispatch ----

    fn handle_frame(&mut self, text: String) {
        let frame = match parse_server_frame(&text) {
            Ok(frame) => frame,
            Err(error) => {
                tracing::debug!(%error, frame = %text, "unparseable frame");
                self.emit_error(
                    ErrorCode::InvalidServerMessage,
                    "Invalid message from desktop.",
                );
                return;
            }
        };

        match frame {
            ServerFrame::Ping => self.handle_ping(),
            ServerFrame::AuthSuccess => {
                tracing::info!("authenticated");
                self.observer.on_auth_success();
            }
            ServerFrame::AuthFailure { message } => {
                let message =
                    message.unwrap_or_else(|| "Authentication rejected by desktop.".to_string());
                tracing::warn!(%message, "authentication failed");
                self.observer.on_auth_failure(message);
            }
            ServerFrame::DesktopError { code, message } => {
                if code == ErrorCode::UnknownServerError {
                    tracing::debug!(frame = %text, "unrecognized desktop error code");
                }
                self.observer.on_error(ErrorNotice::new(code, message));
            }
            ServerFrame::ActionResult(result) => self.handle_action_result(result),
        }
    }

    fn handle_action_result(&mut self, result: ExecutionResult) {
        if self.tracker.is_completed(&result.id) {
            tracing::debug!(action = %result.id, "duplicate result dropped");
            return;
        }
        if !self.tracker.take_pending(&result.id) {
            self.emit_error(
                ErrorCode::ClientError,
                format!("Unknown ACTION_RESULT id: {}", result.id),
            );
            return;
        }
        self.tracker.mark_completed(result.id.clone());
        self.observer.on_action_result(result);
    }

    fn handle_action_deadline(&mut self, id: String) {
        if !self.tracker.take_pending(&id) {
            // already resolved or cleared
            return;
        }
        self.tracker.mark_completed(id.clone());

        let seconds = self.config.action_timeout.as_secs();
        self.observer.on_action_timeout(&id);
        self.observer.on_action_result(ExecutionResult {
            id: id.clone(),
            status: ResultStatus::Error,
            execution_time: self.config.action_timeout.as_millis() as f64,
            error: Some(format!("Action timed out after {seconds} seconds.")),
        });
        self.emit_error(
            ErrorCode::ClientError,
            format!("Action {id} timed out after {seconds} seconds."),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use tapvolt_utils::TapvoltError;

    // ---- test doubles ----

    /// What a mock channel does the moment it is opened.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Script {
        /// Wait for the test to drive events by hand
        Manual,
        /// Emit an immediate close, like a refused connect
        RefuseAll,
    }

    #[derive(Clone)]
    struct MockLink {
        address: String,
        sink: Arc<dyn Fn(TransportEvent) + Send + Sync>,
        sent: Arc<Mutex<Vec<String>>>,
        open: Arc<AtomicBool>,
        detached: Arc<AtomicBool>,
        closed_with: Arc<Mutex<Option<(u16, String)>>>,
    }

    impl MockLink {
        fn emit(&self, event: TransportEvent) {
            if self.detached.load(Ordering::Acquire) {
                return;
            }
            (self.sink)(event);
        }

        fn open_up(&self) {
            self.open.store(true, Ordering::Release);
            self.emit(TransportEvent::Opened);
        }

        fn message(&self, text: &str) {
            self.emit(TransportEvent::Message {
                text: text.to_string(),
            });
        }

        fn drop_link(&self) {
            self.open.store(false, Ordering::Release);
            self.emit(TransportEvent::Closed {
                code: None,
                reason: "dropped".to_string(),
            });
        }

        fn error_out(&self) {
            self.open.store(false, Ordering::Release);
            self.emit(TransportEvent::Errored {
                message: "boom".to_string(),
            });
        }

        fn sent_frames(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }

        fn closed_with(&self) -> Option<(u16, String)> {
            self.closed_with.lock().unwrap().clone()
        }
    }

    struct MockChannel(MockLink);

    impl Channel for MockChannel {
        fn send(&self, text: String) -> bool {
            if !self.is_open() {
                return false;
            }
            self.0.sent.lock().unwrap().push(text);
            true
        }

        fn close(&self, code: u16, reason: &str) {
            self.0.detached.store(true, Ordering::Release);
            self.0.open.store(false, Ordering::Release);
            *self.0.closed_with.lock().unwrap() = Some((code, reason.to_string()));
        }

        fn is_open(&self) -> bool {
            self.0.open.load(Ordering::Acquire) && !self.0.detached.load(Ordering::Acquire)
        }
    }

    #[derive(Clone)]
    struct MockConnector {
        script: Script,
        links: Arc<Mutex<Vec<MockLink>>>,
    }

    impl MockConnector {
        fn new(script: Script) -> Self {
            Self {
                script,
                links: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn opens(&self) -> usize {
            self.links.lock().unwrap().len()
        }

        fn latest(&self) -> MockLink {
            self.links
                .lock()
                .unwrap()
                .last()
                .expect("no channel opened yet")
                .clone()
        }
    }

    impl Connector for MockConnector {
        fn open(&self, address: &str, sink: EventSink) -> Box<dyn Channel> {
            let link = MockLink {
                address: address.to_string(),
                sink: Arc::from(sink),
                sent: Arc::new(Mutex::new(Vec::new())),
                open: Arc::new(AtomicBool::new(false)),
                detached: Arc::new(AtomicBool::new(false)),
                closed_with: Arc::new(Mutex::new(None)),
            };
            self.links.lock().unwrap().push(link.clone());
            if self.script == Script::RefuseAll {
                link.emit(TransportEvent::Closed {
                    code: None,
                    reason: "refused".to_string(),
                });
            }
            Box::new(MockChannel(link))
        }
    }

    struct MockIdentity(String);

    #[async_trait]
    impl IdentityProvider for MockIdentity {
        async fn resolve_or_create_device_id(&self) -> tapvolt_utils::Result<String> {
            Ok(self.0.clone())
        }
    }

    struct FailingIdentity;

    #[async_trait]
    impl IdentityProvider for FailingIdentity {
        async fn resolve_or_create_device_id(&self) -> tapvolt_utils::Result<String> {
            Err(TapvoltError::identity("store unavailable"))
        }
    }

    /// Resolver slow enough for the session to change underneath it.
    struct SlowIdentity;

    #[async_trait]
    impl IdentityProvider for SlowIdentity {
        async fn resolve_or_create_device_id(&self) -> tapvolt_utils::Result<String> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok("66666666-7777-8888-9999-000000000000".to_string())
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Observed {
        State(ConnectionState, u32),
        Connected,
        Disconnected,
        AuthSuccess,
        AuthFailure(String),
        Result(ExecutionResult),
        Timeout(String),
        Error(ErrorCode, String),
        Warning(Option<String>),
        Heartbeat,
    }

    #[derive(Clone, Default)]
    struct Recorder {
        events: Arc<Mutex<Vec<Observed>>>,
    }

    impl Recorder {
        fn observer(&self) -> Box<dyn EngineObserver> {
            Box::new(RecorderObserver(self.clone()))
        }

        fn events(&self) -> Vec<Observed> {
            self.events.lock().unwrap().clone()
        }

        fn errors(&self) -> Vec<(ErrorCode, String)> {
            self.events()
                .into_iter()
                .filter_map(|e| match e {
                    Observed::Error(code, message) => Some((code, message)),
                    _ => None,
                })
                .collect()
        }

        fn results(&self) -> Vec<ExecutionResult> {
            self.events()
                .into_iter()
                .filter_map(|e| match e {
                    Observed::Result(result) => Some(result),
                    _ => None,
                })
                .collect()
        }

        fn clear(&self) {
            self.events.lock().unwrap().clear();
        }
    }

    struct RecorderObserver(Recorder);

    impl RecorderObserver {
        fn push(&self, event: Observed) {
            self.0.events.lock().unwrap().push(event);
        }
    }

    impl EngineObserver for RecorderObserver {
        fn on_state_change(&mut self, state: ConnectionState, reconnect_attempt: u32) {
            self.push(Observed::State(state, reconnect_attempt));
        }
        fn on_connected(&mut self) {
            self.push(Observed::Connected);
        }
        fn on_disconnected(&mut self) {
            self.push(Observed::Disconnected);
        }
        fn on_auth_success(&mut self) {
            self.push(Observed::AuthSuccess);
        }
        fn on_auth_failure(&mut self, message: String) {
            self.push(Observed::AuthFailure(message));
        }
        fn on_action_result(&mut self, result: ExecutionResult) {
            self.push(Observed::Result(result));
        }
        fn on_action_timeout(&mut self, id: &str) {
            self.push(Observed::Timeout(id.to_string()));
        }
        fn on_error(&mut self, notice: ErrorNotice) {
            self.push(Observed::Error(notice.code, notice.message));
        }
        fn on_warning(&mut self, warning: Option<String>) {
            self.push(Observed::Warning(warning));
        }
        fn on_heartbeat(&mut self, _timestamp: u64) {
            self.push(Observed::Heartbeat);
        }
    }

    // ---- harness ----

    fn spawn_engine(script: Script) -> (Engine, MockConnector, Recorder) {
        let connector = MockConnector::new(script);
        let recorder = Recorder::default();
        let engine = Engine::spawn(
            EngineConfig::default(),
            Arc::new(connector.clone()),
            Arc::new(MockIdentity("11111111-2222-3333-4444-555555555555".into())),
            recorder.observer(),
        );
        (engine, connector, recorder)
    }

    /// Lets the engine task drain its queue.
    async fn settle() {
        for _ in 0..32 {
            tokio::task::yield_now().await;
        }
    }

    async fn connected_engine() -> (Engine, MockConnector, Recorder, MockLink) {
        let (engine, connector, recorder) = spawn_engine(Script::Manual);
        engine.connect("192.168.1.20:8080");
        settle().await;
        let link = connector.latest();
        link.open_up();
        settle().await;
        assert_eq!(engine.state(), ConnectionState::Connected);
        (engine, connector, recorder, link)
    }

    // ---- connect ----

    #[tokio::test(start_paused = true)]
    async fn test_connect_normalizes_address() {
        let (engine, connector, _recorder) = spawn_engine(Script::Manual);
        engine.connect("192.168.1.20:8080");
        settle().await;

        assert_eq!(engine.state(), ConnectionState::Connecting);
        assert_eq!(connector.latest().address, "ws://192.168.1.20:8080");
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_passes_websocket_schemes_through() {
        let (engine, connector, _recorder) = spawn_engine(Script::Manual);
        engine.connect("wss://host.example:9");
        settle().await;
        assert_eq!(connector.latest().address, "wss://host.example:9");

        engine.connect("ws://host.example:9");
        settle().await;
        assert_eq!(connector.latest().address, "ws://host.example:9");
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_rejects_empty_address() {
        let (engine, connector, recorder) = spawn_engine(Script::Manual);
        engine.connect("   ");
        settle().await;

        assert_eq!(engine.state(), ConnectionState::Error);
        assert_eq!(connector.opens(), 0);
        assert_eq!(
            recorder.errors(),
            vec![(ErrorCode::ClientError, "IP address is required.".to_string())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_opened_transitions_to_connected() {
        let (engine, _connector, recorder, _link) = connected_engine().await;
        assert_eq!(engine.reconnect_attempt(), 0);

        let events = recorder.events();
        let connected_at = events
            .iter()
            .position(|e| *e == Observed::State(ConnectionState::Connected, 0))
            .expect("connected transition observed");
        assert_eq!(events[connected_at + 1], Observed::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_while_connected_steps_down_first() {
        let (engine, connector, recorder, _link) = connected_engine().await;
        recorder.clear();

        engine.connect("10.0.0.1:9");
        settle().await;

        assert_eq!(engine.state(), ConnectionState::Connecting);
        assert_eq!(connector.opens(), 2);
        let events = recorder.events();
        let down = events
            .iter()
            .position(|e| *e == Observed::State(ConnectionState::Disconnected, 0))
            .expect("stepped down first");
        let connecting = events
            .iter()
            .position(|e| *e == Observed::State(ConnectionState::Connecting, 0))
            .expect("then connecting");
        assert!(down < connecting);
        assert!(recorder.errors().is_empty(), "no illegal transition");
    }

    // ---- authenticate ----

    #[tokio::test(start_paused = true)]
    async fn test_authenticate_sends_exact_auth_frame() {
        let (engine, _connector, recorder, link) = connected_engine().await;

        assert!(engine.authenticate("tapvolt-mobile").await);
        settle().await;

        let frames = link.sent_frames();
        assert_eq!(
            frames,
            vec![
                r#"{"type":"AUTH","payload":{"clientId":"tapvolt-mobile","deviceId":"11111111-2222-3333-4444-555555555555","protocolVersion":"1.0"}}"#
            ]
        );

        link.message(r#"{"type":"AUTH_SUCCESS"}"#);
        settle().await;
        assert!(recorder.events().contains(&Observed::AuthSuccess));
    }

    #[tokio::test(start_paused = true)]
    async fn test_authenticate_requires_connection() {
        let (engine, _connector, recorder) = spawn_engine(Script::Manual);
        assert!(!engine.authenticate("tapvolt-mobile").await);
        assert_eq!(
            recorder.errors(),
            vec![(
                ErrorCode::ClientError,
                "WebSocket is not connected.".to_string()
            )]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_authenticate_rejects_blank_name() {
        let (engine, _connector, recorder, _link) = connected_engine().await;
        assert!(!engine.authenticate("  ").await);
        assert_eq!(
            recorder.errors(),
            vec![(ErrorCode::ClientError, "Client ID is required.".to_string())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_authenticate_surfaces_identity_failure() {
        let connector = MockConnector::new(Script::Manual);
        let recorder = Recorder::default();
        let engine = Engine::spawn(
            EngineConfig::default(),
            Arc::new(connector.clone()),
            Arc::new(FailingIdentity),
            recorder.observer(),
        );

        engine.connect("h:1");
        settle().await;
        connector.latest().open_up();
        settle().await;

        assert!(!engine.authenticate("tapvolt-mobile").await);
        assert!(recorder
            .errors()
            .contains(&(ErrorCode::ClientError, "Failed to load device identity.".to_string())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_rechecks_state_after_identity_resolution() {
        // the channel drops while identity resolution is in flight; the
        // resumed path must re-check the state and refuse to send
        let connector = MockConnector::new(Script::Manual);
        let recorder = Recorder::default();
        let engine = Arc::new(Engine::spawn(
            EngineConfig::default(),
            Arc::new(connector.clone()),
            Arc::new(SlowIdentity),
            recorder.observer(),
        ));

        engine.connect("h:1");
        settle().await;
        let link = connector.latest();
        link.open_up();
        settle().await;
        assert_eq!(engine.state(), ConnectionState::Connected);

        let auth = tokio::spawn({
            let engine = engine.clone();
            async move { engine.authenticate("tapvolt-mobile").await }
        });
        settle().await; // authenticate accepted, resolver still sleeping

        link.drop_link();
        settle().await;
        assert_eq!(engine.state(), ConnectionState::Reconnecting);

        // let the resolver finish; the resumed path must bail out
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(!auth.await.unwrap());
        assert!(link.sent_frames().is_empty());
        assert!(recorder
            .errors()
            .contains(&(ErrorCode::ClientError, "WebSocket is not connected.".to_string())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_reauth_after_reconnect() {
        let (engine, connector, _recorder, link) = connected_engine().await;
        assert!(engine.authenticate("tapvolt-mobile").await);
        settle().await;

        link.drop_link();
        settle().await;
        assert_eq!(engine.state(), ConnectionState::Reconnecting);

        tokio::time::sleep(Duration::from_millis(1_050)).await;
        settle().await;
        assert_eq!(connector.opens(), 2);

        let second = connector.latest();
        second.open_up();
        settle().await;

        assert_eq!(engine.state(), ConnectionState::Connected);
        let frames = second.sent_frames();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].starts_with(r#"{"type":"AUTH""#));
        assert!(frames[0].contains(r#""clientId":"tapvolt-mobile""#));
    }

    // ---- actions ----

    #[tokio::test(start_paused = true)]
    async fn test_action_roundtrip() {
        let (engine, _connector, recorder, link) = connected_engine().await;

        let id = engine
            .send_action(Step::Text {
                value: "hi\n".to_string(),
            })
            .await
            .expect("action accepted");

        let frames = link.sent_frames();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].starts_with(r#"{"type":"EXECUTE_ACTION","timestamp":"#));
        assert!(frames[0].contains(&format!(r#""id":"{id}""#)));
        assert!(frames[0].contains(r#"{"type":"text","value":"hi\n"}"#));

        link.message(&format!(
            r#"{{"type":"ACTION_RESULT","payload":{{"id":"{id}","status":"success","executionTime":42}}}}"#
        ));
        settle().await;

        let results = recorder.results();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, id);
        assert_eq!(results[0].status, ResultStatus::Success);
        assert_eq!(results[0].execution_time, 42.0);
        assert!(recorder.errors().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_action_timeout_sequence() {
        let (engine, _connector, recorder, link) = connected_engine().await;

        let id = engine
            .send_action(Step::Shortcut {
                keys: vec!["control".to_string(), "s".to_string()],
            })
            .await
            .expect("action accepted");

        tokio::time::sleep(Duration::from_millis(8_050)).await;
        settle().await;

        let events = recorder.events();
        let timeout_at = events
            .iter()
            .position(|e| *e == Observed::Timeout(id.clone()))
            .expect("timeout observed");
        let result_at = events
            .iter()
            .position(|e| matches!(e, Observed::Result(r) if r.id == id))
            .expect("synthetic result observed");
        assert!(timeout_at < result_at, "timeout precedes the result");

        let results = recorder.results();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, ResultStatus::Error);
        assert_eq!(results[0].execution_time, 8000.0);
        assert_eq!(
            results[0].error.as_deref(),
            Some("Action timed out after 8 seconds.")
        );
        assert!(recorder.errors().contains(&(
            ErrorCode::ClientError,
            format!("Action {id} timed out after 8 seconds.")
        )));

        // a late host result for the same id is dropped silently
        recorder.clear();
        link.message(&format!(
            r#"{{"type":"ACTION_RESULT","payload":{{"id":"{id}","status":"success","executionTime":9000}}}}"#
        ));
        settle().await;
        assert!(recorder.results().is_empty());
        assert!(recorder.errors().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_result_cancels_timeout() {
        let (engine, _connector, recorder, link) = connected_engine().await;
        let id = engine
            .send_action(Step::Key {
                key: "enter".to_string(),
            })
            .await
            .unwrap();

        link.message(&format!(
            r#"{{"type":"ACTION_RESULT","payload":{{"id":"{id}","status":"success","executionTime":3}}}}"#
        ));
        settle().await;

        tokio::time::sleep(Duration::from_secs(10)).await;
        settle().await;

        // exactly one outcome, no timeout afterwards
        assert_eq!(recorder.results().len(), 1);
        assert!(!recorder
            .events()
            .iter()
            .any(|e| matches!(e, Observed::Timeout(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_result_id_is_an_error() {
        let (_engine, _connector, recorder, link) = connected_engine().await;

        link.message(
            r#"{"type":"ACTION_RESULT","payload":{"id":"nope-1","status":"success","executionTime":1}}"#,
        );
        settle().await;

        assert!(recorder.errors().contains(&(
            ErrorCode::ClientError,
            "Unknown ACTION_RESULT id: nope-1".to_string()
        )));
        assert!(recorder.results().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_command_step_warns_and_others_clear() {
        let (engine, _connector, recorder, _link) = connected_engine().await;

        engine
            .send_action(Step::Command {
                command: "ls".to_string(),
            })
            .await
            .expect("command accepted");
        engine
            .send_action(Step::Key {
                key: "enter".to_string(),
            })
            .await
            .expect("key accepted");
        settle().await;

        let warnings: Vec<_> = recorder
            .events()
            .into_iter()
            .filter_map(|e| match e {
                Observed::Warning(w) => Some(w),
                _ => None,
            })
            .collect();
        assert_eq!(
            warnings,
            vec![
                Some("Command execution may be disabled on desktop.".to_string()),
                None
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_action_while_disconnected() {
        let (engine, _connector, recorder) = spawn_engine(Script::Manual);

        let id = engine
            .send_action(Step::Key {
                key: "enter".to_string(),
            })
            .await;
        assert!(id.is_none());
        assert_eq!(
            recorder.errors(),
            vec![(
                ErrorCode::ClientError,
                "WebSocket is not connected.".to_string()
            )]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_text_step_is_rejected() {
        let (engine, _connector, recorder, link) = connected_engine().await;

        let id = engine
            .send_action(Step::Text {
                value: "x".repeat(1001),
            })
            .await;
        assert!(id.is_none());
        assert!(link.sent_frames().is_empty());
        assert_eq!(
            recorder.errors(),
            vec![(
                ErrorCode::MaxTextLengthExceeded,
                "Text step exceeds the maximum of 1000 characters.".to_string()
            )]
        );
    }

    // ---- heartbeat ----

    #[tokio::test(start_paused = true)]
    async fn test_ping_updates_liveness_and_replies_pong() {
        let (engine, _connector, recorder, link) = connected_engine().await;
        let before = engine.last_heartbeat().expect("liveness set on connect");

        link.message(r#"{"type":"PING"}"#);
        settle().await;

        assert!(recorder.events().contains(&Observed::Heartbeat));
        assert!(engine.last_heartbeat().expect("liveness refreshed") >= before);
        let frames = link.sent_frames();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].starts_with(r#"{"type":"PONG","timestamp":"#));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pings_keep_the_session_alive() {
        let (engine, _connector, recorder, link) = connected_engine().await;

        for _ in 0..3 {
            tokio::time::sleep(Duration::from_secs(10)).await;
            link.message(r#"{"type":"PING"}"#);
            settle().await;
        }

        assert_eq!(engine.state(), ConnectionState::Connected);
        assert!(recorder.errors().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_staleness_forces_reconnect() {
        let (engine, connector, recorder, link) = connected_engine().await;

        tokio::time::sleep(Duration::from_millis(16_100)).await;
        settle().await;

        assert!(recorder.errors().contains(&(
            ErrorCode::ClientError,
            "Heartbeat timeout. Reconnecting.".to_string()
        )));
        assert_eq!(
            link.closed_with(),
            Some((4000, "Heartbeat timeout".to_string()))
        );
        assert_eq!(engine.state(), ConnectionState::Reconnecting);
        assert_eq!(engine.reconnect_attempt(), 1);

        // the error precedes the RECONNECTING transition
        let events = recorder.events();
        let error_at = events
            .iter()
            .position(|e| {
                matches!(e, Observed::Error(_, m) if m == "Heartbeat timeout. Reconnecting.")
            })
            .unwrap();
        let reconnecting_at = events
            .iter()
            .position(|e| *e == Observed::State(ConnectionState::Reconnecting, 1))
            .unwrap();
        assert!(error_at < reconnecting_at);

        // next open lands about a second later
        tokio::time::sleep(Duration::from_millis(1_050)).await;
        settle().await;
        assert_eq!(connector.opens(), 2);
    }

    // ---- reconnect ----

    #[tokio::test(start_paused = true)]
    async fn test_drop_schedules_reconnect_and_open_resets_attempt() {
        let (engine, connector, recorder, link) = connected_engine().await;

        link.drop_link();
        settle().await;

        assert!(recorder.events().contains(&Observed::Disconnected));
        assert_eq!(engine.state(), ConnectionState::Reconnecting);
        assert_eq!(engine.reconnect_attempt(), 1);

        tokio::time::sleep(Duration::from_millis(1_050)).await;
        settle().await;
        assert_eq!(connector.opens(), 2);
        assert_eq!(engine.state(), ConnectionState::Reconnecting);

        connector.latest().open_up();
        settle().await;
        assert_eq!(engine.state(), ConnectionState::Connected);
        assert_eq!(engine.reconnect_attempt(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_sequence_and_exhaustion() {
        let (engine, connector, recorder) = spawn_engine(Script::RefuseAll);
        engine.connect("unreachable:1");
        settle().await;
        assert_eq!(connector.opens(), 1);

        // delays before attempts 1..10: 1,2,4,8,10,10,10,10,10,10 seconds
        let sleeps_ms = [1_000, 2_000, 4_000, 8_000, 10_000, 10_000, 10_000, 10_000, 10_000, 10_000];
        for (i, ms) in sleeps_ms.iter().enumerate() {
            tokio::time::sleep(Duration::from_millis(ms + 25)).await;
            settle().await;
            assert_eq!(connector.opens(), i + 2, "attempt {}", i + 1);
        }

        settle().await;
        assert_eq!(engine.state(), ConnectionState::Error);
        assert!(recorder.errors().contains(&(
            ErrorCode::ClientError,
            "Reconnect failed after 10 attempts.".to_string()
        )));

        // the eleventh attempt never happens
        tokio::time::sleep(Duration::from_secs(60)).await;
        settle().await;
        assert_eq!(connector.opens(), 11);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_surfaces_socket_error() {
        let (engine, _connector, recorder, link) = connected_engine().await;

        link.error_out();
        settle().await;

        assert!(recorder.errors().contains(&(
            ErrorCode::SocketError,
            "WebSocket connection error.".to_string()
        )));
        assert_eq!(engine.state(), ConnectionState::Error);
    }

    // ---- disconnect and lifecycle ----

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_round_trip() {
        let (engine, _connector, recorder, link) = connected_engine().await;
        engine
            .send_action(Step::Key {
                key: "enter".to_string(),
            })
            .await
            .expect("pending action");

        engine.disconnect();
        settle().await;

        assert_eq!(engine.state(), ConnectionState::Disconnected);
        assert_eq!(engine.reconnect_attempt(), 0);
        assert_eq!(link.closed_with(), Some((1000, "client disconnect".to_string())));

        // no timer scheduled before the disconnect may still deliver
        recorder.clear();
        tokio::time::sleep(Duration::from_secs(30)).await;
        settle().await;
        assert!(recorder.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_regardless_of_address_validity() {
        let (engine, _connector, _recorder) = spawn_engine(Script::Manual);
        engine.connect("!! definitely not an address !!");
        engine.disconnect();
        settle().await;

        assert_eq!(engine.state(), ConnectionState::Disconnected);
        assert_eq!(engine.reconnect_attempt(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_then_foreground() {
        let (engine, connector, recorder, link) = connected_engine().await;
        assert!(engine.authenticate("tapvolt-mobile").await);
        engine
            .send_action(Step::Key {
                key: "enter".to_string(),
            })
            .await
            .expect("pending action");

        engine.lifecycle(LifecycleEvent::Backgrounded);
        settle().await;

        assert_eq!(engine.state(), ConnectionState::Disconnected);
        assert_eq!(link.closed_with(), Some((1000, "backgrounded".to_string())));

        // the pending action dies with the session: no result, no timeout
        recorder.clear();
        tokio::time::sleep(Duration::from_secs(30)).await;
        settle().await;
        assert!(recorder.events().is_empty());

        engine.lifecycle(LifecycleEvent::Foregrounded);
        settle().await;

        assert_eq!(engine.state(), ConnectionState::Connecting);
        assert_eq!(engine.reconnect_attempt(), 0);
        assert_eq!(connector.opens(), 2);
        let connecting: Vec<_> = recorder
            .events()
            .into_iter()
            .filter(|e| matches!(e, Observed::State(ConnectionState::Connecting, _)))
            .collect();
        assert_eq!(connecting.len(), 1, "exactly one CONNECTING transition");

        // the remembered identity re-authenticates on open
        let second = connector.latest();
        second.open_up();
        settle().await;
        assert!(second
            .sent_frames()
            .first()
            .is_some_and(|f| f.starts_with(r#"{"type":"AUTH""#)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_foreground_without_target_does_nothing() {
        let (engine, connector, recorder) = spawn_engine(Script::Manual);
        engine.lifecycle(LifecycleEvent::Foregrounded);
        settle().await;

        assert_eq!(engine.state(), ConnectionState::Disconnected);
        assert_eq!(connector.opens(), 0);
        assert!(recorder.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_while_reconnecting_cancels_retry() {
        let (engine, connector, _recorder, link) = connected_engine().await;
        link.drop_link();
        settle().await;
        assert_eq!(engine.state(), ConnectionState::Reconnecting);

        engine.lifecycle(LifecycleEvent::Backgrounded);
        settle().await;
        assert_eq!(engine.state(), ConnectionState::Disconnected);

        tokio::time::sleep(Duration::from_secs(30)).await;
        settle().await;
        assert_eq!(connector.opens(), 1, "no retry while backgrounded");
    }

    // ---- inbound frames ----

    #[tokio::test(start_paused = true)]
    async fn test_invalid_server_message() {
        let (_engine, _connector, recorder, link) = connected_engine().await;

        link.message("garbage");
        link.message(r#"{"type":"WHAT"}"#);
        settle().await;

        let errors = recorder.errors();
        assert_eq!(errors.len(), 2);
        for (code, message) in errors {
            assert_eq!(code, ErrorCode::InvalidServerMessage);
            assert_eq!(message, "Invalid message from desktop.");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_error_mapping() {
        let (_engine, _connector, recorder, link) = connected_engine().await;

        link.message(r#"{"type":"ERROR","payload":{"code":"COMMAND_EXECUTION_DISABLED"}}"#);
        settle().await;
        assert!(recorder.errors().contains(&(
            ErrorCode::CommandExecutionDisabled,
            "Terminal commands are disabled on the desktop.".to_string()
        )));

        recorder.clear();
        link.message(r#"{"type":"ERROR","message":"unauthorized device"}"#);
        settle().await;
        assert!(recorder
            .events()
            .contains(&Observed::AuthFailure("unauthorized device".to_string())));
        assert!(recorder.errors().is_empty(), "auth failures skip the error sink");
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_failure_frame() {
        let (_engine, _connector, recorder, link) = connected_engine().await;

        link.message(r#"{"type":"AUTH_FAILURE"}"#);
        settle().await;
        assert!(recorder
            .events()
            .contains(&Observed::AuthFailure(
                "Authentication rejected by desktop.".to_string()
            )));
    }

    // ---- helpers ----

    #[test]
    fn test_normalize_address() {
        assert_eq!(normalize_address("192.168.1.20:8080"), "ws://192.168.1.20:8080");
        assert_eq!(normalize_address("ws://a:1"), "ws://a:1");
        assert_eq!(normalize_address("wss://a:1"), "wss://a:1");
    }
}
