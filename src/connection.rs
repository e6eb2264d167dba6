use crate::config::ConnectionConfig;
use crate::event::{
    RegisterPayload, RegisteredAck, WireFrame, EVENT_CONNECT, EVENT_CONNECT_ERROR,
    EVENT_DISCONNECT, EVENT_RECONNECT, EVENT_REGISTER, EVENT_REGISTERED,
};
use anyhow::{anyhow, Context, Result};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub type HandlerId = u64;
type EventHandler = Arc<dyn Fn(Value) + Send + Sync>;

/// Synchronous view of the push channel, no I/O involved.
#[derive(Debug, Clone)]
pub struct ConnectionStatus {
    pub connected: bool,
    /// Session id assigned by the server in the registration ack.
    pub session_id: Option<String>,
    pub reconnect_attempts: u32,
    /// True once automatic reconnection has been abandoned; only an explicit
    /// `connect` resumes. Callers must not infer this from attempt counts.
    pub gave_up: bool,
}

/// Bounded exponential backoff. Attempt `n` (1-based) sleeps
/// `min(base * 2^(n-1), cap)` until the attempt budget is exhausted.
pub(crate) struct ReconnectPolicy {
    attempts: u32,
    max_attempts: u32,
    base_ms: u64,
    cap_ms: u64,
}

impl ReconnectPolicy {
    pub(crate) fn new(config: &ConnectionConfig) -> Self {
        Self {
            attempts: 0,
            max_attempts: config.max_reconnect_attempts(),
            base_ms: config.backoff_base_ms(),
            cap_ms: config.backoff_max_ms(),
        }
    }

    /// Delay before the next attempt, or `None` once the budget is spent.
    pub(crate) fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts >= self.max_attempts {
            return None;
        }
        self.attempts += 1;
        let exp = self.attempts.saturating_sub(1).min(20);
        let ms = self.base_ms.saturating_mul(1u64 << exp).min(self.cap_ms);
        Some(Duration::from_millis(ms))
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.attempts
    }

    pub(crate) fn reset(&mut self) {
        self.attempts = 0;
    }
}

#[derive(Default)]
struct Registry {
    next_id: HandlerId,
    handlers: HashMap<String, Vec<(HandlerId, EventHandler)>>,
}

struct ManagerInner {
    config: ConnectionConfig,
    registry: Mutex<Registry>,
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    connected: AtomicBool,
    attempts: AtomicU32,
    gave_up: AtomicBool,
    session_id: Mutex<Option<String>>,
    identity: Mutex<Option<RegisterPayload>>,
    cancel: Mutex<Option<CancellationToken>>,
}

/// Owner of the one persistent push channel. Cheaply clonable handle; all
/// clones share the same transport, registry and counters.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<ManagerInner>,
}

impl ConnectionManager {
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                config,
                registry: Mutex::new(Registry::default()),
                outbound: Mutex::new(None),
                connected: AtomicBool::new(false),
                attempts: AtomicU32::new(0),
                gave_up: AtomicBool::new(false),
                session_id: Mutex::new(None),
                identity: Mutex::new(None),
                cancel: Mutex::new(None),
            }),
        }
    }

    /// Open the push channel and register `account_id`. Idempotent: a no-op
    /// while connected or while the run loop is still reconnecting.
    pub fn connect(&self, account_id: &str) -> Result<()> {
        let url = url::Url::parse(&self.inner.config.ws_url)
            .with_context(|| format!("invalid push channel url: {}", self.inner.config.ws_url))?;
        match url.scheme() {
            "ws" | "wss" => {}
            other => return Err(anyhow!("unsupported push channel scheme: {}", other)),
        }

        if self.inner.connected.load(Ordering::SeqCst) {
            debug!("push channel already connected");
            return Ok(());
        }

        let mut cancel = self.inner.cancel.lock().unwrap();
        if let Some(token) = cancel.as_ref() {
            if !token.is_cancelled() && !self.inner.gave_up.load(Ordering::SeqCst) {
                debug!("push channel already reconnecting");
                return Ok(());
            }
        }

        *self.inner.identity.lock().unwrap() = Some(RegisterPayload {
            account_id: account_id.to_string(),
            client: crate::version::get_useragent(),
            instance_id: Uuid::new_v4().to_string(),
        });
        self.inner.gave_up.store(false, Ordering::SeqCst);
        self.inner.attempts.store(0, Ordering::SeqCst);

        let token = CancellationToken::new();
        *cancel = Some(token.clone());
        tokio::spawn(run_loop(self.inner.clone(), token));
        Ok(())
    }

    /// Register a callback for a named event. Registrations made before the
    /// transport exists are kept and served from the first frame onward.
    pub fn on(&self, event: &str, handler: impl Fn(Value) + Send + Sync + 'static) -> HandlerId {
        let mut registry = self.inner.registry.lock().unwrap();
        registry.next_id += 1;
        let id = registry.next_id;
        registry
            .handlers
            .entry(event.to_string())
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    pub fn off(&self, event: &str, id: HandlerId) {
        let mut registry = self.inner.registry.lock().unwrap();
        if let Some(handlers) = registry.handlers.get_mut(event) {
            handlers.retain(|(handler_id, _)| *handler_id != id);
        }
    }

    /// Send a named event. Only while connected; otherwise the frame is
    /// dropped with a warning, never queued, never an error.
    pub fn emit(&self, event: &str, data: Value) {
        if !self.inner.connected.load(Ordering::SeqCst) {
            warn!(event, "emit while disconnected, dropping frame");
            return;
        }
        let frame = WireFrame::new(event, data);
        let text = match serde_json::to_string(&frame) {
            Ok(text) => text,
            Err(e) => {
                warn!(event, "failed to encode frame: {}", e);
                return;
            }
        };
        if let Some(tx) = self.inner.outbound.lock().unwrap().as_ref() {
            tx.send(Message::Text(text.into())).ok();
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus {
            connected: self.inner.connected.load(Ordering::SeqCst),
            session_id: self.inner.session_id.lock().unwrap().clone(),
            reconnect_attempts: self.inner.attempts.load(Ordering::SeqCst),
            gave_up: self.inner.gave_up.load(Ordering::SeqCst),
        }
    }

    /// Close the transport, drop every handler registration and reset the
    /// counters. A later `connect` starts fresh.
    pub fn disconnect(&self) {
        if let Some(token) = self.inner.cancel.lock().unwrap().take() {
            token.cancel();
        }
        self.inner.mark_disconnected();
        self.inner.registry.lock().unwrap().handlers.clear();
        self.inner.attempts.store(0, Ordering::SeqCst);
        self.inner.gave_up.store(false, Ordering::SeqCst);
        *self.inner.identity.lock().unwrap() = None;
        info!("push channel disconnected");
    }

    #[cfg(test)]
    pub(crate) fn handle_frame(&self, text: &str) {
        self.inner.dispatch_frame(text);
    }
}

impl ManagerInner {
    fn mark_disconnected(&self) {
        self.connected.store(false, Ordering::SeqCst);
        *self.outbound.lock().unwrap() = None;
        *self.session_id.lock().unwrap() = None;
    }

    fn dispatch_event(&self, event: &str, data: Value) {
        let handlers: Vec<EventHandler> = {
            let registry = self.registry.lock().unwrap();
            registry
                .handlers
                .get(event)
                .map(|v| v.iter().map(|(_, h)| h.clone()).collect())
                .unwrap_or_default()
        };
        for handler in handlers {
            handler(data.clone());
        }
    }

    fn dispatch_frame(&self, text: &str) {
        let frame: WireFrame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("undecodable push frame: {}", e);
                return;
            }
        };
        if frame.event == EVENT_REGISTERED {
            match serde_json::from_value::<RegisteredAck>(frame.data.clone()) {
                Ok(ack) => {
                    info!(session_id = %ack.session_id, "push channel registration acknowledged");
                    *self.session_id.lock().unwrap() = Some(ack.session_id);
                }
                Err(e) => warn!("bad registration ack: {}", e),
            }
        }
        self.dispatch_event(&frame.event, frame.data);
    }
}

async fn run_loop(inner: Arc<ManagerInner>, token: CancellationToken) {
    let mut policy = ReconnectPolicy::new(&inner.config);
    loop {
        if token.is_cancelled() {
            return;
        }
        match tokio_tungstenite::connect_async(inner.config.ws_url.as_str()).await {
            Ok((stream, _)) => {
                let resumed = inner.attempts.load(Ordering::SeqCst) > 0;
                policy.reset();
                inner.attempts.store(0, Ordering::SeqCst);
                inner.connected.store(true, Ordering::SeqCst);
                info!(url = %inner.config.ws_url, "push channel connected");

                let (mut sink, mut source) = stream.split();

                let identity = inner.identity.lock().unwrap().clone();
                if let Some(identity) = identity {
                    match serde_json::to_value(&identity) {
                        Ok(data) => {
                            let frame = WireFrame::new(EVENT_REGISTER, data);
                            match serde_json::to_string(&frame) {
                                Ok(text) => {
                                    if let Err(e) = sink.send(Message::Text(text.into())).await {
                                        warn!("failed to send registration: {}", e);
                                    }
                                }
                                Err(e) => warn!("failed to encode registration: {}", e),
                            }
                        }
                        Err(e) => warn!("failed to encode registration: {}", e),
                    }
                }

                let (tx, mut rx) = mpsc::unbounded_channel();
                *inner.outbound.lock().unwrap() = Some(tx);
                inner.dispatch_event(EVENT_CONNECT, Value::Null);
                if resumed {
                    inner.dispatch_event(EVENT_RECONNECT, Value::Null);
                }

                loop {
                    tokio::select! {
                        _ = token.cancelled() => {
                            sink.send(Message::Close(None)).await.ok();
                            inner.mark_disconnected();
                            return;
                        }
                        Some(msg) = rx.recv() => {
                            if let Err(e) = sink.send(msg).await {
                                warn!("push channel send failed: {}", e);
                                break;
                            }
                        }
                        next = source.next() => match next {
                            Some(Ok(Message::Text(text))) => inner.dispatch_frame(&text),
                            Some(Ok(Message::Ping(payload))) => {
                                sink.send(Message::Pong(payload)).await.ok();
                            }
                            Some(Ok(Message::Close(reason))) => {
                                warn!(?reason, "push channel closed by server");
                                break;
                            }
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                warn!("push channel error: {}", e);
                                break;
                            }
                            None => break,
                        }
                    }
                }

                inner.mark_disconnected();
                inner.dispatch_event(EVENT_DISCONNECT, Value::Null);
            }
            Err(e) => {
                warn!(url = %inner.config.ws_url, "push channel connect failed: {}", e);
                inner.dispatch_event(EVENT_CONNECT_ERROR, json!({ "error": e.to_string() }));
            }
        }

        if token.is_cancelled() {
            return;
        }
        match policy.next_delay() {
            Some(delay) => {
                inner.attempts.store(policy.attempts(), Ordering::SeqCst);
                info!(
                    attempt = policy.attempts(),
                    delay_ms = delay.as_millis() as u64,
                    "reconnecting push channel"
                );
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = sleep(delay) => {}
                }
            }
            None => {
                inner.gave_up.store(true, Ordering::SeqCst);
                warn!(
                    max_attempts = inner.config.max_reconnect_attempts(),
                    "push channel reconnect abandoned, explicit connect required"
                );
                return;
            }
        }
    }
}
