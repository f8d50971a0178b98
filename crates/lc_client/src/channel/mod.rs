//! Push channel.
//!
//! One logical connection to the hub. `start` tears down any existing
//! connection, mints a token, connects, and hands the connection to a driver
//! task. The driver multiplexes shutdown, outbound frames and inbound frames;
//! inbound invocations are routed to handlers registered by method name.
//!
//! When the connection drops, the driver walks the `ReconnectPolicy` delays,
//! minting a fresh token for every attempt, and gives up with
//! `ChannelEvent::Closed` once the delays are exhausted.

pub mod auth;
pub mod dispatch;
pub mod websocket;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

use lc_proto::channel::{ChannelFrame, ChannelToken};

use crate::error::{ChannelError, ClientError};

pub use auth::{mint_token, ReplayGuard};
pub use dispatch::{ContactDispatcher, DispatchOutcome};
pub use websocket::WebSocketTransport;

/// Credential source, invoked once per connection attempt.
pub type TokenProvider = Arc<dyn Fn() -> Result<ChannelToken, ClientError> + Send + Sync>;

type Handler = Arc<dyn Fn(Vec<u8>) -> BoxFuture<'static, ()> + Send + Sync>;
type HandlerMap = Arc<RwLock<HashMap<String, Handler>>>;

#[async_trait]
pub trait FrameSink: Send {
    async fn send(&mut self, frame: ChannelFrame) -> Result<(), ChannelError>;
    async fn close(&mut self);
}

#[async_trait]
pub trait FrameStream: Send {
    /// `None` once the peer has gone away.
    async fn next_frame(&mut self) -> Option<Result<ChannelFrame, ChannelError>>;
}

pub struct Connection {
    pub sink: Box<dyn FrameSink>,
    pub stream: Box<dyn FrameStream>,
}

#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn connect(&self, token: &ChannelToken) -> Result<Connection, ChannelError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Connected,
    Reconnecting { reason: String },
    Reconnected,
    Closed { reason: Option<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Delays before each reconnect attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    delays: Vec<Duration>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new([0, 2, 10, 30].into_iter().map(Duration::from_secs).collect())
    }
}

impl ReconnectPolicy {
    pub fn new(delays: Vec<Duration>) -> Self {
        Self { delays }
    }

    pub fn delays(&self) -> &[Duration] {
        &self.delays
    }
}

struct Driver {
    outbound: mpsc::UnboundedSender<ChannelFrame>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

pub struct PushChannel {
    transport: Arc<dyn PushTransport>,
    policy: ReconnectPolicy,
    handlers: HandlerMap,
    events: broadcast::Sender<ChannelEvent>,
    state: Arc<watch::Sender<ChannelState>>,
    driver: Mutex<Option<Driver>>,
}

impl PushChannel {
    pub fn new(transport: Arc<dyn PushTransport>, policy: ReconnectPolicy) -> Self {
        let (events, _) = broadcast::channel(32);
        let (state, _) = watch::channel(ChannelState::Disconnected);
        Self {
            transport,
            policy,
            handlers: Arc::new(RwLock::new(HashMap::new())),
            events,
            state: Arc::new(state),
            driver: Mutex::new(None),
        }
    }

    /// Register the handler for an inbound method, replacing any previous one.
    pub fn on<F, Fut>(&self, method: &str, handler: F)
    where
        F: Fn(Vec<u8>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |payload| handler(payload).boxed());
        self.handlers.write().insert(method.to_string(), handler);
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ChannelEvent> {
        self.events.subscribe()
    }

    pub fn watch_state(&self) -> watch::Receiver<ChannelState> {
        self.state.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        *self.state.borrow() == ChannelState::Connected
    }

    /// Connect and spawn the driver. Any existing connection is stopped first.
    pub async fn start(&self, tokens: TokenProvider) -> Result<(), ChannelError> {
        self.stop().await;

        self.state.send_replace(ChannelState::Connecting);
        let conn = match connect_once(self.transport.as_ref(), &tokens).await {
            Ok(conn) => conn,
            Err(e) => {
                self.state.send_replace(ChannelState::Disconnected);
                tracing::warn!(error = %e, "[channel] initial connect failed");
                return Err(e);
            }
        };
        self.state.send_replace(ChannelState::Connected);
        let _ = self.events.send(ChannelEvent::Connected);
        tracing::info!("[channel] connected");

        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let ctx = DriverCtx {
            transport: Arc::clone(&self.transport),
            tokens,
            policy: self.policy.clone(),
            handlers: Arc::clone(&self.handlers),
            events: self.events.clone(),
            state: Arc::clone(&self.state),
        };
        let task = tokio::spawn(ctx.run(conn, outbound_rx, shutdown_rx));
        *self.driver.lock() = Some(Driver { outbound, shutdown, task });
        Ok(())
    }

    /// Close the connection and wait for the driver to finish.
    pub async fn stop(&self) {
        let driver = self.driver.lock().take();
        if let Some(driver) = driver {
            let _ = driver.shutdown.send(true);
            drop(driver.outbound);
            if let Err(e) = driver.task.await {
                tracing::warn!(error = %e, "[channel] driver task ended abnormally");
            }
        }
    }

    /// Queue an invocation. Does not wait for delivery.
    pub fn send(&self, method: &str, payload: Vec<u8>) -> Result<(), ChannelError> {
        let driver = self.driver.lock();
        let driver = driver.as_ref().ok_or(ChannelError::NotStarted)?;
        driver
            .outbound
            .send(ChannelFrame::invocation(method, payload))
            .map_err(|_| ChannelError::Closed)
    }
}

impl Drop for PushChannel {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.get_mut().take() {
            let _ = driver.shutdown.send(true);
        }
    }
}

async fn connect_once(
    transport: &dyn PushTransport,
    tokens: &TokenProvider,
) -> Result<Connection, ChannelError> {
    let token = tokens().map_err(|e| ChannelError::Credentials(e.to_string()))?;
    transport.connect(&token).await
}

enum Reconnect {
    Connected(Connection),
    Shutdown,
    GaveUp(String),
}

struct DriverCtx {
    transport: Arc<dyn PushTransport>,
    tokens: TokenProvider,
    policy: ReconnectPolicy,
    handlers: HandlerMap,
    events: broadcast::Sender<ChannelEvent>,
    state: Arc<watch::Sender<ChannelState>>,
}

impl DriverCtx {
    async fn run(
        self,
        mut conn: Connection,
        mut outbound: mpsc::UnboundedReceiver<ChannelFrame>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            let reason = tokio::select! {
                _ = shutdown.changed() => {
                    conn.sink.close().await;
                    self.finish(None);
                    return;
                }
                Some(frame) = outbound.recv() => match conn.sink.send(frame).await {
                    Ok(()) => continue,
                    Err(e) => e.to_string(),
                },
                incoming = conn.stream.next_frame() => match incoming {
                    Some(Ok(ChannelFrame::Invocation { method, payload })) => {
                        self.dispatch(&method, payload);
                        continue;
                    }
                    Some(Ok(ChannelFrame::Ping)) => match conn.sink.send(ChannelFrame::Pong).await {
                        Ok(()) => continue,
                        Err(e) => e.to_string(),
                    },
                    Some(Ok(ChannelFrame::Pong)) => continue,
                    Some(Ok(ChannelFrame::Close { reason })) => {
                        reason.unwrap_or_else(|| "closed by server".to_string())
                    }
                    Some(Err(e)) => e.to_string(),
                    None => "connection ended".to_string(),
                },
            };

            tracing::warn!(%reason, "[channel] connection lost");
            self.state.send_replace(ChannelState::Reconnecting);
            let _ = self.events.send(ChannelEvent::Reconnecting { reason });

            match self.reconnect(&mut shutdown).await {
                Reconnect::Connected(next) => {
                    conn = next;
                    self.state.send_replace(ChannelState::Connected);
                    let _ = self.events.send(ChannelEvent::Reconnected);
                    tracing::info!("[channel] reconnected");
                }
                Reconnect::Shutdown => {
                    self.finish(None);
                    return;
                }
                Reconnect::GaveUp(last) => {
                    tracing::warn!(error = %last, "[channel] giving up after reconnect attempts");
                    self.finish(Some(last));
                    return;
                }
            }
        }
    }

    async fn reconnect(&self, shutdown: &mut watch::Receiver<bool>) -> Reconnect {
        let mut last = String::from("no reconnect attempts configured");
        for (attempt, delay) in self.policy.delays().iter().enumerate() {
            tokio::select! {
                _ = shutdown.changed() => return Reconnect::Shutdown,
                _ = tokio::time::sleep(*delay) => {}
            }
            match connect_once(self.transport.as_ref(), &self.tokens).await {
                Ok(conn) => return Reconnect::Connected(conn),
                Err(e) => {
                    tracing::debug!(attempt = attempt + 1, error = %e, "[channel] reconnect attempt failed");
                    last = e.to_string();
                }
            }
        }
        Reconnect::GaveUp(last)
    }

    fn dispatch(&self, method: &str, payload: Vec<u8>) {
        let handler = self.handlers.read().get(method).cloned();
        match handler {
            Some(handler) => {
                tokio::spawn(handler(payload));
            }
            None => tracing::debug!(%method, "[channel] no handler registered"),
        }
    }

    fn finish(&self, reason: Option<String>) {
        self.state.send_replace(ChannelState::Disconnected);
        let _ = self.events.send(ChannelEvent::Closed { reason });
        tracing::info!("[channel] closed");
    }
}
