//! Shared fakes for the client integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;

use lc_client::api::{ApiRequest, ApiResponse};
use lc_client::channel::{Connection, FrameSink, FrameStream, PushTransport};
use lc_client::collaborators::Notifier;
use lc_client::{ChannelError, ClientError, HttpTransport};
use lc_proto::channel::{ChannelFrame, ChannelToken};
use lc_store::{MemoryStore, Record, RecordStore, StoreError};

pub const WAIT: Duration = Duration::from_secs(5);

/// Records every request; answers with queued responses per route, or an
/// empty 200 when nothing is queued.
#[derive(Default)]
pub struct MockHttp {
    requests: Mutex<Vec<ApiRequest>>,
    responses: Mutex<HashMap<String, VecDeque<ApiResponse>>>,
}

impl MockHttp {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, route: &str, status: u16, body: Vec<u8>) {
        self.responses
            .lock()
            .entry(route.to_string())
            .or_default()
            .push_back(ApiResponse { status, body });
    }

    pub fn respond_json<T: Serialize>(&self, route: &str, value: &T) {
        self.respond(route, 200, serde_json::to_vec(value).unwrap());
    }

    pub fn requests_to(&self, route: &str) -> Vec<ApiRequest> {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.route == route)
            .cloned()
            .collect()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl HttpTransport for MockHttp {
    async fn post(&self, request: ApiRequest) -> Result<ApiResponse, ClientError> {
        let queued = self
            .responses
            .lock()
            .get_mut(&request.route)
            .and_then(|q| q.pop_front());
        self.requests.lock().push(request);
        Ok(queued.unwrap_or(ApiResponse { status: 200, body: Vec::new() }))
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub seen: Mutex<Vec<(String, String)>>,
}

impl Notifier for RecordingNotifier {
    fn notify(&self, title: &str, body: &str) {
        self.seen.lock().push((title.to_string(), body.to_string()));
    }
}

impl RecordingNotifier {
    pub fn titles(&self) -> Vec<String> {
        self.seen.lock().iter().map(|(t, _)| t.clone()).collect()
    }
}

/// `MemoryStore` whose inserts can be switched to fail as if the vault
/// were locked.
pub struct FlakyStore<R> {
    pub inner: MemoryStore<R>,
    fail_saves: AtomicBool,
}

impl<R> FlakyStore<R> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { inner: MemoryStore::new(), fail_saves: AtomicBool::new(false) })
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl<R: Record> RecordStore<R> for FlakyStore<R> {
    async fn save(&self, record: &R) -> Result<(), StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::VaultLocked);
        }
        self.inner.save(record).await
    }

    async fn get(&self, key: &str) -> Result<Option<R>, StoreError> {
        self.inner.get(key).await
    }

    async fn update(&self, record: &R) -> Result<(), StoreError> {
        self.inner.update(record).await
    }

    async fn get_all(&self) -> Result<Vec<R>, StoreError> {
        self.inner.get_all().await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.inner.delete(key).await
    }
}

// ── Push transport ───────────────────────────────────────────────────────────

/// Server side of one accepted connection. Dropping it ends the connection.
pub struct ServerEnd {
    pub token: ChannelToken,
    pub from_client: mpsc::UnboundedReceiver<ChannelFrame>,
    pub to_client: mpsc::UnboundedSender<Result<ChannelFrame, ChannelError>>,
}

impl ServerEnd {
    pub fn push(&self, frame: ChannelFrame) {
        self.to_client.send(Ok(frame)).unwrap();
    }

    pub async fn next_from_client(&mut self) -> ChannelFrame {
        tokio::time::timeout(WAIT, self.from_client.recv())
            .await
            .expect("timed out waiting for client frame")
            .expect("client side closed")
    }
}

pub struct MockPush {
    accepted: mpsc::UnboundedSender<ServerEnd>,
    refuse: AtomicBool,
    attempts: AtomicUsize,
}

impl MockPush {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ServerEnd>) {
        let (accepted, rx) = mpsc::unbounded_channel();
        let push = Arc::new(Self {
            accepted,
            refuse: AtomicBool::new(false),
            attempts: AtomicUsize::new(0),
        });
        (push, rx)
    }

    pub fn refuse_connections(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PushTransport for MockPush {
    async fn connect(&self, token: &ChannelToken) -> Result<Connection, ChannelError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.refuse.load(Ordering::SeqCst) {
            return Err(ChannelError::Connect("refused".into()));
        }
        let (client_tx, from_client) = mpsc::unbounded_channel();
        let (to_client, client_rx) = mpsc::unbounded_channel();
        self.accepted
            .send(ServerEnd { token: token.clone(), from_client, to_client })
            .map_err(|_| ChannelError::Connect("server gone".into()))?;
        Ok(Connection {
            sink: Box::new(MockSink(client_tx)),
            stream: Box::new(MockStream(client_rx)),
        })
    }
}

struct MockSink(mpsc::UnboundedSender<ChannelFrame>);

#[async_trait]
impl FrameSink for MockSink {
    async fn send(&mut self, frame: ChannelFrame) -> Result<(), ChannelError> {
        self.0.send(frame).map_err(|e| ChannelError::Send(e.to_string()))
    }

    async fn close(&mut self) {}
}

struct MockStream(mpsc::UnboundedReceiver<Result<ChannelFrame, ChannelError>>);

#[async_trait]
impl FrameStream for MockStream {
    async fn next_frame(&mut self) -> Option<Result<ChannelFrame, ChannelError>> {
        self.0.recv().await
    }
}

pub async fn next_server_end(rx: &mut mpsc::UnboundedReceiver<ServerEnd>) -> ServerEnd {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for connection")
        .expect("transport dropped")
}
