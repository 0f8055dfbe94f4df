//! In-memory collaborators shared by the integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use parking_lot::Mutex;
use tokio::time::Instant;

use relaycast::{
    AuthorContext, Candidate, Channel, ChannelId, ChannelKind, Config, DeliveryFailure,
    DeliveryReport, Directory, Discovery, DiscoveryError, Engine, LogSink, Payload, Server,
    ServerContext, ServerId, Session, SinkError, Transport,
};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Directory whose servers and channels can change while the engine runs.
#[derive(Default)]
pub struct MemoryDirectory {
    servers: Mutex<Vec<Server>>,
    channels: Mutex<Vec<Channel>>,
}

impl MemoryDirectory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_server(&self, id: u64, name: &str) {
        self.servers.lock().push(Server {
            id: ServerId(id),
            name: name.into(),
        });
    }

    pub fn remove_server(&self, id: u64) {
        self.servers.lock().retain(|s| s.id != ServerId(id));
        self.channels.lock().retain(|c| c.server != ServerId(id));
    }

    pub fn add_channel(&self, id: u64, name: &str, kind: ChannelKind, server: u64) {
        self.channels.lock().push(Channel {
            id: ChannelId(id),
            name: name.into(),
            kind,
            server: ServerId(server),
        });
    }

    pub fn add_text(&self, id: u64, name: &str, server: u64) {
        self.add_channel(id, name, ChannelKind::Text, server);
    }

    pub fn remove_channel(&self, id: u64) {
        self.channels.lock().retain(|c| c.id != ChannelId(id));
    }
}

impl Directory for MemoryDirectory {
    fn servers(&self) -> Vec<Server> {
        self.servers.lock().clone()
    }

    fn channels(&self, server: ServerId, kind: Option<ChannelKind>) -> Vec<Channel> {
        self.channels
            .lock()
            .iter()
            .filter(|c| c.server == server && kind.is_none_or(|k| c.kind == k))
            .cloned()
            .collect()
    }

    fn channel(&self, id: ChannelId) -> Option<Channel> {
        self.channels.lock().iter().find(|c| c.id == id).cloned()
    }
}

#[derive(Debug, Clone)]
pub struct Delivery {
    pub channel: ChannelId,
    pub server: ServerId,
    pub payload: Payload,
    pub started: Instant,
    pub finished: Instant,
}

/// Transport that records deliveries and fails channels on demand.
pub struct RecordingTransport {
    latency: Duration,
    deliveries: Mutex<Vec<Delivery>>,
    failures: Mutex<HashMap<ChannelId, DeliveryFailure>>,
    releases: Mutex<usize>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Self::with_latency(Duration::ZERO)
    }

    /// Each send takes `latency` of (paused) time.
    pub fn with_latency(latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            latency,
            deliveries: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            releases: Mutex::new(0),
        })
    }

    pub fn fail(&self, channel: u64, failure: DeliveryFailure) {
        self.failures.lock().insert(ChannelId(channel), failure);
    }

    pub fn heal(&self, channel: u64) {
        self.failures.lock().remove(&ChannelId(channel));
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().clone()
    }

    pub fn sent_to(&self, channel: u64) -> usize {
        self.deliveries
            .lock()
            .iter()
            .filter(|d| d.channel == ChannelId(channel))
            .count()
    }

    pub fn releases(&self) -> usize {
        *self.releases.lock()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(
        &self,
        session: &mut Session,
        channel: &Channel,
        payload: &Payload,
    ) -> Result<(), DeliveryFailure> {
        let started = Instant::now();
        session.connect(channel.id);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if let Some(failure) = self.failures.lock().get(&channel.id) {
            return Err(failure.clone());
        }
        self.deliveries.lock().push(Delivery {
            channel: channel.id,
            server: channel.server,
            payload: payload.clone(),
            started,
            finished: Instant::now(),
        });
        Ok(())
    }

    async fn release(&self, session: &mut Session) {
        *self.releases.lock() += 1;
        session.clear();
    }
}

/// Discovery over a fixed candidate list; joining adds the server to a directory.
pub struct FakeDiscovery {
    candidates: Vec<Candidate>,
    directory: Arc<MemoryDirectory>,
    limit: Option<usize>,
    /// Candidates whose join "succeeds" but never become visible.
    ghosts: Vec<ServerId>,
    /// Candidates whose join returns an error.
    refused: Vec<ServerId>,
    joined: Mutex<Vec<ServerId>>,
    closed: Mutex<bool>,
}

impl FakeDiscovery {
    pub fn new(directory: Arc<MemoryDirectory>, names: &[(u64, &str)]) -> Self {
        Self {
            candidates: names
                .iter()
                .map(|(id, name)| Candidate {
                    name: (*name).into(),
                    id: ServerId(*id),
                    join_url: format!("https://invite.example/{id}"),
                })
                .collect(),
            directory,
            limit: None,
            ghosts: Vec::new(),
            refused: Vec::new(),
            joined: Mutex::new(Vec::new()),
            closed: Mutex::new(false),
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_ghost(mut self, id: u64) -> Self {
        self.ghosts.push(ServerId(id));
        self
    }

    pub fn with_refusal(mut self, id: u64) -> Self {
        self.refused.push(ServerId(id));
        self
    }

    pub fn joined(&self) -> Vec<ServerId> {
        self.joined.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock()
    }
}

#[async_trait]
impl Discovery for FakeDiscovery {
    fn candidates(&self) -> BoxStream<'static, Candidate> {
        Box::pin(stream::iter(self.candidates.clone()))
    }

    async fn join(&self, candidate: &Candidate) -> Result<(), DiscoveryError> {
        self.joined.lock().push(candidate.id);
        if self.refused.contains(&candidate.id) {
            return Err(DiscoveryError::JoinFailed("invite expired".into()));
        }
        if !self.ghosts.contains(&candidate.id) {
            self.directory.add_server(candidate.id.0, &candidate.name);
        }
        Ok(())
    }

    fn limit(&self) -> Option<usize> {
        self.limit
    }

    async fn close(&self) {
        *self.closed.lock() = true;
    }
}

/// Sink that keeps every saved report.
#[derive(Default)]
pub struct RecordingSink {
    saved: Mutex<VecDeque<(ServerContext, DeliveryReport)>>,
    fail: Mutex<bool>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_failing(&self, fail: bool) {
        *self.fail.lock() = fail;
    }

    pub fn saved(&self) -> Vec<(ServerContext, DeliveryReport)> {
        self.saved.lock().iter().cloned().collect()
    }
}

#[async_trait]
impl LogSink for RecordingSink {
    async fn save(
        &self,
        server: &ServerContext,
        report: &DeliveryReport,
        _author: &AuthorContext,
    ) -> Result<(), SinkError> {
        if *self.fail.lock() {
            return Err("sink offline".into());
        }
        self.saved.lock().push_back((server.clone(), report.clone()));
        Ok(())
    }
}

pub struct Harness {
    pub engine: Arc<Engine>,
    pub directory: Arc<MemoryDirectory>,
    pub transport: Arc<RecordingTransport>,
    pub sink: Arc<RecordingSink>,
}

pub fn harness(cfg: Config, transport: Arc<RecordingTransport>) -> Harness {
    init_tracing();
    let directory = MemoryDirectory::new();
    harness_with(cfg, transport, directory)
}

pub fn harness_with(
    cfg: Config,
    transport: Arc<RecordingTransport>,
    directory: Arc<MemoryDirectory>,
) -> Harness {
    let sink = RecordingSink::new();
    let engine = Engine::builder(cfg, transport.clone(), directory.clone())
        .with_log_sink(sink.clone())
        .with_author(AuthorContext {
            name: "relay".into(),
            id: 7,
        })
        .build();
    Harness {
        engine,
        directory,
        transport,
        sink,
    }
}

/// Advances paused time in small steps so spawned tasks get to run.
pub async fn advance(total: Duration) {
    let step = Duration::from_millis(100);
    let mut left = total;
    while !left.is_zero() {
        let d = left.min(step);
        tokio::time::sleep(d).await;
        left -= d;
    }
}
