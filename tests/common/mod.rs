#![allow(dead_code)]

//! Shared test doubles: a scripted connector and scripted requests driven
//! through the session's dispatch tick.

use futures::future::BoxFuture;
use netpool::{
    BufferPool, Connector, EstablishedTransport, ExchangeOutcome, HostAddress, MemoryStore,
    NetError, NetworkSession, Request, SessionConfig, TransportStream,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use url::Url;

/// Connector that establishes instantly, with optional scripted failures
/// consumed in order before successes resume.
pub struct MockConnector {
    protocol: String,
    failures: Mutex<VecDeque<NetError>>,
    established: AtomicUsize,
}

impl MockConnector {
    pub fn new(protocol: &str) -> Arc<Self> {
        Arc::new(Self {
            protocol: protocol.to_string(),
            failures: Mutex::new(VecDeque::new()),
            established: AtomicUsize::new(0),
        })
    }

    pub fn fail_next(&self, error: NetError) {
        self.failures.lock().unwrap().push_back(error);
    }

    /// Transports successfully established so far.
    pub fn established_count(&self) -> usize {
        self.established.load(Ordering::SeqCst)
    }
}

impl Connector for MockConnector {
    fn establish(
        &self,
        _address: HostAddress,
        _protocols: Vec<String>,
    ) -> BoxFuture<'static, Result<EstablishedTransport, NetError>> {
        let scripted = self.failures.lock().unwrap().pop_front();
        let result = match scripted {
            Some(error) => Err(error),
            None => {
                self.established.fetch_add(1, Ordering::SeqCst);
                let (client, _server) = tokio::io::duplex(4096);
                Ok(EstablishedTransport {
                    stream: Box::new(client),
                    protocol: self.protocol.clone(),
                })
            }
        };
        Box::pin(async move { result })
    }
}

/// Per-attempt behavior of a [`MockRequest`].
pub enum ExchangeStep {
    Succeed { reusable: bool },
    Fail(NetError),
    /// Never completes; the connection stays Active.
    Stall,
}

/// Test-side handle observing a request's attempts and completions.
#[derive(Clone)]
pub struct RequestProbe {
    attempts: Arc<AtomicUsize>,
    completions: Arc<Mutex<Vec<Result<(), NetError>>>>,
}

impl RequestProbe {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn completions(&self) -> Vec<Result<(), NetError>> {
        self.completions.lock().unwrap().clone()
    }
}

pub struct MockRequest {
    id: u64,
    uri: Url,
    script: VecDeque<ExchangeStep>,
    retries: u32,
    attempts: Arc<AtomicUsize>,
    completions: Arc<Mutex<Vec<Result<(), NetError>>>>,
}

impl MockRequest {
    pub fn new(
        id: u64,
        uri: &str,
        retries: u32,
        script: Vec<ExchangeStep>,
    ) -> (Box<MockRequest>, RequestProbe) {
        let attempts = Arc::new(AtomicUsize::new(0));
        let completions = Arc::new(Mutex::new(Vec::new()));
        let probe =
            RequestProbe { attempts: Arc::clone(&attempts), completions: Arc::clone(&completions) };
        let request = Box::new(MockRequest {
            id,
            uri: Url::parse(uri).unwrap(),
            script: script.into(),
            retries,
            attempts,
            completions,
        });
        (request, probe)
    }
}

impl Request for MockRequest {
    fn id(&self) -> u64 {
        self.id
    }

    fn uri(&self) -> &Url {
        &self.uri
    }

    fn set_uri(&mut self, uri: Url) {
        self.uri = uri;
    }

    fn exchange<'a>(
        &'a mut self,
        _stream: &'a mut dyn TransportStream,
        buffers: &'a BufferPool,
    ) -> BoxFuture<'a, Result<ExchangeOutcome, NetError>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let step = self.script.pop_front().unwrap_or(ExchangeStep::Succeed { reusable: true });
        match step {
            ExchangeStep::Succeed { reusable } => Box::pin(async move {
                // Exercise the allocator the way a real transcoder would.
                let scratch = buffers.acquire(8192, false);
                buffers.release(scratch);
                Ok(ExchangeOutcome { reusable })
            }),
            ExchangeStep::Fail(error) => Box::pin(async move { Err(error) }),
            ExchangeStep::Stall => {
                Box::pin(futures::future::pending::<Result<ExchangeOutcome, NetError>>())
            }
        }
    }

    fn take_retry(&mut self) -> bool {
        if self.retries > 0 {
            self.retries -= 1;
            true
        } else {
            false
        }
    }

    fn complete(&mut self, result: Result<(), NetError>) {
        self.completions.lock().unwrap().push(result);
    }
}

/// Session wired to the mock connector and an in-memory store.
pub fn session_with(connector: Arc<MockConnector>, config: SessionConfig) -> NetworkSession {
    NetworkSession::with_parts(config, connector, Arc::new(MemoryStore::new()))
}

/// Let worker tasks run, then apply their events; repeated so multi-hop
/// flows (resend, recycle) settle.
pub async fn pump(session: &mut NetworkSession, rounds: usize) {
    for _ in 0..rounds {
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        session.tick();
    }
}
