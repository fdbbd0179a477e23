//! Test doubles shared by the unit tests of this crate.

use async_trait::async_trait;
use civitas_env::{GenerateRequest, GenerateResponse, GenerativeModel, ModelError, SessionContext};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::task::JoinHandle;

/// Context with a hand-driven clock.
pub struct ManualClock {
    now: Mutex<Duration>,
    seed: u64,
}

impl ManualClock {
    pub fn shared(seed: u64) -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(Duration::ZERO),
            seed,
        })
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock().unwrap() += by;
    }
}

#[async_trait]
impl SessionContext for ManualClock {
    fn now(&self) -> Duration {
        *self.now.lock().unwrap()
    }

    fn system_time(&self) -> SystemTime {
        UNIX_EPOCH + self.now()
    }

    async fn sleep(&self, duration: Duration) {
        self.advance(duration);
        tokio::task::yield_now().await;
    }

    fn spawn<F>(&self, _name: &str, future: F) -> JoinHandle<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        tokio::spawn(future)
    }

    fn derive_rng(&self, stream: u64) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(self.seed ^ stream)
    }

    fn seed(&self) -> u64 {
        self.seed
    }
}

/// Model that replays queued outcomes and advances the clock by a fixed latency.
pub struct StubModel {
    clock: Arc<ManualClock>,
    latency: Duration,
    outcomes: Mutex<VecDeque<Result<GenerateResponse, ModelError>>>,
    calls: AtomicUsize,
    last_request: Mutex<Option<GenerateRequest>>,
}

impl StubModel {
    pub fn shared(clock: Arc<ManualClock>, latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            clock,
            latency,
            outcomes: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        })
    }

    pub fn push(&self, outcome: Result<GenerateResponse, ModelError>) {
        self.outcomes.lock().unwrap().push_back(outcome);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<GenerateRequest> {
        self.last_request.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerativeModel for StubModel {
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.clock.advance(self.latency);
        let echo = format!("answer to: {}", request.prompt);
        *self.last_request.lock().unwrap() = Some(request);
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(GenerateResponse::text(echo)))
    }

    fn backend_name(&self) -> &str {
        "stub"
    }
}
