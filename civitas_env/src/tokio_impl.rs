//! Production implementation of SessionContext using Tokio.

use crate::SessionContext;
use async_trait::async_trait;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tokio::task::JoinHandle;
use tracing::Instrument;

/// Production context backed by Tokio and OS entropy.
///
/// Time comes from the system clock, randomness from the OS.
pub struct TokioContext {
    /// Start time for monotonic duration calculations
    start: Instant,
}

impl TokioContext {
    /// Creates a new TokioContext.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Creates an Arc-wrapped context for sharing across tasks.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl Default for TokioContext {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionContext for TokioContext {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    fn system_time(&self) -> SystemTime {
        SystemTime::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn spawn<F>(&self, name: &str, future: F) -> JoinHandle<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        tokio::spawn(future.instrument(tracing::info_span!("task", name = %name)))
    }

    fn derive_rng(&self, _stream: u64) -> ChaCha8Rng {
        // In production, every stream is independently entropy-seeded
        ChaCha8Rng::from_entropy()
    }

    fn seed(&self) -> u64 {
        // Production is not seeded
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[tokio::test]
    async fn test_tokio_context_time() {
        let ctx = TokioContext::new();
        let t1 = ctx.now();
        ctx.sleep(Duration::from_millis(10)).await;
        let t2 = ctx.now();

        assert!(t2 > t1);
        assert!(t2 - t1 >= Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_tokio_context_rng_not_reproducible() {
        let ctx = TokioContext::new();
        let a: u64 = ctx.derive_rng(1).gen();
        let b: u64 = ctx.derive_rng(1).gen();

        // In production, streams should differ (random)
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_tokio_context_spawn_can_be_aborted() {
        let ctx = TokioContext::new();
        let handle = ctx.spawn("forever", async {
            loop {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        });
        handle.abort();
        let joined = handle.await;
        assert!(joined.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_tokio_context_spawn_runs_in_task_span() {
        let _guard = tracing::subscriber::set_default(tracing_subscriber::registry());
        let ctx = TokioContext::new();
        let handle = ctx.spawn("telemetry-ticker", async {
            let span = tracing::Span::current();
            assert_eq!(span.metadata().map(|m| m.name()), Some("task"));
        });
        handle.await.unwrap();
    }

    #[test]
    fn test_tokio_context_seed() {
        let ctx = TokioContext::new();
        assert_eq!(ctx.seed(), 0);
    }
}
