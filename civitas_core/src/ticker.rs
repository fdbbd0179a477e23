//! Periodic telemetry drift for the simulation store.

use crate::simulation::SimulationStore;
use civitas_env::SessionContext;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Owns the background task that calls `SimulationStore::tick` on a fixed
/// interval.
///
/// The task is aborted by `stop()` or when the ticker is dropped, so the
/// store is never mutated after the session is torn down.
pub struct TelemetryTicker {
    handle: Option<JoinHandle<()>>,
    interval: Duration,
}

impl TelemetryTicker {
    /// Spawns the tick loop on the context's executor.
    ///
    /// Needs a real-time context such as `TokioContext`. On a virtual clock
    /// whose `sleep` advances time and yields, the loop never waits and
    /// ticks without bound; drive telemetry from the clock instead.
    pub fn start<Ctx: SessionContext>(
        context: Arc<Ctx>,
        store: Arc<Mutex<SimulationStore>>,
        interval: Duration,
    ) -> Self {
        let clock = Arc::clone(&context);
        let handle = context.spawn("telemetry-ticker", async move {
            loop {
                clock.sleep(interval).await;
                let poisoned = match store.lock() {
                    Ok(mut store) => {
                        store.tick();
                        false
                    }
                    Err(_) => true,
                };
                if poisoned {
                    warn!("simulation store lock poisoned, stopping telemetry ticker");
                    break;
                }
            }
        });
        debug!(interval_ms = interval.as_millis() as u64, "telemetry ticker started");

        Self {
            handle: Some(handle),
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns true while the tick loop is alive.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().map_or(false, |h| !h.is_finished())
    }

    /// Cancels the tick loop. Idempotent.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            debug!("telemetry ticker stopped");
        }
    }
}

impl Drop for TelemetryTicker {
    fn drop(&mut self) {
        self.stop();
    }
}
