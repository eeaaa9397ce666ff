//! Simulated network latency for the local backend.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use common::LocalStoreConfig;

/// Produces the artificial delay awaited before each local operation.
pub trait DelayStrategy: Send + Sync + Debug {
    fn next_delay(&self) -> Duration;
}

/// Resolve immediately (deterministic tests)
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDelay;

impl DelayStrategy for NoDelay {
    fn next_delay(&self) -> Duration {
        Duration::ZERO
    }
}

/// Same delay for every operation
#[derive(Debug, Clone, Copy)]
pub struct FixedDelay(pub Duration);

impl DelayStrategy for FixedDelay {
    fn next_delay(&self) -> Duration {
        self.0
    }
}

/// `base` plus a uniformly distributed extra in `[0, jitter]`
#[derive(Debug, Clone, Copy)]
pub struct JitterDelay {
    pub base: Duration,
    pub jitter: Duration,
}

impl DelayStrategy for JitterDelay {
    fn next_delay(&self) -> Duration {
        let span = self.jitter.as_nanos();
        if span == 0 {
            return self.base;
        }
        // v4 UUIDs are filled from the OS random source
        let sample = uuid::Uuid::new_v4().as_u128() % (span + 1);
        self.base + Duration::from_nanos(sample as u64)
    }
}

/// Build the strategy described by configuration
pub fn from_config(config: &LocalStoreConfig) -> Arc<dyn DelayStrategy> {
    let base = Duration::from_millis(config.delay_ms);
    match (config.delay_ms, config.jitter_ms) {
        (0, 0) => Arc::new(NoDelay),
        (_, 0) => Arc::new(FixedDelay(base)),
        (_, jitter) => Arc::new(JitterDelay {
            base,
            jitter: Duration::from_millis(jitter),
        }),
    }
}

/// Await the next delay of a strategy
pub(crate) async fn pause(strategy: &dyn DelayStrategy) {
    let delay = strategy.next_delay();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}
