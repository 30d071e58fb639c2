//! Simulated hardware provisioning latency
//!
//! Real hardware takes time to come up. The adaptor waits once per
//! allocation call, before touching any persisted state. The wait is an async
//! sleep, so other reconciles keep running.

use std::fmt;
use std::time::Duration;

use tracing::debug;

/// How long an allocation call waits before provisioning
pub trait ProvisioningLatency: Send + Sync + fmt::Debug {
    fn delay(&self) -> Duration;
}

/// Always wait the same amount of time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedLatency(pub Duration);

impl FixedLatency {
    pub fn from_secs(secs: u64) -> Self {
        Self(Duration::from_secs(secs))
    }
}

impl ProvisioningLatency for FixedLatency {
    fn delay(&self) -> Duration {
        self.0
    }
}

/// Never wait
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoLatency;

impl ProvisioningLatency for NoLatency {
    fn delay(&self) -> Duration {
        Duration::ZERO
    }
}

/// Wait for the policy's delay
pub async fn simulate(latency: &dyn ProvisioningLatency) {
    let delay = latency.delay();
    if delay.is_zero() {
        return;
    }

    debug!("Simulating provisioning latency of {:?}", delay);
    tokio::time::sleep(delay).await;
}
