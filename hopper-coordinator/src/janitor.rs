//! A background actor that periodically marks expired transactions and
//! recovers stuck leases. Both sweeps are idempotent and safe at any
//! concurrency, so the cadence is a liveness knob, not a correctness one.

use std::{sync::Arc, time::Duration};

use hopper_common::{shutdown::ShutdownChannel, time::Clock};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::store::Store;

pub struct Janitor {
    store: Store,
    clock: Arc<dyn Clock>,
    sweep_interval: Duration,
    lease_max_age: Duration,
    shutdown: ShutdownChannel,
}

impl Janitor {
    pub fn new(
        store: Store,
        clock: Arc<dyn Clock>,
        sweep_interval: Duration,
        lease_max_age: Duration,
        shutdown: ShutdownChannel,
    ) -> Self {
        Self {
            store,
            clock,
            sweep_interval,
            lease_max_age,
            shutdown,
        }
    }

    /// Runs until a shutdown signal is received. The first sweep fires
    /// immediately, which matters after a coordinator restart: any leases
    /// orphaned by the outage are recovered on the first tick instead of a
    /// full interval later.
    pub async fn start(self) {
        let mut ticker = time::interval(self.sweep_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.sweep_once().await,
                () = self.shutdown.recv() => {
                    info!("janitor received shutdown signal");
                    break;
                }
            }
        }
    }

    async fn sweep_once(&self) {
        let now = self.clock.now();

        match self.store.sweep_expired(now).await {
            Ok(0) => debug!("expiry sweep: nothing to do"),
            Ok(count) => info!("expiry sweep: marked {count} expired"),
            Err(err) => warn!("expiry sweep failed: {err}"),
        }

        match self.store.revive_stuck_leases(self.lease_max_age, now).await {
            Ok(0) => debug!("lease sweep: nothing to do"),
            Ok(count) => info!("lease sweep: revived {count} stuck leases"),
            Err(err) => warn!("lease sweep failed: {err}"),
        }
    }
}
