//! The coin hopper driver seam.
//!
//! The serial protocol to the mechanism lives behind [`CoinHopper`]; the
//! agent only sees `dispense(n) → ok | fault`. A fault return and a raised
//! error are treated identically by the caller.

use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum HopperFault {
    /// The mechanism reported a fault (jam, empty hopper, comms error).
    #[error("hardware fault: {0}")]
    Fault(String),
    /// The driver did not answer within its internal bound.
    #[error("dispense timed out")]
    Timeout,
}

#[async_trait]
pub trait CoinHopper: Send + Sync + 'static {
    /// Pay out `coins` coins. Returning `Ok` means the driver believes the
    /// coins left the hopper; any error means the payout cannot be
    /// confirmed and feeds the job's retry accounting.
    async fn dispense(&self, coins: u32) -> Result<(), HopperFault>;
}

/// A driver for development and tests: always succeeds after a
/// mechanical-feeling delay proportional to the coin count.
pub struct MockHopper {
    pub per_coin_delay: Duration,
}

impl Default for MockHopper {
    fn default() -> Self {
        Self {
            per_coin_delay: Duration::from_millis(5),
        }
    }
}

#[async_trait]
impl CoinHopper for MockHopper {
    async fn dispense(&self, coins: u32) -> Result<(), HopperFault> {
        tokio::time::sleep(self.per_coin_delay * coins).await;
        info!("mock hopper dispensed {coins} coins");
        Ok(())
    }
}
