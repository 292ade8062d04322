//! Top-level wiring for the agent binary.

use std::{path::Path, sync::Arc, time::Duration};

use anyhow::{bail, Context as _};
use hopper_common::{rng::SysRng, shutdown::ShutdownChannel};
use tracing::{info, warn};

use crate::{
    agent::DispenseAgent,
    client::CoordinatorClient,
    config::Args,
    hopper::{CoinHopper, MockHopper},
    identity,
};

pub async fn run(args: Args) -> anyhow::Result<()> {
    let mut rng = SysRng::new();
    let kiosk_id =
        identity::load_or_generate(Path::new(&args.kiosk_id_file), &mut rng)?;
    info!(%kiosk_id, coordinator = %args.coordinator_url, "starting hopper-agent");

    // The serial driver for the real mechanism is the integration point for
    // deployments; this build ships only the development driver.
    let hopper: Arc<dyn CoinHopper> = if args.mock_hardware {
        warn!("using the MOCK hopper driver; no coins will move");
        Arc::new(MockHopper::default())
    } else {
        bail!(
            "this build carries no serial hopper driver; \
             run with --mock-hardware for development"
        );
    };

    let shutdown = ShutdownChannel::new();
    let client = CoordinatorClient::new(args.coordinator_url, kiosk_id);
    let agent = DispenseAgent::new(
        client,
        hopper,
        Duration::from_millis(args.idle_poll_ms),
        Duration::from_secs(args.dispense_timeout_secs),
        shutdown.clone(),
    );
    let agent_task = tokio::spawn(agent.run());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    info!("received ctrl-c; shutting down");
    shutdown.send();
    agent_task.await.context("Agent task panicked")?;
    Ok(())
}
