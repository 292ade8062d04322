//! Top-level wiring: config → store → context → janitor + HTTP server, with
//! ctrl-c fanning out through the shutdown channel.

use std::sync::{Arc, Mutex};

use anyhow::Context as _;
use hopper_common::{rng::SysRng, shutdown::ShutdownChannel, time::SystemClock};
use tracing::{info, warn};

use crate::{
    config::{Args, Config, VerifierConfig},
    context::Context,
    janitor::Janitor,
    server,
    store::Store,
    verifier::{AcceptAllVerifier, HttpVerifier, ProofVerifier},
};

pub async fn run(args: Args) -> anyhow::Result<()> {
    let config = Config::from_args(args)?;
    info!(
        listen = %config.listen,
        env = config.deploy_env.as_str(),
        db = %config.db,
        "starting hopperd"
    );

    let store = Store::open(&config.db, config.tunables.clone()).await?;

    let verifier: Arc<dyn ProofVerifier> = match &config.verifier {
        VerifierConfig::Http { url, action_id } =>
            Arc::new(HttpVerifier::new(url.clone(), action_id.clone())),
        VerifierConfig::AcceptAll => {
            warn!(
                "proof verification is DISABLED; every proof will be accepted"
            );
            Arc::new(AcceptAllVerifier)
        }
    };

    let clock = Arc::new(SystemClock);
    let shutdown = ShutdownChannel::new();
    let ctx = Context::new(
        store.clone(),
        verifier,
        clock.clone(),
        Arc::new(Mutex::new(SysRng::new())),
        Arc::new(config.clone()),
    );

    let janitor = Janitor::new(
        store,
        clock,
        config.sweep_interval,
        config.lease_max_age,
        shutdown.clone(),
    );
    let janitor_task = tokio::spawn(janitor.start());

    let listener = tokio::net::TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("Could not bind {}", config.listen))?;
    let router = server::router(ctx);
    let server_task =
        tokio::spawn(server::serve(listener, router, shutdown.clone()));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    info!("received ctrl-c; shutting down");
    shutdown.send();

    server_task
        .await
        .context("Server task panicked")?
        .context("Server task errored")?;
    janitor_task.await.context("Janitor task panicked")?;
    info!("bye");
    Ok(())
}
