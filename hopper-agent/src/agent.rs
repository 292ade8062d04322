//! The poll → actuate → report loop.
//!
//! The agent is single-threaded with respect to actuation: it never overlaps
//! a dispense with a poll or another dispense. Its in-memory state is one
//! job id — the last one it successfully actuated — which is exactly enough
//! to make a re-leased job safe: seeing that id again means our success
//! report was lost, so we report again without touching the hardware.

use std::{sync::Arc, time::Duration};

use hopper_api::{
    def::DispenserApi,
    error::ErrorKind,
    models::{CompleteJobRequest, JobView},
};
use hopper_common::{backoff, ids::JobId, shutdown::ShutdownChannel};
use tokio::time;
use tracing::{debug, info, warn};

use crate::hopper::{CoinHopper, HopperFault};

pub struct DispenseAgent<A> {
    api: A,
    hopper: Arc<dyn CoinHopper>,
    idle_poll: Duration,
    dispense_timeout: Duration,
    shutdown: ShutdownChannel,
    /// The last job we actuated to completion. Rebuilt empty on restart;
    /// the coordinator's idempotent report handling covers that case.
    last_completed: Option<JobId>,
}

impl<A: DispenserApi> DispenseAgent<A> {
    pub fn new(
        api: A,
        hopper: Arc<dyn CoinHopper>,
        idle_poll: Duration,
        dispense_timeout: Duration,
        shutdown: ShutdownChannel,
    ) -> Self {
        Self {
            api,
            hopper,
            idle_poll,
            dispense_timeout,
            shutdown,
            last_completed: None,
        }
    }

    /// Runs until a shutdown signal is received.
    pub async fn run(mut self) {
        info!("agent loop starting");
        while !self.shutdown.try_recv() {
            self.step().await;
        }
        info!("agent loop stopped");
    }

    async fn step(&mut self) {
        match self.api.next_job().await {
            Ok(Some(job)) => self.handle_job(job).await,
            Ok(None) => self.idle().await,
            Err(err) => {
                warn!("poll failed: {err}");
                self.idle().await;
            }
        }
    }

    async fn idle(&self) {
        tokio::select! {
            () = self.shutdown.recv() => {}
            () = time::sleep(self.idle_poll) => {}
        }
    }

    async fn handle_job(&mut self, job: JobView) {
        if self.last_completed == Some(job.id) {
            // Already actuated; only the acknowledgement was lost. Do not
            // touch the hardware again.
            debug!(job_id = %job.id, "re-leased a job we already actuated");
            self.report_until_acked(job.id, true, None).await;
            return;
        }

        info!(job_id = %job.id, coins = job.coins, attempts = job.attempts, "dispensing");
        let outcome = time::timeout(
            self.dispense_timeout,
            self.hopper.dispense(job.coins),
        )
        .await;
        let (success, error) = match outcome {
            Ok(Ok(())) => (true, None),
            Ok(Err(fault)) => {
                warn!(job_id = %job.id, "dispense failed: {fault}");
                (false, Some(fault.to_string()))
            }
            Err(_elapsed) => {
                warn!(job_id = %job.id, "dispense timed out");
                (false, Some(HopperFault::Timeout.to_string()))
            }
        };
        if success {
            self.last_completed = Some(job.id);
        }
        self.report_until_acked(job.id, success, error).await;
    }

    /// Deliver the outcome until the coordinator acknowledges it. Never
    /// re-actuates: a lost acknowledgement must not become a double payout.
    async fn report_until_acked(
        &self,
        job_id: JobId,
        success: bool,
        error: Option<String>,
    ) {
        let req = CompleteJobRequest { success, error };
        let mut backoff = backoff::iter();
        loop {
            match self.api.complete_job(job_id, &req).await {
                Ok(resp) => {
                    info!(%job_id, ack = ?resp.status, "report acknowledged");
                    return;
                }
                Err(err)
                    if matches!(
                        err.kind,
                        ErrorKind::NotFound
                            | ErrorKind::JobNotInProgress
                            | ErrorKind::JobOwnershipMismatch
                    ) =>
                {
                    // The coordinator already settled or revived this job;
                    // there is nothing left for this report to do.
                    warn!(%job_id, "report not accepted: {err}");
                    return;
                }
                Err(err) => {
                    warn!(%job_id, "report failed, will retry: {err}");
                    let delay =
                        backoff.next().expect("backoff iter is infinite");
                    tokio::select! {
                        () = self.shutdown.recv() => return,
                        () = time::sleep(delay) => {}
                    }
                }
            }
        }
    }
}
