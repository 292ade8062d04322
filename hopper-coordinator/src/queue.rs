//! `JobQueue`: the leasing and retry policy the HTTP edge exposes to
//! dispenser-node agents, implemented atop store primitives.
//!
//! Retry policy: a reported failure returns the job to pending with its
//! attempt counted, and the very next poll on the same kiosk may re-lease it
//! — there is no application-level backoff here, the agent's poll cadence
//! owns backoff.

use hopper_api::{
    error::ApiResult,
    models::{CompleteJobRequest, CompleteJobResponse, JobView},
};
use hopper_common::ids::{JobId, KioskId};
use tracing::info;

use crate::context::Context;

#[derive(Clone)]
pub struct JobQueue {
    ctx: Context,
}

impl JobQueue {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    /// Lease the next job for this kiosk. If the kiosk already holds an
    /// in-progress job (it missed our reply and polled again), that same
    /// job comes back, so the agent's dedupe-by-id is sufficient.
    pub async fn next(&self, kiosk_id: KioskId) -> ApiResult<Option<JobView>> {
        let job = self
            .ctx
            .store
            .lease_next_job(kiosk_id, self.ctx.now())
            .await?;
        if let Some(job) = &job {
            info!(job_id = %job.id, coins = job.coins, attempts = job.attempts, "leased job");
        }
        Ok(job.map(|job| job.to_view()))
    }

    /// Settle an actuation report. Idempotent against the first
    /// acknowledgement.
    pub async fn report(
        &self,
        job_id: JobId,
        kiosk_id: KioskId,
        req: &CompleteJobRequest,
    ) -> ApiResult<CompleteJobResponse> {
        let ack = self
            .ctx
            .store
            .complete_job(
                job_id,
                kiosk_id,
                req.success,
                req.error.as_deref(),
                self.ctx.now(),
            )
            .await?;
        info!(%job_id, success = req.success, ack = ?ack, "job report settled");
        Ok(CompleteJobResponse { status: ack })
    }
}
