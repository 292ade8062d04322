//! # API Definitions
//!
//! Defines, as closely as possible, the APIs exposed by the coordinator.
//! There is no compile-time guarantee that the axum router matches these
//! definitions, but it is straightforward to compare the router with the
//! traits below to ensure consistency.
//!
//! Each endpoint is documented with:
//! - 1) HTTP method e.g. `GET`
//! - 2) Endpoint e.g. `/jobs/pending`
//! - 3) Request data type
//! - 4) The return type

#![deny(missing_docs)]
// We don't export these traits to foreign crates' trait objects, so auto
// trait stability is not a concern.
#![allow(async_fn_in_trait)]

use hopper_common::ids::JobId;

use crate::{
    error::ApiResult,
    models::{CompleteJobRequest, CompleteJobResponse, JobView},
};

/// Every kiosk-scoped request carries this header with the node identifier.
pub const KIOSK_ID_HEADER: &str = "X-Kiosk-Id";

/// The api that the coordinator exposes to dispenser-node agents. The kiosk
/// identity travels in the [`KIOSK_ID_HEADER`] header, supplied by the
/// implementation.
pub trait DispenserApi {
    /// Lease the next dispense job for this kiosk, if any. Re-polling while
    /// a job is already leased returns that same job.
    ///
    /// GET /jobs/pending -> [`Option<JobView>`]
    async fn next_job(&self) -> ApiResult<Option<JobView>>;

    /// Report the outcome of an actuation attempt. Idempotent after the
    /// first acknowledgement.
    ///
    /// POST /jobs/{id}/complete [`CompleteJobRequest`] ->
    /// [`CompleteJobResponse`]
    async fn complete_job(
        &self,
        job_id: JobId,
        req: &CompleteJobRequest,
    ) -> ApiResult<CompleteJobResponse>;
}
