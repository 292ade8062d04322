//! `TxCoordinator`: glue over the store exposing the small surface the HTTP
//! edge needs for transactions. Holds no mutable state of its own.

use hopper_api::{
    error::{ApiError, ApiResult, ErrorKind},
    models::{
        CreateTransactionRequest, PayRequest, PayResponse, TransactionView,
        TxStatus,
    },
};
use hopper_common::ids::{KioskId, TransactionId};
use tracing::info;

use crate::{config::TX_ID_TOKEN, context::Context, verifier::ProofSubmission};

#[derive(Clone)]
pub struct TxCoordinator {
    ctx: Context,
}

impl TxCoordinator {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    /// Create a pending transaction for the attendant display and hand back
    /// the payer deep-link URL to render as a QR code. The coordinator only
    /// templates this URL; it never parses it.
    pub async fn create(
        &self,
        kiosk_id: KioskId,
        req: CreateTransactionRequest,
    ) -> ApiResult<TransactionView> {
        let id = self.ctx.gen_transaction_id();
        let qr_url = self
            .ctx
            .config
            .payer_url_template
            .replace(TX_ID_TOKEN, &id.to_string());
        let tx = self
            .ctx
            .store
            .create_transaction(id, kiosk_id, req.amount, qr_url, self.ctx.now())
            .await?;
        info!(%id, amount = %tx.amount, coins = tx.coins, "created transaction");
        Ok(tx.to_view(None))
    }

    /// Apply a payment proof: verify it with the external verifier, then
    /// atomically mark the transaction paid and enqueue its dispense job.
    ///
    /// A rejected proof leaves all state untouched. A duplicate submit for
    /// an already-paid transaction resolves to `AlreadyProcessed` without a
    /// verifier call, so replays are cheap and idempotent.
    pub async fn pay(&self, req: PayRequest) -> ApiResult<PayResponse> {
        let now = self.ctx.now();
        let tx = self.ctx.store.get_transaction(req.transaction_id).await?;
        match tx.status {
            TxStatus::Pending => {}
            TxStatus::Expired =>
                return Err(ApiError::new(
                    ErrorKind::Expired,
                    "the authorization window has passed",
                )),
            _ =>
                return Err(ApiError::new(
                    ErrorKind::AlreadyProcessed,
                    "transaction was already paid",
                )),
        }

        let job_id = self.ctx.gen_job_id();

        // Past the window there is no point burning a verifier call; the
        // store will mark the row expired and return the terminal error.
        if now >= tx.expires_at {
            let (tx, job) = self
                .ctx
                .store
                .mark_paid_and_enqueue(
                    req.transaction_id,
                    job_id,
                    &req.nullifier_hash,
                    now,
                )
                .await?;
            return Ok(PayResponse::new(job.id, tx.id, job.coins));
        }

        let submission = ProofSubmission {
            proof: req.proof,
            nullifier_hash: req.nullifier_hash.as_str().to_owned(),
            merkle_root: req.merkle_root,
        };
        self.ctx.verifier.verify(&submission).await?;

        let (tx, job) = self
            .ctx
            .store
            .mark_paid_and_enqueue(
                req.transaction_id,
                job_id,
                &req.nullifier_hash,
                self.ctx.now(),
            )
            .await?;
        info!(id = %tx.id, job_id = %job.id, coins = job.coins, "payment accepted, job enqueued");
        Ok(PayResponse::new(job.id, tx.id, job.coins))
    }

    /// The public view either party polls: internal fields stripped, with
    /// `paid` refined to `dispensing` while the kiosk is actuating.
    pub async fn describe(
        &self,
        id: TransactionId,
    ) -> ApiResult<TransactionView> {
        let tx = self.ctx.store.get_transaction(id).await?;
        let job_status = if tx.status == TxStatus::Paid {
            self.ctx
                .store
                .get_job_for_transaction(id)
                .await?
                .map(|job| job.status)
        } else {
            None
        };
        Ok(tx.to_view(job_status))
    }
}
