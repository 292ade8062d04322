//! Durable typed accessors over transactions, dispense jobs, kiosks, and
//! events. The single durable ground truth.
//!
//! Callers never see SQL: every operation is a typed method, and every
//! multi-row mutation executes inside one serializable database transaction
//! together with the [`TransactionEvent`] rows it implies, so partial state
//! is impossible. The two invariants that keep payouts safe are enforced at
//! the database layer rather than in application code:
//!
//! - at most one `in_progress` job per kiosk (partial unique index), and
//! - at most one transaction per nullifier (partial unique index).

use std::{str::FromStr, time::Duration};

use anyhow::Context as _;
use hopper_api::{
    error::{ApiError, ApiResult, ErrorKind},
    models::{JobStatus, JobView, TransactionView, TxStatus},
};
use hopper_common::{
    amount::Amount,
    ids::{JobId, KioskId, NullifierHash, TransactionId},
    time::TimestampMs,
};
use rust_decimal::Decimal;
use sqlx::{
    sqlite::{
        SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow,
    },
    Row, SqlitePool,
};

use crate::config::Tunables;

/// Database calls that exceed this bound surface as
/// [`ErrorKind::DatabaseUnavailable`], never as a silent wait.
const DB_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = include_str!("schema.sql");

// --- Row types --- //

/// A transaction row. The stored status never contains
/// [`TxStatus::Dispensing`]; that refinement is computed in [`to_view`].
///
/// [`to_view`]: Transaction::to_view
#[derive(Clone, Debug)]
pub struct Transaction {
    pub id: TransactionId,
    pub kiosk_id: KioskId,
    pub amount: Amount,
    pub coins: u32,
    pub total: Amount,
    pub status: TxStatus,
    pub qr_url: String,
    pub nullifier_hash: Option<NullifierHash>,
    pub created_at: TimestampMs,
    pub expires_at: TimestampMs,
    pub paid_at: Option<TimestampMs>,
    pub completed_at: Option<TimestampMs>,
}

impl Transaction {
    /// The public projection: internal fields stripped, `paid` refined to
    /// `dispensing` while the backing job is actuating.
    pub fn to_view(&self, job_status: Option<JobStatus>) -> TransactionView {
        let status = match (self.status, job_status) {
            (TxStatus::Paid, Some(JobStatus::InProgress)) =>
                TxStatus::Dispensing,
            (status, _) => status,
        };
        TransactionView {
            id: self.id,
            amount: self.amount,
            coins: self.coins,
            total: self.total,
            qr_url: self.qr_url.clone(),
            status,
            created_at: self.created_at,
            expires_at: self.expires_at,
            paid_at: self.paid_at,
            completed_at: self.completed_at,
        }
    }
}

/// A dispense job row.
#[derive(Clone, Debug)]
pub struct DispenseJob {
    pub id: JobId,
    pub transaction_id: TransactionId,
    pub kiosk_id: KioskId,
    pub coins: u32,
    pub status: JobStatus,
    pub attempts: u32,
    pub max_attempts: u32,
    pub last_error: Option<String>,
    pub created_at: TimestampMs,
    pub last_attempt_at: Option<TimestampMs>,
    pub completed_at: Option<TimestampMs>,
}

impl DispenseJob {
    pub fn to_view(&self) -> JobView {
        JobView {
            id: self.id,
            transaction_id: self.transaction_id,
            coins: self.coins,
            attempts: self.attempts,
            created_at: self.created_at,
        }
    }
}

/// One append-only audit entry.
#[derive(Clone, Debug)]
pub struct TransactionEvent {
    pub id: i64,
    pub transaction_id: TransactionId,
    pub job_id: Option<JobId>,
    pub kiosk_id: KioskId,
    pub kind: EventKind,
    pub payload: serde_json::Value,
    pub created_at: TimestampMs,
}

/// Audit event kinds, one per status transition.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum EventKind {
    Created,
    Paid,
    JobEnqueued,
    JobLeased,
    JobRetry,
    JobCompleted,
    JobFailed,
    LeaseRevived,
    Completed,
    Failed,
    Expired,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Paid => "paid",
            Self::JobEnqueued => "job_enqueued",
            Self::JobLeased => "job_leased",
            Self::JobRetry => "job_retry",
            Self::JobCompleted => "job_completed",
            Self::JobFailed => "job_failed",
            Self::LeaseRevived => "lease_revived",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Expired => "expired",
        }
    }

    fn from_stored(s: &str) -> Option<Self> {
        let all = [
            Self::Created,
            Self::Paid,
            Self::JobEnqueued,
            Self::JobLeased,
            Self::JobRetry,
            Self::JobCompleted,
            Self::JobFailed,
            Self::LeaseRevived,
            Self::Completed,
            Self::Failed,
            Self::Expired,
        ];
        all.into_iter().find(|kind| kind.as_str() == s)
    }
}

/// What a `complete_job` report did; mirrors
/// [`hopper_api::models::ReportAck`] one-to-one.
pub use hopper_api::models::ReportAck;

// --- Store --- //

/// Typed accessors over the coordinator database.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
    tunables: Tunables,
}

impl Store {
    /// Open (creating if missing) the database at `path` and apply the
    /// schema.
    pub async fn open(path: &str, tunables: Tunables) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(DB_TIMEOUT)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .acquire_timeout(DB_TIMEOUT)
            .connect_with(options)
            .await
            .context("Could not open database")?;
        Self::init(pool, tunables).await
    }

    /// An in-memory database for tests and local development.
    pub async fn in_memory(tunables: Tunables) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .context("Bad in-memory connection string")?
            .foreign_keys(true);
        // A single eternal connection: each new in-memory connection would
        // otherwise be a fresh empty database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
            .connect_with(options)
            .await
            .context("Could not open in-memory database")?;
        Self::init(pool, tunables).await
    }

    async fn init(pool: SqlitePool, tunables: Tunables) -> anyhow::Result<Self> {
        sqlx::raw_sql(SCHEMA)
            .execute(&pool)
            .await
            .context("Could not apply schema")?;
        Ok(Self { pool, tunables })
    }

    pub fn tunables(&self) -> &Tunables {
        &self.tunables
    }

    /// Cheap liveness probe for `/health`.
    pub async fn health_ping(&self) -> ApiResult<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    // --- Transactions --- //

    /// Insert a new pending transaction, deriving coin count, total, and
    /// expiry from the tunables, and upsert the owning kiosk row.
    pub async fn create_transaction(
        &self,
        id: TransactionId,
        kiosk_id: KioskId,
        amount: Amount,
        qr_url: String,
        now: TimestampMs,
    ) -> ApiResult<Transaction> {
        if !amount.is_positive() {
            return Err(ApiError::invalid_amount(
                "amount must be greater than zero",
            ));
        }
        let cap = self.tunables.amount_cap;
        if amount > cap {
            return Err(ApiError::invalid_amount(format!(
                "amount exceeds the per-transaction cap of {cap}"
            )));
        }
        let coins = amount
            .coins_at_unit(self.tunables.coin_unit)
            .ok_or_else(|| ApiError::database("coin unit misconfigured"))?;
        let total = amount.checked_add(self.tunables.fee).ok_or_else(|| {
            ApiError::invalid_amount("amount plus fee overflows")
        })?;
        let expires_at = now.saturating_add(self.tunables.auth_window);

        let mut dbtx = self.pool.begin().await.map_err(db_err)?;
        upsert_kiosk(&mut dbtx, kiosk_id, now).await?;
        sqlx::query(
            "INSERT INTO transactions \
             (id, kiosk_id, amount, coins, total, status, qr_url, \
              created_at, expires_at) \
             VALUES (?, ?, ?, ?, ?, 'pending', ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(kiosk_id.to_string())
        .bind(amount.to_string())
        .bind(i64::from(coins))
        .bind(total.to_string())
        .bind(&qr_url)
        .bind(now.to_i64())
        .bind(expires_at.to_i64())
        .execute(&mut *dbtx)
        .await
        .map_err(db_err)?;
        insert_event(
            &mut dbtx,
            id,
            None,
            kiosk_id,
            EventKind::Created,
            serde_json::json!({
                "amount": amount.to_string(),
                "coins": coins,
                "total": total.to_string(),
            }),
            now,
        )
        .await?;
        dbtx.commit().await.map_err(db_err)?;

        Ok(Transaction {
            id,
            kiosk_id,
            amount,
            coins,
            total,
            status: TxStatus::Pending,
            qr_url,
            nullifier_hash: None,
            created_at: now,
            expires_at,
            paid_at: None,
            completed_at: None,
        })
    }

    pub async fn get_transaction(
        &self,
        id: TransactionId,
    ) -> ApiResult<Transaction> {
        let row = sqlx::query("SELECT * FROM transactions WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        match row {
            Some(row) => parse_transaction(&row),
            None => Err(ApiError::not_found(format!("no transaction {id}"))),
        }
    }

    /// The (at most one) job backing a transaction, if the transaction has
    /// been paid.
    pub async fn get_job_for_transaction(
        &self,
        id: TransactionId,
    ) -> ApiResult<Option<DispenseJob>> {
        let row = sqlx::query(
            "SELECT * FROM dispense_jobs WHERE transaction_id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.as_ref().map(parse_job).transpose()
    }

    /// Apply an accepted payment proof: transaction → `paid` and the
    /// dispense job enqueued, atomically. The nullifier is consumed here;
    /// the partial unique index makes cross-transaction reuse impossible
    /// even under races.
    ///
    /// An expired-but-unswept transaction is marked `expired` on the way
    /// out, so callers and pollers observe the terminal state immediately
    /// rather than after the next janitor pass.
    pub async fn mark_paid_and_enqueue(
        &self,
        id: TransactionId,
        job_id: JobId,
        nullifier: &NullifierHash,
        now: TimestampMs,
    ) -> ApiResult<(Transaction, DispenseJob)> {
        let mut dbtx = self.pool.begin().await.map_err(db_err)?;

        let row = sqlx::query("SELECT * FROM transactions WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&mut *dbtx)
            .await
            .map_err(db_err)?;
        let mut tx = match row {
            Some(row) => parse_transaction(&row)?,
            None =>
                return Err(ApiError::not_found(format!("no transaction {id}"))),
        };

        match tx.status {
            TxStatus::Pending if now < tx.expires_at => {}
            TxStatus::Pending => {
                // Eagerly expire so pollers observe the terminal status
                // without waiting for the janitor.
                sqlx::query(
                    "UPDATE transactions SET status = 'expired' WHERE id = ?",
                )
                .bind(id.to_string())
                .execute(&mut *dbtx)
                .await
                .map_err(db_err)?;
                insert_event(
                    &mut dbtx,
                    id,
                    None,
                    tx.kiosk_id,
                    EventKind::Expired,
                    serde_json::json!({}),
                    now,
                )
                .await?;
                dbtx.commit().await.map_err(db_err)?;
                return Err(ApiError::new(
                    ErrorKind::Expired,
                    "the authorization window has passed",
                ));
            }
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

        // Explicit reuse check for a clean error kind; the unique index
        // below is the backstop under races.
        let reused = sqlx::query(
            "SELECT 1 FROM transactions \
             WHERE nullifier_hash = ? AND id <> ?",
        )
        .bind(nullifier.as_str())
        .bind(id.to_string())
        .fetch_optional(&mut *dbtx)
        .await
        .map_err(db_err)?;
        if reused.is_some() {
            return Err(ApiError::new(
                ErrorKind::NullifierReused,
                "nullifier was already consumed by another transaction",
            ));
        }

        let updated = sqlx::query(
            "UPDATE transactions \
             SET status = 'paid', nullifier_hash = ?, paid_at = ? \
             WHERE id = ? AND status = 'pending'",
        )
        .bind(nullifier.as_str())
        .bind(now.to_i64())
        .bind(id.to_string())
        .execute(&mut *dbtx)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                ApiError::new(
                    ErrorKind::NullifierReused,
                    "nullifier was already consumed by another transaction",
                )
            } else {
                db_err(err)
            }
        })?;
        if updated.rows_affected() != 1 {
            return Err(ApiError::new(
                ErrorKind::AlreadyProcessed,
                "transaction was already paid",
            ));
        }
        insert_event(
            &mut dbtx,
            id,
            None,
            tx.kiosk_id,
            EventKind::Paid,
            serde_json::json!({ "nullifier_hash": nullifier.as_str() }),
            now,
        )
        .await?;

        let max_attempts = self.tunables.attempt_ceiling;
        sqlx::query(
            "INSERT INTO dispense_jobs \
             (id, transaction_id, kiosk_id, coins, status, attempts, \
              max_attempts, created_at) \
             VALUES (?, ?, ?, ?, 'pending', 0, ?, ?)",
        )
        .bind(job_id.to_string())
        .bind(id.to_string())
        .bind(tx.kiosk_id.to_string())
        .bind(i64::from(tx.coins))
        .bind(i64::from(max_attempts))
        .bind(now.to_i64())
        .execute(&mut *dbtx)
        .await
        .map_err(db_err)?;
        insert_event(
            &mut dbtx,
            id,
            Some(job_id),
            tx.kiosk_id,
            EventKind::JobEnqueued,
            serde_json::json!({ "coins": tx.coins }),
            now,
        )
        .await?;

        dbtx.commit().await.map_err(db_err)?;

        tx.status = TxStatus::Paid;
        tx.nullifier_hash = Some(nullifier.clone());
        tx.paid_at = Some(now);
        let job = DispenseJob {
            id: job_id,
            transaction_id: id,
            kiosk_id: tx.kiosk_id,
            coins: tx.coins,
            status: JobStatus::Pending,
            attempts: 0,
            max_attempts,
            last_error: None,
            created_at: now,
            last_attempt_at: None,
            completed_at: None,
        };
        Ok((tx, job))
    }

    // --- Jobs --- //

    /// Lease the next dispense job for a kiosk, if any, and upsert the
    /// kiosk's last-seen instant.
    ///
    /// If the kiosk already holds an in-progress job (it missed our reply
    /// and polled again), that same job is returned with a refreshed
    /// `last_attempt_at` — and crucially no `attempts` increment — so the
    /// agent's dedupe-by-id logic is sufficient. Otherwise the oldest
    /// pending job below its attempt ceiling is atomically moved to
    /// `in_progress`; the partial unique index guarantees single-inflight
    /// even against a concurrent lease.
    pub async fn lease_next_job(
        &self,
        kiosk_id: KioskId,
        now: TimestampMs,
    ) -> ApiResult<Option<DispenseJob>> {
        let mut dbtx = self.pool.begin().await.map_err(db_err)?;
        // First statement is a write so this transaction holds the write
        // lock for the reads below.
        upsert_kiosk(&mut dbtx, kiosk_id, now).await?;

        let existing = sqlx::query(
            "UPDATE dispense_jobs SET last_attempt_at = ? \
             WHERE kiosk_id = ? AND status = 'in_progress' \
             RETURNING *",
        )
        .bind(now.to_i64())
        .bind(kiosk_id.to_string())
        .fetch_optional(&mut *dbtx)
        .await
        .map_err(db_err)?;
        if let Some(row) = existing {
            let job = parse_job(&row)?;
            dbtx.commit().await.map_err(db_err)?;
            return Ok(Some(job));
        }

        let leased = sqlx::query(
            "UPDATE dispense_jobs \
             SET status = 'in_progress', last_attempt_at = ? \
             WHERE id = (\
                 SELECT id FROM dispense_jobs \
                 WHERE kiosk_id = ? AND status = 'pending' \
                   AND attempts < max_attempts \
                 ORDER BY created_at ASC, id ASC \
                 LIMIT 1\
             ) \
             RETURNING *",
        )
        .bind(now.to_i64())
        .bind(kiosk_id.to_string())
        .fetch_optional(&mut *dbtx)
        .await
        .map_err(db_err)?;
        let job = match leased {
            Some(row) => parse_job(&row)?,
            None => {
                dbtx.commit().await.map_err(db_err)?;
                return Ok(None);
            }
        };

        insert_event(
            &mut dbtx,
            job.transaction_id,
            Some(job.id),
            kiosk_id,
            EventKind::JobLeased,
            serde_json::json!({ "attempts": job.attempts }),
            now,
        )
        .await?;
        dbtx.commit().await.map_err(db_err)?;
        Ok(Some(job))
    }

    /// Settle an actuation report.
    ///
    /// - success: job → `completed`, transaction → `completed`.
    /// - failure below the ceiling: job → `pending` with `attempts + 1`;
    ///   the next lease may hand it out again immediately.
    /// - failure at the ceiling: job → `failed`, transaction → `failed`.
    ///
    /// A repeat report against an already-terminal job is acknowledged as a
    /// no-op so the agent can retry reports safely.
    pub async fn complete_job(
        &self,
        job_id: JobId,
        kiosk_id: KioskId,
        success: bool,
        error_text: Option<&str>,
        now: TimestampMs,
    ) -> ApiResult<ReportAck> {
        let mut dbtx = self.pool.begin().await.map_err(db_err)?;
        upsert_kiosk(&mut dbtx, kiosk_id, now).await?;

        let row = sqlx::query("SELECT * FROM dispense_jobs WHERE id = ?")
            .bind(job_id.to_string())
            .fetch_optional(&mut *dbtx)
            .await
            .map_err(db_err)?;
        let job = match row {
            Some(row) => parse_job(&row)?,
            None =>
                return Err(ApiError::not_found(format!("no job {job_id}"))),
        };
        if job.kiosk_id != kiosk_id {
            return Err(ApiError::new(
                ErrorKind::JobOwnershipMismatch,
                "job belongs to a different kiosk",
            ));
        }
        match job.status {
            JobStatus::Completed => {
                // Idempotent re-acknowledgement.
                dbtx.commit().await.map_err(db_err)?;
                return Ok(ReportAck::Success);
            }
            JobStatus::Failed => {
                dbtx.commit().await.map_err(db_err)?;
                return Ok(ReportAck::Failed);
            }
            JobStatus::Pending =>
                return Err(ApiError::new(
                    ErrorKind::JobNotInProgress,
                    "job is not currently leased",
                )),
            JobStatus::InProgress => {}
        }

        let ack = if success {
            sqlx::query(
                "UPDATE dispense_jobs \
                 SET status = 'completed', completed_at = ?, last_error = NULL \
                 WHERE id = ?",
            )
            .bind(now.to_i64())
            .bind(job_id.to_string())
            .execute(&mut *dbtx)
            .await
            .map_err(db_err)?;
            sqlx::query(
                "UPDATE transactions \
                 SET status = 'completed', completed_at = ? \
                 WHERE id = ?",
            )
            .bind(now.to_i64())
            .bind(job.transaction_id.to_string())
            .execute(&mut *dbtx)
            .await
            .map_err(db_err)?;
            insert_event(
                &mut dbtx,
                job.transaction_id,
                Some(job_id),
                kiosk_id,
                EventKind::JobCompleted,
                serde_json::json!({ "coins": job.coins }),
                now,
            )
            .await?;
            insert_event(
                &mut dbtx,
                job.transaction_id,
                Some(job_id),
                kiosk_id,
                EventKind::Completed,
                serde_json::json!({}),
                now,
            )
            .await?;
            ReportAck::Success
        } else {
            let attempts = job.attempts + 1;
            let error_text = error_text.unwrap_or("unspecified failure");
            if attempts < job.max_attempts {
                sqlx::query(
                    "UPDATE dispense_jobs \
                     SET status = 'pending', attempts = ?, last_error = ? \
                     WHERE id = ?",
                )
                .bind(i64::from(attempts))
                .bind(error_text)
                .bind(job_id.to_string())
                .execute(&mut *dbtx)
                .await
                .map_err(db_err)?;
                insert_event(
                    &mut dbtx,
                    job.transaction_id,
                    Some(job_id),
                    kiosk_id,
                    EventKind::JobRetry,
                    serde_json::json!({
                        "attempts": attempts,
                        "error": error_text,
                    }),
                    now,
                )
                .await?;
                ReportAck::Retry
            } else {
                sqlx::query(
                    "UPDATE dispense_jobs \
                     SET status = 'failed', attempts = ?, last_error = ?, \
                         completed_at = ? \
                     WHERE id = ?",
                )
                .bind(i64::from(attempts))
                .bind(error_text)
                .bind(now.to_i64())
                .bind(job_id.to_string())
                .execute(&mut *dbtx)
                .await
                .map_err(db_err)?;
                sqlx::query(
                    "UPDATE transactions \
                     SET status = 'failed', completed_at = ? \
                     WHERE id = ?",
                )
                .bind(now.to_i64())
                .bind(job.transaction_id.to_string())
                .execute(&mut *dbtx)
                .await
                .map_err(db_err)?;
                insert_event(
                    &mut dbtx,
                    job.transaction_id,
                    Some(job_id),
                    kiosk_id,
                    EventKind::JobFailed,
                    serde_json::json!({
                        "attempts": attempts,
                        "error": error_text,
                    }),
                    now,
                )
                .await?;
                insert_event(
                    &mut dbtx,
                    job.transaction_id,
                    Some(job_id),
                    kiosk_id,
                    EventKind::Failed,
                    serde_json::json!({}),
                    now,
                )
                .await?;
                ReportAck::Failed
            }
        };

        dbtx.commit().await.map_err(db_err)?;
        Ok(ack)
    }

    // --- Sweeps --- //

    /// Mark every pending transaction past its expiry as `expired`.
    /// Returns the number of transactions swept. Idempotent per sweep.
    pub async fn sweep_expired(&self, now: TimestampMs) -> ApiResult<u64> {
        let mut dbtx = self.pool.begin().await.map_err(db_err)?;
        let rows = sqlx::query(
            "UPDATE transactions SET status = 'expired' \
             WHERE status = 'pending' AND expires_at < ? \
             RETURNING id, kiosk_id",
        )
        .bind(now.to_i64())
        .fetch_all(&mut *dbtx)
        .await
        .map_err(db_err)?;
        let count = rows.len() as u64;
        for row in rows {
            let tx_id = parse_id::<TransactionId>(&row, "id")?;
            let kiosk_id = parse_id::<KioskId>(&row, "kiosk_id")?;
            insert_event(
                &mut dbtx,
                tx_id,
                None,
                kiosk_id,
                EventKind::Expired,
                serde_json::json!({}),
                now,
            )
            .await?;
        }
        dbtx.commit().await.map_err(db_err)?;
        Ok(count)
    }

    /// Recover jobs whose lease outcome was lost: any `in_progress` job with
    /// a `last_attempt_at` older than `max_age` has its attempt counted and
    /// returns to `pending` (or fails terminally at the ceiling).
    ///
    /// If the hopper already paid out before the agent crashed, the revived
    /// job will be actuated a second time by a restarted agent: this is the
    /// deliberate prefer-double-pay resolution, since the hardware contract
    /// offers no dispense readback to confirm against.
    pub async fn revive_stuck_leases(
        &self,
        max_age: Duration,
        now: TimestampMs,
    ) -> ApiResult<u64> {
        let max_age_ms = i64::try_from(max_age.as_millis()).unwrap_or(i64::MAX);
        let cutoff = now.to_i64().saturating_sub(max_age_ms);

        let mut dbtx = self.pool.begin().await.map_err(db_err)?;
        let rows = sqlx::query(
            "SELECT * FROM dispense_jobs \
             WHERE status = 'in_progress' AND last_attempt_at < ?",
        )
        .bind(cutoff)
        .fetch_all(&mut *dbtx)
        .await
        .map_err(db_err)?;

        let mut count = 0u64;
        for row in &rows {
            let job = parse_job(row)?;
            let attempts = job.attempts + 1;
            if attempts < job.max_attempts {
                sqlx::query(
                    "UPDATE dispense_jobs \
                     SET status = 'pending', attempts = ? \
                     WHERE id = ?",
                )
                .bind(i64::from(attempts))
                .bind(job.id.to_string())
                .execute(&mut *dbtx)
                .await
                .map_err(db_err)?;
                insert_event(
                    &mut dbtx,
                    job.transaction_id,
                    Some(job.id),
                    job.kiosk_id,
                    EventKind::LeaseRevived,
                    serde_json::json!({ "attempts": attempts }),
                    now,
                )
                .await?;
            } else {
                sqlx::query(
                    "UPDATE dispense_jobs \
                     SET status = 'failed', attempts = ?, last_error = ?, \
                         completed_at = ? \
                     WHERE id = ?",
                )
                .bind(i64::from(attempts))
                .bind("lease expired without an outcome report")
                .bind(now.to_i64())
                .bind(job.id.to_string())
                .execute(&mut *dbtx)
                .await
                .map_err(db_err)?;
                sqlx::query(
                    "UPDATE transactions \
                     SET status = 'failed', completed_at = ? \
                     WHERE id = ?",
                )
                .bind(now.to_i64())
                .bind(job.transaction_id.to_string())
                .execute(&mut *dbtx)
                .await
                .map_err(db_err)?;
                insert_event(
                    &mut dbtx,
                    job.transaction_id,
                    Some(job.id),
                    job.kiosk_id,
                    EventKind::JobFailed,
                    serde_json::json!({
                        "attempts": attempts,
                        "error": "lease expired without an outcome report",
                    }),
                    now,
                )
                .await?;
                insert_event(
                    &mut dbtx,
                    job.transaction_id,
                    Some(job.id),
                    job.kiosk_id,
                    EventKind::Failed,
                    serde_json::json!({}),
                    now,
                )
                .await?;
            }
            count += 1;
        }
        dbtx.commit().await.map_err(db_err)?;
        Ok(count)
    }

    // --- Kiosks & events --- //

    /// The most recent last-seen instant across all kiosks, or [`None`] if
    /// no kiosk has ever registered. Feeds the `/health` hardware probe.
    pub async fn latest_kiosk_seen_at(
        &self,
    ) -> ApiResult<Option<TimestampMs>> {
        let row = sqlx::query("SELECT MAX(last_seen_at) AS latest FROM kiosks")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        let latest: Option<i64> = row.try_get("latest").map_err(db_err)?;
        latest
            .map(|ms| {
                TimestampMs::try_from_i64(ms)
                    .map_err(|err| ApiError::database(err.to_string()))
            })
            .transpose()
    }

    /// The audit trail for one transaction, oldest first.
    pub async fn list_events(
        &self,
        id: TransactionId,
    ) -> ApiResult<Vec<TransactionEvent>> {
        let rows = sqlx::query(
            "SELECT * FROM transaction_events \
             WHERE transaction_id = ? ORDER BY id ASC",
        )
        .bind(id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(parse_event).collect()
    }
}

// --- Helpers --- //

async fn upsert_kiosk(
    dbtx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    kiosk_id: KioskId,
    now: TimestampMs,
) -> ApiResult<()> {
    sqlx::query(
        "INSERT INTO kiosks (id, status, last_seen_at, created_at) \
         VALUES (?, 'active', ?, ?) \
         ON CONFLICT (id) DO UPDATE \
         SET last_seen_at = excluded.last_seen_at, status = 'active'",
    )
    .bind(kiosk_id.to_string())
    .bind(now.to_i64())
    .bind(now.to_i64())
    .execute(&mut **dbtx)
    .await
    .map_err(db_err)?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn insert_event(
    dbtx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    transaction_id: TransactionId,
    job_id: Option<JobId>,
    kiosk_id: KioskId,
    kind: EventKind,
    payload: serde_json::Value,
    now: TimestampMs,
) -> ApiResult<()> {
    sqlx::query(
        "INSERT INTO transaction_events \
         (transaction_id, job_id, kiosk_id, kind, payload, created_at) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(transaction_id.to_string())
    .bind(job_id.map(|id| id.to_string()))
    .bind(kiosk_id.to_string())
    .bind(kind.as_str())
    .bind(payload.to_string())
    .bind(now.to_i64())
    .execute(&mut **dbtx)
    .await
    .map_err(db_err)?;
    Ok(())
}

fn db_err(err: sqlx::Error) -> ApiError {
    ApiError::database(err.to_string())
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db| db.is_unique_violation())
}

fn corrupt(detail: impl Into<String>) -> ApiError {
    ApiError::database(detail.into())
}

fn parse_id<T: FromStr>(row: &SqliteRow, col: &str) -> ApiResult<T> {
    let raw: String = row.try_get(col).map_err(db_err)?;
    T::from_str(&raw).map_err(|_| corrupt(format!("bad id in column {col}")))
}

fn parse_amount_col(row: &SqliteRow, col: &str) -> ApiResult<Amount> {
    let raw: String = row.try_get(col).map_err(db_err)?;
    let value = Decimal::from_str(&raw)
        .map_err(|_| corrupt(format!("bad decimal in column {col}")))?;
    Amount::try_from_decimal(value)
        .map_err(|_| corrupt(format!("bad amount in column {col}")))
}

fn parse_ts(row: &SqliteRow, col: &str) -> ApiResult<TimestampMs> {
    let raw: i64 = row.try_get(col).map_err(db_err)?;
    TimestampMs::try_from_i64(raw)
        .map_err(|_| corrupt(format!("bad timestamp in column {col}")))
}

fn parse_opt_ts(row: &SqliteRow, col: &str) -> ApiResult<Option<TimestampMs>> {
    let raw: Option<i64> = row.try_get(col).map_err(db_err)?;
    raw.map(|ms| {
        TimestampMs::try_from_i64(ms)
            .map_err(|_| corrupt(format!("bad timestamp in column {col}")))
    })
    .transpose()
}

fn parse_u32(row: &SqliteRow, col: &str) -> ApiResult<u32> {
    let raw: i64 = row.try_get(col).map_err(db_err)?;
    u32::try_from(raw)
        .map_err(|_| corrupt(format!("bad counter in column {col}")))
}

fn parse_transaction(row: &SqliteRow) -> ApiResult<Transaction> {
    let status_raw: String = row.try_get("status").map_err(db_err)?;
    let status = TxStatus::from_wire(&status_raw)
        .ok_or_else(|| corrupt(format!("bad tx status '{status_raw}'")))?;
    let nullifier: Option<String> =
        row.try_get("nullifier_hash").map_err(db_err)?;
    Ok(Transaction {
        id: parse_id(row, "id")?,
        kiosk_id: parse_id(row, "kiosk_id")?,
        amount: parse_amount_col(row, "amount")?,
        coins: parse_u32(row, "coins")?,
        total: parse_amount_col(row, "total")?,
        status,
        qr_url: row.try_get("qr_url").map_err(db_err)?,
        nullifier_hash: nullifier.map(NullifierHash::new),
        created_at: parse_ts(row, "created_at")?,
        expires_at: parse_ts(row, "expires_at")?,
        paid_at: parse_opt_ts(row, "paid_at")?,
        completed_at: parse_opt_ts(row, "completed_at")?,
    })
}

fn parse_job(row: &SqliteRow) -> ApiResult<DispenseJob> {
    let status_raw: String = row.try_get("status").map_err(db_err)?;
    let status = JobStatus::from_wire(&status_raw)
        .ok_or_else(|| corrupt(format!("bad job status '{status_raw}'")))?;
    Ok(DispenseJob {
        id: parse_id(row, "id")?,
        transaction_id: parse_id(row, "transaction_id")?,
        kiosk_id: parse_id(row, "kiosk_id")?,
        coins: parse_u32(row, "coins")?,
        status,
        attempts: parse_u32(row, "attempts")?,
        max_attempts: parse_u32(row, "max_attempts")?,
        last_error: row.try_get("last_error").map_err(db_err)?,
        created_at: parse_ts(row, "created_at")?,
        last_attempt_at: parse_opt_ts(row, "last_attempt_at")?,
        completed_at: parse_opt_ts(row, "completed_at")?,
    })
}

fn parse_event(row: &SqliteRow) -> ApiResult<TransactionEvent> {
    let kind_raw: String = row.try_get("kind").map_err(db_err)?;
    let kind = EventKind::from_stored(&kind_raw)
        .ok_or_else(|| corrupt(format!("bad event kind '{kind_raw}'")))?;
    let payload_raw: String = row.try_get("payload").map_err(db_err)?;
    let payload = serde_json::from_str(&payload_raw)
        .map_err(|_| corrupt("bad event payload"))?;
    let job_id: Option<String> = row.try_get("job_id").map_err(db_err)?;
    let job_id = job_id
        .map(|raw| {
            JobId::from_str(&raw).map_err(|_| corrupt("bad event job id"))
        })
        .transpose()?;
    Ok(TransactionEvent {
        id: row.try_get("id").map_err(db_err)?,
        transaction_id: parse_id(row, "transaction_id")?,
        job_id,
        kiosk_id: parse_id(row, "kiosk_id")?,
        kind,
        payload,
        created_at: parse_ts(row, "created_at")?,
    })
}

#[cfg(test)]
mod test {
    use hopper_common::rng::WeakRng;
    use rust_decimal_macros::dec;

    use super::*;

    fn ts(ms: i64) -> TimestampMs {
        TimestampMs::try_from_i64(ms).unwrap()
    }

    fn amt(value: Decimal) -> Amount {
        Amount::try_from_decimal(value).unwrap()
    }

    struct Harness {
        store: Store,
        rng: WeakRng,
        kiosk: KioskId,
    }

    impl Harness {
        async fn new() -> Self {
            let store = Store::in_memory(Tunables::default()).await.unwrap();
            let mut rng = WeakRng::from_u64(0xd15b0557);
            let kiosk = KioskId::generate(&mut rng);
            Self { store, rng, kiosk }
        }

        async fn create(
            &mut self,
            amount: Decimal,
            now: TimestampMs,
        ) -> Transaction {
            let id = TransactionId::generate(&mut self.rng);
            self.store
                .create_transaction(
                    id,
                    self.kiosk,
                    amt(amount),
                    format!("https://pay.example/t/{id}"),
                    now,
                )
                .await
                .unwrap()
        }

        /// Create + pay in one step; returns the enqueued job.
        async fn paid_job(
            &mut self,
            amount: Decimal,
            now: TimestampMs,
        ) -> DispenseJob {
            let tx = self.create(amount, now).await;
            let job_id = JobId::generate(&mut self.rng);
            let nullifier = NullifierHash::new(format!("n-{job_id}"));
            let (_, job) = self
                .store
                .mark_paid_and_enqueue(tx.id, job_id, &nullifier, now)
                .await
                .unwrap();
            job
        }
    }

    #[tokio::test]
    async fn create_computes_pricing() {
        let mut h = Harness::new().await;
        let tx = h.create(dec!(5.00), ts(1_000)).await;
        assert_eq!(tx.coins, 20);
        assert_eq!(tx.total, amt(dec!(5.50)));
        assert_eq!(tx.status, TxStatus::Pending);
        // window = 15 min
        assert_eq!(tx.expires_at.to_i64(), 1_000 + 900_000);

        // An awkward amount still rounds coins up.
        let tx = h.create(dec!(5.01), ts(1_000)).await;
        assert_eq!(tx.coins, 21);

        let fetched = h.store.get_transaction(tx.id).await.unwrap();
        assert_eq!(fetched.coins, 21);
        assert_eq!(fetched.qr_url, tx.qr_url);
    }

    #[tokio::test]
    async fn create_rejects_bad_amounts() {
        let mut h = Harness::new().await;
        let id = TransactionId::generate(&mut h.rng);
        let err = h
            .store
            .create_transaction(
                id,
                h.kiosk,
                Amount::ZERO,
                "https://pay.example/t/x".into(),
                ts(0),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidAmount);

        let over_cap = amt(dec!(100.01));
        let err = h
            .store
            .create_transaction(
                id,
                h.kiosk,
                over_cap,
                "https://pay.example/t/x".into(),
                ts(0),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidAmount);

        // At the cap is fine.
        let at_cap = amt(dec!(100.00));
        assert!(h
            .store
            .create_transaction(
                id,
                h.kiosk,
                at_cap,
                "https://pay.example/t/x".into(),
                ts(0),
            )
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn get_unknown_transaction_is_not_found() {
        let mut h = Harness::new().await;
        let id = TransactionId::generate(&mut h.rng);
        let err = h.store.get_transaction(id).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn mark_paid_enqueues_exactly_one_job() {
        let mut h = Harness::new().await;
        let tx = h.create(dec!(5.00), ts(1_000)).await;
        let job_id = JobId::generate(&mut h.rng);
        let nullifier = NullifierHash::new("n1".to_owned());

        let (paid, job) = h
            .store
            .mark_paid_and_enqueue(tx.id, job_id, &nullifier, ts(2_000))
            .await
            .unwrap();
        assert_eq!(paid.status, TxStatus::Paid);
        assert_eq!(paid.paid_at, Some(ts(2_000)));
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.attempts, 0);
        assert_eq!(job.coins, 20);

        // Replay: same nullifier, same transaction.
        let job_id2 = JobId::generate(&mut h.rng);
        let err = h
            .store
            .mark_paid_and_enqueue(tx.id, job_id2, &nullifier, ts(3_000))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::AlreadyProcessed);

        // Still exactly one job.
        let backing = h.store.get_job_for_transaction(tx.id).await.unwrap();
        assert_eq!(backing.unwrap().id, job_id);
    }

    #[tokio::test]
    async fn nullifier_cannot_span_transactions() {
        let mut h = Harness::new().await;
        let tx1 = h.create(dec!(1.00), ts(0)).await;
        let tx2 = h.create(dec!(2.00), ts(0)).await;
        let nullifier = NullifierHash::new("n1".to_owned());

        let job1 = JobId::generate(&mut h.rng);
        h.store
            .mark_paid_and_enqueue(tx1.id, job1, &nullifier, ts(1))
            .await
            .unwrap();

        let job2 = JobId::generate(&mut h.rng);
        let err = h
            .store
            .mark_paid_and_enqueue(tx2.id, job2, &nullifier, ts(2))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NullifierReused);

        // tx2 is untouched.
        let tx2 = h.store.get_transaction(tx2.id).await.unwrap();
        assert_eq!(tx2.status, TxStatus::Pending);
    }

    #[tokio::test]
    async fn pay_at_expiry_boundary() {
        let mut h = Harness::new().await;
        let t0 = ts(1_000);
        let tx = h.create(dec!(5.00), t0).await;
        let expires_at = tx.expires_at;

        // One millisecond before expiry: accepted.
        let job_id = JobId::generate(&mut h.rng);
        let nullifier = NullifierHash::new("n-early".to_owned());
        let just_before = ts(expires_at.to_i64() - 1);
        assert!(h
            .store
            .mark_paid_and_enqueue(tx.id, job_id, &nullifier, just_before)
            .await
            .is_ok());

        // A second transaction paid at expiry: rejected and eagerly expired.
        let tx2 = h.create(dec!(5.00), t0).await;
        let job_id2 = JobId::generate(&mut h.rng);
        let nullifier2 = NullifierHash::new("n-late".to_owned());
        let err = h
            .store
            .mark_paid_and_enqueue(tx2.id, job_id2, &nullifier2, expires_at)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Expired);
        let tx2 = h.store.get_transaction(tx2.id).await.unwrap();
        assert_eq!(tx2.status, TxStatus::Expired);
        // No job was created.
        assert!(h
            .store
            .get_job_for_transaction(tx2.id)
            .await
            .unwrap()
            .is_none());

        // Paying the now-expired transaction still reports Expired.
        let err = h
            .store
            .mark_paid_and_enqueue(
                tx2.id,
                job_id2,
                &nullifier2,
                ts(expires_at.to_i64() + 1),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Expired);
    }

    #[tokio::test]
    async fn lease_is_fifo_and_idempotent() {
        let mut h = Harness::new().await;
        let job1 = h.paid_job(dec!(1.00), ts(1_000)).await;
        let job2 = h.paid_job(dec!(2.00), ts(2_000)).await;

        // Oldest job first.
        let leased =
            h.store.lease_next_job(h.kiosk, ts(3_000)).await.unwrap().unwrap();
        assert_eq!(leased.id, job1.id);
        assert_eq!(leased.status, JobStatus::InProgress);

        // Re-polling without a report returns the same job, not job2, and
        // does not consume retry budget.
        let again =
            h.store.lease_next_job(h.kiosk, ts(4_000)).await.unwrap().unwrap();
        assert_eq!(again.id, job1.id);
        assert_eq!(again.attempts, 0);
        assert_eq!(again.last_attempt_at, Some(ts(4_000)));

        // Settle job1; the next lease hands out job2.
        h.store
            .complete_job(job1.id, h.kiosk, true, None, ts(5_000))
            .await
            .unwrap();
        let leased =
            h.store.lease_next_job(h.kiosk, ts(6_000)).await.unwrap().unwrap();
        assert_eq!(leased.id, job2.id);
    }

    #[tokio::test]
    async fn lease_is_scoped_per_kiosk() {
        let mut h = Harness::new().await;
        let _job = h.paid_job(dec!(1.00), ts(1_000)).await;

        let other_kiosk = KioskId::generate(&mut h.rng);
        let none = h
            .store
            .lease_next_job(other_kiosk, ts(2_000))
            .await
            .unwrap();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn success_report_completes_job_and_transaction() {
        let mut h = Harness::new().await;
        let job = h.paid_job(dec!(5.00), ts(1_000)).await;
        h.store.lease_next_job(h.kiosk, ts(2_000)).await.unwrap();

        let ack = h
            .store
            .complete_job(job.id, h.kiosk, true, None, ts(3_000))
            .await
            .unwrap();
        assert_eq!(ack, ReportAck::Success);

        let tx = h.store.get_transaction(job.transaction_id).await.unwrap();
        assert_eq!(tx.status, TxStatus::Completed);
        assert_eq!(tx.completed_at, Some(ts(3_000)));
        let job = h
            .store
            .get_job_for_transaction(job.transaction_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(job.status, JobStatus::Completed);

        // Repeat acknowledgement is a no-op success.
        let ack = h
            .store
            .complete_job(job.id, h.kiosk, true, None, ts(4_000))
            .await
            .unwrap();
        assert_eq!(ack, ReportAck::Success);
    }

    #[tokio::test]
    async fn failure_reports_consume_retry_budget() {
        let mut h = Harness::new().await;
        let job = h.paid_job(dec!(5.00), ts(0)).await;

        // Attempts 1 and 2: back to pending, re-leasable.
        for attempt in 1..3u32 {
            h.store.lease_next_job(h.kiosk, ts(1_000)).await.unwrap();
            let ack = h
                .store
                .complete_job(
                    job.id,
                    h.kiosk,
                    false,
                    Some("hopper jam"),
                    ts(2_000),
                )
                .await
                .unwrap();
            assert_eq!(ack, ReportAck::Retry);
            let row = h
                .store
                .get_job_for_transaction(job.transaction_id)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(row.status, JobStatus::Pending);
            assert_eq!(row.attempts, attempt);
            assert_eq!(row.last_error.as_deref(), Some("hopper jam"));
        }

        // Third failure is terminal.
        h.store.lease_next_job(h.kiosk, ts(3_000)).await.unwrap();
        let ack = h
            .store
            .complete_job(job.id, h.kiosk, false, Some("hopper jam"), ts(4_000))
            .await
            .unwrap();
        assert_eq!(ack, ReportAck::Failed);

        let row = h
            .store
            .get_job_for_transaction(job.transaction_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.status, JobStatus::Failed);
        assert_eq!(row.attempts, row.max_attempts);
        let tx = h.store.get_transaction(job.transaction_id).await.unwrap();
        assert_eq!(tx.status, TxStatus::Failed);

        // No further leases for this job.
        assert!(h
            .store
            .lease_next_job(h.kiosk, ts(5_000))
            .await
            .unwrap()
            .is_none());

        // A late duplicate report is acknowledged as the terminal state.
        let ack = h
            .store
            .complete_job(job.id, h.kiosk, false, Some("again"), ts(6_000))
            .await
            .unwrap();
        assert_eq!(ack, ReportAck::Failed);
    }

    #[tokio::test]
    async fn report_validations() {
        let mut h = Harness::new().await;
        let job = h.paid_job(dec!(1.00), ts(0)).await;

        // Not leased yet.
        let err = h
            .store
            .complete_job(job.id, h.kiosk, true, None, ts(1))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::JobNotInProgress);

        // Leased, but reported by the wrong kiosk.
        h.store.lease_next_job(h.kiosk, ts(2)).await.unwrap();
        let imposter = KioskId::generate(&mut h.rng);
        let err = h
            .store
            .complete_job(job.id, imposter, true, None, ts(3))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::JobOwnershipMismatch);

        // Unknown job id.
        let unknown = JobId::generate(&mut h.rng);
        let err = h
            .store
            .complete_job(unknown, h.kiosk, true, None, ts(4))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn sweep_expired_marks_only_overdue_pending() {
        let mut h = Harness::new().await;
        let stale = h.create(dec!(1.00), ts(0)).await;
        let fresh = h.create(dec!(1.00), ts(600_000)).await;

        // At stale's expiry instant nothing sweeps (strictly-less-than).
        let swept =
            h.store.sweep_expired(stale.expires_at).await.unwrap();
        assert_eq!(swept, 0);

        let after = ts(stale.expires_at.to_i64() + 1);
        let swept = h.store.sweep_expired(after).await.unwrap();
        assert_eq!(swept, 1);
        assert_eq!(
            h.store.get_transaction(stale.id).await.unwrap().status,
            TxStatus::Expired
        );
        assert_eq!(
            h.store.get_transaction(fresh.id).await.unwrap().status,
            TxStatus::Pending
        );

        // Idempotent.
        assert_eq!(h.store.sweep_expired(after).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn stuck_leases_are_revived_then_failed() {
        let mut h = Harness::new().await;
        let job = h.paid_job(dec!(1.00), ts(0)).await;
        let max_age = Duration::from_secs(120);

        h.store.lease_next_job(h.kiosk, ts(0)).await.unwrap();

        // Not yet stuck.
        let revived = h
            .store
            .revive_stuck_leases(max_age, ts(60_000))
            .await
            .unwrap();
        assert_eq!(revived, 0);

        // Stuck: attempt counted, back to pending.
        let revived = h
            .store
            .revive_stuck_leases(max_age, ts(120_001))
            .await
            .unwrap();
        assert_eq!(revived, 1);
        let row = h
            .store
            .get_job_for_transaction(job.transaction_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.status, JobStatus::Pending);
        assert_eq!(row.attempts, 1);

        // Two more stuck leases exhaust the budget and fail the job.
        h.store.lease_next_job(h.kiosk, ts(130_000)).await.unwrap();
        h.store
            .revive_stuck_leases(max_age, ts(260_000))
            .await
            .unwrap();
        h.store.lease_next_job(h.kiosk, ts(270_000)).await.unwrap();
        h.store
            .revive_stuck_leases(max_age, ts(400_000))
            .await
            .unwrap();

        let row = h
            .store
            .get_job_for_transaction(job.transaction_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.status, JobStatus::Failed);
        assert_eq!(row.attempts, row.max_attempts);
        assert_eq!(
            h.store
                .get_transaction(job.transaction_id)
                .await
                .unwrap()
                .status,
            TxStatus::Failed
        );
    }

    #[tokio::test]
    async fn events_trace_the_happy_path() {
        let mut h = Harness::new().await;
        let job = h.paid_job(dec!(5.00), ts(0)).await;
        h.store.lease_next_job(h.kiosk, ts(1)).await.unwrap();
        h.store
            .complete_job(job.id, h.kiosk, true, None, ts(2))
            .await
            .unwrap();

        let events = h.store.list_events(job.transaction_id).await.unwrap();
        let kinds: Vec<EventKind> =
            events.iter().map(|event| event.kind).collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::Created,
                EventKind::Paid,
                EventKind::JobEnqueued,
                EventKind::JobLeased,
                EventKind::JobCompleted,
                EventKind::Completed,
            ]
        );
        // Exactly one terminal `completed` event.
        assert_eq!(
            events
                .iter()
                .filter(|event| event.kind == EventKind::Completed)
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn kiosk_recency_tracks_requests() {
        let mut h = Harness::new().await;
        assert!(h.store.latest_kiosk_seen_at().await.unwrap().is_none());

        h.create(dec!(1.00), ts(5_000)).await;
        assert_eq!(
            h.store.latest_kiosk_seen_at().await.unwrap(),
            Some(ts(5_000))
        );

        h.store.lease_next_job(h.kiosk, ts(9_000)).await.unwrap();
        assert_eq!(
            h.store.latest_kiosk_seen_at().await.unwrap(),
            Some(ts(9_000))
        );
    }
}
