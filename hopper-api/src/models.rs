//! Request / response models.
//!
//! These structs resemble the data actually sent across the wire. Amounts
//! serialize as decimal strings ("5.50"), ids as lowercase hex strings, and
//! timestamps as integer unix milliseconds.

use hopper_common::{
    amount::Amount,
    ids::{JobId, NullifierHash, TransactionId},
    time::TimestampMs,
};
use serde::{Deserialize, Serialize};

// --- Statuses --- //

/// The payer-visible transaction status.
///
/// `Dispensing` is a view-only refinement of `Paid`: it is surfaced when the
/// backing dispense job has been leased by the kiosk. Callers observing
/// either `Paid` or `Dispensing` must treat the payment as already
/// authorized.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    Pending,
    Paid,
    Dispensing,
    Completed,
    Failed,
    Expired,
}

impl TxStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Dispensing => "dispensing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Expired => "expired",
        }
    }

    /// Parse a stored/wire form. Returns [`None`] for unrecognized strings.
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "paid" => Some(Self::Paid),
            "dispensing" => Some(Self::Dispensing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }

    /// Whether no further transitions are possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Expired)
    }
}

/// Dispense job status.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parse a stored/wire form. Returns [`None`] for unrecognized strings.
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

// --- POST /transaction/create --- //

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateTransactionRequest {
    /// The fiat amount selected at the attendant display.
    pub amount: Amount,
}

// --- GET /transaction/{id} (and create response) --- //

/// The public projection of a transaction. Internal fields (owning kiosk,
/// nullifier) are stripped.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransactionView {
    pub id: TransactionId,
    pub amount: Amount,
    /// Number of coins that will be dispensed.
    pub coins: u32,
    /// Total charged to the payer: amount plus the fixed fee.
    pub total: Amount,
    /// Payer-side deep-link URL encoded into the attendant's QR code.
    pub qr_url: String,
    pub status: TxStatus,
    pub created_at: TimestampMs,
    pub expires_at: TimestampMs,
    pub paid_at: Option<TimestampMs>,
    pub completed_at: Option<TimestampMs>,
}

// --- POST /transaction/pay --- //

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PayRequest {
    pub transaction_id: TransactionId,
    /// Opaque zero-knowledge proof, forwarded to the verifier verbatim.
    pub proof: String,
    pub nullifier_hash: NullifierHash,
    pub merkle_root: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PayResponse {
    /// Always [`PayResponse::STATUS`].
    pub status: String,
    pub job_id: JobId,
    pub transaction_id: TransactionId,
    pub coins: u32,
}

impl PayResponse {
    pub const STATUS: &'static str = "payment_complete";

    pub fn new(job_id: JobId, transaction_id: TransactionId, coins: u32) -> Self {
        Self {
            status: Self::STATUS.to_owned(),
            job_id,
            transaction_id,
            coins,
        }
    }
}

// --- GET /jobs/pending --- //

/// The agent's view of a leased dispense job.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobView {
    pub id: JobId,
    pub transaction_id: TransactionId,
    /// Number of coins to actuate.
    pub coins: u32,
    /// How many delivery attempts have already consumed retry budget.
    pub attempts: u32,
    pub created_at: TimestampMs,
}

// --- POST /jobs/{id}/complete --- //

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompleteJobRequest {
    pub success: bool,
    /// Short failure reason; ignored when `success` is true.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// What the report did to the job.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportAck {
    /// The job (and its transaction) completed.
    Success,
    /// The failure was recorded; the job returned to pending for re-lease.
    Retry,
    /// The failure exhausted the retry budget; the job and transaction are
    /// terminally failed.
    Failed,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompleteJobResponse {
    pub status: ReportAck,
}

// --- GET /health --- //

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStatus {
    Ok,
    /// Kiosks exist but none has been seen recently.
    Stale,
    /// No kiosk has ever registered.
    Unknown,
    Error,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ProbeStatus,
    pub db: ProbeStatus,
    /// Fleet-level hardware reachability inferred from kiosk last-seen
    /// recency; the coordinator has no direct line to any hopper.
    pub hardware: ProbeStatus,
}
