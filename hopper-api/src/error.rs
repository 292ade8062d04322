//! Serializable api error types and error kinds returned by the coordinator.
//!
//! Domain code returns [`ApiError`]s by value; the HTTP edge is the only
//! place that translates them into status codes, and the wire shape is
//! always [`ErrorResponse`]: `{"error": "<machine-readable kind>",
//! "detail": "<free text>"}`.

use std::fmt;

use http::status::StatusCode;
use serde::{Deserialize, Serialize};

// Associated constants can't be imported.
pub const CLIENT_400_BAD_REQUEST: StatusCode = StatusCode::BAD_REQUEST;
pub const CLIENT_403_FORBIDDEN: StatusCode = StatusCode::FORBIDDEN;
pub const CLIENT_404_NOT_FOUND: StatusCode = StatusCode::NOT_FOUND;
pub const CLIENT_409_CONFLICT: StatusCode = StatusCode::CONFLICT;
pub const SERVER_500_INTERNAL_SERVER_ERROR: StatusCode =
    StatusCode::INTERNAL_SERVER_ERROR;
pub const SERVER_503_SERVICE_UNAVAILABLE: StatusCode =
    StatusCode::SERVICE_UNAVAILABLE;

/// `ErrorResponse` is the JSON-serialized representation of all [`ApiError`]s.
/// It is the only error struct actually sent across the wire.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable error kind, e.g. "invalid_amount".
    pub error: String,
    /// Free-text detail for humans and logs.
    #[serde(default)]
    pub detail: String,
}

/// All error kinds surfaced by the coordinator's API.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum ErrorKind {
    /// An error kind unrecognized by this version of the software. Client
    /// side only; the server never produces it.
    #[default]
    Unknown,

    // --- Input errors --- //
    /// Amount is non-positive or above the configured cap.
    InvalidAmount,
    /// The `X-Kiosk-Id` header is missing or malformed.
    InvalidKiosk,
    /// The request body or a path/query parameter failed to parse.
    MalformedRequest,

    // --- State errors --- //
    /// No such transaction or job.
    NotFound,
    /// The transaction's authorization window has passed.
    Expired,
    /// The transaction was already paid.
    AlreadyProcessed,
    /// The nullifier was already consumed by another transaction.
    NullifierReused,
    /// The job is owned by a different kiosk.
    JobOwnershipMismatch,
    /// The job is not currently in progress.
    JobNotInProgress,

    // --- Authorization errors --- //
    /// The identity/payment verifier rejected the proof.
    VerificationRejected,

    // --- Transient infrastructure errors --- //
    /// The database did not respond or returned an unexpected error.
    DatabaseUnavailable,
    /// The verifier service did not respond.
    VerifierUnavailable,
}

impl ErrorKind {
    /// All known kinds, excluding [`ErrorKind::Unknown`].
    pub const KINDS: &'static [Self] = &[
        Self::InvalidAmount,
        Self::InvalidKiosk,
        Self::MalformedRequest,
        Self::NotFound,
        Self::Expired,
        Self::AlreadyProcessed,
        Self::NullifierReused,
        Self::JobOwnershipMismatch,
        Self::JobNotInProgress,
        Self::VerificationRejected,
        Self::DatabaseUnavailable,
        Self::VerifierUnavailable,
    ];

    /// The machine-readable wire form of this kind.
    pub fn to_wire(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::InvalidAmount => "invalid_amount",
            Self::InvalidKiosk => "invalid_kiosk",
            Self::MalformedRequest => "malformed_request",
            Self::NotFound => "not_found",
            Self::Expired => "expired",
            Self::AlreadyProcessed => "already_processed",
            Self::NullifierReused => "nullifier_reused",
            Self::JobOwnershipMismatch => "job_ownership_mismatch",
            Self::JobNotInProgress => "job_not_in_progress",
            Self::VerificationRejected => "verification_rejected",
            Self::DatabaseUnavailable => "database_unavailable",
            Self::VerifierUnavailable => "verifier_unavailable",
        }
    }

    /// Parse a wire form back into a kind. Unrecognized strings map to
    /// [`ErrorKind::Unknown`] so older clients keep working against newer
    /// servers.
    pub fn from_wire(wire: &str) -> Self {
        Self::KINDS
            .iter()
            .copied()
            .find(|kind| kind.to_wire() == wire)
            .unwrap_or(Self::Unknown)
    }

    /// The HTTP status code this kind surfaces as.
    pub fn to_http_status(self) -> StatusCode {
        match self {
            Self::Unknown => SERVER_500_INTERNAL_SERVER_ERROR,

            Self::InvalidAmount => CLIENT_400_BAD_REQUEST,
            Self::InvalidKiosk => CLIENT_400_BAD_REQUEST,
            Self::MalformedRequest => CLIENT_400_BAD_REQUEST,

            Self::NotFound => CLIENT_404_NOT_FOUND,
            Self::Expired => CLIENT_400_BAD_REQUEST,
            Self::AlreadyProcessed => CLIENT_409_CONFLICT,
            Self::NullifierReused => CLIENT_409_CONFLICT,
            Self::JobOwnershipMismatch => CLIENT_403_FORBIDDEN,
            Self::JobNotInProgress => CLIENT_409_CONFLICT,

            Self::VerificationRejected => CLIENT_400_BAD_REQUEST,

            Self::DatabaseUnavailable => SERVER_503_SERVICE_UNAVAILABLE,
            Self::VerifierUnavailable => SERVER_503_SERVICE_UNAVAILABLE,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_wire())
    }
}

/// The error type returned by coordinator domain code and decoded by clients.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub struct ApiError {
    pub kind: ErrorKind,
    pub detail: String,
}

impl ApiError {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    // A few high-traffic constructors.

    pub fn invalid_amount(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidAmount, detail)
    }

    pub fn invalid_kiosk(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidKiosk, detail)
    }

    pub fn malformed(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::MalformedRequest, detail)
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, detail)
    }

    pub fn database(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::DatabaseUnavailable, detail)
    }

    /// Log this error and get its HTTP [`StatusCode`].
    #[cfg(feature = "axum")]
    fn log_and_status(&self) -> StatusCode {
        let status = self.kind.to_http_status();
        if status.is_server_error() {
            tracing::error!("{self}");
        } else {
            tracing::warn!("{self}");
        }
        status
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = self.kind.to_wire();
        let detail = &self.detail;
        write!(f, "{kind}: {detail}")
    }
}

impl From<ErrorResponse> for ApiError {
    fn from(resp: ErrorResponse) -> Self {
        Self {
            kind: ErrorKind::from_wire(&resp.error),
            detail: resp.detail,
        }
    }
}

impl From<ApiError> for ErrorResponse {
    fn from(err: ApiError) -> Self {
        Self {
            error: err.kind.to_wire().to_owned(),
            detail: err.detail,
        }
    }
}

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        // Log here; by the time axum's layers see this it is already an
        // `http::Response`.
        let status = self.log_and_status();
        let resp = ErrorResponse::from(self);
        (status, axum::Json(resp)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
