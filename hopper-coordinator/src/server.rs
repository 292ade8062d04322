//! The HTTP edge: deserialize, authenticate the kiosk header, dispatch to
//! [`TxCoordinator`] / [`JobQueue`], serialize. Domain errors are translated
//! into status codes here and nowhere else.

use std::{str::FromStr, time::Duration};

use anyhow::Context as _;
use axum::{
    extract::{FromRequest, FromRequestParts, Path, Request, State},
    http::{request::Parts, Method, Uri},
    routing::{get, post},
    Json, Router,
};
use hopper_api::{
    def::KIOSK_ID_HEADER,
    error::{ApiError, ApiResult},
    models::{
        CompleteJobRequest, CompleteJobResponse, CreateTransactionRequest,
        HealthResponse, JobView, PayRequest, PayResponse, ProbeStatus,
        TransactionView,
    },
};
use hopper_common::{
    ids::{JobId, KioskId, TransactionId},
    shutdown::ShutdownChannel,
};
use serde::de::DeserializeOwned;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::{context::Context, coordinator::TxCoordinator, queue::JobQueue};

/// A kiosk whose agent has not checked in for this long counts as stale in
/// `/health`. Comfortably above the agent's idle poll cadence.
const HARDWARE_STALE_AFTER: Duration = Duration::from_secs(60);

// --- Extractors --- //

/// Extracts and validates the `X-Kiosk-Id` header.
pub struct KioskIdHeader(pub KioskId);

impl<S: Send + Sync> FromRequestParts<S> for KioskIdHeader {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        let value = parts.headers.get(KIOSK_ID_HEADER).ok_or_else(|| {
            ApiError::invalid_kiosk(format!("missing {KIOSK_ID_HEADER} header"))
        })?;
        let value = value.to_str().map_err(|_| {
            ApiError::invalid_kiosk(format!(
                "{KIOSK_ID_HEADER} header is not valid ascii"
            ))
        })?;
        KioskId::from_str(value).map(Self).map_err(|_| {
            ApiError::invalid_kiosk(format!(
                "{KIOSK_ID_HEADER} header is not a valid kiosk id"
            ))
        })
    }
}

/// [`Json`] with rejections translated to our wire error shape.
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request(
        req: Request,
        state: &S,
    ) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(ApiError::malformed(rejection.body_text())),
        }
    }
}

// --- Router --- //

#[derive(Clone)]
struct ApiState {
    coordinator: TxCoordinator,
    queue: JobQueue,
    ctx: Context,
}

/// Build the coordinator's router. See `hopper_api::def` for the endpoint
/// definitions this must stay consistent with.
pub fn router(ctx: Context) -> Router {
    let state = ApiState {
        coordinator: TxCoordinator::new(ctx.clone()),
        queue: JobQueue::new(ctx.clone()),
        ctx,
    };

    // The payer client is a browser on someone's phone, so the payer-facing
    // routes must answer cross-origin preflights.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/transaction/create", post(create_transaction))
        .route("/transaction/pay", post(pay_transaction))
        .route("/transaction/{id}", get(get_transaction))
        .route("/jobs/pending", get(next_job))
        .route("/jobs/{id}/complete", post(complete_job))
        .route("/health", get(health))
        .fallback(fallback)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the router until a shutdown signal arrives, then drain gracefully.
pub async fn serve(
    listener: tokio::net::TcpListener,
    router: Router,
    shutdown: ShutdownChannel,
) -> anyhow::Result<()> {
    let addr = listener.local_addr().context("No local address")?;
    info!("http server listening on {addr}");
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.recv().await })
        .await
        .context("Server error")
}

// --- Handlers --- //

async fn create_transaction(
    State(state): State<ApiState>,
    kiosk: KioskIdHeader,
    JsonBody(req): JsonBody<CreateTransactionRequest>,
) -> ApiResult<Json<TransactionView>> {
    state.coordinator.create(kiosk.0, req).await.map(Json)
}

async fn pay_transaction(
    State(state): State<ApiState>,
    JsonBody(req): JsonBody<PayRequest>,
) -> ApiResult<Json<PayResponse>> {
    state.coordinator.pay(req).await.map(Json)
}

async fn get_transaction(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<Json<TransactionView>> {
    let id = TransactionId::from_str(&id)
        .map_err(|_| ApiError::malformed("bad transaction id"))?;
    state.coordinator.describe(id).await.map(Json)
}

async fn next_job(
    State(state): State<ApiState>,
    kiosk: KioskIdHeader,
) -> ApiResult<Json<Option<JobView>>> {
    state.queue.next(kiosk.0).await.map(Json)
}

async fn complete_job(
    State(state): State<ApiState>,
    kiosk: KioskIdHeader,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<CompleteJobRequest>,
) -> ApiResult<Json<CompleteJobResponse>> {
    let id =
        JobId::from_str(&id).map_err(|_| ApiError::malformed("bad job id"))?;
    state.queue.report(id, kiosk.0, &req).await.map(Json)
}

async fn health(State(state): State<ApiState>) -> Json<HealthResponse> {
    let db = match state.ctx.store.health_ping().await {
        Ok(()) => ProbeStatus::Ok,
        Err(_) => ProbeStatus::Error,
    };
    let hardware = match state.ctx.store.latest_kiosk_seen_at().await {
        Err(_) => ProbeStatus::Error,
        Ok(None) => ProbeStatus::Unknown,
        Ok(Some(seen)) => {
            let now = state.ctx.now();
            if now.saturating_duration_since(seen) <= HARDWARE_STALE_AFTER {
                ProbeStatus::Ok
            } else {
                ProbeStatus::Stale
            }
        }
    };
    let status = match db {
        ProbeStatus::Ok => ProbeStatus::Ok,
        _ => ProbeStatus::Error,
    };
    Json(HealthResponse {
        status,
        db,
        hardware,
    })
}

async fn fallback(method: Method, uri: Uri) -> ApiError {
    ApiError::not_found(format!("no such endpoint: {method} {uri}"))
}
