//! REST client for the coordinator's dispenser API.

use std::time::Duration;

use hopper_api::{
    def::{DispenserApi, KIOSK_ID_HEADER},
    error::{ApiError, ApiResult, ErrorKind, ErrorResponse},
    models::{CompleteJobRequest, CompleteJobResponse, JobView},
};
use hopper_common::ids::{JobId, KioskId};
use serde::de::DeserializeOwned;

/// Poll and report calls are short; a slow coordinator should surface as a
/// retry, not a hung loop.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

pub struct CoordinatorClient {
    client: reqwest::Client,
    base_url: String,
    kiosk_id: KioskId,
}

impl CoordinatorClient {
    pub fn new(base_url: impl Into<String>, kiosk_id: KioskId) -> Self {
        let client = reqwest::Client::builder()
            .user_agent("hopper-agent")
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to build reqwest Client");
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Self {
            client,
            base_url,
            kiosk_id,
        }
    }

    async fn decode<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> ApiResult<T> {
        let status = response.status();
        if status.is_success() {
            return response.json::<T>().await.map_err(|err| {
                ApiError::new(
                    ErrorKind::Unknown,
                    format!("bad coordinator response: {err}"),
                )
            });
        }
        // Error statuses carry our standard wire shape; fall back to the
        // status code if the body is something else (a proxy error page).
        match response.json::<ErrorResponse>().await {
            Ok(resp) => Err(ApiError::from(resp)),
            Err(_) => Err(ApiError::new(
                ErrorKind::Unknown,
                format!("coordinator returned HTTP {status}"),
            )),
        }
    }
}

fn transport_err(err: reqwest::Error) -> ApiError {
    ApiError::new(
        ErrorKind::Unknown,
        format!("coordinator unreachable: {err}"),
    )
}

impl DispenserApi for CoordinatorClient {
    async fn next_job(&self) -> ApiResult<Option<JobView>> {
        let url = format!("{}/jobs/pending", self.base_url);
        let response = self
            .client
            .get(url)
            .header(KIOSK_ID_HEADER, self.kiosk_id.to_string())
            .send()
            .await
            .map_err(transport_err)?;
        Self::decode(response).await
    }

    async fn complete_job(
        &self,
        job_id: JobId,
        req: &CompleteJobRequest,
    ) -> ApiResult<CompleteJobResponse> {
        let url = format!("{}/jobs/{job_id}/complete", self.base_url);
        let response = self
            .client
            .post(url)
            .header(KIOSK_ID_HEADER, self.kiosk_id.to_string())
            .json(req)
            .send()
            .await
            .map_err(transport_err)?;
        Self::decode(response).await
    }
}
