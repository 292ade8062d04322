//! The opaque identity/payment proof verifier.
//!
//! The coordinator knows nothing about proofs beyond this call shape. It
//! never caches verifier responses; nullifier uniqueness in the store is the
//! replay defence.

use std::time::Duration;

use async_trait::async_trait;
use hopper_api::error::{ApiError, ApiResult, ErrorKind};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// The verifier is the slowest hop in `Pay`; a timeout is treated as a
/// rejection, never a silent wait.
const VERIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// A proof submission, forwarded verbatim from the payer client.
#[derive(Clone, Debug)]
pub struct ProofSubmission {
    pub proof: String,
    pub nullifier_hash: String,
    pub merkle_root: String,
}

#[async_trait]
pub trait ProofVerifier: Send + Sync + 'static {
    /// Returns `Ok(())` if the proof was accepted.
    ///
    /// Errors with [`ErrorKind::VerificationRejected`] when the verifier
    /// rejects the proof (or times out), and
    /// [`ErrorKind::VerifierUnavailable`] when it cannot be reached at all.
    async fn verify(&self, submission: &ProofSubmission) -> ApiResult<()>;
}

// --- HTTP verifier --- //

#[derive(Serialize)]
struct VerifyRequestWire<'a> {
    proof: &'a str,
    nullifier_hash: &'a str,
    merkle_root: &'a str,
    action_id: &'a str,
}

#[derive(Deserialize)]
struct VerifyResponseWire {
    success: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Calls the external verifier service over HTTP.
pub struct HttpVerifier {
    client: reqwest::Client,
    url: String,
    action_id: String,
}

impl HttpVerifier {
    pub fn new(url: String, action_id: String) -> Self {
        let client = reqwest::Client::builder()
            .user_agent("hopperd")
            .timeout(VERIFY_TIMEOUT)
            .build()
            .expect("Failed to build reqwest Client");
        Self {
            client,
            url,
            action_id,
        }
    }
}

#[async_trait]
impl ProofVerifier for HttpVerifier {
    async fn verify(&self, submission: &ProofSubmission) -> ApiResult<()> {
        let request = VerifyRequestWire {
            proof: &submission.proof,
            nullifier_hash: &submission.nullifier_hash,
            merkle_root: &submission.merkle_root,
            action_id: &self.action_id,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    ApiError::new(ErrorKind::VerificationRejected, "timeout")
                } else {
                    ApiError::new(
                        ErrorKind::VerifierUnavailable,
                        format!("could not reach verifier: {err}"),
                    )
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::new(
                ErrorKind::VerifierUnavailable,
                format!("verifier returned HTTP {status}"),
            ));
        }

        let wire: VerifyResponseWire =
            response.json().await.map_err(|err| {
                ApiError::new(
                    ErrorKind::VerifierUnavailable,
                    format!("bad verifier response: {err}"),
                )
            })?;
        if wire.success {
            debug!("verifier accepted proof");
            Ok(())
        } else {
            let reason =
                wire.error.unwrap_or_else(|| "proof rejected".to_owned());
            Err(ApiError::new(ErrorKind::VerificationRejected, reason))
        }
    }
}

// --- Always-accept verifier --- //

/// Short-circuits verification to always-accept. Config validation refuses
/// this outside dev/staging; see [`Config::from_args`].
///
/// [`Config::from_args`]: crate::config::Config::from_args
pub struct AcceptAllVerifier;

#[async_trait]
impl ProofVerifier for AcceptAllVerifier {
    async fn verify(&self, _submission: &ProofSubmission) -> ApiResult<()> {
        Ok(())
    }
}
