//! End-to-end lifecycle scenarios driven through `TxCoordinator` and
//! `JobQueue` with a deterministic clock and RNG, against an in-memory
//! store.

use std::{
    str::FromStr,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use hopper_api::{
    error::{ApiResult, ErrorKind},
    models::{
        CompleteJobRequest, CreateTransactionRequest, PayRequest, ReportAck,
        TxStatus,
    },
};
use hopper_common::{
    amount::Amount,
    ids::{JobId, KioskId, NullifierHash, TransactionId},
    rng::WeakRng,
    time::{Clock, TestClock, TimestampMs},
};
use hopper_coordinator::{
    config::{Config, DeployEnv, Tunables, VerifierConfig},
    context::Context,
    coordinator::TxCoordinator,
    queue::JobQueue,
    store::{EventKind, Store},
    verifier::{AcceptAllVerifier, ProofSubmission, ProofVerifier},
};
use rust_decimal::Decimal;

/// A verifier that rejects everything, for exercising the rejection path.
struct RejectingVerifier;

#[async_trait]
impl ProofVerifier for RejectingVerifier {
    async fn verify(&self, _submission: &ProofSubmission) -> ApiResult<()> {
        Err(hopper_api::error::ApiError::new(
            ErrorKind::VerificationRejected,
            "invalid merkle root",
        ))
    }
}

fn ts(ms: i64) -> TimestampMs {
    TimestampMs::try_from_i64(ms).unwrap()
}

fn amount(s: &str) -> Amount {
    Amount::try_from_decimal(Decimal::from_str(s).unwrap()).unwrap()
}

struct Harness {
    coordinator: TxCoordinator,
    queue: JobQueue,
    store: Store,
    clock: TestClock,
    kiosk: KioskId,
}

impl Harness {
    async fn new(verifier: Arc<dyn ProofVerifier>) -> Self {
        let store = Store::in_memory(Tunables::default()).await.unwrap();
        let clock = TestClock::new(ts(1_000));
        let config = Config {
            db: ":memory:".to_owned(),
            listen: "127.0.0.1:0".parse().unwrap(),
            deploy_env: DeployEnv::Dev,
            verifier: VerifierConfig::AcceptAll,
            payer_url_template: "https://pay.example/t/{transaction_id}"
                .to_owned(),
            tunables: Tunables::default(),
            sweep_interval: Duration::from_secs(60),
            lease_max_age: Duration::from_secs(120),
        };
        let mut rng = WeakRng::from_u64(0xc0117);
        let kiosk = KioskId::generate(&mut rng);
        let ctx = Context::new(
            store.clone(),
            verifier,
            Arc::new(clock.clone()),
            Arc::new(Mutex::new(rng)),
            Arc::new(config),
        );
        Self {
            coordinator: TxCoordinator::new(ctx.clone()),
            queue: JobQueue::new(ctx.clone()),
            store,
            clock,
            kiosk,
        }
    }

    async fn create(&self, amount_str: &str) -> TransactionId {
        let view = self
            .coordinator
            .create(
                self.kiosk,
                CreateTransactionRequest {
                    amount: amount(amount_str),
                },
            )
            .await
            .unwrap();
        view.id
    }

    async fn pay(
        &self,
        tx_id: TransactionId,
        nullifier: &str,
    ) -> ApiResult<JobId> {
        self.coordinator
            .pay(PayRequest {
                transaction_id: tx_id,
                proof: "zk-proof".to_owned(),
                nullifier_hash: NullifierHash::new(nullifier.to_owned()),
                merkle_root: "root".to_owned(),
            })
            .await
            .map(|resp| resp.job_id)
    }

    async fn report(
        &self,
        job_id: JobId,
        success: bool,
        error: Option<&str>,
    ) -> ApiResult<ReportAck> {
        self.queue
            .report(
                job_id,
                self.kiosk,
                &CompleteJobRequest {
                    success,
                    error: error.map(str::to_owned),
                },
            )
            .await
            .map(|resp| resp.status)
    }
}

/// The happy path, end to end.
#[tokio::test]
async fn happy_path_end_to_end() {
    let h = Harness::new(Arc::new(AcceptAllVerifier)).await;

    let view = h
        .coordinator
        .create(
            h.kiosk,
            CreateTransactionRequest {
                amount: amount("5.00"),
            },
        )
        .await
        .unwrap();
    assert_eq!(view.coins, 20);
    assert_eq!(view.total, amount("5.50"));
    assert_eq!(view.status, TxStatus::Pending);
    assert!(view.qr_url.contains(&view.id.to_string()));

    let job_id = h.pay(view.id, "n1").await.unwrap();

    let leased = h.queue.next(h.kiosk).await.unwrap().unwrap();
    assert_eq!(leased.id, job_id);
    assert_eq!(leased.coins, 20);

    let ack = h.report(job_id, true, None).await.unwrap();
    assert_eq!(ack, ReportAck::Success);

    let view = h.coordinator.describe(view.id).await.unwrap();
    assert_eq!(view.status, TxStatus::Completed);
    assert!(view.completed_at.is_some());

    let events = h.store.list_events(view.id).await.unwrap();
    let completed = events
        .iter()
        .filter(|event| event.kind == EventKind::Completed)
        .count();
    assert_eq!(completed, 1);
}

/// Payment after the authorization window fails and the transaction lands
/// in `expired`, with no job created.
#[tokio::test]
async fn payment_after_window_expires() {
    let h = Harness::new(Arc::new(AcceptAllVerifier)).await;
    let tx_id = h.create("5.00").await;

    h.clock.advance(Duration::from_secs(16 * 60));
    let err = h.pay(tx_id, "n1").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Expired);

    let view = h.coordinator.describe(tx_id).await.unwrap();
    assert_eq!(view.status, TxStatus::Expired);
    assert!(h
        .store
        .get_job_for_transaction(tx_id)
        .await
        .unwrap()
        .is_none());

    // Starting over works: the payer re-initiates at the attendant.
    let tx_id = h.create("5.00").await;
    assert!(h.pay(tx_id, "n1").await.is_ok());
}

/// A replayed payment resolves idempotently with exactly one job.
#[tokio::test]
async fn replayed_payment_is_idempotent() {
    let h = Harness::new(Arc::new(AcceptAllVerifier)).await;
    let tx_id = h.create("5.00").await;

    let job_id = h.pay(tx_id, "n1").await.unwrap();
    let err = h.pay(tx_id, "n1").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::AlreadyProcessed);

    let job = h
        .store
        .get_job_for_transaction(tx_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(job.id, job_id);
}

/// A transient hardware fault consumes one attempt, then the retry
/// succeeds.
#[tokio::test]
async fn transient_fault_then_success() {
    let h = Harness::new(Arc::new(AcceptAllVerifier)).await;
    let tx_id = h.create("5.00").await;
    let job_id = h.pay(tx_id, "n1").await.unwrap();

    h.queue.next(h.kiosk).await.unwrap().unwrap();
    let ack = h
        .report(job_id, false, Some("motor stalled"))
        .await
        .unwrap();
    assert_eq!(ack, ReportAck::Retry);

    // The failure is invisible to the payer: still authorized.
    let view = h.coordinator.describe(tx_id).await.unwrap();
    assert_eq!(view.status, TxStatus::Paid);

    let leased = h.queue.next(h.kiosk).await.unwrap().unwrap();
    assert_eq!(leased.id, job_id);
    assert_eq!(leased.attempts, 1);

    let ack = h.report(job_id, true, None).await.unwrap();
    assert_eq!(ack, ReportAck::Success);
    let view = h.coordinator.describe(tx_id).await.unwrap();
    assert_eq!(view.status, TxStatus::Completed);
}

/// Three consecutive faults exhaust the budget; the transaction fails
/// terminally and the job is never leased again.
#[tokio::test]
async fn terminal_hardware_failure() {
    let h = Harness::new(Arc::new(AcceptAllVerifier)).await;
    let tx_id = h.create("5.00").await;
    let job_id = h.pay(tx_id, "n1").await.unwrap();

    for round in 1..=3u32 {
        let leased = h.queue.next(h.kiosk).await.unwrap().unwrap();
        assert_eq!(leased.id, job_id);
        let ack = h
            .report(job_id, false, Some("coin jam"))
            .await
            .unwrap();
        if round < 3 {
            assert_eq!(ack, ReportAck::Retry);
        } else {
            assert_eq!(ack, ReportAck::Failed);
        }
    }

    let job = h
        .store
        .get_job_for_transaction(tx_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(job.attempts, 3);
    assert_eq!(
        h.coordinator.describe(tx_id).await.unwrap().status,
        TxStatus::Failed
    );
    assert!(h.queue.next(h.kiosk).await.unwrap().is_none());

    let events = h.store.list_events(tx_id).await.unwrap();
    assert!(events
        .iter()
        .any(|event| event.kind == EventKind::Failed));
}

/// A lost outcome report: the sweeper revives the lease and a restarted
/// agent (same kiosk id) leases the same job again.
#[tokio::test]
async fn stuck_lease_recovery() {
    let h = Harness::new(Arc::new(AcceptAllVerifier)).await;
    let tx_id = h.create("5.00").await;
    let job_id = h.pay(tx_id, "n1").await.unwrap();

    let leased = h.queue.next(h.kiosk).await.unwrap().unwrap();
    assert_eq!(leased.id, job_id);

    // The agent actuates, then crashes before reporting. Two minutes later
    // the sweeper counts the attempt and re-opens the job.
    h.clock.advance(Duration::from_secs(121));
    let revived = h
        .store
        .revive_stuck_leases(Duration::from_secs(120), h.clock.now())
        .await
        .unwrap();
    assert_eq!(revived, 1);

    let leased = h.queue.next(h.kiosk).await.unwrap().unwrap();
    assert_eq!(leased.id, job_id);
    assert_eq!(leased.attempts, 1);

    // This time the report lands.
    let ack = h.report(job_id, true, None).await.unwrap();
    assert_eq!(ack, ReportAck::Success);
}

/// A rejected proof must leave every row untouched.
#[tokio::test]
async fn rejected_verification_leaves_state_unchanged() {
    let h = Harness::new(Arc::new(RejectingVerifier)).await;
    let tx_id = h.create("5.00").await;

    let err = h.pay(tx_id, "n1").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::VerificationRejected);

    let view = h.coordinator.describe(tx_id).await.unwrap();
    assert_eq!(view.status, TxStatus::Pending);
    assert!(h
        .store
        .get_job_for_transaction(tx_id)
        .await
        .unwrap()
        .is_none());
}

/// Duplicate outcome reports after the first acknowledgement are no-ops.
#[tokio::test]
async fn duplicate_reports_are_noops() {
    let h = Harness::new(Arc::new(AcceptAllVerifier)).await;
    let tx_id = h.create("1.00").await;
    let job_id = h.pay(tx_id, "n1").await.unwrap();

    h.queue.next(h.kiosk).await.unwrap().unwrap();
    assert_eq!(h.report(job_id, true, None).await.unwrap(), ReportAck::Success);
    // The agent's report retry loop may deliver the same outcome again.
    assert_eq!(h.report(job_id, true, None).await.unwrap(), ReportAck::Success);
    // Even a contradictory late report does not disturb the terminal state.
    assert_eq!(
        h.report(job_id, false, Some("late fault")).await.unwrap(),
        ReportAck::Success
    );
    let view = h.coordinator.describe(tx_id).await.unwrap();
    assert_eq!(view.status, TxStatus::Completed);
}
