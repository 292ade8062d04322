//! The explicit context object wired through the process at startup.
//!
//! There are no process-wide singletons: handlers and background tasks reach
//! the store, verifier, clock, and RNG only through a [`Context`] handle.

use std::sync::{Arc, Mutex};

use hopper_common::{
    ids::{JobId, TransactionId},
    rng::Crng,
    time::{Clock, TimestampMs},
};

use crate::{config::Config, store::Store, verifier::ProofVerifier};

#[derive(Clone)]
pub struct Context {
    pub store: Store,
    pub verifier: Arc<dyn ProofVerifier>,
    pub clock: Arc<dyn Clock>,
    pub rng: Arc<Mutex<dyn Crng + Send>>,
    pub config: Arc<Config>,
}

impl Context {
    pub fn new(
        store: Store,
        verifier: Arc<dyn ProofVerifier>,
        clock: Arc<dyn Clock>,
        rng: Arc<Mutex<dyn Crng + Send>>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            store,
            verifier,
            clock,
            rng,
            config,
        }
    }

    #[inline]
    pub fn now(&self) -> TimestampMs {
        self.clock.now()
    }

    pub fn gen_transaction_id(&self) -> TransactionId {
        let mut rng = self.rng.lock().unwrap();
        TransactionId::generate(&mut *rng)
    }

    pub fn gen_job_id(&self) -> JobId {
        let mut rng = self.rng.lock().unwrap();
        JobId::generate(&mut *rng)
    }
}
