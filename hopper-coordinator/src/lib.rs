//! The hopper coordinator: owns the durable transaction + dispense-job state
//! and exposes the HTTP API consumed by attendant displays, payer clients,
//! and dispenser-node agents.
//!
//! The interesting part lives in [`store`] (the single durable ground truth)
//! and [`queue`] (the at-most-one-in-flight-per-kiosk leasing policy); the
//! rest is thin glue the way the `/transaction/*` handlers in [`server`]
//! are thin glue.

/// CLI args and validated runtime configuration.
pub mod config;
/// The explicit context object wired through the process.
pub mod context;
/// `TxCoordinator`: transaction creation, payment, public views.
pub mod coordinator;
/// Periodic expiry marking and stuck-lease recovery.
pub mod janitor;
/// `JobQueue`: pull-based job delivery and retry accounting.
pub mod queue;
/// Top-level wiring: store, janitor, HTTP server, graceful shutdown.
pub mod run;
/// The HTTP edge.
pub mod server;
/// Durable typed accessors over transactions, jobs, kiosks, events.
pub mod store;
/// The opaque identity/payment proof verifier.
pub mod verifier;
