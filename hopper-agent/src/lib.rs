//! The dispenser-node agent. Stateless except for one persisted kiosk id:
//! it treats itself as a cache of the coordinator and rebuilds everything
//! else by polling.

/// The poll → actuate → report loop.
pub mod agent;
/// REST client for the coordinator's dispenser API.
pub mod client;
/// CLI args.
pub mod config;
/// The coin hopper driver seam.
pub mod hopper;
/// The persisted kiosk identity.
pub mod identity;
/// Top-level wiring.
pub mod run;
