//! Wire types, error kinds, and API definitions shared by the hopper
//! coordinator (server side) and the dispenser-node agent (client side).

// Deny suspicious match names that are probably non-existent variants.
#![deny(non_snake_case)]

/// API definitions: which endpoints exist, and with which types.
pub mod def;
/// Serializable api error types and error kinds.
pub mod error;
/// Request / response models.
pub mod models;
