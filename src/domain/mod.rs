//! Domain layer types and invariants.

pub mod artifact;
pub mod fingerprint;
pub mod request;
