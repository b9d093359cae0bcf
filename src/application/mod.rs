//! Application services layer: the relay pipeline and its adapter seams.

pub mod capture;
pub mod credential;
pub mod document;
pub mod error;
pub mod ports;
pub mod relay;
