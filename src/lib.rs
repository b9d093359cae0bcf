//! Relay chat completions upstream and publish each answer as a rendered PNG.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
