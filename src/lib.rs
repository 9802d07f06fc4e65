//! Library exports for campus-session, shared between the binary and tests.

pub mod client;
pub mod config;
pub mod models;
pub mod session;
pub mod startup;
pub mod utils;
