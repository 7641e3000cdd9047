//! AssignHub Backend Library
//!
//! Exposes every module so the binary and the integration tests build the same
//! router from the same pieces.

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod storage;

pub use api::{build_router, AppState};
pub use config::Config;
