//! Procura Kernel Library
//!
//! Record-management backend built around one generic retrieval engine.
//! The main entry point for running the server is the `procura` binary.

pub mod category;
pub mod config;
pub mod db;
pub mod entity;
pub mod error;
pub mod query;
pub mod record;
pub mod routes;
pub mod sequence;
pub mod state;
pub mod store;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use state::AppState;
