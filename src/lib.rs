//! Allure TestOps adapter library.
//!
//! Re-exports the modules used by the binary and by integration tests in `tests/`.

pub mod api;
pub mod config;
pub mod errors;
pub mod models;
pub mod selector;
pub mod service;
pub mod upstream;

/// Shared application state passed to handlers.
pub struct AppState {
    pub config: config::Config,
    pub reports: service::ReportService,
}
