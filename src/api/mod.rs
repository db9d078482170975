//! API layer
//!
//! HTTP handlers for:
//! - Current user and tenancy API
//! - HTML pages
//! - Metrics (Prometheus)

mod companies;
mod dto;
mod me;
pub mod metrics;
mod pages;

pub use dto::*;

pub use companies::companies_router;
pub use me::me_router;
pub use metrics::metrics_router;
pub use pages::pages_router;
