//! Prometheus metrics registry and instruments.
//!
//! This module is framework-agnostic and can be used from any layer.

use lazy_static::lazy_static;
use prometheus::{IntCounterVec, Opts, Registry};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Request gate
    pub static ref GATE_DECISIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("authgate_gate_decisions_total", "Total number of request gate decisions"),
        &["decision"]
    ).expect("metric can be created");

    // Sign-in flow
    pub static ref SIGN_INS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("authgate_sign_ins_total", "Total number of sign-in attempts"),
        &["provider", "outcome"]
    ).expect("metric can be created");

    // Error Metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("authgate_errors_total", "Total number of error responses"),
        &["error_type"]
    ).expect("metric can be created");
}

/// Initialize metrics registry.
///
/// Call once at startup; registering twice panics.
pub fn init_metrics() {
    REGISTRY
        .register(Box::new(GATE_DECISIONS_TOTAL.clone()))
        .expect("GATE_DECISIONS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(SIGN_INS_TOTAL.clone()))
        .expect("SIGN_INS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(ERRORS_TOTAL.clone()))
        .expect("ERRORS_TOTAL can be registered");

    tracing::info!("Metrics registry initialized");
}
