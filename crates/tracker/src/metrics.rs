//! Prometheus metrics for the batch tracker.
//!
//! Everything is registered in [`REGISTRY`] rather than the process-wide
//! default registry so embedders can decide how (and whether) to expose it.

use lazy_static::lazy_static;
use prometheus::{
    register_int_counter_vec_with_registry, register_int_counter_with_registry,
    register_int_gauge_with_registry, Encoder, Error, IntCounter, IntCounterVec, IntGauge,
    Registry, TextEncoder,
};

lazy_static! {
    /// Registry for all tracker metrics
    pub static ref REGISTRY: Registry = Registry::new();

    /// Counter for batch status transitions
    /// Labels: status=[pending|committed|invalid]
    pub static ref BATCH_TRANSITIONS_TOTAL: IntCounterVec = register_int_counter_vec_with_registry!(
        "batchtrack_batch_transitions_total",
        "Total number of batch status transitions",
        &["status"],
        REGISTRY
    )
    .unwrap();

    /// Counter for rejections that matched no pending batch
    pub static ref STALE_REJECTIONS_TOTAL: IntCounter = register_int_counter_with_registry!(
        "batchtrack_stale_rejections_total",
        "Transaction rejections ignored because no pending batch contained the transaction",
        REGISTRY
    )
    .unwrap();

    /// Counter for admissions ignored because the batch already left pending
    pub static ref IGNORED_ADMISSIONS_TOTAL: IntCounter = register_int_counter_with_registry!(
        "batchtrack_ignored_admissions_total",
        "Batch admissions ignored because the batch was already committed or invalid",
        REGISTRY
    )
    .unwrap();

    /// Counter for watch outcomes
    /// Labels: outcome=[immediate|registered|resolved]
    pub static ref WATCHES_TOTAL: IntCounterVec = register_int_counter_vec_with_registry!(
        "batchtrack_watches_total",
        "Total number of watch registrations by outcome",
        &["outcome"],
        REGISTRY
    )
    .unwrap();

    /// Gauge tracking the number of pending batches
    pub static ref PENDING_BATCHES: IntGauge = register_int_gauge_with_registry!(
        "batchtrack_pending_batches",
        "Number of batches currently pending",
        REGISTRY
    )
    .unwrap();

    /// Gauge tracking the number of registered watchers
    pub static ref ACTIVE_WATCHERS: IntGauge = register_int_gauge_with_registry!(
        "batchtrack_active_watchers",
        "Number of watchers waiting on pending batches",
        REGISTRY
    )
    .unwrap();
}

/// Renders every tracker metric in the Prometheus text format.
pub fn encode_text() -> Result<String, Error> {
    let mut buf = Vec::new();
    TextEncoder::new().encode(&REGISTRY.gather(), &mut buf)?;
    String::from_utf8(buf).map_err(|e| Error::Msg(e.to_string()))
}
