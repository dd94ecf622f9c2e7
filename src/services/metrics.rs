use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge, Histogram,
    IntCounter, IntCounterVec, IntGauge,
};

lazy_static! {
    // ── Provisioning ────────────────────────────────────────────────────────
    pub static ref PROVISION_ATTEMPTS: IntCounterVec = register_int_counter_vec!(
        "tenant_provision_attempts_total",
        "Tenant database provisioning attempts by outcome",
        &["outcome"]
    ).unwrap();

    pub static ref PROVISION_DURATION: Histogram = register_histogram!(
        "tenant_provision_duration_seconds",
        "Time spent creating a tenant database, its pool and bootstrap schema",
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    ).unwrap();

    // ── Cache ───────────────────────────────────────────────────────────────
    pub static ref CACHE_HITS: IntCounter = register_int_counter!(
        "tenant_cache_hits_total",
        "Requests served from an already provisioned tenant handle"
    ).unwrap();

    pub static ref CACHED_TENANTS: IntGauge = register_int_gauge!(
        "tenant_cache_ready_handles",
        "Tenant database handles currently cached"
    ).unwrap();
}
