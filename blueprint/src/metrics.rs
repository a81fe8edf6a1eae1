//! Metrics declaration and initialization.
//!
//! Enabled with the `metrics` feature. Names are registered with their
//! description on first use.

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
lazy_static! {
    // Resolution metrics

    /// Track number of URL resolutions answered by an existing record.
    pub static ref CACHE_HIT_COUNTER: &'static str = {
        metrics::describe_counter!(
            "blueprint_cache_hit_total",
            "Total number of resolutions answered by an existing record."
        );
        "blueprint_cache_hit_total"
    };
    /// Track number of resolutions that created a record.
    pub static ref CACHE_MISS_COUNTER: &'static str = {
        metrics::describe_counter!(
            "blueprint_cache_miss_total",
            "Total number of resolutions that created a new record."
        );
        "blueprint_cache_miss_total"
    };
    /// Track number of URL resolutions refused by the download policy.
    pub static ref CACHE_DENIED_COUNTER: &'static str = {
        metrics::describe_counter!(
            "blueprint_cache_denied_total",
            "Total number of URL resolutions refused by the download policy."
        );
        "blueprint_cache_denied_total"
    };

    // Load metrics

    /// Track number of load outcomes, labelled by `outcome`.
    pub static ref LOADS_FINISHED: &'static str = {
        metrics::describe_counter!(
            "blueprint_loads_finished_total",
            "Total number of finished payload loads by outcome."
        );
        "blueprint_loads_finished_total"
    };
    /// Gauge of currently running URL loads.
    pub static ref LOADS_ACTIVE: &'static str = {
        metrics::describe_gauge!(
            "blueprint_loads_active",
            "Number of URL loads currently in flight."
        );
        "blueprint_loads_active"
    };
    /// Histogram of URL load duration.
    pub static ref LOAD_DURATION: &'static str = {
        metrics::describe_histogram!(
            "blueprint_load_duration_seconds",
            metrics::Unit::Seconds,
            "Duration of URL loads in seconds."
        );
        "blueprint_load_duration_seconds"
    };

    // Cleanup metrics

    /// Track number of URL records evicted by the cleanup worker.
    pub static ref SWEEP_EVICTED: &'static str = {
        metrics::describe_counter!(
            "blueprint_sweep_evicted_total",
            "Total number of expired URL records evicted by the cleanup worker."
        );
        "blueprint_sweep_evicted_total"
    };
    /// Track number of sweeps that panicked.
    pub static ref SWEEP_FAULTS: &'static str = {
        metrics::describe_counter!(
            "blueprint_sweep_faults_total",
            "Total number of cleanup sweeps that panicked."
        );
        "blueprint_sweep_faults_total"
    };
}
