//! Core metrics definitions.
//!
//! All metrics follow Prometheus naming conventions:
//! - `_total` suffix for counters
//! - `_seconds` suffix for histograms measuring duration
//!
//! Nothing is exported unless the embedding program installs a recorder.

use metrics::{counter, describe_counter, describe_histogram, histogram};

/// Register all core metrics with descriptions.
pub fn register_core_metrics() {
    describe_counter!("klar_scans_total", "Total number of image scans started");
    describe_counter!(
        "klar_scan_failures_total",
        "Total number of scans aborted by a fatal error (by stage)"
    );
    describe_counter!(
        "klar_scans_degraded_total",
        "Total number of scans completed without analysis results"
    );
    describe_histogram!("klar_scan_duration_seconds", "Scan duration (by outcome)");
    describe_counter!(
        "klar_vulnerabilities_total",
        "Total vulnerabilities reported (by severity)"
    );
}

pub fn record_scan_started() {
    counter!("klar_scans_total").increment(1);
}

pub fn record_stage_failure(stage: &str) {
    counter!("klar_scan_failures_total", "stage" => stage.to_string()).increment(1);
}

pub fn record_scan_finished(duration_secs: f64, degraded: bool) {
    let outcome = if degraded { "degraded" } else { "complete" };
    if degraded {
        counter!("klar_scans_degraded_total").increment(1);
    }
    histogram!("klar_scan_duration_seconds", "outcome" => outcome).record(duration_secs);
}

pub fn record_vulnerabilities(severity: &str, count: u64) {
    counter!("klar_vulnerabilities_total", "severity" => severity.to_string()).increment(count);
}
