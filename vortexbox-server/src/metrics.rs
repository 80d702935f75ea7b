//! Simple metrics collection for observability
//!
//! Lightweight atomic counters, exported in Prometheus text format on
//! `GET /metrics`. Nothing here allocates on the request path.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Core metrics collected by the server
pub struct Metrics {
    /// Server start time
    start_time: Instant,

    /// Requests that went through admission control
    pub total_requests: AtomicU64,

    /// Admission decisions
    pub requests_allowed: AtomicU64,
    pub requests_denied: AtomicU64,

    /// Store failures seen by admission control
    pub store_errors: AtomicU64,
    pub fail_open_admissions: AtomicU64,
    pub fail_closed_rejections: AtomicU64,

    /// Upload outcomes
    pub uploads_accepted: AtomicU64,
    pub uploads_rejected: AtomicU64,
    pub upload_bytes: AtomicU64,

    /// Account activity
    pub registrations: AtomicU64,
    pub logins: AtomicU64,
    pub failed_logins: AtomicU64,
}

/// Outcome of one admission check, for metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionOutcome {
    Allowed,
    Denied,
    FailOpen,
    FailClosed,
}

impl Metrics {
    /// Create a new metrics instance
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            total_requests: AtomicU64::new(0),
            requests_allowed: AtomicU64::new(0),
            requests_denied: AtomicU64::new(0),
            store_errors: AtomicU64::new(0),
            fail_open_admissions: AtomicU64::new(0),
            fail_closed_rejections: AtomicU64::new(0),
            uploads_accepted: AtomicU64::new(0),
            uploads_rejected: AtomicU64::new(0),
            upload_bytes: AtomicU64::new(0),
            registrations: AtomicU64::new(0),
            logins: AtomicU64::new(0),
            failed_logins: AtomicU64::new(0),
        }
    }

    /// Record one admission check
    pub fn record_admission(&self, outcome: AdmissionOutcome) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);

        match outcome {
            AdmissionOutcome::Allowed => {
                self.requests_allowed.fetch_add(1, Ordering::Relaxed);
            }
            AdmissionOutcome::Denied => {
                self.requests_denied.fetch_add(1, Ordering::Relaxed);
            }
            AdmissionOutcome::FailOpen => {
                self.store_errors.fetch_add(1, Ordering::Relaxed);
                self.fail_open_admissions.fetch_add(1, Ordering::Relaxed);
                self.requests_allowed.fetch_add(1, Ordering::Relaxed);
            }
            AdmissionOutcome::FailClosed => {
                self.store_errors.fetch_add(1, Ordering::Relaxed);
                self.fail_closed_rejections.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Record a stored upload
    pub fn record_upload(&self, bytes: u64) {
        self.uploads_accepted.fetch_add(1, Ordering::Relaxed);
        self.upload_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Record a rejected upload
    pub fn record_upload_rejected(&self) {
        self.uploads_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_registration(&self) {
        self.registrations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_login(&self, success: bool) {
        if success {
            self.logins.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_logins.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Export metrics in Prometheus text format
    pub fn export_prometheus(&self) -> String {
        let mut output = String::with_capacity(2048);

        write_metric(
            &mut output,
            "uptime_seconds",
            "gauge",
            "Time since server start in seconds",
            self.uptime_seconds(),
        );

        let counters: [(&str, &str, &AtomicU64); 12] = [
            (
                "requests_total",
                "Total number of requests checked by admission control",
                &self.total_requests,
            ),
            (
                "requests_allowed",
                "Total requests admitted",
                &self.requests_allowed,
            ),
            (
                "requests_denied",
                "Total requests rejected with 429",
                &self.requests_denied,
            ),
            (
                "store_errors",
                "Total admission checks that could not reach the store",
                &self.store_errors,
            ),
            (
                "fail_open_admissions",
                "Requests admitted because the store was unavailable",
                &self.fail_open_admissions,
            ),
            (
                "fail_closed_rejections",
                "Requests rejected with 503 because the store was unavailable",
                &self.fail_closed_rejections,
            ),
            (
                "uploads_accepted",
                "Total uploads stored",
                &self.uploads_accepted,
            ),
            (
                "uploads_rejected",
                "Total uploads rejected",
                &self.uploads_rejected,
            ),
            (
                "upload_bytes",
                "Total bytes of stored uploads",
                &self.upload_bytes,
            ),
            (
                "registrations",
                "Total accounts registered",
                &self.registrations,
            ),
            ("logins", "Total successful logins", &self.logins),
            (
                "failed_logins",
                "Total logins rejected for bad credentials",
                &self.failed_logins,
            ),
        ];

        for (name, help, value) in counters {
            write_metric(
                &mut output,
                name,
                "counter",
                help,
                value.load(Ordering::Relaxed),
            );
        }

        output
    }
}

fn write_metric(output: &mut String, name: &str, kind: &str, help: &str, value: u64) {
    // Writing to a String cannot fail
    let _ = writeln!(output, "# HELP vortexbox_{name} {help}");
    let _ = writeln!(output, "# TYPE vortexbox_{name} {kind}");
    let _ = writeln!(output, "vortexbox_{name} {value}\n");
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
