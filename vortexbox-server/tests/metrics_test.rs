use std::sync::Arc;
use vortexbox_server::metrics::{AdmissionOutcome, Metrics};

#[test]
fn test_prometheus_export() {
    let metrics = Arc::new(Metrics::new());

    metrics.record_admission(AdmissionOutcome::Allowed);
    metrics.record_admission(AdmissionOutcome::Allowed);
    metrics.record_admission(AdmissionOutcome::Denied);
    metrics.record_upload(1500);
    metrics.record_upload(500);
    metrics.record_upload_rejected();
    metrics.record_registration();
    metrics.record_login(true);
    metrics.record_login(false);

    let prometheus = metrics.export_prometheus();

    assert!(prometheus.contains("# TYPE vortexbox_uptime_seconds gauge"));
    assert!(prometheus.contains("vortexbox_requests_total 3\n"));
    assert!(prometheus.contains("vortexbox_requests_allowed 2\n"));
    assert!(prometheus.contains("vortexbox_requests_denied 1\n"));
    assert!(prometheus.contains("vortexbox_uploads_accepted 2\n"));
    assert!(prometheus.contains("vortexbox_uploads_rejected 1\n"));
    assert!(prometheus.contains("vortexbox_upload_bytes 2000\n"));
    assert!(prometheus.contains("vortexbox_logins 1\n"));
    assert!(prometheus.contains("vortexbox_failed_logins 1\n"));
}

#[test]
fn test_store_outage_accounting() {
    let metrics = Metrics::new();

    // Fail-open still counts as an admission
    metrics.record_admission(AdmissionOutcome::FailOpen);
    metrics.record_admission(AdmissionOutcome::FailClosed);

    let prometheus = metrics.export_prometheus();
    assert!(prometheus.contains("vortexbox_store_errors 2\n"));
    assert!(prometheus.contains("vortexbox_fail_open_admissions 1\n"));
    assert!(prometheus.contains("vortexbox_fail_closed_rejections 1\n"));
    assert!(prometheus.contains("vortexbox_requests_allowed 1\n"));
    assert!(prometheus.contains("vortexbox_requests_denied 0\n"));
}

#[test]
fn test_concurrent_recording() {
    let metrics = Arc::new(Metrics::new());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let metrics = metrics.clone();
            std::thread::spawn(move || {
                for _ in 0..1000 {
                    metrics.record_admission(AdmissionOutcome::Allowed);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert!(metrics.export_prometheus().contains("vortexbox_requests_allowed 8000\n"));
}
