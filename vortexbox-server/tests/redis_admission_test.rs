//! Admission against a live Redis
//!
//! Run with a disposable instance:
//!
//! ```bash
//! VORTEXBOX_TEST_REDIS_URL=redis://127.0.0.1:6379/ cargo test -- --ignored
//! ```

use std::sync::Arc;
use std::time::{Duration, SystemTime};
use vortexbox_server::admission::{Admission, AdmissionController};
use vortexbox_server::config::FailurePolicy;
use vortexbox_server::metrics::Metrics;
use vortexbox_server::store::AccountStore;
use vortexbox_server::store::redis_store::RedisBackend;
use vortexbox_server::types::{ClientIdentity, Quota};

fn redis_url() -> String {
    std::env::var("VORTEXBOX_TEST_REDIS_URL")
        .unwrap_or_else(|_| "redis://127.0.0.1:6379/".to_string())
}

/// A key prefix no other run shares
fn unique_prefix() -> String {
    format!("vortexbox-test-{}", uuid::Uuid::new_v4())
}

fn controller(
    backend: Arc<RedisBackend>,
    prefix: &str,
    limit: u64,
    period: Duration,
) -> AdmissionController {
    AdmissionController::new(
        backend,
        Quota::new(limit, period).unwrap(),
        FailurePolicy::Closed,
        prefix,
        Arc::new(Metrics::new()),
    )
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_two_processes_share_one_window() {
    let prefix = unique_prefix();
    let url = redis_url();

    // Separate backends stand in for separate server processes
    let a = controller(
        Arc::new(RedisBackend::new(&url, &prefix, Duration::from_secs(1)).unwrap()),
        &prefix,
        10,
        Duration::from_secs(60),
    );
    let b = controller(
        Arc::new(RedisBackend::new(&url, &prefix, Duration::from_secs(1)).unwrap()),
        &prefix,
        10,
        Duration::from_secs(60),
    );
    let (a, b) = (Arc::new(a), Arc::new(b));

    let client = ClientIdentity::from_ip("198.51.100.4".parse().unwrap());
    let mut tasks = Vec::new();
    for i in 0..30 {
        let controller = if i % 2 == 0 { a.clone() } else { b.clone() };
        let client = client.clone();
        tasks.push(tokio::spawn(async move {
            controller.admit(&client, SystemTime::now()).await
        }));
    }

    let mut allowed = 0;
    for task in tasks {
        match task.await.unwrap() {
            Admission::Allow { .. } => allowed += 1,
            Admission::Deny { retry_after } => assert!(retry_after <= Duration::from_secs(60)),
            Admission::Unavailable(e) => panic!("store unavailable: {e}"),
        }
    }
    assert_eq!(allowed, 10);
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_window_expires_in_redis() {
    let prefix = unique_prefix();
    let backend =
        Arc::new(RedisBackend::new(&redis_url(), &prefix, Duration::from_secs(1)).unwrap());
    let controller = controller(backend, &prefix, 1, Duration::from_millis(300));
    let client = ClientIdentity::from_ip("198.51.100.5".parse().unwrap());

    assert!(matches!(
        controller.admit(&client, SystemTime::now()).await,
        Admission::Allow { .. }
    ));
    assert!(matches!(
        controller.admit(&client, SystemTime::now()).await,
        Admission::Deny { .. }
    ));

    tokio::time::sleep(Duration::from_millis(400)).await;

    assert!(matches!(
        controller.admit(&client, SystemTime::now()).await,
        Admission::Allow { .. }
    ));
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_sessions_in_redis() {
    let prefix = unique_prefix();
    let backend = RedisBackend::new(&redis_url(), &prefix, Duration::from_secs(1)).unwrap();

    assert!(backend.create_account("dev01", "hash").await.unwrap());
    assert!(!backend.create_account("dev01", "other").await.unwrap());
    assert_eq!(
        backend.password_hash("dev01").await.unwrap().as_deref(),
        Some("hash")
    );

    backend
        .replace_session("dev01", "first", Duration::from_secs(60))
        .await
        .unwrap();
    backend
        .replace_session("dev01", "second", Duration::from_secs(60))
        .await
        .unwrap();

    assert_eq!(backend.session_login("first").await.unwrap(), None);
    assert_eq!(
        backend.session_login("second").await.unwrap().as_deref(),
        Some("dev01")
    );
}

#[tokio::test]
async fn test_unreachable_redis_fails_closed() {
    // Nothing listens on port 1
    let backend = Arc::new(
        RedisBackend::new(
            "redis://127.0.0.1:1/",
            "vortexbox-test",
            Duration::from_millis(200),
        )
        .unwrap(),
    );
    let controller = controller(backend, "vortexbox-test", 5, Duration::from_secs(60));
    let client = ClientIdentity::from_ip("198.51.100.6".parse().unwrap());

    assert!(matches!(
        controller.admit(&client, SystemTime::now()).await,
        Admission::Unavailable(_)
    ));
}
