#[cfg(test)]
mod tests {
    use crate::actor::CounterActor;
    use crate::error::StoreError;
    use crate::store::CounterStore;
    use std::time::{Duration, SystemTime};
    use vortexbox_limiter::{PeriodicStore, Quota};

    fn spawn() -> crate::actor::CounterHandle {
        let store = PeriodicStore::builder()
            .capacity(1000)
            .cleanup_interval(Duration::from_secs(60))
            .build();
        CounterActor::spawn(100, store)
    }

    #[tokio::test]
    async fn test_basic_counting() {
        let handle = spawn();
        let now = SystemTime::now();
        let period = Duration::from_secs(60);

        let first = handle.increment("test", period, now).await.unwrap();
        assert_eq!(first.count, 1);
        assert_eq!(first.ttl, period);

        let second = handle
            .increment("test", period, now + Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(second.count, 2);
        assert_eq!(second.ttl, Duration::from_secs(59));
    }

    #[tokio::test]
    async fn test_unrepresentable_period_keeps_actor_alive() {
        let handle = spawn();
        let now = SystemTime::now();

        let result = handle.increment("far", Duration::MAX, now).await;
        assert!(matches!(result, Err(StoreError::Protocol(_))));

        // The same actor still answers afterwards
        let period = Duration::from_secs(60);
        assert_eq!(handle.increment("far", period, now).await.unwrap().count, 1);
        assert_eq!(handle.increment("far", period, now).await.unwrap().count, 2);
    }

    #[tokio::test]
    async fn test_concurrent_requests() {
        let handle = spawn();
        let quota = Quota::new(10, Duration::from_secs(60)).unwrap();
        let now = SystemTime::now();

        // Send multiple concurrent requests
        let mut handles = vec![];
        for _ in 0..20 {
            let h = handle.clone();
            handles.push(tokio::spawn(async move {
                h.increment("concurrent_test", quota.period(), now).await
            }));
        }

        // Collect results
        let mut allowed_count = 0;
        for h in handles {
            let state = h.await.unwrap().unwrap();
            if quota.decide(state).is_allowed() {
                allowed_count += 1;
            }
        }

        // Exactly the limit gets through
        assert_eq!(allowed_count, 10);
    }

    #[tokio::test]
    async fn test_window_reopens_after_period() {
        let handle = spawn();
        let period = Duration::from_secs(60);
        let t0 = SystemTime::now();

        for _ in 0..3 {
            handle.increment("client", period, t0).await.unwrap();
        }

        let state = handle
            .increment("client", period, t0 + Duration::from_secs(61))
            .await
            .unwrap();
        assert_eq!(state.count, 1);
    }
}
