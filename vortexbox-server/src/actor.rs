//! In-process counter backend
//!
//! One task owns the window table; every increment is a message to it, so
//! concurrent requests are applied strictly one after another without locks.
//! A failed increment is answered with an error and the task keeps serving.

use crate::error::StoreError;
use crate::store::CounterStore;
use async_trait::async_trait;
use std::time::{Duration, SystemTime};
use tokio::sync::{mpsc, oneshot};
use vortexbox_limiter::{FixedWindowLimiter, LimitError, PeriodicStore, WindowState};

/// Message types for the counter actor
pub enum CounterMessage {
    Increment {
        key: String,
        period: Duration,
        now: SystemTime,
        response_tx: oneshot::Sender<Result<WindowState, LimitError>>,
    },
}

/// Handle to communicate with the counter actor
#[derive(Clone)]
pub struct CounterHandle {
    tx: mpsc::Sender<CounterMessage>,
}

#[async_trait]
impl CounterStore for CounterHandle {
    async fn increment(
        &self,
        key: &str,
        period: Duration,
        now: SystemTime,
    ) -> Result<WindowState, StoreError> {
        let (response_tx, response_rx) = oneshot::channel();

        self.tx
            .send(CounterMessage::Increment {
                key: key.to_string(),
                period,
                now,
                response_tx,
            })
            .await
            .map_err(|_| StoreError::Unavailable("counter actor has stopped".to_string()))?;

        response_rx
            .await
            .map_err(|_| StoreError::Unavailable("counter actor has stopped".to_string()))?
            .map_err(|e| StoreError::Protocol(e.to_string()))
    }
}

/// The counter actor
pub struct CounterActor;

impl CounterActor {
    /// Spawn a new counter actor over a periodic store
    pub fn spawn(buffer_size: usize, store: PeriodicStore) -> CounterHandle {
        let (tx, rx) = mpsc::channel(buffer_size);

        let actor = tokio::spawn(run_actor(rx, FixedWindowLimiter::new(store)));
        tokio::spawn(async move {
            if let Err(e) = actor.await {
                if e.is_panic() {
                    tracing::error!(
                        "Counter actor panicked, in-memory rate limiting is offline: {}",
                        e
                    );
                }
            }
        });

        CounterHandle { tx }
    }
}

async fn run_actor(
    mut rx: mpsc::Receiver<CounterMessage>,
    mut limiter: FixedWindowLimiter<PeriodicStore>,
) {
    while let Some(msg) = rx.recv().await {
        match msg {
            CounterMessage::Increment {
                key,
                period,
                now,
                response_tx,
            } => {
                let result = limiter.count(&key, period, now);
                if let Err(e) = &result {
                    tracing::warn!("Increment for {} failed: {}", key, e);
                }
                // Ignore send errors - receiver may have timed out
                let _ = response_tx.send(result);
            }
        }
    }

    tracing::info!("Counter actor shutting down");
}
