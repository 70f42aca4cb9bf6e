use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Black-box ASD CNN: takes the flattened clip tensor, returns
/// `framesPerUpdate` float logits.
#[async_trait]
pub trait AsdModel: Send + Sync {
    async fn predict(&self, input: Vec<f32>) -> Vec<f32>;
}

/// Bounded-concurrency actor over N pre-loaded model handles. `tokio::sync::Semaphore`
/// wakes waiters in FIFO order, which is what gives `run_inference` its
/// borrow/reclaim fairness guarantee.
pub struct ModelPool {
    models: Vec<Arc<dyn AsdModel>>,
    semaphore: Arc<Semaphore>,
    round_robin: AtomicUsize,
}

impl ModelPool {
    pub fn new(models: Vec<Arc<dyn AsdModel>>) -> Self {
        let n = models.len();
        Self {
            models,
            semaphore: Arc::new(Semaphore::new(n)),
            round_robin: AtomicUsize::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.models.len()
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Borrows a handle (suspending until one frees), runs the model, and
    /// reclaims it. At most `capacity()` of these can be in flight at once.
    pub async fn run_inference(&self, input: Vec<f32>) -> Vec<f32> {
        let _permit = self.semaphore.acquire().await.expect("semaphore never closed");
        let idx = self.round_robin.fetch_add(1, Ordering::Relaxed) % self.models.len();
        let model = self.models[idx].clone();
        model.predict(input).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    struct CountingModel {
        in_flight: Arc<AtomicU32>,
        max_seen: Arc<AtomicU32>,
    }

    #[async_trait]
    impl AsdModel for CountingModel {
        async fn predict(&self, _input: Vec<f32>) -> Vec<f32> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_seen.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            vec![0.0; 5]
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_predictions_never_exceed_capacity() {
        let in_flight = Arc::new(AtomicU32::new(0));
        let max_seen = Arc::new(AtomicU32::new(0));
        let models: Vec<Arc<dyn AsdModel>> = (0..2)
            .map(|_| {
                Arc::new(CountingModel {
                    in_flight: in_flight.clone(),
                    max_seen: max_seen.clone(),
                }) as Arc<dyn AsdModel>
            })
            .collect();
        let pool = Arc::new(ModelPool::new(models));

        let mut handles = Vec::new();
        for _ in 0..6 {
            let pool = pool.clone();
            handles.push(tokio::spawn(async move {
                pool.run_inference(vec![0.0; 4]).await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert!(max_seen.load(Ordering::SeqCst) <= 2);
    }
}
