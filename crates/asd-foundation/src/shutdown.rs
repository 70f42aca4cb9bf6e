use tokio::sync::watch;

/// Cooperative shutdown signal shared across the capture/tracker/pool tasks.
/// The engine's frame loop checks `is_shutting_down()` between frames rather
/// than being forcibly aborted mid-frame, so in-flight inferences and pool
/// bookkeeping always finish a consistent step.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
    rx: watch::Receiver<bool>,
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownHandle {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx, rx }
    }

    pub fn request_shutdown(&self) {
        tracing::info!("shutdown requested");
        let _ = self.tx.send(true);
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.rx.borrow()
    }

    pub async fn wait_for_shutdown(&mut self) {
        let _ = self.rx.wait_for(|v| *v).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn request_shutdown_wakes_waiter() {
        let mut handle = ShutdownHandle::new();
        assert!(!handle.is_shutting_down());
        let waiter = handle.clone();
        let task = tokio::spawn(async move {
            let mut waiter = waiter;
            waiter.wait_for_shutdown().await;
        });
        handle.request_shutdown();
        task.await.unwrap();
        assert!(handle.is_shutting_down());
    }
}
