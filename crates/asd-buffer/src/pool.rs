use crate::asd_buffer::{AsdBuffer, AsdRequest, LogitData};
use crate::model_pool::ModelPool;
use crate::scheduler::Scheduler;
use asd_foundation::{AsdError, BufferError, PoolConfig};
use asd_telemetry::PipelineMetrics;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{error, warn};
use uuid::Uuid;

/// Reservation queue, frame advance, scheduling, and inference dispatch
/// for the fixed set of clip buffers. All mutation of `available`,
/// `active`, `reservations`, and the scheduler happens under `inner`'s
/// lock; inference itself is dispatched outside the lock.
pub struct AsdBufferPool {
    inner: Mutex<PoolInner>,
    model_pool: Arc<ModelPool>,
    metrics: PipelineMetrics,
    framerate: u32,
}

struct PoolInner {
    buffers: HashMap<Uuid, AsdBuffer>,
    available: Vec<Uuid>,
    active: HashMap<Uuid, Uuid>,
    reservations: VecDeque<Uuid>,
    scheduler: Scheduler,
    frame_index: u64,
    last_timestamp: Option<f64>,
}

impl AsdBufferPool {
    pub fn new(
        pool_config: &PoolConfig,
        video_length: usize,
        frame_width: usize,
        frame_height: usize,
        min_frames: u32,
        min_segment_gap: usize,
        framerate: u32,
        model_pool: Arc<ModelPool>,
        metrics: PipelineMetrics,
    ) -> Result<Self, AsdError> {
        if pool_config.num_video_buffers == 0 {
            return Err(BufferError::InvalidVideoBufferAmount(pool_config.num_video_buffers).into());
        }
        if pool_config.num_asd_models == 0 {
            return Err(BufferError::InvalidAsdModelAmount(pool_config.num_asd_models).into());
        }

        let mut buffers = HashMap::new();
        let mut available = Vec::new();
        for _ in 0..pool_config.num_video_buffers {
            let id = Uuid::new_v4();
            let mut buffer = AsdBuffer::new(id, video_length, frame_width, frame_height, min_frames, min_segment_gap);
            buffer.activate();
            buffers.insert(id, buffer);
            available.push(id);
        }

        Ok(Self {
            inner: Mutex::new(PoolInner {
                buffers,
                available,
                active: HashMap::new(),
                reservations: VecDeque::new(),
                scheduler: Scheduler::new(pool_config.cooldown as u64, pool_config.num_asd_models as u64),
                frame_index: 0,
                last_timestamp: None,
            }),
            model_pool,
            metrics,
            framerate,
        })
    }

    /// Requests a buffer for `speaker_id`. Returns `None` and enqueues a
    /// reservation when no buffer is free, or when another waiter is
    /// ahead in the FIFO.
    pub fn request(&self, speaker_id: Uuid) -> Option<Uuid> {
        let mut inner = self.inner.lock();

        if inner.available.is_empty() {
            if !inner.reservations.contains(&speaker_id) {
                inner.reservations.push_back(speaker_id);
            }
            return None;
        }

        let is_head = inner.reservations.front() == Some(&speaker_id) || inner.reservations.is_empty();
        if !is_head {
            return None;
        }

        let buffer_id = inner.available.pop()?;
        if let Some(buffer) = inner.buffers.get_mut(&buffer_id) {
            buffer.activate();
        }
        inner.active.insert(speaker_id, buffer_id);
        if inner.reservations.front() == Some(&speaker_id) {
            inner.reservations.pop_front();
        }
        self.metrics.increment_buffers_reserved();
        Some(buffer_id)
    }

    pub fn recycle(&self, speaker_id: Uuid) {
        let mut inner = self.inner.lock();
        if let Some(buffer_id) = inner.active.remove(&speaker_id) {
            inner.available.push(buffer_id);
            inner.scheduler.remove(buffer_id);
            self.metrics.increment_buffers_recycled();
        }
    }

    pub fn cancel_reservation(&self, speaker_id: Uuid) {
        let mut inner = self.inner.lock();
        inner.reservations.retain(|id| *id != speaker_id);
    }

    /// Preserves the earlier-queued of the two ids' positions when a
    /// speaker's identity is replaced (e.g. re-pairing after a merge).
    pub fn replace_reservation(&self, old: Uuid, new: Uuid) {
        let mut inner = self.inner.lock();
        if let Some(pos) = inner.reservations.iter().position(|id| *id == old) {
            inner.reservations[pos] = new;
        } else if !inner.reservations.contains(&new) {
            inner.reservations.push_back(new);
        }
    }

    pub fn with_buffer_mut<R>(&self, speaker_id: Uuid, f: impl FnOnce(&mut AsdBuffer) -> R) -> Option<R> {
        let mut inner = self.inner.lock();
        let buffer_id = *inner.active.get(&speaker_id)?;
        inner.buffers.get_mut(&buffer_id).map(f)
    }

    /// Drives the scheduler and, at most once per frame, dispatches one
    /// inference for whichever buffer the scheduler names.
    pub async fn advance_frame(&self, timestamp: f64, drop_frame: bool) -> Result<(), AsdError> {
        let dispatch = {
            let mut inner = self.inner.lock();

            if let Some(last) = inner.last_timestamp {
                if timestamp < last {
                    error!(last, timestamp, "timestamp regressed");
                    return Err(BufferError::RegressingTimestamp {
                        previous: std::time::Duration::from_secs_f64(last.max(0.0)),
                        new: std::time::Duration::from_secs_f64(timestamp.max(0.0)),
                    }
                    .into());
                }
            }
            inner.last_timestamp = Some(timestamp);

            let active_ids: Vec<(Uuid, Uuid)> = inner.active.iter().map(|(s, b)| (*s, *b)).collect();
            for (_, buffer_id) in &active_ids {
                let ready = inner
                    .buffers
                    .get(buffer_id)
                    .map(|b| b.has_enough_frames())
                    .unwrap_or(false);
                if ready {
                    inner.scheduler.register_if_new(*buffer_id);
                } else {
                    inner.scheduler.remove(*buffer_id);
                }
            }

            inner.scheduler.advance();
            self.metrics.increment_scheduler_cycles();
            self.metrics.set_reservations_pending(inner.reservations.len());

            let dispatch = if !drop_frame {
                inner.scheduler.current_call_id().and_then(|buffer_id| {
                    inner.buffers.get(&buffer_id).map(|b| {
                        let call_frame = inner.frame_index;
                        let request = AsdRequest {
                            call_frame,
                            hit_history: b.history().raw_mask(),
                        };
                        (buffer_id, request, b.as_tensor())
                    })
                })
            } else {
                None
            };

            inner.frame_index += 1;
            let expected = (timestamp * self.framerate as f64).round() as u64;
            if inner.frame_index.abs_diff(expected) > 1 {
                warn!(expected, actual = inner.frame_index, "frame index drift exceeded one frame; resyncing");
                inner.frame_index = expected;
            }

            dispatch
        };

        if let Some((buffer_id, request, tensor)) = dispatch {
            self.metrics.increment_frames_processed();
            let model_pool = self.model_pool.clone();
            let logits = model_pool.run_inference(tensor).await;
            let mut inner = self.inner.lock();
            if let Some(buffer) = inner.buffers.get_mut(&buffer_id) {
                buffer.enqueue_logits(LogitData {
                    call_frame: request.call_frame,
                    hit_history: request.hit_history,
                    logits,
                });
            }
        }

        Ok(())
    }

    pub fn available_count(&self) -> usize {
        self.inner.lock().available.len()
    }

    pub fn active_count(&self) -> usize {
        self.inner.lock().active.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model_pool::AsdModel;
    use async_trait::async_trait;

    struct FixedModel;

    #[async_trait]
    impl AsdModel for FixedModel {
        async fn predict(&self, _input: Vec<f32>) -> Vec<f32> {
            vec![2.0; 5]
        }
    }

    fn pool_config(num_buffers: usize, num_models: usize) -> PoolConfig {
        PoolConfig {
            num_video_buffers: num_buffers,
            num_asd_models: num_models,
            cooldown: 5,
        }
    }

    #[test]
    fn zero_buffers_is_a_configuration_error() {
        let models: Vec<Arc<dyn AsdModel>> = vec![Arc::new(FixedModel)];
        let result = AsdBufferPool::new(
            &pool_config(0, 1),
            25,
            4,
            4,
            3,
            2,
            30,
            Arc::new(ModelPool::new(models)),
            PipelineMetrics::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn available_plus_active_equals_total() {
        let models: Vec<Arc<dyn AsdModel>> = vec![Arc::new(FixedModel)];
        let pool = AsdBufferPool::new(
            &pool_config(2, 1),
            25,
            4,
            4,
            3,
            2,
            30,
            Arc::new(ModelPool::new(models)),
            PipelineMetrics::default(),
        )
        .unwrap();

        let speaker_a = Uuid::new_v4();
        let speaker_b = Uuid::new_v4();
        let speaker_c = Uuid::new_v4();

        assert!(pool.request(speaker_a).is_some());
        assert!(pool.request(speaker_b).is_some());
        assert!(pool.request(speaker_c).is_none());

        assert_eq!(pool.available_count() + pool.active_count(), 2);
    }

    #[test]
    fn third_waiter_is_enqueued_and_served_fifo_on_release() {
        let models: Vec<Arc<dyn AsdModel>> = vec![Arc::new(FixedModel)];
        let pool = AsdBufferPool::new(
            &pool_config(2, 1),
            25,
            4,
            4,
            3,
            2,
            30,
            Arc::new(ModelPool::new(models)),
            PipelineMetrics::default(),
        )
        .unwrap();

        let speaker_a = Uuid::new_v4();
        let speaker_b = Uuid::new_v4();
        let speaker_c = Uuid::new_v4();

        pool.request(speaker_a);
        pool.request(speaker_b);
        assert!(pool.request(speaker_c).is_none());

        pool.recycle(speaker_a);
        assert!(pool.request(speaker_c).is_some());
    }
}
