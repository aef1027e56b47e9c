use crate::device::Device;
use ash::vk;
use crossbeam_queue::SegQueue;
use parking_lot::Mutex;
use std::sync::Arc;

/// A native object whose destruction has been deferred.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeferredObject {
    Pipeline(vk::Pipeline),
    PipelineLayout(vk::PipelineLayout),
    DescriptorPool(vk::DescriptorPool),
    PipelineCache(vk::PipelineCache),
}

impl DeferredObject {
    /// # Safety
    ///
    /// - The object must have been created by `device` and must no longer be in use.
    unsafe fn destroy(self, device: &dyn Device) {
        match self {
            Self::Pipeline(handle) => unsafe { device.destroy_pipeline(handle) },
            Self::PipelineLayout(handle) => unsafe { device.destroy_pipeline_layout(handle) },
            Self::DescriptorPool(handle) => unsafe { device.destroy_descriptor_pool(handle) },
            Self::PipelineCache(handle) => unsafe { device.destroy_pipeline_cache(handle) },
        }
    }
}

/// Holds native objects until the command buffers that may reference them have completed.
///
/// Pushing never blocks. Each object is destroyed by the first [`drain`](Self::drain) whose
/// completed fence value reaches the value the object was pushed with. Objects that are still
/// queued when the queue is dropped are destroyed then, so the queue must outlive the GPU work
/// that references them.
#[derive(Debug)]
pub struct DeferredDeletionQueue {
    device: Arc<dyn Device>,
    incoming: SegQueue<(DeferredObject, u64)>,
    waiting: Mutex<Vec<(DeferredObject, u64)>>,
}

impl DeferredDeletionQueue {
    #[inline]
    pub fn new(device: Arc<dyn Device>) -> Self {
        DeferredDeletionQueue {
            device,
            incoming: SegQueue::new(),
            waiting: Mutex::new(Vec::new()),
        }
    }

    /// Defers destruction of `object` until every command buffer up to `required_fence` has
    /// completed.
    #[inline]
    pub fn push(&self, object: DeferredObject, required_fence: u64) {
        self.incoming.push((object, required_fence));
    }

    /// Destroys every object whose required fence value is at most `completed_fence`. Returns
    /// how many objects were destroyed.
    ///
    /// # Safety
    ///
    /// - `completed_fence` must not be greater than the value up to which the GPU has actually
    ///   completed.
    pub unsafe fn drain(&self, completed_fence: u64) -> usize {
        let mut waiting = self.waiting.lock();

        while let Some(item) = self.incoming.pop() {
            waiting.push(item);
        }

        let mut destroyed = 0;
        waiting.retain(|&(object, required_fence)| {
            if required_fence <= completed_fence {
                unsafe { object.destroy(&*self.device) };
                destroyed += 1;

                false
            } else {
                true
            }
        });

        if destroyed != 0 {
            log::trace!(
                "destroyed {} deferred objects, {} still waiting",
                destroyed,
                waiting.len(),
            );
        }

        destroyed
    }

    /// Destroys every object regardless of fence values.
    ///
    /// # Safety
    ///
    /// - The device must be idle.
    pub unsafe fn drain_all(&self) -> usize {
        unsafe { self.drain(u64::MAX) }
    }

    /// Returns the number of objects waiting for destruction.
    pub fn len(&self) -> usize {
        self.waiting.lock().len() + self.incoming.len()
    }
}

impl Drop for DeferredDeletionQueue {
    fn drop(&mut self) {
        let remaining = unsafe { self.drain_all() };

        if remaining != 0 {
            log::debug!("destroyed {} deferred objects on teardown", remaining);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{DeferredDeletionQueue, DeferredObject};
    use ash::vk::{self, Handle};

    #[test]
    fn destroys_only_completed_objects() {
        let device = mock_device!();
        let queue = DeferredDeletionQueue::new(device.clone());

        queue.push(DeferredObject::Pipeline(vk::Pipeline::from_raw(1)), 3);
        queue.push(DeferredObject::Pipeline(vk::Pipeline::from_raw(2)), 5);
        queue.push(DeferredObject::PipelineLayout(vk::PipelineLayout::from_raw(3)), 0);
        assert_eq!(queue.len(), 3);

        assert_eq!(unsafe { queue.drain(2) }, 1);
        assert_eq!(device.counters().pipeline_layouts_destroyed(), 1);
        assert_eq!(device.counters().pipelines_destroyed(), 0);

        assert_eq!(unsafe { queue.drain(4) }, 1);
        assert_eq!(device.counters().pipelines_destroyed(), 1);

        assert_eq!(unsafe { queue.drain_all() }, 1);
        assert_eq!(device.counters().pipelines_destroyed(), 2);
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn never_destroys_without_progress() {
        let device = mock_device!();
        let queue = DeferredDeletionQueue::new(device.clone());

        for raw in 1..=16 {
            queue.push(DeferredObject::Pipeline(vk::Pipeline::from_raw(raw)), raw);
        }

        for _ in 0..4 {
            assert_eq!(unsafe { queue.drain(0) }, 0);
        }

        assert_eq!(device.counters().pipelines_destroyed(), 0);
        assert_eq!(queue.len(), 16);
    }

    #[test]
    fn teardown_destroys_leftovers() {
        let device = mock_device!();
        let queue = DeferredDeletionQueue::new(device.clone());
        queue.push(DeferredObject::Pipeline(vk::Pipeline::from_raw(1)), 9);
        assert_eq!(device.counters().pipelines_destroyed(), 0);

        drop(queue);
        assert_eq!(device.counters().pipelines_destroyed(), 1);
    }
}
