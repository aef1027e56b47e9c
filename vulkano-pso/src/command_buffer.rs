// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Command buffers and their lifecycle.
//!
//! A [`CommandBuffer`] goes through four states:
//!
//! ```text
//! ReadyForBegin --begin--> Recording --end--> Ended --submit--> Submitted
//!       ^                                                           |
//!       +--------------------------poll-----------------------------+
//! ```
//!
//! [`begin`](CommandBufferManager::begin) reserves the fence value of the recording from the
//! [`FenceTracker`]. Everything the recording uses is marked with that value, so that it is kept
//! alive until the value completes. [`poll`](CommandBufferManager::poll) observes the native
//! fences of submitted command buffers, signals the values of those that finished, and makes
//! them available again.
//!
//! A command buffer that was acquired must eventually be submitted or given back with
//! [`reset`](CommandBufferManager::reset), otherwise its fence value never completes.

use crate::{
    descriptor_set::pool::TransientPool, device::Device, pipeline::PipelineBindPoint,
    sync::fence::FenceTracker, VulkanError,
};
use ash::vk;
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::{error::Error, fmt, sync::Arc, time::Duration};

/// The state of a command buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CommandBufferState {
    ReadyForBegin,
    Recording,
    Ended,
    Submitted,
}

/// A command buffer, together with the fence that is signaled when its execution completes.
#[derive(Debug)]
pub struct CommandBuffer {
    handle: vk::CommandBuffer,
    fence: vk::Fence,
    state: CommandBufferState,
    fence_value: u64,
    pub(crate) descriptor_pool: TransientPool,
    pub(crate) current_state: CurrentState,
}

impl CommandBuffer {
    #[inline]
    pub fn handle(&self) -> vk::CommandBuffer {
        self.handle
    }

    #[inline]
    pub fn state(&self) -> CommandBufferState {
        self.state
    }

    /// Returns the fence value of the current recording, or 0 if the command buffer is ready
    /// for begin.
    #[inline]
    pub fn fence_value(&self) -> u64 {
        self.fence_value
    }

    fn expect_state(&self, expected: CommandBufferState) -> Result<(), CommandBufferError> {
        if self.state != expected {
            return Err(CommandBufferError::InvalidState {
                expected,
                actual: self.state,
            });
        }

        Ok(())
    }
}

/// The state that has been recorded into a command buffer so far, so that binding it again can be
/// skipped.
#[derive(Debug, Default)]
pub(crate) struct CurrentState {
    graphics: BoundState,
    compute: BoundState,
}

impl CurrentState {
    #[inline]
    pub(crate) fn bind_point_mut(&mut self, bind_point: PipelineBindPoint) -> &mut BoundState {
        match bind_point {
            PipelineBindPoint::Graphics => &mut self.graphics,
            PipelineBindPoint::Compute => &mut self.compute,
        }
    }

    #[inline]
    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// What is bound at one pipeline bind point of a command buffer.
#[derive(Debug, Default)]
pub(crate) struct BoundState {
    pub(crate) pipeline: Option<vk::Pipeline>,
    pub(crate) descriptor_sets: Option<BoundDescriptorSets>,
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) struct BoundDescriptorSets {
    pub(crate) layout: vk::PipelineLayout,
    pub(crate) sets: SmallVec<[vk::DescriptorSet; 4]>,
    pub(crate) dynamic_offsets: SmallVec<[u32; 4]>,
}

/// Hands out command buffers and tracks them until the GPU is done with them.
#[derive(Debug)]
pub struct CommandBufferManager {
    device: Arc<dyn Device>,
    fences: Arc<FenceTracker>,
    ready: Mutex<Vec<CommandBuffer>>,
    in_flight: Mutex<Vec<CommandBuffer>>,
    transient_sets_per_pool: u32,
}

impl CommandBufferManager {
    /// Creates a manager with `initial_count` command buffers ready for begin.
    pub fn new(
        device: Arc<dyn Device>,
        fences: Arc<FenceTracker>,
        initial_count: usize,
        transient_sets_per_pool: u32,
    ) -> Result<Self, VulkanError> {
        let manager = CommandBufferManager {
            device,
            fences,
            ready: Mutex::new(Vec::with_capacity(initial_count)),
            in_flight: Mutex::new(Vec::new()),
            transient_sets_per_pool,
        };

        for _ in 0..initial_count {
            let command_buffer = manager.create()?;
            manager.ready.lock().push(command_buffer);
        }

        Ok(manager)
    }

    fn create(&self) -> Result<CommandBuffer, VulkanError> {
        let handle = self.device.allocate_command_buffer()?;
        let fence = match self.device.create_fence() {
            Ok(fence) => fence,
            Err(err) => {
                unsafe { self.device.free_command_buffer(handle) };
                return Err(err);
            }
        };

        Ok(CommandBuffer {
            handle,
            fence,
            state: CommandBufferState::ReadyForBegin,
            fence_value: 0,
            descriptor_pool: TransientPool::new(self.transient_sets_per_pool),
            current_state: CurrentState::default(),
        })
    }

    /// Returns a command buffer that is ready for begin, creating one if none is available.
    pub fn acquire(&self) -> Result<CommandBuffer, CommandBufferError> {
        if let Some(command_buffer) = self.ready.lock().pop() {
            return Ok(command_buffer);
        }

        Ok(self.create()?)
    }

    /// Starts recording, and reserves the fence value of the recording.
    pub fn begin(&self, command_buffer: &mut CommandBuffer) -> Result<(), CommandBufferError> {
        command_buffer.expect_state(CommandBufferState::ReadyForBegin)?;

        unsafe { self.device.begin_command_buffer(command_buffer.handle) }?;
        command_buffer.current_state.reset();
        command_buffer.fence_value = self.fences.reserve();
        command_buffer.state = CommandBufferState::Recording;

        log::trace!(
            "began command buffer {:?} with fence value {}",
            command_buffer.handle,
            command_buffer.fence_value,
        );

        Ok(())
    }

    pub fn end(&self, command_buffer: &mut CommandBuffer) -> Result<(), CommandBufferError> {
        command_buffer.expect_state(CommandBufferState::Recording)?;

        unsafe { self.device.end_command_buffer(command_buffer.handle) }?;
        command_buffer.state = CommandBufferState::Ended;

        Ok(())
    }

    /// Submits the command buffer. Returns its fence value.
    ///
    /// If submission fails, the command buffer is reset and made available again.
    pub fn submit(&self, mut command_buffer: CommandBuffer) -> Result<u64, CommandBufferError> {
        if let Err(err) = command_buffer.expect_state(CommandBufferState::Ended) {
            self.recycle(command_buffer);
            return Err(err);
        }

        let fence_value = command_buffer.fence_value;

        if let Err(err) = unsafe {
            self.device
                .queue_submit(command_buffer.handle, command_buffer.fence)
        } {
            self.recycle(command_buffer);
            return Err(err.into());
        }

        command_buffer.state = CommandBufferState::Submitted;
        self.in_flight.lock().push(command_buffer);

        Ok(fence_value)
    }

    /// Gives back a command buffer that will not be submitted. Its fence value, if any, is
    /// signaled right away.
    pub fn reset(&self, command_buffer: CommandBuffer) -> Result<(), CommandBufferError> {
        if command_buffer.state == CommandBufferState::Submitted {
            let err = CommandBufferError::InvalidState {
                expected: CommandBufferState::Ended,
                actual: CommandBufferState::Submitted,
            };
            self.in_flight.lock().push(command_buffer);

            return Err(err);
        }

        self.recycle(command_buffer);

        Ok(())
    }

    fn recycle(&self, mut command_buffer: CommandBuffer) {
        if command_buffer.fence_value != 0 {
            self.fences.signal(command_buffer.fence_value);
        }

        // Nothing recorded in the command buffer ever reached the GPU.
        if let Err(err) = unsafe { command_buffer.descriptor_pool.reset(&*self.device) } {
            log::warn!("failed to reset a transient descriptor pool: {}", err);
            unsafe { command_buffer.descriptor_pool.destroy(&*self.device) };
        }

        self.make_ready(command_buffer);
    }

    fn make_ready(&self, mut command_buffer: CommandBuffer) {
        command_buffer.fence_value = 0;
        command_buffer.state = CommandBufferState::ReadyForBegin;
        command_buffer.current_state.reset();
        self.ready.lock().push(command_buffer);
    }

    /// Prepares a command buffer whose execution has finished for another recording. If its
    /// fence or its descriptor pool cannot be reset, it is destroyed instead.
    fn retire(&self, mut command_buffer: CommandBuffer) -> Result<(), VulkanError> {
        let reset = unsafe {
            self.device
                .reset_fence(command_buffer.fence)
                .and_then(|()| command_buffer.descriptor_pool.reset(&*self.device))
        };

        match reset {
            Ok(()) => {
                self.make_ready(command_buffer);

                Ok(())
            }
            Err(err) => {
                log::warn!(
                    "failed to reset command buffer {:?}, destroying it: {}",
                    command_buffer.handle,
                    err,
                );
                unsafe { self.destroy(command_buffer) };

                Err(err)
            }
        }
    }

    /// # Safety
    ///
    /// - The GPU must be done with `command_buffer`.
    unsafe fn destroy(&self, mut command_buffer: CommandBuffer) {
        unsafe { command_buffer.descriptor_pool.destroy(&*self.device) };
        unsafe { self.device.destroy_fence(command_buffer.fence) };
        unsafe { self.device.free_command_buffer(command_buffer.handle) };
    }

    /// Checks the fences of every submitted command buffer, and makes the finished ones
    /// available again. Returns the completed fence value.
    ///
    /// Every command buffer seen finishing is signaled even when an error is returned. The
    /// command buffers whose fence status could not be read stay in flight.
    pub fn poll(&self) -> Result<u64, CommandBufferError> {
        let mut finished = Vec::new();
        let mut result = Ok(());

        {
            let mut in_flight = self.in_flight.lock();
            let mut index = 0;

            while index < in_flight.len() {
                match unsafe { self.device.fence_status(in_flight[index].fence) } {
                    Ok(true) => finished.push(in_flight.swap_remove(index)),
                    Ok(false) => index += 1,
                    Err(err) => {
                        result = Err(err);
                        break;
                    }
                }
            }
        }

        for command_buffer in finished {
            self.fences.signal(command_buffer.fence_value);

            if let Err(err) = self.retire(command_buffer) {
                if result.is_ok() {
                    result = Err(err);
                }
            }
        }

        result?;

        Ok(self.fences.completed_value())
    }

    /// Blocks until every submitted command buffer has finished, or until `timeout` elapses.
    /// Returns the completed fence value.
    pub fn wait_idle(&self, timeout: Duration) -> Result<u64, CommandBufferError> {
        let fences: Vec<_> = self.in_flight.lock().iter().map(|cb| cb.fence).collect();

        if !fences.is_empty() {
            unsafe { self.device.wait_for_fences(&fences, timeout) }?;
        }

        self.poll()
    }

    /// Returns the number of submitted command buffers that have not been seen finishing yet.
    #[inline]
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }

    #[inline]
    pub fn ready_count(&self) -> usize {
        self.ready.lock().len()
    }
}

impl Drop for CommandBufferManager {
    fn drop(&mut self) {
        let in_flight = self.in_flight.get_mut();

        if !in_flight.is_empty() {
            let fences: Vec<_> = in_flight.iter().map(|cb| cb.fence).collect();

            if let Err(err) = unsafe { self.device.wait_for_fences(&fences, Duration::MAX) } {
                log::warn!("failed to wait for command buffers on teardown: {}", err);
            }
        }

        let command_buffers: Vec<_> = in_flight
            .drain(..)
            .chain(self.ready.get_mut().drain(..))
            .collect();

        for command_buffer in command_buffers {
            unsafe { self.destroy(command_buffer) };
        }
    }
}

/// Error that can happen when using a command buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandBufferError {
    /// The command buffer is not in the state the operation requires.
    InvalidState {
        expected: CommandBufferState,
        actual: CommandBufferState,
    },

    /// The device reported an error.
    VulkanError(VulkanError),
}

impl Error for CommandBufferError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::VulkanError(err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for CommandBufferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidState { expected, actual } => write!(
                f,
                "the command buffer is in the {:?} state, but the {:?} state is required",
                actual, expected,
            ),
            Self::VulkanError(_) => write!(f, "a runtime error occurred"),
        }
    }
}

impl From<VulkanError> for CommandBufferError {
    #[inline]
    fn from(err: VulkanError) -> Self {
        Self::VulkanError(err)
    }
}
