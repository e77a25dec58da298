//! Command buffer recording, semaphore creation, and queue submission.

use ash::vk;

use crate::device::Device;
use crate::error::Result;

/// Command buffers produced by
/// [`Device::create_and_record_command_buffers`]. Only `primary` is
/// submitted; `secondary` is present when the device records through a
/// secondary buffer.
pub struct RecordedCommands {
    pub primary: vk::CommandBuffer,
    pub secondary: Option<vk::CommandBuffer>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemaphoreKind {
    Binary,
    Timeline,
}

/// Timeline payload values accompanying a [`SubmitBundle`]. Wait values
/// pair positionally with the bundle's wait semaphores, signal values with
/// its signal semaphores; binary semaphores in mixed sets carry ignored
/// placeholder values.
#[derive(Debug, Default, Clone)]
pub struct TimelineValues {
    pub wait_values: Vec<u64>,
    pub signal_values: Vec<u64>,
}

/// An owned, ordered submission: everything `vkQueueSubmit` needs, with the
/// arrays kept alive by the bundle itself rather than borrowed from the
/// caller's stack.
#[derive(Default)]
pub struct SubmitBundle {
    pub command_buffers: Vec<vk::CommandBuffer>,
    pub wait_semaphores: Vec<vk::Semaphore>,
    pub wait_stage_masks: Vec<vk::PipelineStageFlags>,
    pub signal_semaphores: Vec<vk::Semaphore>,
    pub timeline: Option<TimelineValues>,
}

impl SubmitBundle {
    /// Every wait semaphore has a stage mask, and timeline values (when
    /// present) pair one-to-one with their semaphore arrays.
    pub fn is_consistent(&self) -> bool {
        self.wait_semaphores.len() == self.wait_stage_masks.len()
            && self.timeline.as_ref().map_or(true, |values| {
                values.wait_values.len() == self.wait_semaphores.len()
                    && values.signal_values.len() == self.signal_semaphores.len()
            })
    }

    pub fn submit_to(
        &self,
        device: &ash::Device,
        queue: vk::Queue,
        fence: vk::Fence,
    ) -> Result<()> {
        debug_assert!(self.is_consistent());
        let mut timeline_info = self.timeline.as_ref().map(|values| {
            vk::TimelineSemaphoreSubmitInfo::builder()
                .wait_semaphore_values(&values.wait_values)
                .signal_semaphore_values(&values.signal_values)
        });
        let mut submit = vk::SubmitInfo::builder()
            .command_buffers(&self.command_buffers)
            .wait_semaphores(&self.wait_semaphores)
            .wait_dst_stage_mask(&self.wait_stage_masks)
            .signal_semaphores(&self.signal_semaphores);
        if let Some(info) = timeline_info.as_mut() {
            submit = submit.push_next(info);
        }
        unsafe { device.queue_submit(queue, &[submit.build()], fence)? };
        Ok(())
    }

    /// Sparse-binding analogue of [`submit_to`](Self::submit_to): an empty
    /// bind with the bundle's semaphore sets, exercising the second queue
    /// operation type that can signal semaphores.
    pub fn bind_sparse_to(
        &self,
        device: &ash::Device,
        queue: vk::Queue,
        fence: vk::Fence,
    ) -> Result<()> {
        debug_assert!(self.is_consistent());
        let mut timeline_info = self.timeline.as_ref().map(|values| {
            vk::TimelineSemaphoreSubmitInfo::builder()
                .wait_semaphore_values(&values.wait_values)
                .signal_semaphore_values(&values.signal_values)
        });
        let mut bind = vk::BindSparseInfo::builder()
            .wait_semaphores(&self.wait_semaphores)
            .signal_semaphores(&self.signal_semaphores);
        if let Some(info) = timeline_info.as_mut() {
            bind = bind.push_next(info);
        }
        unsafe { device.queue_bind_sparse(queue, &[bind.build()], fence)? };
        Ok(())
    }
}

impl Device {
    pub fn allocate_command_buffer(
        &self,
        level: vk::CommandBufferLevel,
        pool: vk::CommandPool,
    ) -> Result<vk::CommandBuffer> {
        let info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(pool)
            .level(level)
            .command_buffer_count(1);
        let buffers = unsafe { self.device.allocate_command_buffers(&info)? };
        Ok(buffers
            .first()
            .copied()
            .unwrap_or_else(vk::CommandBuffer::null))
    }

    /// Allocate and record a one-time-submit primary command buffer from
    /// `pool` (default pool when `None`). When the device was configured
    /// with secondary recording, `record` goes into a secondary buffer and
    /// the primary merely executes it.
    pub fn create_and_record_command_buffers(
        &self,
        debug_name: Option<&str>,
        pool: Option<vk::CommandPool>,
        record: impl FnOnce(vk::CommandBuffer) -> Result<()>,
    ) -> Result<RecordedCommands> {
        let pool = pool.unwrap_or(self.command_pool);
        let primary = self.allocate_command_buffer(vk::CommandBufferLevel::PRIMARY, pool)?;
        if let Some(name) = debug_name {
            self.caps.set_object_name(
                primary,
                vk::ObjectType::COMMAND_BUFFER,
                &format!("{name} Primary Command Buffer"),
            );
        }
        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        if !self.use_secondary {
            unsafe { self.device.begin_command_buffer(primary, &begin_info)? };
            record(primary)?;
            unsafe { self.device.end_command_buffer(primary)? };
            return Ok(RecordedCommands {
                primary,
                secondary: None,
            });
        }

        let secondary = self.allocate_command_buffer(vk::CommandBufferLevel::SECONDARY, pool)?;
        if let Some(name) = debug_name {
            self.caps.set_object_name(
                secondary,
                vk::ObjectType::COMMAND_BUFFER,
                &format!("{name} Secondary Command Buffer"),
            );
        }
        let inheritance = vk::CommandBufferInheritanceInfo::default();
        let secondary_begin = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)
            .inheritance_info(&inheritance);
        unsafe {
            self.device.begin_command_buffer(secondary, &secondary_begin)?;
        }
        record(secondary)?;
        unsafe {
            self.device.end_command_buffer(secondary)?;
            self.device.begin_command_buffer(primary, &begin_info)?;
            self.device.cmd_execute_commands(primary, &[secondary]);
            self.device.end_command_buffer(primary)?;
        }
        Ok(RecordedCommands {
            primary,
            secondary: Some(secondary),
        })
    }

    /// Record an empty one-time-submit command buffer.
    pub fn begin_and_end_command_buffer(&self, cb: vk::CommandBuffer) -> Result<()> {
        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            self.device.begin_command_buffer(cb, &begin_info)?;
            self.device.end_command_buffer(cb)?;
        }
        Ok(())
    }

    /// Create an event that no one will ever set and record a wait on it.
    /// The canonical hang payload: the queue stalls at this command forever.
    pub fn wait_on_event_that_never_signals(&self, cb: vk::CommandBuffer) -> Result<vk::Event> {
        let info = vk::EventCreateInfo::builder();
        let event = unsafe { self.device.create_event(&info, None)? };
        self.caps
            .set_object_name(event, vk::ObjectType::EVENT, "Never-signaled Event");
        unsafe {
            self.device.cmd_wait_events(
                cb,
                &[event],
                vk::PipelineStageFlags::HOST,
                vk::PipelineStageFlags::TOP_OF_PIPE,
                &[],
                &[],
                &[],
            );
        }
        Ok(event)
    }

    /// Create `count` semaphores of the given kind. Timeline semaphores
    /// start at `initial_value`; binary semaphores ignore it.
    pub fn create_semaphores(
        &self,
        count: usize,
        kind: SemaphoreKind,
        initial_value: u64,
    ) -> Result<Vec<vk::Semaphore>> {
        let mut semaphores = Vec::with_capacity(count);
        for _ in 0..count {
            let mut type_info = vk::SemaphoreTypeCreateInfo::builder()
                .semaphore_type(vk::SemaphoreType::TIMELINE)
                .initial_value(initial_value);
            let mut info = vk::SemaphoreCreateInfo::builder();
            if kind == SemaphoreKind::Timeline {
                info = info.push_next(&mut type_info);
            }
            semaphores.push(unsafe { self.device.create_semaphore(&info, None)? });
        }
        Ok(semaphores)
    }

    pub fn create_binary_semaphores(&self, count: usize) -> Result<Vec<vk::Semaphore>> {
        self.create_semaphores(count, SemaphoreKind::Binary, 0)
    }

    pub fn create_timeline_semaphores(
        &self,
        count: usize,
        initial_value: u64,
    ) -> Result<Vec<vk::Semaphore>> {
        self.create_semaphores(count, SemaphoreKind::Timeline, initial_value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn semaphore(raw: u64) -> vk::Semaphore {
        vk::Semaphore::from_raw(raw)
    }

    #[test]
    fn bundle_keeps_wait_associations() {
        let bundle = SubmitBundle {
            wait_semaphores: vec![semaphore(1), semaphore(2)],
            wait_stage_masks: vec![
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::COMPUTE_SHADER,
            ],
            ..Default::default()
        };
        assert!(bundle.is_consistent());
        assert_eq!(bundle.wait_semaphores.len(), bundle.wait_stage_masks.len());
        assert_eq!(
            bundle.wait_stage_masks[1],
            vk::PipelineStageFlags::COMPUTE_SHADER
        );
    }

    #[test]
    fn bundle_detects_missing_stage_mask() {
        let bundle = SubmitBundle {
            wait_semaphores: vec![semaphore(1), semaphore(2)],
            wait_stage_masks: vec![vk::PipelineStageFlags::TOP_OF_PIPE],
            ..Default::default()
        };
        assert!(!bundle.is_consistent());
    }

    #[test]
    fn bundle_checks_timeline_value_counts() {
        let bundle = SubmitBundle {
            wait_semaphores: vec![semaphore(1)],
            wait_stage_masks: vec![vk::PipelineStageFlags::TOP_OF_PIPE],
            signal_semaphores: vec![semaphore(2), semaphore(3)],
            timeline: Some(TimelineValues {
                wait_values: vec![10],
                signal_values: vec![20, 30],
            }),
            ..Default::default()
        };
        assert!(bundle.is_consistent());

        let short = SubmitBundle {
            signal_semaphores: vec![semaphore(2), semaphore(3)],
            timeline: Some(TimelineValues {
                wait_values: vec![],
                signal_values: vec![20],
            }),
            ..Default::default()
        };
        assert!(!short.is_consistent());
    }
}
