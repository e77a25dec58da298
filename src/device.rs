//! Logical device record: queues, command pools, the trivial compute
//! pipeline, the paired I/O buffer arena, and the extension capability
//! table.

use std::ffi::{CStr, CString};

use ash::extensions::ext;
use ash::vk;
use ash::vk::Handle;

/// Numeric payload arity of each I/O buffer.
pub const NUM_BUFFER_ENTRIES: usize = 256;
/// Byte size of one I/O buffer.
pub const BUFFER_SIZE: vk::DeviceSize =
    (NUM_BUFFER_ENTRIES * std::mem::size_of::<f32>()) as vk::DeviceSize;

/// Optional extension entry points, resolved once at device creation.
///
/// Every capability not requested (or not available) behaves as a harmless
/// no-op, preserving the "absent extension does nothing" contract without
/// scattering null checks through the scenarios.
#[derive(Clone)]
pub struct DeviceCaps {
    device: vk::Device,
    buffer_marker: Option<vk::AmdBufferMarkerFn>,
    timeline: Option<vk::KhrTimelineSemaphoreFn>,
    debug_utils: Option<ext::DebugUtils>,
}

impl DeviceCaps {
    pub(crate) fn new(
        instance: &ash::Instance,
        device: &ash::Device,
        extensions: &[CString],
        debug_utils: Option<ext::DebugUtils>,
    ) -> Self {
        let handle = device.handle();
        let requested = |name: &CStr| extensions.iter().any(|e| e.as_c_str() == name);

        let buffer_marker = requested(vk::AmdBufferMarkerFn::name()).then(|| {
            vk::AmdBufferMarkerFn::load(|name| unsafe {
                std::mem::transmute(instance.get_device_proc_addr(handle, name.as_ptr()))
            })
        });
        let timeline = requested(vk::KhrTimelineSemaphoreFn::name()).then(|| {
            vk::KhrTimelineSemaphoreFn::load(|name| unsafe {
                std::mem::transmute(instance.get_device_proc_addr(handle, name.as_ptr()))
            })
        });

        Self {
            device: handle,
            buffer_marker,
            timeline,
            debug_utils,
        }
    }

    /// `vkCmdWriteBufferMarkerAMD`; no-op when `VK_AMD_buffer_marker` was
    /// not requested.
    pub fn write_buffer_marker(
        &self,
        cb: vk::CommandBuffer,
        stage: vk::PipelineStageFlags,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        marker: u32,
    ) {
        if let Some(fns) = &self.buffer_marker {
            unsafe { (fns.cmd_write_buffer_marker_amd)(cb, stage, buffer, offset, marker) };
        }
    }

    /// Host-signal a timeline semaphore; no-op success when
    /// `VK_KHR_timeline_semaphore` was not requested.
    pub fn signal_semaphore(&self, info: &vk::SemaphoreSignalInfo) -> crate::Result<()> {
        match &self.timeline {
            Some(fns) => unsafe { (fns.signal_semaphore_khr)(self.device, info).result()? },
            None => {}
        }
        Ok(())
    }

    /// Host-wait on timeline semaphores with a bounded timeout; no-op
    /// success when `VK_KHR_timeline_semaphore` was not requested.
    pub fn wait_semaphores(
        &self,
        info: &vk::SemaphoreWaitInfo,
        timeout_ns: u64,
    ) -> crate::Result<()> {
        match &self.timeline {
            Some(fns) => unsafe {
                (fns.wait_semaphores_khr)(self.device, info, timeout_ns).result()?
            },
            None => {}
        }
        Ok(())
    }

    /// Assign a human-readable debug name to an object; no-op when debug
    /// naming was not requested.
    pub fn set_object_name<T: Handle>(&self, obj: T, object_type: vk::ObjectType, name: &str) {
        let Some(utils) = &self.debug_utils else { return };
        let Ok(name) = CString::new(name) else { return };
        let info = vk::DebugUtilsObjectNameInfoEXT::builder()
            .object_type(object_type)
            .object_handle(obj.as_raw())
            .object_name(&name)
            .build();
        let _ = unsafe { utils.set_debug_utils_object_name(self.device, &info) };
    }
}

/// A single arena allocation split into two named sub-ranges: "in" at
/// `[0, buffer_size)` and "out" at `[buffer_size, 2 * buffer_size)`.
pub struct IoBuffers {
    pub(crate) input: vk::Buffer,
    pub(crate) output: vk::Buffer,
    pub(crate) memory: vk::DeviceMemory,
    pub(crate) buffer_size: vk::DeviceSize,
}

impl IoBuffers {
    pub fn input(&self) -> vk::Buffer {
        self.input
    }

    pub fn output(&self) -> vk::Buffer {
        self.output
    }

    pub fn memory(&self) -> vk::DeviceMemory {
        self.memory
    }

    pub fn buffer_size(&self) -> vk::DeviceSize {
        self.buffer_size
    }

    /// Bound offset of the "out" sub-range within the shared allocation.
    pub fn output_offset(&self) -> vk::DeviceSize {
        self.buffer_size
    }
}

/// A logical device bound to the context's physical accelerator.
pub struct Device {
    pub(crate) device: ash::Device,
    pub(crate) physical_device: vk::PhysicalDevice,
    pub(crate) memory_properties: vk::PhysicalDeviceMemoryProperties,

    pub(crate) queues: Vec<vk::Queue>,
    pub(crate) queue_families: Vec<u32>,
    pub(crate) queue: vk::Queue,
    // One pool per distinct queue family, keyed by family index.
    pub(crate) command_pools: Vec<(u32, vk::CommandPool)>,
    pub(crate) command_pool: vk::CommandPool,

    pub(crate) caps: DeviceCaps,
    pub(crate) use_secondary: bool,

    pub(crate) shader_module: vk::ShaderModule,
    pub(crate) descriptor_set_layout: vk::DescriptorSetLayout,
    pub(crate) descriptor_pool: vk::DescriptorPool,
    pub(crate) descriptor_set: vk::DescriptorSet,
    pub(crate) pipeline_layout: vk::PipelineLayout,
    pub(crate) pipeline: vk::Pipeline,

    pub(crate) io: Option<IoBuffers>,
}

impl Device {
    pub fn ash(&self) -> &ash::Device {
        &self.device
    }

    pub fn handle(&self) -> vk::Device {
        self.device.handle()
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.memory_properties
    }

    /// The default queue (first requested).
    pub fn queue(&self) -> vk::Queue {
        self.queue
    }

    pub fn queues(&self) -> &[vk::Queue] {
        &self.queues
    }

    /// The default command pool (the default queue's family).
    pub fn command_pool(&self) -> vk::CommandPool {
        self.command_pool
    }

    /// The command pool serving the queue at `queue_index`.
    pub fn command_pool_for_queue(&self, queue_index: usize) -> vk::CommandPool {
        let family = self.queue_families[queue_index];
        self.command_pools
            .iter()
            .find(|(pool_family, _)| *pool_family == family)
            .map(|(_, pool)| *pool)
            .expect("queue index out of range")
    }

    pub fn caps(&self) -> &DeviceCaps {
        &self.caps
    }

    pub fn pipeline(&self) -> vk::Pipeline {
        self.pipeline
    }

    pub fn pipeline_layout(&self) -> vk::PipelineLayout {
        self.pipeline_layout
    }

    pub fn descriptor_set(&self) -> vk::DescriptorSet {
        self.descriptor_set
    }

    pub fn shader_module(&self) -> vk::ShaderModule {
        self.shader_module
    }

    /// The paired I/O buffers. Calling this before
    /// [`allocate_io_buffers`](Self::allocate_io_buffers) is a programming
    /// error.
    pub fn io(&self) -> &IoBuffers {
        self.io.as_ref().expect("I/O buffers not allocated")
    }

    pub(crate) fn destroy(&mut self) {
        unsafe { self.device.destroy_device(None) };
    }
}
