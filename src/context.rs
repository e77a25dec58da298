//! Instance-level context: Vulkan entry/instance ownership, logical device
//! provisioning, the device registry, and the process watchdog.

use std::ffi::{CStr, CString};
use std::path::PathBuf;
use std::time::Duration;

use ash::extensions::ext;
use ash::vk;
use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};

use crate::device::{Device, DeviceCaps};
use crate::error::{HcfError, Result};
use crate::flags::Flags;
use crate::resources::load_shader;
use crate::select::{select_queue_family, QueueType};
use crate::watchdog::{Watchdog, DEFAULT_TEST_TERMINATION_TIMER};

/// Instance-level configuration, fixed for the lifetime of the [`Context`].
pub struct ContextInfo {
    pub api_version: u32,
    pub instance_extensions: Vec<CString>,
    pub instance_layers: Vec<CString>,
    /// Watchdog deadline armed by [`Context::arm_watchdog`].
    pub test_termination_timer: Duration,
    /// Load `VK_EXT_debug_utils` and name objects as they are created.
    pub debug_utils: bool,
}

impl Default for ContextInfo {
    fn default() -> Self {
        Self {
            api_version: vk::API_VERSION_1_0,
            instance_extensions: Vec::new(),
            instance_layers: Vec::new(),
            test_termination_timer: DEFAULT_TEST_TERMINATION_TIMER,
            debug_utils: false,
        }
    }
}

/// Per-device configuration consumed by [`Context::init_device`].
pub struct DeviceOptions {
    pub extensions: Vec<CString>,
    /// SPIR-V kernel to build the compute pipeline from. `None` skips the
    /// pipeline entirely (shader-load-only devices).
    pub kernel_path: Option<PathBuf>,
    /// Queue classes to create, one queue per entry. `None` requests a
    /// single queue of `default_queue`; `Some(vec![])` creates a queue-less
    /// device.
    pub queues: Option<Vec<QueueType>>,
    pub default_queue: QueueType,
    /// Record scenario work into a secondary command buffer wrapped by the
    /// primary.
    pub use_secondary: bool,
    pub debug_names: bool,
}

impl Default for DeviceOptions {
    fn default() -> Self {
        Self {
            extensions: Vec::new(),
            kernel_path: None,
            queues: None,
            default_queue: QueueType::Graphics,
            use_secondary: false,
            debug_names: false,
        }
    }
}

impl DeviceOptions {
    /// Apply the common scenario flags (`--queue`, `--secondary`,
    /// `--debug_utils`).
    pub fn from_flags(flags: &Flags) -> Self {
        Self {
            default_queue: QueueType::from_flag(flags.get("--queue"), QueueType::Graphics),
            use_secondary: flags.is_set("--secondary"),
            debug_names: flags.is_set("--debug_utils"),
            ..Default::default()
        }
    }
}

/// Owns the Vulkan instance, the logical device registry, and the process
/// watchdog. One per scenario process.
pub struct Context {
    entry: ash::Entry,
    instance: ash::Instance,
    debug_utils: Option<ext::DebugUtils>,
    devices: Mutex<Vec<Device>>,
    watchdog: Watchdog,
    info: ContextInfo,
}

impl Context {
    pub fn new(info: ContextInfo) -> Result<Self> {
        let entry = unsafe { ash::Entry::load()? };

        let app_name = CString::new("Halt And Catch Fire").unwrap_or_default();
        let engine_name = CString::new("halt_and_catch_fire").unwrap_or_default();
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .engine_name(&engine_name)
            .api_version(info.api_version);

        let mut extensions = info.instance_extensions.clone();
        if info.debug_utils {
            let debug_ext = ext::DebugUtils::name();
            if !extensions.iter().any(|e| e.as_c_str() == debug_ext) {
                extensions.push(debug_ext.to_owned());
            }
        }
        let extension_ptrs: Vec<*const i8> = extensions.iter().map(|e| e.as_ptr()).collect();
        let layer_ptrs: Vec<*const i8> =
            info.instance_layers.iter().map(|l| l.as_ptr()).collect();

        let instance_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extension_ptrs)
            .enabled_layer_names(&layer_ptrs);

        let instance = unsafe { entry.create_instance(&instance_info, None) }.map_err(|err| {
            log::error!("Unable to create Vulkan instance: {err}");
            match err {
                vk::Result::ERROR_INCOMPATIBLE_DRIVER => HcfError::IncompatibleDriver,
                other => HcfError::Vulkan(other),
            }
        })?;

        let debug_utils = info
            .debug_utils
            .then(|| ext::DebugUtils::new(&entry, &instance));

        Ok(Self {
            entry,
            instance,
            debug_utils,
            devices: Mutex::new(Vec::new()),
            watchdog: Watchdog::new(),
            info,
        })
    }

    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    pub fn entry(&self) -> &ash::Entry {
        &self.entry
    }

    /// Arm the watchdog with the context's configured deadline.
    pub fn arm_watchdog(&self) {
        self.watchdog.arm(self.info.test_termination_timer);
    }

    /// Create a logical device on the first physical device, resolve its
    /// queues, command pools and capability table, and (when a kernel is
    /// given) build the storage-buffer compute pipeline. The device is
    /// registered with the context; the raw handle identifies it in
    /// [`device`](Self::device) and [`delete_device`](Self::delete_device)
    /// calls.
    pub fn init_device(&self, options: &DeviceOptions) -> Result<vk::Device> {
        let physical_devices = unsafe { self.instance.enumerate_physical_devices()? };
        log::info!("Found {} physical device(s)", physical_devices.len());
        for pdev in &physical_devices {
            let props = unsafe { self.instance.get_physical_device_properties(*pdev) };
            let name = unsafe { CStr::from_ptr(props.device_name.as_ptr()) };
            log::info!("Physical device: {}", name.to_string_lossy());
        }
        let physical_device = *physical_devices.first().ok_or(HcfError::NoPhysicalDevices)?;

        let families = unsafe {
            self.instance
                .get_physical_device_queue_family_properties(physical_device)
        };

        // Requests for the same family collapse into one create entry with
        // an increased count; each request remembers its (family, index)
        // placement for queue retrieval after device creation.
        let queue_classes = match &options.queues {
            Some(classes) => classes.clone(),
            None => vec![options.default_queue],
        };
        let mut family_counts: Vec<(u32, u32)> = Vec::new();
        let mut placements: Vec<(u32, u32)> = Vec::new();
        for class in &queue_classes {
            let family = select_queue_family(&families, *class)
                .ok_or(HcfError::NoMatchingQueueFamily(*class))?;
            match family_counts.iter_mut().find(|(f, _)| *f == family) {
                Some((_, count)) => {
                    placements.push((family, *count));
                    *count += 1;
                }
                None => {
                    placements.push((family, 0));
                    family_counts.push((family, 1));
                }
            }
        }

        let max_count = family_counts.iter().map(|(_, c)| *c).max().unwrap_or(0);
        let priorities = vec![1.0f32; max_count as usize];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = family_counts
            .iter()
            .map(|(family, count)| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(*family)
                    .queue_priorities(&priorities[..*count as usize])
                    .build()
            })
            .collect();

        for ext_name in &options.extensions {
            log::info!("Device Extension: {}", ext_name.to_string_lossy());
        }
        let extension_ptrs: Vec<*const i8> =
            options.extensions.iter().map(|e| e.as_ptr()).collect();

        let wants_timeline = options
            .extensions
            .iter()
            .any(|e| e.as_c_str() == vk::KhrTimelineSemaphoreFn::name());
        let mut timeline_features =
            vk::PhysicalDeviceTimelineSemaphoreFeatures::builder().timeline_semaphore(true);

        let mut device_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extension_ptrs);
        if wants_timeline {
            device_info = device_info.push_next(&mut timeline_features);
        }

        let device = unsafe {
            self.instance
                .create_device(physical_device, &device_info, None)
        }
        .map_err(|err| {
            log::error!("Unable to create logical device: {err}");
            HcfError::Vulkan(err)
        })?;

        let debug_utils = options
            .debug_names
            .then(|| self.debug_utils.clone())
            .flatten();
        let caps = DeviceCaps::new(&self.instance, &device, &options.extensions, debug_utils);

        caps.set_object_name(device.handle(), vk::ObjectType::DEVICE, "Default Device");
        caps.set_object_name(
            self.instance.handle(),
            vk::ObjectType::INSTANCE,
            "Default Instance",
        );
        caps.set_object_name(
            physical_device,
            vk::ObjectType::PHYSICAL_DEVICE,
            "Default PhysicalDevice",
        );

        let mut queues = Vec::with_capacity(placements.len());
        let mut queue_families = Vec::with_capacity(placements.len());
        for (family, index) in &placements {
            let queue = unsafe { device.get_device_queue(*family, *index) };
            caps.set_object_name(queue, vk::ObjectType::QUEUE, "Default Queue");
            queues.push(queue);
            queue_families.push(*family);
        }

        let mut command_pools = Vec::with_capacity(family_counts.len());
        for (family, _) in &family_counts {
            let pool_info = vk::CommandPoolCreateInfo::builder()
                .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
                .queue_family_index(*family);
            let pool = unsafe { device.create_command_pool(&pool_info, None)? };
            caps.set_object_name(pool, vk::ObjectType::COMMAND_POOL, "Default CommandPool");
            command_pools.push((*family, pool));
        }

        let memory_properties = unsafe {
            self.instance
                .get_physical_device_memory_properties(physical_device)
        };

        let mut registered = Device {
            device,
            physical_device,
            memory_properties,
            queue: queues.first().copied().unwrap_or_else(vk::Queue::null),
            queues,
            queue_families,
            command_pool: command_pools
                .first()
                .map(|(_, pool)| *pool)
                .unwrap_or_else(vk::CommandPool::null),
            command_pools,
            caps,
            use_secondary: options.use_secondary,
            shader_module: vk::ShaderModule::null(),
            descriptor_set_layout: vk::DescriptorSetLayout::null(),
            descriptor_pool: vk::DescriptorPool::null(),
            descriptor_set: vk::DescriptorSet::null(),
            pipeline_layout: vk::PipelineLayout::null(),
            pipeline: vk::Pipeline::null(),
            io: None,
        };

        if let Some(kernel_path) = &options.kernel_path {
            create_compute_pipeline(&mut registered, kernel_path)?;
        }

        let raw = registered.handle();
        self.devices.lock().push(registered);
        Ok(raw)
    }

    /// The registry's only device. Holding more or fewer than one device is
    /// a programming error in the scenario.
    pub fn single_device(&self) -> MappedMutexGuard<'_, Device> {
        MutexGuard::map(self.devices.lock(), |devices| {
            assert_eq!(devices.len(), 1, "expected exactly one registered device");
            &mut devices[0]
        })
    }

    /// Look up a registered device by raw handle.
    pub fn device(&self, raw: vk::Device) -> Option<MappedMutexGuard<'_, Device>> {
        MutexGuard::try_map(self.devices.lock(), |devices| {
            devices.iter_mut().find(|device| device.handle() == raw)
        })
        .ok()
    }

    pub fn device_count(&self) -> usize {
        self.devices.lock().len()
    }

    /// Unregister and destroy a device. An unregistered handle is still
    /// destroyed so the driver observes the teardown.
    pub fn delete_device(&self, raw: vk::Device) {
        let mut devices = self.devices.lock();
        match devices.iter().position(|device| device.handle() == raw) {
            Some(idx) => {
                let mut device = devices.remove(idx);
                device.destroy();
            }
            None => unsafe {
                ash::Device::load(self.instance.fp_v1_0(), raw).destroy_device(None);
            },
        }
    }

    /// Destroy every registered device and the instance. Not expected to be
    /// reached by a successfully misbehaving scenario.
    pub fn cleanup(self) {
        self.watchdog.disarm();
        let mut devices = self.devices.lock();
        for device in devices.iter_mut() {
            device.destroy();
        }
        devices.clear();
        drop(devices);
        unsafe { self.instance.destroy_instance(None) };
    }
}

/// Build the fixed two-slot storage-buffer compute pipeline from a SPIR-V
/// kernel: descriptor set layout (bindings 0 and 1, all stages), descriptor
/// pool, pipeline layout, and the pipeline with entry point `main`.
fn create_compute_pipeline(device: &mut Device, kernel_path: &std::path::Path) -> Result<()> {
    let ash_device = device.device.clone();
    device.shader_module = load_shader(&ash_device, kernel_path)?;

    let bindings = [
        vk::DescriptorSetLayoutBinding::builder()
            .binding(0)
            .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
            .descriptor_count(1)
            .stage_flags(vk::ShaderStageFlags::ALL)
            .build(),
        vk::DescriptorSetLayoutBinding::builder()
            .binding(1)
            .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
            .descriptor_count(1)
            .stage_flags(vk::ShaderStageFlags::ALL)
            .build(),
    ];
    let layout_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&bindings);
    device.descriptor_set_layout =
        unsafe { ash_device.create_descriptor_set_layout(&layout_info, None)? };

    let pool_sizes = [vk::DescriptorPoolSize::builder()
        .ty(vk::DescriptorType::STORAGE_BUFFER)
        .descriptor_count(2)
        .build()];
    let pool_info = vk::DescriptorPoolCreateInfo::builder()
        .max_sets(2)
        .pool_sizes(&pool_sizes);
    device.descriptor_pool = unsafe { ash_device.create_descriptor_pool(&pool_info, None)? };

    let set_layouts = [device.descriptor_set_layout];
    let pipeline_layout_info = vk::PipelineLayoutCreateInfo::builder().set_layouts(&set_layouts);
    device.pipeline_layout =
        unsafe { ash_device.create_pipeline_layout(&pipeline_layout_info, None)? };

    let entry_point = unsafe { CStr::from_bytes_with_nul_unchecked(b"main\0") };
    let stage = vk::PipelineShaderStageCreateInfo::builder()
        .stage(vk::ShaderStageFlags::COMPUTE)
        .module(device.shader_module)
        .name(entry_point)
        .build();
    let pipeline_info = vk::ComputePipelineCreateInfo::builder()
        .stage(stage)
        .layout(device.pipeline_layout)
        .build();
    let pipelines = unsafe {
        ash_device.create_compute_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
    }
    .map_err(|(_, err)| HcfError::Vulkan(err))?;
    device.pipeline = pipelines
        .into_iter()
        .next()
        .unwrap_or_else(vk::Pipeline::null);

    Ok(())
}
