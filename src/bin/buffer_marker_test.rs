//! Writes AMD buffer markers around two dispatches and reads them back.
//!
//! Expected readback of the first four marker words:
//! `deadbeef 0badf00d 00000002 00000003`.

use std::path::PathBuf;

use ash::vk;
use hcf::{
    check, find_memory_type, validate, BufferInit, Context, ContextInfo, DeviceOptions, Flags,
    SubmitBundle, BUFFER_SIZE, NUM_BUFFER_ENTRIES,
};

const MARKER_TOP: u32 = 0xDEADBEEF;
const MARKER_BOTTOM: u32 = 0x0BAD_F00D;

fn log_markers(ptr: *const u32) {
    for i in 0..4 {
        log::info!("{i:4}: {:08x}", unsafe { ptr.add(i).read() });
    }
}

fn payload(ctx: &Context) -> hcf::Result<()> {
    let mut dev = ctx.single_device();
    dev.allocate_io_buffers(BufferInit::Default)?;
    let dev_memory_properties = *dev.memory_properties();

    log::info!("Creating Buffer Marker Buffer");
    let device = dev.ash().clone();
    let buffer_info = vk::BufferCreateInfo::builder()
        .size(BUFFER_SIZE)
        .usage(vk::BufferUsageFlags::TRANSFER_SRC | vk::BufferUsageFlags::TRANSFER_DST)
        .sharing_mode(vk::SharingMode::EXCLUSIVE);
    let marker_buffer = unsafe { device.create_buffer(&buffer_info, None)? };

    let requirements = unsafe { device.get_buffer_memory_requirements(marker_buffer) };
    let memory_type = find_memory_type(
        &dev_memory_properties,
        requirements.memory_type_bits,
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
    )
    .ok_or(hcf::HcfError::NoMatchingMemoryType)?;
    let alloc_info = vk::MemoryAllocateInfo::builder()
        .allocation_size(2 * BUFFER_SIZE)
        .memory_type_index(memory_type);
    let marker_memory = unsafe { device.allocate_memory(&alloc_info, None)? };
    unsafe { device.bind_buffer_memory(marker_buffer, marker_memory, 0)? };

    // Stays mapped so the markers can be read back after the submission.
    let marker_ptr = unsafe {
        device.map_memory(marker_memory, 0, vk::WHOLE_SIZE, vk::MemoryMapFlags::empty())?
    } as *mut u32;
    unsafe {
        for i in 0..NUM_BUFFER_ENTRIES {
            marker_ptr.add(i).write(i as u32);
        }
    }

    log::info!("INIT MARKERS");
    log_markers(marker_ptr);

    dev.create_descriptor_sets()?;
    let dev = &*dev;

    let cb = dev.allocate_command_buffer(vk::CommandBufferLevel::PRIMARY, dev.command_pool())?;
    let begin_info = vk::CommandBufferBeginInfo::builder()
        .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
    unsafe {
        device.begin_command_buffer(cb, &begin_info)?;
        device.cmd_bind_pipeline(cb, vk::PipelineBindPoint::COMPUTE, dev.pipeline());
        device.cmd_bind_descriptor_sets(
            cb,
            vk::PipelineBindPoint::COMPUTE,
            dev.pipeline_layout(),
            0,
            &[dev.descriptor_set()],
            &[],
        );
    }
    dev.caps().write_buffer_marker(
        cb,
        vk::PipelineStageFlags::TOP_OF_PIPE,
        marker_buffer,
        0,
        MARKER_TOP,
    );
    unsafe {
        device.cmd_dispatch(cb, 1, 1, 1);
        device.cmd_dispatch(cb, 1, 1, 1);
    }
    dev.caps().write_buffer_marker(
        cb,
        vk::PipelineStageFlags::BOTTOM_OF_PIPE,
        marker_buffer,
        4,
        MARKER_BOTTOM,
    );
    unsafe { device.end_command_buffer(cb)? };

    let submit = SubmitBundle {
        command_buffers: vec![cb],
        ..Default::default()
    };
    log::info!("Submitting 0");
    submit.submit_to(&device, dev.queue(), vk::Fence::null())?;
    log::info!("Submitted 0");

    log::info!("Waiting for idle...");
    validate!(unsafe { device.queue_wait_idle(dev.queue()) });

    log::info!("MARKERS");
    log_markers(marker_ptr);
    Ok(())
}

fn main() {
    hcf::init_logging();
    let flags = Flags::with_common().parse(std::env::args());

    let info = ContextInfo {
        debug_utils: flags.is_set("--debug_utils"),
        ..Default::default()
    };
    let ctx = match Context::new(info) {
        Ok(ctx) => ctx,
        Err(err) => {
            log::error!("Unable to initialize Vulkan: {err}");
            std::process::exit(1);
        }
    };
    let options = DeviceOptions {
        extensions: vec![vk::AmdBufferMarkerFn::name().to_owned()],
        kernel_path: Some(PathBuf::from("read_write.comp.spv")),
        ..DeviceOptions::from_flags(&flags)
    };
    if let Err(err) = ctx.init_device(&options) {
        log::error!("Unable to create the test device: {err}");
        std::process::exit(1);
    }
    ctx.arm_watchdog();

    check!(payload(&ctx));

    ctx.cleanup();
}
