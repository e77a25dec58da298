//! Hangs the host in `vkWaitSemaphoresKHR` on a timeline semaphore whose
//! target value is never reached.
//!
//! Two timeline semaphores are created at value 0x10. The submission waits
//! on semaphore 1, which the host then signals so the work can run; the
//! host afterwards waits on semaphore 2, which nothing ever signals.

use std::path::PathBuf;

use ash::vk;
use hcf::{
    check, run_with_crash_check, validate, BufferInit, Context, ContextInfo, DeviceOptions,
    Flags, SemaphoreKind, SubmitBundle, TimelineValues,
};

const INITIAL_VALUE: u64 = 0x10;
const SIGNALED_VALUE: u64 = 0x20;

fn payload(ctx: &Context) -> hcf::Result<()> {
    let mut dev = ctx.single_device();
    dev.allocate_io_buffers(BufferInit::Default)?;
    dev.create_descriptor_sets()?;
    let dev = &*dev;
    let device = dev.ash();

    let cb = dev.allocate_command_buffer(vk::CommandBufferLevel::PRIMARY, dev.command_pool())?;
    dev.caps()
        .set_object_name(cb, vk::ObjectType::COMMAND_BUFFER, "CommandBuffer 1");
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
        device.cmd_dispatch(cb, 1, 1, 1);
        device.cmd_dispatch(cb, 1, 1, 1);
        device.end_command_buffer(cb)?;
    }

    let semaphores = dev.create_semaphores(2, SemaphoreKind::Timeline, INITIAL_VALUE)?;
    dev.caps()
        .set_object_name(semaphores[0], vk::ObjectType::SEMAPHORE, "TimelineSemaphore 1");
    dev.caps()
        .set_object_name(semaphores[1], vk::ObjectType::SEMAPHORE, "TimelineSemaphore 2");

    let submit = SubmitBundle {
        command_buffers: vec![cb],
        wait_semaphores: vec![semaphores[0]],
        wait_stage_masks: vec![vk::PipelineStageFlags::ALL_GRAPHICS],
        timeline: Some(TimelineValues {
            wait_values: vec![SIGNALED_VALUE],
            signal_values: vec![],
        }),
        ..Default::default()
    };
    log::info!("Submitting submit info to the queue");
    validate!(submit.submit_to(device, dev.queue(), vk::Fence::null()));
    log::info!("Submitted VkSubmitInfo to the queue.");

    let signal_info = vk::SemaphoreSignalInfo::builder()
        .semaphore(semaphores[0])
        .value(SIGNALED_VALUE)
        .build();
    log::info!("Host signalling timeline semaphore 1...");
    validate!(dev.caps().signal_semaphore(&signal_info));
    log::info!("Timeline semaphore 1 signalled by the host");

    let wait_semaphores = [semaphores[1]];
    let wait_values = [SIGNALED_VALUE];
    let wait_info = vk::SemaphoreWaitInfo::builder()
        .semaphores(&wait_semaphores)
        .values(&wait_values)
        .build();
    log::info!("Host waiting on timeline semaphore 2...");
    validate!(dev.caps().wait_semaphores(&wait_info, u64::MAX));
    log::info!("Timeline semaphore 2 signalled.");
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
        extensions: vec![vk::KhrTimelineSemaphoreFn::name().to_owned()],
        kernel_path: Some(PathBuf::from("read_write.comp.spv")),
        ..DeviceOptions::from_flags(&flags)
    };
    if let Err(err) = ctx.init_device(&options) {
        log::error!("Unable to create the test device: {err}");
        std::process::exit(1);
    }
    ctx.arm_watchdog();

    check!(run_with_crash_check(&ctx, payload));

    ctx.cleanup();
}
