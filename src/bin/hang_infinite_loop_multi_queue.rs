//! Hangs three queues (one graphics, two compute) with the looping kernel
//! to check that a multi-queue wedge is reported for every queue.

use std::path::PathBuf;

use ash::vk;
use hcf::{
    check, run_with_crash_check, validate, BufferInit, Context, ContextInfo, Device,
    DeviceOptions, Flags, QueueType, SubmitBundle,
};

fn record_dispatch(dev: &Device, name: &str, queue_index: usize) -> hcf::Result<vk::CommandBuffer> {
    let pool = dev.command_pool_for_queue(queue_index);
    let recorded = dev.create_and_record_command_buffers(Some(name), Some(pool), |cb| {
        let device = dev.ash();
        unsafe {
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
        }
        Ok(())
    })?;
    Ok(recorded.primary)
}

fn payload(ctx: &Context) -> hcf::Result<()> {
    let mut dev = ctx.single_device();
    dev.allocate_io_buffers(BufferInit::SixtyFourK)?;
    dev.create_descriptor_sets()?;
    let dev = &*dev;

    let gfx_cb = record_dispatch(dev, "HANG Dispatch Graphics", 0)?;
    let compute_cb_1 = record_dispatch(dev, "HANG Dispatch Compute 1", 1)?;
    let compute_cb_2 = record_dispatch(dev, "HANG Dispatch Compute 2", 2)?;

    let submit = |cb| SubmitBundle {
        command_buffers: vec![cb],
        ..Default::default()
    };

    log::info!("Submit Graphics...");
    // Each of these should wedge its queue.
    validate!(submit(gfx_cb).submit_to(dev.ash(), dev.queues()[0], vk::Fence::null()));
    log::info!("Submit Compute 1/2...");
    validate!(submit(compute_cb_1).submit_to(dev.ash(), dev.queues()[1], vk::Fence::null()));
    log::info!("Submit Compute 2/2...");
    validate!(submit(compute_cb_2).submit_to(dev.ash(), dev.queues()[2], vk::Fence::null()));
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
        kernel_path: Some(PathBuf::from("infinite_loop.comp.spv")),
        queues: Some(vec![
            QueueType::Graphics,
            QueueType::Compute,
            QueueType::Compute,
        ]),
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
