//! Hangs the queue on an event that is never signaled from the host.

use std::path::PathBuf;

use ash::vk;
use hcf::{
    check, run_with_crash_check, validate, BufferInit, Context, ContextInfo, Device,
    DeviceOptions, Flags, SubmitBundle,
};

fn bind_and_dispatch(dev: &Device, cb: vk::CommandBuffer) {
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
}

fn payload(ctx: &Context) -> hcf::Result<()> {
    let mut dev = ctx.single_device();
    dev.allocate_io_buffers(BufferInit::Default)?;
    dev.create_descriptor_sets()?;
    let dev = &*dev;

    let hang = dev.create_and_record_command_buffers(Some("HANG Dispatch and Wait"), None, |cb| {
        bind_and_dispatch(dev, cb);
        dev.wait_on_event_that_never_signals(cb)?;
        // dispatch again to see if commands execute past the wait
        unsafe { dev.ash().cmd_dispatch(cb, 1, 1, 1) };
        Ok(())
    })?;

    let probe = dev.create_and_record_command_buffers(Some("Dispatch for validation"), None, |cb| {
        bind_and_dispatch(dev, cb);
        Ok(())
    })?;

    // Submit the wait that never resolves, idle-wait, then submit a probe
    // to see whether the queue still makes progress.
    let hang_submit = SubmitBundle {
        command_buffers: vec![hang.primary],
        ..Default::default()
    };
    log::info!("Submit 1...");
    validate!(hang_submit.submit_to(dev.ash(), dev.queue(), vk::Fence::null()));

    // Some drivers report VK_SUCCESS here even though the queue is wedged.
    log::info!("Wait for idle...");
    validate!(unsafe { dev.ash().queue_wait_idle(dev.queue()) });

    log::info!("Submit 2...");
    let probe_submit = SubmitBundle {
        command_buffers: vec![probe.primary],
        ..Default::default()
    };
    validate!(probe_submit.submit_to(dev.ash(), dev.queue(), vk::Fence::null()));

    log::info!("Waiting for idle...");
    // Not expected to be reached; a previous call should report device loss.
    validate!(unsafe { dev.ash().queue_wait_idle(dev.queue()) });
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
        kernel_path: Some(PathBuf::from("read_write.comp.spv")),
        ..DeviceOptions::from_flags(&flags)
    };
    if let Err(err) = ctx.init_device(&options) {
        log::error!("Unable to create the test device: {err}");
        std::process::exit(1);
    }
    ctx.arm_watchdog();
    log::info!("starting the test...");

    check!(run_with_crash_check(&ctx, payload));

    ctx.cleanup();
}
