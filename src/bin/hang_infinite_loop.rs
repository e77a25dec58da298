//! Hangs the device with a compute kernel that loops forever.
//!
//! The kernel spins while its input reads 65535, so the `SixtyFourK`
//! buffer fill guarantees the dispatch never retires.

use std::path::PathBuf;

use ash::vk;
use hcf::{
    check, run_with_crash_check, validate, BufferInit, Context, ContextInfo, DeviceOptions,
    Flags, SubmitBundle,
};

fn payload(ctx: &Context) -> hcf::Result<()> {
    let mut dev = ctx.single_device();
    dev.allocate_io_buffers(BufferInit::SixtyFourK)?;
    dev.create_descriptor_sets()?;
    let dev = &*dev;

    let hang = dev.create_and_record_command_buffers(Some("HANG Dispatch"), None, |cb| {
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

    let submit = SubmitBundle {
        command_buffers: vec![hang.primary],
        ..Default::default()
    };
    log::info!("Submit 1...");
    // This submission should never complete.
    validate!(submit.submit_to(dev.ash(), dev.queue(), vk::Fence::null()));
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
