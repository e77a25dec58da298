//! Runs a benign dispatch on two extra devices, deletes one, then hangs a
//! third. The hang report must only implicate the hanging device.

use std::path::PathBuf;

use ash::vk;
use hcf::{validate, BufferInit, Context, ContextInfo, Device, DeviceOptions, Flags, SubmitBundle};

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

fn run_round(ctx: &Context, raw: vk::Device, run_hang_host_event: bool) -> hcf::Result<()> {
    let mut dev = ctx.device(raw).expect("device not registered");
    dev.allocate_io_buffers(BufferInit::Default)?;
    dev.create_descriptor_sets()?;
    let dev = &*dev;
    let device = dev.ash();

    let hang_cb = dev.allocate_command_buffer(vk::CommandBufferLevel::PRIMARY, dev.command_pool())?;
    dev.caps()
        .set_object_name(hang_cb, vk::ObjectType::COMMAND_BUFFER, "CommandBuffer 1");
    let probe_cb = dev.allocate_command_buffer(vk::CommandBufferLevel::PRIMARY, dev.command_pool())?;
    dev.caps()
        .set_object_name(probe_cb, vk::ObjectType::COMMAND_BUFFER, "CommandBuffer 2");

    let begin_info = vk::CommandBufferBeginInfo::builder();
    unsafe {
        device.begin_command_buffer(probe_cb, &begin_info)?;
    }
    bind_and_dispatch(dev, probe_cb);
    unsafe {
        device.end_command_buffer(probe_cb)?;
        device.begin_command_buffer(hang_cb, &begin_info)?;
    }
    bind_and_dispatch(dev, hang_cb);

    if run_hang_host_event {
        dev.wait_on_event_that_never_signals(hang_cb)?;
        unsafe {
            device.cmd_dispatch(hang_cb, 1, 1, 1);
            device.end_command_buffer(hang_cb)?;
        }

        let hang_submit = SubmitBundle {
            command_buffers: vec![hang_cb],
            ..Default::default()
        };
        log::info!("Submit 1...");
        validate!(hang_submit.submit_to(device, dev.queue(), vk::Fence::null()));

        log::info!("Wait for idle...");
        validate!(unsafe { device.queue_wait_idle(dev.queue()) });

        log::info!("Submit 2...");
        let probe_submit = SubmitBundle {
            command_buffers: vec![probe_cb],
            ..Default::default()
        };
        validate!(probe_submit.submit_to(device, dev.queue(), vk::Fence::null()));
    }

    log::info!("Waiting for idle...");
    validate!(unsafe { device.queue_wait_idle(dev.queue()) });
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
    let mut devices = Vec::new();
    for _ in 0..3 {
        match ctx.init_device(&options) {
            Ok(raw) => devices.push(raw),
            Err(err) => {
                log::error!("Unable to create a test device: {err}");
                std::process::exit(1);
            }
        }
    }
    ctx.arm_watchdog();

    validate!(run_round(&ctx, devices[0], false));
    // Intentionally keep the first device alive.

    validate!(run_round(&ctx, devices[1], false));
    ctx.delete_device(devices[1]);

    validate!(run_round(&ctx, devices[2], true));

    ctx.cleanup();
}
