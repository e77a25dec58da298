//! Signals mixed binary/timeline semaphore sets through queue submits and
//! sparse binds, then hangs on a wait for timeline values never reached.
//!
//! Semaphore bookkeeping across the steps:
//! binary:   [0 0 0 0 0 0 0 0 0 0] -> [1 0 0 0 1 0 0 0 0 0]
//!        -> [0 0 1 0 1 0 1 0 0 0] -> [0 0 1 0 0 0 1 1 0 0]
//! timeline: [10 .. 10] -> [11 10 10 10 12 10 10 10 13 10]
//!        -> [11 14 10 10 12 15 10 10 13 16] -> [17 18 19 10 12 15 10 10 13 16]
//! The final submission waits for value 100 on all twenty.

use std::path::PathBuf;

use ash::vk;
use hcf::{
    check, run_with_crash_check, validate, BufferInit, Context, ContextInfo, DeviceOptions,
    Flags, SubmitBundle, TimelineValues,
};

const NUM_BINARY_SEMAPHORES: usize = 10;
const NUM_TIMELINE_SEMAPHORES: usize = 10;
const FENCE_TIMEOUT_NS: u64 = 30_000_000_000;

fn wait_fence(device: &ash::Device, fence: vk::Fence) {
    match unsafe { device.wait_for_fences(&[fence], true, FENCE_TIMEOUT_NS) } {
        Err(vk::Result::TIMEOUT) => log::info!("TIMEOUT"),
        result => validate!(result),
    }
    log::info!("Fence signal received.");
}

fn reset_fence(device: &ash::Device, fence: vk::Fence) {
    log::info!("Resetting the fence...");
    validate!(unsafe { device.reset_fences(&[fence]) });
}

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

    log::info!("Creating fence...");
    let fence_info = vk::FenceCreateInfo::builder();
    let fence = unsafe { device.create_fence(&fence_info, None)? };
    dev.caps().set_object_name(fence, vk::ObjectType::FENCE, "Fence");

    log::info!("Creating binary semaphores...");
    let binary = dev.create_binary_semaphores(NUM_BINARY_SEMAPHORES)?;
    for (i, semaphore) in binary.iter().enumerate() {
        dev.caps().set_object_name(
            *semaphore,
            vk::ObjectType::SEMAPHORE,
            &format!("Binary Semaphore {i}"),
        );
    }

    log::info!("Creating timeline semaphores...");
    let timeline = dev.create_timeline_semaphores(NUM_TIMELINE_SEMAPHORES, 10)?;
    for (i, semaphore) in timeline.iter().enumerate() {
        dev.caps().set_object_name(
            *semaphore,
            vk::ObjectType::SEMAPHORE,
            &format!("Timeline Semaphore {i}"),
        );
    }

    log::info!("Creating and submitting VkSubmitInfo...");
    let submit = SubmitBundle {
        command_buffers: vec![cb],
        signal_semaphores: vec![binary[0], binary[4], timeline[0], timeline[4], timeline[8]],
        timeline: Some(TimelineValues {
            wait_values: vec![],
            signal_values: vec![1, 1, 11, 12, 13],
        }),
        ..Default::default()
    };
    validate!(submit.submit_to(device, dev.queue(), fence));
    log::info!("Done.");

    log::info!("Waiting for fence from vkQueueSubmit...");
    wait_fence(device, fence);
    reset_fence(device, fence);

    log::info!("Creating and submitting VkBindSparseInfo1 with fence...");
    let bind1 = SubmitBundle {
        wait_semaphores: vec![binary[0], timeline[8]],
        wait_stage_masks: vec![vk::PipelineStageFlags::ALL_GRAPHICS; 2],
        signal_semaphores: vec![binary[2], binary[6], timeline[1], timeline[5], timeline[9]],
        timeline: Some(TimelineValues {
            wait_values: vec![1, 13],
            signal_values: vec![1, 1, 14, 15, 16],
        }),
        ..Default::default()
    };
    validate!(bind1.bind_sparse_to(device, dev.queue(), fence));
    log::info!("Done.");

    log::info!("Waiting for fence from vkQueueBindSparse1...");
    wait_fence(device, fence);
    reset_fence(device, fence);

    log::info!("Creating and submitting VkBindSparseInfo2 with fence...");
    let bind2 = SubmitBundle {
        wait_semaphores: vec![binary[4], timeline[8]],
        wait_stage_masks: vec![vk::PipelineStageFlags::ALL_GRAPHICS; 2],
        signal_semaphores: vec![binary[2], binary[7], timeline[0], timeline[1], timeline[2]],
        timeline: Some(TimelineValues {
            wait_values: vec![1, 13],
            signal_values: vec![1, 1, 17, 18, 19],
        }),
        ..Default::default()
    };
    validate!(bind2.bind_sparse_to(device, dev.queue(), fence));
    log::info!("Done.");

    log::info!("Waiting for fence from vkQueueBindSparse2...");
    wait_fence(device, fence);
    reset_fence(device, fence);

    log::info!("Creating and submitting VkSubmitInfo2 that waits on all the semaphores...");
    let all: Vec<vk::Semaphore> = binary.iter().chain(timeline.iter()).copied().collect();
    let count = all.len();
    let wait_all = SubmitBundle {
        command_buffers: vec![cb],
        wait_semaphores: all,
        wait_stage_masks: vec![vk::PipelineStageFlags::ALL_GRAPHICS; count],
        timeline: Some(TimelineValues {
            wait_values: vec![100; count],
            signal_values: vec![],
        }),
        ..Default::default()
    };
    validate!(wait_all.submit_to(device, dev.queue(), fence));
    log::info!("Done.");
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
