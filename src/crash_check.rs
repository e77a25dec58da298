//! Positive hang/crash detection envelope.
//!
//! An idle-wait alone may return VK_SUCCESS on some drivers even after the
//! device was lost, so the envelope submits an empty sentinel command
//! buffer with a fence after the payload and waits on the fence with a
//! bounded timeout. The fence wait is the authoritative detector; the
//! surrounding idle-waits report early losses when the driver does notice.

use ash::vk;

use crate::context::Context;
use crate::error::Result;

/// Upper bound on the sentinel fence wait. A healthy device completes an
/// empty submission in microseconds.
const CRASH_CHECK_FENCE_TIMEOUT_NS: u64 = 30_000_000_000;

/// Run a scenario payload between crash-check bookends on the context's
/// single device. Any device-loss error from the submission or the waits
/// propagates to the caller.
pub fn run_with_crash_check<F>(ctx: &Context, work: F) -> Result<()>
where
    F: FnOnce(&Context) -> Result<()>,
{
    // The sentinel is prepared up front while the device is healthy; the
    // registry guard is released before the payload runs so the payload can
    // take it again.
    let (device, queue, sentinel, fence) = {
        let dev = ctx.single_device();
        let sentinel =
            dev.allocate_command_buffer(vk::CommandBufferLevel::PRIMARY, dev.command_pool())?;
        dev.begin_and_end_command_buffer(sentinel)?;
        dev.caps().set_object_name(
            sentinel,
            vk::ObjectType::COMMAND_BUFFER,
            "Hang/crash detection CommandBuffer",
        );
        let fence_info = vk::FenceCreateInfo::builder();
        let fence = unsafe { dev.ash().create_fence(&fence_info, None)? };
        dev.caps()
            .set_object_name(fence, vk::ObjectType::FENCE, "Hang/crash detection Fence");
        (dev.ash().clone(), dev.queue(), sentinel, fence)
    };

    work(ctx)?;

    log::info!("Waiting for idle...");
    unsafe { device.queue_wait_idle(queue)? };

    log::info!("Submit empty command buffer...");
    let buffers = [sentinel];
    let submit = vk::SubmitInfo::builder().command_buffers(&buffers);
    unsafe { device.queue_submit(queue, &[submit.build()], fence)? };
    unsafe { device.wait_for_fences(&[fence], true, CRASH_CHECK_FENCE_TIMEOUT_NS)? };

    log::info!("[NOT REACHABLE(if crash/hang)] Waiting for idle...");
    unsafe { device.queue_wait_idle(queue)? };
    Ok(())
}
