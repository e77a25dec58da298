//! Shared initialization and orchestration layer for the HCF ("Halt And
//! Catch Fire") diagnostic programs.
//!
//! Each scenario binary creates a [`Context`], provisions buffers and a
//! trivial compute pipeline on one or more logical [`Device`]s, arms the
//! process watchdog, and then submits command buffers that intentionally
//! misbehave. The [`run_with_crash_check`] envelope positively detects the
//! resulting device loss even when a plain idle-wait fails to report it.

pub mod context;
pub mod crash_check;
pub mod device;
pub mod error;
pub mod flags;
pub mod resources;
pub mod select;
pub mod submit;
pub mod watchdog;

pub use context::{Context, ContextInfo, DeviceOptions};
pub use crash_check::run_with_crash_check;
pub use device::{Device, DeviceCaps, IoBuffers, BUFFER_SIZE, NUM_BUFFER_ENTRIES};
pub use error::{HcfError, Result};
pub use flags::Flags;
pub use resources::{load_shader, read_spirv, BufferInit};
pub use select::{find_memory_type, select_queue_family, QueueType};
pub use submit::{RecordedCommands, SemaphoreKind, SubmitBundle, TimelineValues};
pub use watchdog::{Watchdog, DEFAULT_TEST_TERMINATION_TIMER};

/// Initialize stderr logging for a scenario binary.
///
/// Defaults to `info` so the scenario milestones are always visible; these
/// programs exist to be watched by an external diagnostic layer.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    )
    .format_timestamp(None)
    .try_init();
}
