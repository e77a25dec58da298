use std::path::PathBuf;

use ash::vk;
use thiserror::Error;

use crate::select::QueueType;

#[derive(Debug, Error)]
pub enum HcfError {
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),
    #[error("failed to load the Vulkan library: {0}")]
    Loading(#[from] ash::LoadingError),
    #[error("unable to find a compatible Vulkan driver")]
    IncompatibleDriver,
    #[error("no physical devices available")]
    NoPhysicalDevices,
    #[error("no queue family matches the requested {0:?} class")]
    NoMatchingQueueFamily(QueueType),
    #[error("no memory type satisfies the requested property flags")]
    NoMatchingMemoryType,
    #[error("invalid kernel file {path:?}: {source}")]
    KernelIo {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid kernel length in {0:?}: not a whole number of SPIR-V words")]
    KernelLength(PathBuf),
}

/// Convenient crate-wide result type.
pub type Result<T, E = HcfError> = std::result::Result<T, E>;

/// Fatal-assert policy: any unexpected failure from a setup call logs the
/// error and location, then aborts the process via panic. Used where a
/// failure means the scenario cannot meaningfully run at all.
#[macro_export]
macro_rules! check {
    ($call:expr) => {
        match $call {
            Ok(val) => val,
            Err(err) => {
                log::error!("Fatal : {} in {} at line {}", err, file!(), line!());
                panic!("unexpected failure: {}", err);
            }
        }
    };
}

/// Validate-and-exit policy: logs the failure, then exits cleanly with
/// status 0. Used for submission/wait calls inside hang/crash scenarios so
/// an *expected* device-loss error does not register as a test crash.
#[macro_export]
macro_rules! validate {
    ($call:expr) => {
        match $call {
            Ok(val) => val,
            Err(err) => {
                log::error!("Fatal : {} in {} at line {}", err, file!(), line!());
                std::process::exit(0);
            }
        }
    };
}
