//! Standalone kernel loader: brings up an instance and a queue-less device
//! with user-chosen extensions/layers and builds a shader module from the
//! SPIR-V file given as the last argument.

use std::ffi::CString;
use std::path::Path;

use ash::vk;
use hcf::{Context, ContextInfo, DeviceOptions};

fn print_usage() {
    eprintln!(
        "USAGE: [-v vulkan version] [-d device extensions] [-i instance extension] \
         [-l layer] spirv-file"
    );
    eprintln!("\tMultiple extensions and layer can be enabled by passing multiple -i/-d/-l options");
}

fn to_cstring(value: &str) -> CString {
    CString::new(value).unwrap_or_else(|_| {
        eprintln!("Invalid name: \"{value}\"");
        std::process::exit(1);
    })
}

fn main() {
    hcf::init_logging();
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    let mut info = ContextInfo::default();
    let mut device_extensions = Vec::new();

    let (kernel, options) = match args[1..].split_last() {
        Some(split) => split,
        None => {
            print_usage();
            std::process::exit(1);
        }
    };
    let mut iter = options.iter();
    while let Some(option) = iter.next() {
        let value = match iter.next() {
            Some(value) => value,
            None => {
                eprintln!("Missing value for option \"{option}\"");
                print_usage();
                std::process::exit(1);
            }
        };
        match option.as_str() {
            "-i" | "--instance" => {
                println!("Using instance extension: \"{value}\"");
                info.instance_extensions.push(to_cstring(value));
            }
            "-d" | "--device" => {
                println!("Using device extension: \"{value}\"");
                device_extensions.push(to_cstring(value));
            }
            "-l" | "--layer" => {
                println!("Using instance layers: \"{value}\"");
                info.instance_layers.push(to_cstring(value));
            }
            "-v" | "--version" => {
                println!("Vulkan version: \"{value}\"");
                info.api_version = match value.as_str() {
                    "1.0" => vk::API_VERSION_1_0,
                    "1.1" => vk::API_VERSION_1_1,
                    other => {
                        eprintln!("Unknown Vulkan version \"{other}\"");
                        std::process::exit(1);
                    }
                };
            }
            other => {
                eprintln!("Unknown option \"{other}\"");
                print_usage();
                std::process::exit(1);
            }
        }
    }

    println!("Loading shader \"{kernel}\"");

    let ctx = match Context::new(info) {
        Ok(ctx) => ctx,
        Err(err) => {
            log::error!("Unable to initialize Vulkan: {err}");
            std::process::exit(1);
        }
    };
    let device_options = DeviceOptions {
        extensions: device_extensions,
        queues: Some(Vec::new()),
        ..Default::default()
    };
    if let Err(err) = ctx.init_device(&device_options) {
        log::error!("Unable to create the device: {err}");
        std::process::exit(1);
    }

    let dev = ctx.single_device();
    if let Err(err) = hcf::load_shader(dev.ash(), Path::new(kernel)) {
        log::error!("Unable to load the shader: {err}");
        std::process::exit(1);
    }
    drop(dev);

    ctx.cleanup();
}
