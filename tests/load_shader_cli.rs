//! Argument handling of the `load_shader` utility. These paths fail before
//! any Vulkan call, so no driver is needed.

use std::process::Command;

#[test]
fn no_arguments_prints_usage_and_fails() {
    let output = Command::new(env!("CARGO_BIN_EXE_load_shader"))
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("USAGE:"));
}

#[test]
fn option_without_value_prints_usage_and_fails() {
    // The trailing positional is the kernel path, so "-d" is left with no
    // value to consume.
    let output = Command::new(env!("CARGO_BIN_EXE_load_shader"))
        .args(["-d", "kernel.spv"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Missing value for option"));
    assert!(stderr.contains("USAGE:"));
}

#[test]
fn unknown_option_prints_usage_and_fails() {
    let output = Command::new(env!("CARGO_BIN_EXE_load_shader"))
        .args(["-x", "1", "kernel.spv"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Unknown option"));
    assert!(stderr.contains("USAGE:"));
}
