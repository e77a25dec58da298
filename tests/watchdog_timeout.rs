//! End-to-end watchdog behavior: a process whose deadline expires must
//! terminate with exit status 0 close to the deadline.

use std::process::Command;
use std::time::{Duration, Instant};

use hcf::Watchdog;

const CHILD_ENV: &str = "HCF_WATCHDOG_CHILD";

#[test]
fn watchdog_expiry_exits_zero() {
    if std::env::var_os(CHILD_ENV).is_some() {
        // Child mode: arm a short deadline and block well past it. The
        // watchdog must terminate the process before the sleep finishes.
        let watchdog = Watchdog::new();
        assert!(watchdog.arm(Duration::from_millis(200)));
        std::thread::sleep(Duration::from_secs(60));
        unreachable!("watchdog did not fire");
    }

    let start = Instant::now();
    let status = Command::new(std::env::current_exe().unwrap())
        .args(["--exact", "watchdog_expiry_exits_zero", "--nocapture"])
        .env(CHILD_ENV, "1")
        .status()
        .unwrap();
    let elapsed = start.elapsed();

    assert!(status.success(), "expected exit status 0, got {status}");
    assert!(elapsed >= Duration::from_millis(200));
    assert!(
        elapsed < Duration::from_secs(30),
        "watchdog took too long: {elapsed:?}"
    );
}
