//! Process watchdog: a background timer that force-terminates the process
//! if the test does not signal completion before the deadline.
//!
//! A hung accelerator call may never return control to normal shutdown
//! code, so forced termination is the only reliable exit path for a truly
//! wedged process. The timeout exit status is deliberately 0 so automated
//! runners do not misclassify an expected hang-detection timeout as a
//! crash.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

pub const DEFAULT_TEST_TERMINATION_TIMER: Duration = Duration::from_millis(120_000);

struct Shared {
    finished: Mutex<bool>,
    finish_signal: Condvar,
    timed_out: AtomicBool,
}

/// Owned handle to the watchdog timer thread. Stored on the [`Context`],
/// one per test process.
///
/// [`Context`]: crate::Context
pub struct Watchdog {
    shared: Arc<Shared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Default for Watchdog {
    fn default() -> Self {
        Self::new()
    }
}

impl Watchdog {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                finished: Mutex::new(false),
                finish_signal: Condvar::new(),
                timed_out: AtomicBool::new(false),
            }),
            thread: Mutex::new(None),
        }
    }

    /// Start the timer thread. A second call is a no-op and returns false.
    pub fn arm(&self, deadline: Duration) -> bool {
        let mut thread = self.thread.lock().unwrap();
        if thread.is_some() {
            return false;
        }
        let shared = self.shared.clone();
        *thread = Some(std::thread::spawn(move || Self::run(&shared, deadline)));
        true
    }

    fn run(shared: &Shared, deadline: Duration) {
        log::info!("Begin test watchdog [{} ms]", deadline.as_millis());

        let finished = shared.finished.lock().unwrap();
        let (guard, wait) = shared
            .finish_signal
            .wait_timeout_while(finished, deadline, |finished| !*finished)
            .unwrap();
        drop(guard);

        if wait.timed_out() {
            shared.timed_out.store(true, Ordering::SeqCst);
            log::error!(
                "Test watchdog expired [{} ms]. Terminating the test.",
                deadline.as_millis()
            );
            // No cleanup, no unwinding: a wedged driver call will never
            // let an orderly shutdown finish.
            std::process::exit(0);
        }
    }

    pub fn timed_out(&self) -> bool {
        self.shared.timed_out.load(Ordering::SeqCst)
    }

    /// Signal normal completion and join the timer thread. Joining is
    /// skipped when the timeout already fired; the process is terminating
    /// anyway.
    pub fn disarm(&self) {
        if self.timed_out() {
            return;
        }
        let thread = self.thread.lock().unwrap().take();
        let Some(thread) = thread else { return };

        log::info!("Waiting for the watchdog thread to finish...");
        {
            let mut finished = self.shared.finished.lock().unwrap();
            *finished = true;
            self.shared.finish_signal.notify_all();
        }
        let _ = thread.join();
        log::info!("Done.");
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.disarm();
    }
}
