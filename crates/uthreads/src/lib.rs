//! A cooperative user-level thread library with virtual-time preemption.
//!
//! Threads are multiplexed onto the one OS thread that called [`init`].
//! Scheduling is round-robin over a FIFO ready queue, driven by
//! `ITIMER_VIRTUAL`: every `quantum_usecs` microseconds of consumed CPU
//! time the running thread is preempted and appended to the back of the
//! queue. Threads can be blocked and resumed by tid, or put to sleep for a
//! number of quantums.
//!
//! The public surface keeps the C-flavoured contract of the original
//! library: operations return -1 after printing a `thread library error:`
//! line for recoverable failures, and unrecoverable OS failures print
//! `system error:` and exit the process with status 1.

mod context;
mod engine;
mod error;
mod thread;

pub use context::ThreadEntry;
pub use error::ThreadError;

use engine::{Engine, MaskGuard, ENGINE};

/// Upper bound on concurrently existing threads, main included.
pub const MAX_THREAD_NUM: usize = 100;
/// Stack size of each spawned thread, in bytes.
pub const STACK_SIZE: usize = 4096;

pub(crate) mod msg {
    pub const TIMER: &str = "set-itimer had failed";
    pub const SIGACTION: &str = "sigaction failed for SIGVTALRM";
    pub const SIGPROCMASK: &str = "sigprocmask failed";
    pub const EMPTY_READY: &str = "no ready thread to schedule";
}

fn report(error: ThreadError) -> i32 {
    eprintln!("thread library error: {error}");
    -1
}

/// Run `op` on the engine with the timer signal masked.
fn guarded(op: impl FnOnce(&mut Engine) -> Result<i32, ThreadError>) -> i32 {
    let _guard = MaskGuard::new();
    match unsafe { ENGINE.get_mut() }.as_mut() {
        None => report(ThreadError::NotInitialized),
        Some(engine) => match op(engine) {
            Ok(value) => value,
            Err(error) => report(error),
        },
    }
}

/// Initialize the library: create the main thread (tid 0) and arm the
/// virtual timer to fire every `quantum_usecs` microseconds.
///
/// Must be called before any other operation. Returns 0 on success, -1 if
/// `quantum_usecs` is negative.
pub fn init(quantum_usecs: i32) -> i32 {
    if quantum_usecs < 0 {
        return report(ThreadError::NegativeQuantum);
    }
    // A previous engine may still have its timer armed.
    let _guard = MaskGuard::new();
    let engine = unsafe { ENGINE.get_mut() };
    *engine = Some(Engine::new(quantum_usecs));
    if let Some(engine) = engine.as_mut() {
        engine.start_timer();
    }
    0
}

/// Create a new thread that will run `entry`, with the smallest free
/// positive tid. The thread is appended to the ready queue. Returns the tid,
/// or -1 if the thread limit is reached.
pub fn spawn(entry: ThreadEntry) -> i32 {
    guarded(|engine| engine.create_thread(entry))
}

/// Terminate the thread `tid` and release its record. Terminating tid 0
/// tears the whole library down and exits the process with status 0.
/// Terminating the running thread switches to the next ready thread and
/// does not return to the caller.
pub fn terminate(tid: i32) -> i32 {
    guarded(|engine| engine.terminate(tid))
}

/// Block the thread `tid` until [`resume`]d. Blocking the running thread
/// switches away immediately. The main thread cannot be blocked.
pub fn block(tid: i32) -> i32 {
    guarded(|engine| engine.block(tid))
}

/// Clear the blocked flag of `tid`. The thread becomes ready unless it is
/// still in the middle of a [`sleep`]. Resuming a thread that is not
/// blocked is a no-op that succeeds.
pub fn resume(tid: i32) -> i32 {
    guarded(|engine| engine.resume(tid))
}

/// Put the running thread to sleep for `num_quantums` further quantums.
/// Rejected for the main thread and for negative counts.
pub fn sleep(num_quantums: i32) -> i32 {
    guarded(|engine| engine.sleep(num_quantums))
}

/// The tid of the running thread, or -1 before [`init`].
pub fn get_tid() -> i32 {
    guarded(|engine| Ok(engine.running.tid))
}

/// Total number of quantums started since [`init`], the initial scheduling
/// of the main thread included. Returns -1 before [`init`].
pub fn get_total_quantums() -> i32 {
    guarded(|engine| Ok(engine.total_quantums))
}

/// Number of quantums the thread `tid` has been scheduled for, the running
/// one's current quantum included.
pub fn get_quantums(tid: i32) -> i32 {
    guarded(|engine| engine.quantums_of(tid))
}
