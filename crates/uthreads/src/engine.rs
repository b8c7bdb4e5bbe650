// Scheduler internals
// -------------------
// Single OS thread, many user threads. The only source of concurrency is
// the asynchronous delivery of SIGVTALRM from the virtual-time interval
// timer. Every public entry point masks that signal for the duration of the
// call (MaskGuard), so the engine's containers are only ever mutated with
// the timer quiet.
//
// A context switch has exactly one suspension point: the __sigsetjmp call
// inside `switch`. A thread that is switched away from is abandoned right
// there, frame intact on its own stack; when it is resumed, siglongjmp
// re-enters that frame, __sigsetjmp reports a nonzero discriminator, and
// the thread unwinds normally out of whichever call suspended it. The
// restored jump also reinstates the signal mask saved at suspension time,
// which is what re-opens the masked section on the way out.
//
// Terminating the running thread cannot free its record immediately: the
// switch code is still executing on that record's stack until the jump
// away. The record is parked in a one-slot graveyard instead and dropped at
// the top of the next switch, which runs on some other thread's stack.

use std::collections::VecDeque;
use std::process;
use std::ptr;

use crate::context::{__sigsetjmp, siglongjmp};
use crate::error::ThreadError;
use crate::thread::Thread;
use crate::{msg, ThreadEntry, MAX_THREAD_NUM};

/// How the outgoing thread leaves the CPU.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Cycle,
    Terminate,
    Blocked,
}

/// Minimal wrapper to store non-`Sync` types in statics.
///
/// Safety: the timer signal is masked around every mutation, so the signal
/// handler and the API entry points never hold `&mut` at the same time.
pub struct Global<T> {
    inner: core::cell::UnsafeCell<T>,
}

impl<T> Global<T> {
    pub const fn new(value: T) -> Self {
        Self {
            inner: core::cell::UnsafeCell::new(value),
        }
    }

    /// # Safety
    /// Callers must ensure exclusive access or otherwise serialize mutations.
    pub unsafe fn get_mut(&self) -> &mut T {
        unsafe { &mut *self.inner.get() }
    }
}

unsafe impl<T> Sync for Global<T> {}

pub static ENGINE: Global<Option<Engine>> = Global::new(None);

extern "C" fn timer_handler(_sig: libc::c_int) {
    if let Some(engine) = unsafe { ENGINE.get_mut().as_mut() } {
        engine.switch(Action::Cycle);
    }
}

/// Blocks SIGVTALRM on construction, unblocks on drop. A switch that jumps
/// away skips the drop; the resumed context carries the mask saved at its
/// own suspension point, so the unblock still happens exactly once per
/// activation of the frame.
pub struct MaskGuard;

impl MaskGuard {
    pub fn new() -> Self {
        change_mask(libc::SIG_BLOCK);
        MaskGuard
    }
}

impl Drop for MaskGuard {
    fn drop(&mut self) {
        change_mask(libc::SIG_UNBLOCK);
    }
}

fn change_mask(how: libc::c_int) {
    unsafe {
        let mut set: libc::sigset_t = std::mem::zeroed();
        libc::sigemptyset(&mut set);
        libc::sigaddset(&mut set, libc::SIGVTALRM);
        if libc::sigprocmask(how, &set, ptr::null_mut()) == -1 {
            fatal(msg::SIGPROCMASK);
        }
    }
}

pub fn fatal(message: &str) -> ! {
    eprintln!("system error: {message}");
    process::exit(1);
}

pub struct Engine {
    pub running: Box<Thread>,
    ready: VecDeque<Box<Thread>>,
    blocked: Vec<Box<Thread>>,
    tid_in_use: [bool; MAX_THREAD_NUM],
    pub total_quantums: i32,
    timer: libc::itimerval,
    graveyard: Option<Box<Thread>>,
}

impl Engine {
    pub fn new(quantum_usecs: i32) -> Self {
        let mut running = Thread::main();
        running.quantum_count = 1;
        let mut tid_in_use = [false; MAX_THREAD_NUM];
        tid_in_use[0] = true;

        let interval = libc::timeval {
            tv_sec: (quantum_usecs / 1_000_000) as libc::time_t,
            tv_usec: (quantum_usecs % 1_000_000) as libc::suseconds_t,
        };
        Engine {
            running,
            ready: VecDeque::new(),
            blocked: Vec::new(),
            tid_in_use,
            total_quantums: 1,
            timer: libc::itimerval {
                it_interval: interval,
                it_value: interval,
            },
            graveyard: None,
        }
    }

    /// Install the SIGVTALRM handler and arm the virtual timer.
    pub fn start_timer(&mut self) {
        unsafe {
            let mut sa: libc::sigaction = std::mem::zeroed();
            sa.sa_sigaction = timer_handler as extern "C" fn(libc::c_int) as libc::sighandler_t;
            libc::sigemptyset(&mut sa.sa_mask);
            if libc::sigaction(libc::SIGVTALRM, &sa, ptr::null_mut()) < 0 {
                fatal(msg::SIGACTION);
            }
        }
        self.restart_clock();
    }

    fn restart_clock(&mut self) {
        unsafe {
            if libc::setitimer(libc::ITIMER_VIRTUAL, &self.timer, ptr::null_mut()) < 0 {
                fatal(msg::TIMER);
            }
        }
    }

    fn check_tid(&self, tid: i32) -> Result<(), ThreadError> {
        if tid < 0 || tid >= MAX_THREAD_NUM as i32 {
            return Err(ThreadError::InvalidTid);
        }
        if !self.tid_in_use[tid as usize] {
            return Err(ThreadError::UnknownTid);
        }
        Ok(())
    }

    pub fn create_thread(&mut self, entry: ThreadEntry) -> Result<i32, ThreadError> {
        let tid = (1..MAX_THREAD_NUM as i32)
            .find(|&t| !self.tid_in_use[t as usize])
            .ok_or(ThreadError::MaxThreads)?;
        self.tid_in_use[tid as usize] = true;
        self.ready.push_back(Thread::with_entry(tid, entry));
        Ok(tid)
    }

    pub fn terminate(&mut self, tid: i32) -> Result<i32, ThreadError> {
        self.check_tid(tid)?;
        if tid == 0 {
            // Tear everything down right here; no further scheduling.
            self.ready.clear();
            self.blocked.clear();
            process::exit(0);
        }
        self.tid_in_use[tid as usize] = false;
        self.ready.retain(|t| t.tid != tid);
        self.blocked.retain(|t| t.tid != tid);
        if self.running.tid == tid {
            // Does not return: control resumes in the next ready thread.
            self.switch(Action::Terminate);
        }
        Ok(0)
    }

    pub fn block(&mut self, tid: i32) -> Result<i32, ThreadError> {
        self.check_tid(tid)?;
        if tid == 0 {
            return Err(ThreadError::BlockMain);
        }
        // Already blocked or sleeping: just make sure the flag is set, the
        // record stays where it is.
        if let Some(thread) = self.blocked.iter_mut().find(|t| t.tid == tid) {
            thread.blocked = true;
            return Ok(0);
        }
        if let Some(pos) = self.ready.iter().position(|t| t.tid == tid) {
            if let Some(mut thread) = self.ready.remove(pos) {
                thread.blocked = true;
                self.blocked.push(thread);
            }
            return Ok(0);
        }
        if self.running.tid == tid {
            self.running.blocked = true;
            self.switch(Action::Blocked);
        }
        Ok(0)
    }

    pub fn resume(&mut self, tid: i32) -> Result<i32, ThreadError> {
        self.check_tid(tid)?;
        if let Some(pos) = self.blocked.iter().position(|t| t.tid == tid) {
            self.blocked[pos].blocked = false;
            if self.blocked[pos].sleep_remaining == 0 {
                let thread = self.blocked.swap_remove(pos);
                self.ready.push_back(thread);
            }
        }
        // Running or ready threads resume to a no-op.
        Ok(0)
    }

    pub fn sleep(&mut self, num_quantums: i32) -> Result<i32, ThreadError> {
        if num_quantums < 0 {
            return Err(ThreadError::NegativeSleep);
        }
        if self.running.tid == 0 {
            return Err(ThreadError::SleepMain);
        }
        self.running.sleep_remaining = num_quantums;
        self.switch(Action::Blocked);
        Ok(0)
    }

    pub fn quantums_of(&self, tid: i32) -> Result<i32, ThreadError> {
        self.check_tid(tid)?;
        if self.running.tid == tid {
            return Ok(self.running.quantum_count);
        }
        self.ready
            .iter()
            .chain(self.blocked.iter())
            .find(|t| t.tid == tid)
            .map(|t| t.quantum_count)
            .ok_or(ThreadError::UnknownTid)
    }

    /// Every sleeper loses one quantum; the ones that hit zero and are not
    /// explicitly blocked go back to the ready queue.
    fn update_sleep_counters(&mut self) {
        let mut i = 0;
        while i < self.blocked.len() {
            let thread = &mut self.blocked[i];
            if thread.sleep_remaining > 0 {
                thread.sleep_remaining -= 1;
            }
            if thread.sleep_remaining == 0 && !thread.blocked {
                let thread = self.blocked.swap_remove(i);
                self.ready.push_back(thread);
            } else {
                i += 1;
            }
        }
    }

    /// The single suspension point. Saves the outgoing context, disposes of
    /// the outgoing thread per `action`, and jumps into the next ready one.
    pub fn switch(&mut self, action: Action) {
        // Safe to drop now: we are executing on the current thread's stack,
        // never on the one parked here by a previous pass.
        self.graveyard = None;
        self.update_sleep_counters();

        let discriminator = unsafe { __sigsetjmp(&mut self.running.context, 1) };
        if discriminator != 0 {
            // This thread is being re-entered.
            return;
        }

        if action == Action::Cycle && self.ready.is_empty() {
            // Nobody else to run: the same thread continues on a fresh
            // quantum without a restore.
            self.running.quantum_count += 1;
            self.total_quantums += 1;
            return;
        }

        let next = match self.ready.pop_front() {
            Some(thread) => thread,
            None => fatal(msg::EMPTY_READY),
        };
        let outgoing = std::mem::replace(&mut self.running, next);
        match action {
            Action::Cycle => self.ready.push_back(outgoing),
            Action::Terminate => self.graveyard = Some(outgoing),
            Action::Blocked => self.blocked.push(outgoing),
        }

        self.running.quantum_count += 1;
        self.total_quantums += 1;
        self.restart_clock();
        unsafe { siglongjmp(&mut self.running.context, 1) }
    }
}
