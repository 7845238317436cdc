use std::sync::{Condvar, Mutex};
use std::thread::{self, ThreadId};

/// Device-level blocked-state machine (§4.4). `NotBlocked` is both
/// the initial and the steady "available" state; there is no
/// terminal state, the device lives for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockedState {
    NotBlocked,
    Unmounted,
    WaitingForSysop,
    DoingAcquire,
    WritingLabel,
    UnmountedWaitingForSysop,
    Mount,
    Despooling,
    Releasing,
}

struct LockState {
    held: bool,
    holder: Option<ThreadId>,
    depth: u32,
    blocked: BlockedState,
    no_wait_id: Option<ThreadId>,
}

/// The device's recursive lock (`rLock`/`rUnlock`, §4.4). A thread
/// that has put the device into a blocked state (via `block_device`)
/// may re-enter the lock any number of times while every other thread
/// waits on the condition variable; once unblocked, the lock behaves
/// like an ordinary mutex.
pub struct DeviceLock {
    state: Mutex<LockState>,
    cond: Condvar,
}

impl DeviceLock {
    pub fn new() -> Self {
        DeviceLock {
            state: Mutex::new(LockState {
                held: false,
                holder: None,
                depth: 0,
                blocked: BlockedState::NotBlocked,
                no_wait_id: None,
            }),
            cond: Condvar::new(),
        }
    }

    pub fn rlock(&self) -> DeviceLockGuard<'_> {
        let me = thread::current().id();
        let mut st = self.state.lock().unwrap();
        loop {
            if !st.held {
                st.held = true;
                st.holder = Some(me);
                st.depth = 1;
                break;
            }
            let am_blocker = st.no_wait_id == Some(me);
            if st.holder == Some(me) && am_blocker {
                st.depth += 1;
                break;
            }
            st = self.cond.wait(st).unwrap();
        }
        DeviceLockGuard { lock: self }
    }

    fn runlock(&self) {
        let mut st = self.state.lock().unwrap();
        st.depth = st.depth.saturating_sub(1);
        if st.depth == 0 {
            st.held = false;
            st.holder = None;
            self.cond.notify_all();
        }
    }

    /// Requires the caller already holds the lock (`guard`). Installs
    /// `new_state` and records the current thread as the one thread
    /// permitted to keep re-entering the lock while blocked.
    pub fn block_device(&self, _guard: &DeviceLockGuard<'_>, new_state: BlockedState) {
        let mut st = self.state.lock().unwrap();
        st.blocked = new_state;
        st.no_wait_id = Some(thread::current().id());
    }

    pub fn unblock_device(&self) {
        let mut st = self.state.lock().unwrap();
        st.blocked = BlockedState::NotBlocked;
        st.no_wait_id = None;
        self.cond.notify_all();
    }

    pub fn blocked_state(&self) -> BlockedState {
        self.state.lock().unwrap().blocked
    }

    /// Atomically records the current blocked state, installs a new
    /// one, and releases the raw mutex (used by the mount subsystem
    /// to publish "waiting for operator" without holding the device
    /// lock across the whole wait).
    pub fn steal_device_lock(&self, new_state: BlockedState) -> BlockedState {
        let mut st = self.state.lock().unwrap();
        let previous = st.blocked;
        st.blocked = new_state;
        st.no_wait_id = Some(thread::current().id());
        previous
    }

    pub fn give_back_device_lock(&self, saved_state: BlockedState) {
        let mut st = self.state.lock().unwrap();
        st.blocked = saved_state;
        if saved_state == BlockedState::NotBlocked {
            st.no_wait_id = None;
        }
        self.cond.notify_all();
    }
}

impl Default for DeviceLock {
    fn default() -> Self {
        Self::new()
    }
}

pub struct DeviceLockGuard<'a> {
    lock: &'a DeviceLock,
}

impl Drop for DeviceLockGuard<'_> {
    fn drop(&mut self) {
        self.lock.runlock();
    }
}
