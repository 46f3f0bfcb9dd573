use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// Single-shot, edge-triggered signal. `set` never suspends the caller and
/// is safe to call more than once; waiters wake up early once it fires.
#[derive(Debug, Default)]
pub struct Signal {
    flag: Mutex<bool>,
    cond: Condvar,
}

impl Signal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        let mut flag = self.flag.lock().unwrap();
        *flag = true;
        self.cond.notify_all();
    }

    pub fn is_set(&self) -> bool {
        *self.flag.lock().unwrap()
    }

    /// Block until the signal fires or the timeout expires, whichever comes
    /// first. Returns the signal state on return.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let flag = self.flag.lock().unwrap();
        let (flag, _timed_out) = self
            .cond
            .wait_timeout_while(flag, timeout, |fired| !*fired)
            .unwrap();
        *flag
    }
}
