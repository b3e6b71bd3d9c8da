use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use log::debug;

/// Time budget for one search.
#[derive(Clone, Copy, Debug)]
pub struct Clock {
    pub think_ms: u64,
    /// Absolute budgets (`movetime`) run to the wire; soft budgets stop
    /// iterating once half the budget is gone.
    pub absolute: bool,
}

/// Think-time allocation from the clock state: spread the remaining time and
/// increments over the expected number of moves, never committing more than a
/// fifteenth of the clock to a single move.
pub fn think_time(my_time_ms: u64, my_inc_ms: u64, movestogo: i32) -> u64 {
    let cur_n_moves = if movestogo <= 0 { 40 } else { movestogo } as u64;
    let think = (my_time_ms + (cur_n_moves - 1) * my_inc_ms) / (cur_n_moves + 7);
    think.min(my_time_ms / 15)
}

/// The time-keeper task: sleeps on a condition variable until the deadline
/// or an external wake-up, then raises the stop flag.
pub struct Timekeeper {
    gate: Arc<(Mutex<bool>, Condvar)>,
}

impl Timekeeper {
    pub fn new() -> Self {
        Self { gate: Arc::new((Mutex::new(false), Condvar::new())) }
    }

    pub fn start(&self, think_ms: u64, stop: Arc<AtomicBool>) -> JoinHandle<()> {
        let gate = Arc::clone(&self.gate);
        *gate.0.lock().unwrap() = false;
        std::thread::spawn(move || {
            let (lock, cv) = &*gate;
            let woken = lock.lock().unwrap();
            let _unused = cv
                .wait_timeout_while(woken, Duration::from_millis(think_ms), |woken| !*woken)
                .unwrap();
            stop.store(true, Ordering::Relaxed);
            debug!("time is up; set stop flag");
        })
    }

    /// Wakes the timer thread early (explicit stop or search finished).
    pub fn wake(&self) {
        let (lock, cv) = &*self.gate;
        *lock.lock().unwrap() = true;
        cv.notify_all();
    }
}

impl Default for Timekeeper {
    fn default() -> Self {
        Self::new()
    }
}
