//! Logical timer driving view changes and block pacing.
//!
//! The engine never reads a clock directly: it asks its [`Timer`] for the
//! current time, schedules a single pending fire tagged with a
//! `(height, view)` pair, and expects the host's event loop to feed fires
//! back through `Dbft::on_timeout`. Stale fires are ignored by the engine,
//! not by the timer.

use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// The `(height, view)` a timer fire was scheduled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeightView {
    pub height: u32,
    pub view: u8,
}

/// Clock and single-slot alarm used by the engine.
///
/// At most one fire is pending at a time; [`Timer::reset`] supersedes any
/// earlier schedule. How fires are delivered is the implementation's
/// business: [`ThreadTimer`] sends them over a channel, [`ManualTimer`]
/// hands them to the test driver.
pub trait Timer: Send {
    /// Current time in milliseconds since the Unix epoch (or the test
    /// clock's equivalent).
    fn now_ms(&self) -> u64;

    /// Cancel any pending fire and schedule a new one after `delay`.
    fn reset(&mut self, hv: HeightView, delay: Duration);

    /// Push the pending fire further out by `delta`. No-op when nothing is
    /// pending.
    fn extend(&mut self, delta: Duration);

    /// Cancel the pending fire.
    fn stop(&mut self);
}

struct ThreadTimerState {
    pending: Option<(HeightView, Instant)>,
    shutdown: bool,
}

/// Wall-clock timer backed by a worker thread.
///
/// Fires are delivered on the channel returned by [`ThreadTimer::spawn`];
/// the host's event loop reads it and calls `Dbft::on_timeout`.
pub struct ThreadTimer {
    state: Arc<(Mutex<ThreadTimerState>, Condvar)>,
    worker: Option<thread::JoinHandle<()>>,
}

impl ThreadTimer {
    /// Start the worker thread and return the timer plus its fire channel.
    pub fn spawn() -> (Self, mpsc::Receiver<HeightView>) {
        let (tx, rx) = mpsc::channel();
        let state = Arc::new((
            Mutex::new(ThreadTimerState {
                pending: None,
                shutdown: false,
            }),
            Condvar::new(),
        ));

        let worker_state = Arc::clone(&state);
        let worker = thread::spawn(move || {
            let (lock, cond) = &*worker_state;
            let mut guard = lock.lock().expect("timer state poisoned");
            loop {
                if guard.shutdown {
                    break;
                }
                match guard.pending {
                    None => {
                        guard = cond.wait(guard).expect("timer state poisoned");
                    }
                    Some((hv, deadline)) => {
                        let now = Instant::now();
                        if now >= deadline {
                            guard.pending = None;
                            // Receiver gone means the host is shutting down.
                            if tx.send(hv).is_err() {
                                break;
                            }
                        } else {
                            let (g, _) = cond
                                .wait_timeout(guard, deadline - now)
                                .expect("timer state poisoned");
                            guard = g;
                        }
                    }
                }
            }
        });

        (
            Self {
                state,
                worker: Some(worker),
            },
            rx,
        )
    }
}

impl Timer for ThreadTimer {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }

    fn reset(&mut self, hv: HeightView, delay: Duration) {
        let (lock, cond) = &*self.state;
        let mut guard = lock.lock().expect("timer state poisoned");
        guard.pending = Some((hv, Instant::now() + delay));
        cond.notify_one();
    }

    fn extend(&mut self, delta: Duration) {
        let (lock, cond) = &*self.state;
        let mut guard = lock.lock().expect("timer state poisoned");
        if let Some((_, deadline)) = &mut guard.pending {
            *deadline += delta;
            cond.notify_one();
        }
    }

    fn stop(&mut self) {
        let (lock, cond) = &*self.state;
        let mut guard = lock.lock().expect("timer state poisoned");
        guard.pending = None;
        cond.notify_one();
    }
}

impl Drop for ThreadTimer {
    fn drop(&mut self) {
        let (lock, cond) = &*self.state;
        if let Ok(mut guard) = lock.lock() {
            guard.shutdown = true;
            cond.notify_one();
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

#[derive(Default)]
struct ManualTimerState {
    now_ms: u64,
    pending: Option<(HeightView, u64)>,
}

/// Test clock with an explicitly driven fire slot.
///
/// Clones share state, so a test can keep one handle while the engine owns
/// another. Time only moves when the test says so.
#[derive(Clone, Default)]
pub struct ManualTimer {
    inner: Arc<Mutex<ManualTimerState>>,
}

impl ManualTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_now(&self, now_ms: u64) {
        self.inner.lock().expect("timer state poisoned").now_ms = now_ms;
    }

    pub fn advance(&self, delta_ms: u64) {
        self.inner.lock().expect("timer state poisoned").now_ms += delta_ms;
    }

    /// The pending fire and its absolute deadline, if any.
    pub fn pending(&self) -> Option<(HeightView, u64)> {
        self.inner.lock().expect("timer state poisoned").pending
    }

    /// Take the pending fire if its deadline has passed.
    pub fn pop_due(&self) -> Option<HeightView> {
        let mut state = self.inner.lock().expect("timer state poisoned");
        match state.pending {
            Some((hv, deadline)) if state.now_ms >= deadline => {
                state.pending = None;
                Some(hv)
            }
            _ => None,
        }
    }

    /// Take the pending fire regardless of its deadline, simulating the
    /// wait having elapsed.
    pub fn pop_pending(&self) -> Option<HeightView> {
        let mut state = self.inner.lock().expect("timer state poisoned");
        state.pending.take().map(|(hv, _)| hv)
    }
}

impl Timer for ManualTimer {
    fn now_ms(&self) -> u64 {
        self.inner.lock().expect("timer state poisoned").now_ms
    }

    fn reset(&mut self, hv: HeightView, delay: Duration) {
        let mut state = self.inner.lock().expect("timer state poisoned");
        let deadline = state.now_ms + delay.as_millis() as u64;
        state.pending = Some((hv, deadline));
    }

    fn extend(&mut self, delta: Duration) {
        let mut state = self.inner.lock().expect("timer state poisoned");
        if let Some((_, deadline)) = &mut state.pending {
            *deadline += delta.as_millis() as u64;
        }
    }

    fn stop(&mut self) {
        self.inner.lock().expect("timer state poisoned").pending = None;
    }
}
