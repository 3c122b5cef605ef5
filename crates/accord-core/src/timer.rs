use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

pub type WakeupFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
pub type WakeupHandler = Box<dyn FnOnce() -> WakeupFuture + Send>;

/// External timer collaborator. The host only registers wakeups; when and how
/// ticks advance is the embedder's business.
pub trait TimerService: Send + Sync {
    fn set_wakeup(&self, deadline: u64, handler: WakeupHandler);
}

struct Wakeup {
    deadline: u64,
    seq: u64,
    handler: WakeupHandler,
}

struct TimerState {
    now: u64,
    next_seq: u64,
    pending: Vec<Wakeup>,
}

/// Deterministic timer driven by explicit `advance_to` calls.
///
/// Handlers fire in (deadline, registration) order; a handler may register
/// further wakeups, which fire in the same pass when already due.
pub struct ManualTimer {
    state: Mutex<TimerState>,
}

impl ManualTimer {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TimerState {
                now: 0,
                next_seq: 0,
                pending: Vec::new(),
            }),
        }
    }

    pub fn now(&self) -> u64 {
        self.lock_state().now
    }

    /// Move the clock to `tick` and run every wakeup that has come due.
    pub async fn advance_to(&self, tick: u64) {
        loop {
            let due = {
                let mut state = self.lock_state();
                if tick > state.now {
                    state.now = tick;
                }
                let now = state.now;
                let next = state
                    .pending
                    .iter()
                    .enumerate()
                    .filter(|(_, wakeup)| wakeup.deadline <= now)
                    .min_by_key(|(_, wakeup)| (wakeup.deadline, wakeup.seq))
                    .map(|(index, _)| index);
                next.map(|index| state.pending.swap_remove(index))
            };
            match due {
                Some(wakeup) => (wakeup.handler)().await,
                None => break,
            }
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, TimerState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for ManualTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerService for ManualTimer {
    fn set_wakeup(&self, deadline: u64, handler: WakeupHandler) {
        let mut state = self.lock_state();
        let seq = state.next_seq;
        state.next_seq += 1;
        state.pending.push(Wakeup {
            deadline,
            seq,
            handler,
        });
    }
}
