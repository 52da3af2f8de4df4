//! Background status poller
//!
//! One poller thread runs per controller. Each cycle waits on the wake
//! event for up to the moving-poll interval, then decides per axis whether
//! to poll: always when the event fired (a motion command was just
//! issued), always while the axis is not done, and otherwise at the slower
//! idle rate via a fractional skip counter that counts down by
//! `moving / idle` per cycle.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, info, trace, warn};
use ucprotocol::{address, AxisStatus};

use crate::axis::PollReadings;
use crate::controller::{ControllerShared, StatusCallback};
use crate::health::CommHealth;

/// Manual-reset-free wake event: signal once, wake one waiting cycle.
pub(crate) struct PollEvent {
    flag: Mutex<bool>,
    cond: Condvar,
}

impl PollEvent {
    pub(crate) fn new() -> Self {
        Self {
            flag: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    pub(crate) fn signal(&self) {
        *self.flag.lock().unwrap() = true;
        self.cond.notify_one();
    }

    /// Wait up to `timeout` for a signal. Returns true when the wait ended
    /// because of a signal rather than the timeout.
    pub(crate) fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut signaled = self.flag.lock().unwrap();
        while !*signaled {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let (guard, wait) = self
                .cond
                .wait_timeout(signaled, deadline - now)
                .unwrap();
            signaled = guard;
            if wait.timed_out() {
                break;
            }
        }
        let was_signaled = *signaled;
        *signaled = false;
        was_signaled
    }
}

/// Fractional countdown deciding whether an idle axis is due this cycle.
/// Each moving-rate cycle consumes `factor = moving / idle` of an idle
/// period; a poll resets the countdown to one full period.
pub(crate) struct SkipCounter {
    value: f64,
    factor: f64,
}

impl SkipCounter {
    pub(crate) fn new(factor: f64) -> Self {
        // Starts due, so the first cycle always polls.
        Self { value: 0.0, factor }
    }

    /// Advance one cycle. Returns true when a poll is due; `busy` forces
    /// one regardless of the countdown.
    pub(crate) fn tick(&mut self, busy: bool) -> bool {
        let due = busy || self.value <= 0.0;
        if due {
            self.value = 1.0;
        }
        self.value -= self.factor;
        due
    }
}

/// Poll loop body; runs until the controller's shutdown flag is raised.
pub(crate) fn run(shared: Arc<ControllerShared>, callback: StatusCallback) {
    let moving = shared.config.intervals.moving;
    let idle = shared.config.intervals.idle;
    let factor = moving.as_secs_f64() / idle.as_secs_f64();

    let axis_count = shared.axes.len();
    let mut skips: Vec<SkipCounter> = (0..axis_count).map(|_| SkipCounter::new(factor)).collect();
    let mut skip_global = SkipCounter::new(factor);
    let mut health = CommHealth::new();

    debug!(card = shared.config.card, "poller started");
    loop {
        let forced = shared.wake.wait(moving);
        if shared.shutdown.load(Ordering::Acquire) {
            break;
        }

        // Controller-wide objects go at the idle rate.
        if skip_global.tick(false) {
            poll_global(&shared);
        }

        for slot in 0..axis_count {
            let busy = forced || !shared.axes[slot].lock().unwrap().done;
            if skips[slot].tick(busy) {
                poll_axis(&shared, slot, &mut health, &callback);
            }
        }
    }
    debug!(card = shared.config.card, "poller stopped");
}

/// Read the controller-wide temperature status object.
fn poll_global(shared: &Arc<ControllerShared>) {
    let mut client = shared.client.lock().unwrap();
    match client.get(address::TEMP_STATUS, 0) {
        Ok(value) => {
            let ok = value != 0;
            if !ok && shared.temperature_ok.load(Ordering::Relaxed) {
                warn!(card = shared.config.card, "controller reports overtemperature");
            }
            shared.temperature_ok.store(ok, Ordering::Relaxed);
        }
        Err(e) => trace!("temperature status read failed: {e}"),
    }
}

/// Poll one axis and publish the updated snapshot.
pub(crate) fn poll_axis(
    shared: &Arc<ControllerShared>,
    slot: usize,
    health: &mut CommHealth,
    callback: &StatusCallback,
) {
    let mut state = shared.axes[slot].lock().unwrap();
    let index = state.axis - 1;
    let mut readings = PollReadings::default();
    let mut cycle_ok = true;

    {
        let mut client = shared.client.lock().unwrap();
        match client.get(address::STATUS, index) {
            Ok(value) => readings.status = Some(AxisStatus::from_raw(value)),
            Err(e) => {
                trace!(axis = state.axis, "status read failed: {e}");
                cycle_ok = false;
            }
        }
        match client.get(address::AMPL, index) {
            Ok(value) => readings.amplitude = Some(value),
            Err(e) => {
                trace!(axis = state.axis, "amplitude read failed: {e}");
                cycle_ok = false;
            }
        }
        match client.get(address::REFCOUNTER, index) {
            Ok(value) => readings.refcounter = Some(value),
            Err(e) => {
                trace!(axis = state.axis, "refcounter read failed: {e}");
                cycle_ok = false;
            }
        }
        match client.get(address::COUNTER, index) {
            Ok(value) => readings.counter = Some(value),
            Err(e) => {
                trace!(axis = state.axis, "counter read failed: {e}");
                cycle_ok = false;
            }
        }
    }

    let homing_completed = state.apply(&readings);
    if homing_completed {
        info!(axis = state.axis, "homing complete, reference valid");
        // Nudge off the reference mark so the actor settles.
        let mut client = shared.client.lock().unwrap();
        if let Err(e) = client.set(address::SGL_FWD, index, 1) {
            warn!(axis = state.axis, "corrective step after homing failed: {e}");
            cycle_ok = false;
        }
    }

    if cycle_ok {
        if health.record_success() {
            info!(card = shared.config.card, "controller communication restored");
        }
    } else if health.record_failure() {
        warn!(
            card = shared.config.card,
            failures = health.failures(),
            "controller communication lost"
        );
    }
    state.comm_failures = health.failures();
    state.comm_lost = health.lost();

    callback(&state);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn wait_returns_on_signal() {
        let event = Arc::new(PollEvent::new());
        let waiter = event.clone();
        let handle = std::thread::spawn(move || waiter.wait(Duration::from_secs(10)));
        std::thread::sleep(Duration::from_millis(20));
        event.signal();
        assert!(handle.join().unwrap());
    }

    #[test]
    fn wait_times_out_without_signal() {
        let event = PollEvent::new();
        let start = Instant::now();
        assert!(!event.wait(Duration::from_millis(30)));
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn signal_before_wait_is_not_lost() {
        let event = PollEvent::new();
        event.signal();
        let start = Instant::now();
        assert!(event.wait(Duration::from_secs(5)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn signal_is_consumed_by_one_wait() {
        let event = PollEvent::new();
        event.signal();
        assert!(event.wait(Duration::from_millis(10)));
        assert!(!event.wait(Duration::from_millis(10)));
    }

    #[test]
    fn idle_axis_polls_every_other_cycle_at_half_rate() {
        // idle = 2 x moving interval
        let mut skip = SkipCounter::new(0.5);
        let due: Vec<bool> = (0..6).map(|_| skip.tick(false)).collect();
        assert_eq!(due, vec![true, false, true, false, true, false]);
    }

    #[test]
    fn busy_axis_polls_every_cycle() {
        let mut skip = SkipCounter::new(0.1);
        for _ in 0..5 {
            assert!(skip.tick(true));
        }
    }

    #[test]
    fn idle_axis_at_quarter_rate_polls_every_fourth_cycle() {
        let mut skip = SkipCounter::new(0.25);
        let polled = (0..100).filter(|_| skip.tick(false)).count();
        assert_eq!(polled, 25);
    }
}
