//! Controller instance and motion commands
//!
//! [`Anc350`] owns the protocol client, one [`AxisState`] per configured
//! axis, and the background poller. Motion commands run on the caller's
//! thread: they take the target axis's lock, issue the Set telegrams, and
//! only then update the cached state, so a failed command leaves the
//! state untouched. Every command finishes by signalling the poller so
//! status follows promptly instead of waiting out the idle interval.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, info, warn};
use ucprotocol::address::{self, MAX_AXIS};
use ucprotocol::{AxisStatus, CorrelationCounter};

use crate::axis::{AxisState, Direction};
use crate::client::{ProtocolClient, ProtocolError};
use crate::poller::{self, PollEvent};
use crate::transport::Transport;

/// Default poll interval while any axis is moving.
pub const DEFAULT_MOVING_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default poll interval while all axes are idle.
pub const DEFAULT_IDLE_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Receives a snapshot after every poll cycle and every completed motion
/// command for the axis concerned.
pub type StatusCallback = Box<dyn Fn(&AxisState) + Send + 'static>;

/// Errors from the driver layer.
#[derive(thiserror::Error, Debug)]
pub enum DriverError {
    /// A protocol exchange failed.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The axis number is outside this controller's configured range.
    #[error("invalid axis {axis}: controller has axes 1..={axes}")]
    InvalidAxis { axis: i32, axes: i32 },

    /// The configuration is not usable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The poller was started twice.
    #[error("poller already running")]
    AlreadyRunning,

    /// The poller thread could not be spawned.
    #[error("failed to spawn poller thread: {0}")]
    Thread(#[from] std::io::Error),
}

/// Adaptive poll interval pair; the moving interval must not exceed the
/// idle interval.
#[derive(Debug, Clone, Copy)]
pub struct PollIntervals {
    pub moving: Duration,
    pub idle: Duration,
}

impl Default for PollIntervals {
    fn default() -> Self {
        Self {
            moving: DEFAULT_MOVING_POLL_INTERVAL,
            idle: DEFAULT_IDLE_POLL_INTERVAL,
        }
    }
}

/// Static configuration of one controller instance.
#[derive(Debug, Clone, Copy)]
pub struct ControllerConfig {
    /// External identifier of this controller, used for registry lookup
    /// and log context.
    pub card: u32,
    /// Number of axes fitted, 1-based axis numbers `1..=axes`.
    pub axes: i32,
    pub intervals: PollIntervals,
}

impl ControllerConfig {
    pub fn new(card: u32, axes: i32) -> Self {
        Self {
            card,
            axes,
            intervals: PollIntervals::default(),
        }
    }

    pub fn with_intervals(mut self, intervals: PollIntervals) -> Self {
        self.intervals = intervals;
        self
    }
}

/// Shared between the controller handle and its poller thread.
pub(crate) struct ControllerShared {
    pub(crate) config: ControllerConfig,
    pub(crate) client: Mutex<ProtocolClient>,
    pub(crate) axes: Vec<Mutex<AxisState>>,
    pub(crate) wake: PollEvent,
    pub(crate) shutdown: AtomicBool,
    pub(crate) temperature_ok: AtomicBool,
}

/// One ANC350 controller.
pub struct Anc350 {
    shared: Arc<ControllerShared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Anc350 {
    /// Build a controller over an established transport. The correlation
    /// counter is passed in so several controllers can share one sequence.
    pub fn new(
        config: ControllerConfig,
        transport: Box<dyn Transport>,
        correlation: CorrelationCounter,
    ) -> Result<Self, DriverError> {
        if config.axes < 1 || config.axes > MAX_AXIS {
            return Err(DriverError::InvalidConfig(format!(
                "axis count {} not in 1..={MAX_AXIS}",
                config.axes
            )));
        }
        if config.intervals.moving.is_zero()
            || config.intervals.moving > config.intervals.idle
        {
            return Err(DriverError::InvalidConfig(format!(
                "poll intervals {:?} invalid: moving must be nonzero and at most idle",
                config.intervals
            )));
        }

        let axes = (1..=config.axes).map(|n| Mutex::new(AxisState::new(n))).collect();
        Ok(Self {
            shared: Arc::new(ControllerShared {
                config,
                client: Mutex::new(ProtocolClient::new(transport, correlation)),
                axes,
                wake: PollEvent::new(),
                shutdown: AtomicBool::new(false),
                temperature_ok: AtomicBool::new(true),
            }),
            handle: Mutex::new(None),
        })
    }

    pub fn card(&self) -> u32 {
        self.shared.config.card
    }

    /// Read each axis's status once to seed the homed flags, then start
    /// the background poller. Snapshots are published through `callback`.
    pub fn start(&self, callback: StatusCallback) -> Result<(), DriverError> {
        let mut handle = self.handle.lock().unwrap();
        if handle.is_some() {
            return Err(DriverError::AlreadyRunning);
        }

        for axis in &self.shared.axes {
            let mut state = axis.lock().unwrap();
            let index = state.axis - 1;
            let mut client = self.shared.client.lock().unwrap();
            match client.get(address::STATUS, index) {
                Ok(value) => state.apply_initial(AxisStatus::from_raw(value)),
                Err(e) => debug!(axis = state.axis, "initial status read failed: {e}"),
            }
            drop(client);
            callback(&state);
        }

        // One full poll per axis so position, reference, and amplitude are
        // populated before the first cycle. Health starts fresh on the
        // poller thread either way.
        let mut health = crate::health::CommHealth::new();
        for slot in 0..self.shared.axes.len() {
            poller::poll_axis(&self.shared, slot, &mut health, &callback);
        }

        let shared = self.shared.clone();
        let thread = std::thread::Builder::new()
            .name(format!("anc350-poll-{}", self.shared.config.card))
            .spawn(move || poller::run(shared, callback))?;
        *handle = Some(thread);
        info!(card = self.shared.config.card, "controller started");
        Ok(())
    }

    /// Stop the poller and wait for it to exit. Safe to call more than
    /// once; also runs on drop.
    pub fn shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.wake.signal();
        if let Some(thread) = self.handle.lock().unwrap().take() {
            if thread.join().is_err() {
                warn!(card = self.shared.config.card, "poller thread panicked");
            }
        }
    }

    /// Snapshot of one axis's cached state.
    pub fn axis_state(&self, axis: i32) -> Result<AxisState, DriverError> {
        let slot = self.slot(axis)?;
        Ok(*self.shared.axes[slot].lock().unwrap())
    }

    /// Last polled controller-wide temperature status.
    pub fn temperature_ok(&self) -> bool {
        self.shared.temperature_ok.load(Ordering::Relaxed)
    }

    /// Start an absolute or relative approach. `position` is in scaled
    /// counts relative to the reference position; on the wire the target
    /// is offset by the cached reference counter.
    pub fn move_to(&self, axis: i32, position: i32, relative: bool) -> Result<(), DriverError> {
        let slot = self.slot(axis)?;
        let run = if relative {
            address::RUN_RELATIVE
        } else {
            address::RUN_TARGET
        };
        let direction = if position >= 0 {
            Direction::Forward
        } else {
            Direction::Backward
        };

        let mut state = self.shared.axes[slot].lock().unwrap();
        let target = position + state.reference;
        {
            let mut client = self.shared.client.lock().unwrap();
            let index = axis - 1;
            client.set(address::STOP_EN, index, 1)?;
            client.set(address::REGSPD_SELSP, index, 1)?;
            client.set(address::TARGET, index, target)?;
            client.set(run, index, 1)?;
        }
        state.begin_motion(Some(direction));
        drop(state);

        self.shared.wake.signal();
        Ok(())
    }

    /// Start a reference search by driving continuously until the
    /// reference mark is found; the poller detects completion.
    pub fn home(&self, axis: i32, forward: bool) -> Result<(), DriverError> {
        let slot = self.slot(axis)?;
        let (run, direction) = if forward {
            (address::CONT_FWD, Direction::Forward)
        } else {
            (address::CONT_BKWD, Direction::Backward)
        };

        let mut state = self.shared.axes[slot].lock().unwrap();
        {
            let mut client = self.shared.client.lock().unwrap();
            let index = axis - 1;
            client.set(address::STOP_EN, index, 1)?;
            client.set(address::REGSPD_SELSP, index, 1)?;
            client.set(run, index, 1)?;
        }
        state.begin_homing(direction);
        drop(state);

        self.shared.wake.signal();
        Ok(())
    }

    /// Continuous (jog) movement; the sign of `velocity` selects the
    /// direction. The controller regulates the speed itself, so only the
    /// sign matters here.
    pub fn jog(&self, axis: i32, velocity: i32) -> Result<(), DriverError> {
        let slot = self.slot(axis)?;
        let (run, direction) = if velocity > 0 {
            (address::CONT_FWD, Direction::Forward)
        } else {
            (address::CONT_BKWD, Direction::Backward)
        };

        let mut state = self.shared.axes[slot].lock().unwrap();
        {
            let mut client = self.shared.client.lock().unwrap();
            let index = axis - 1;
            client.set(address::STOP_EN, index, 1)?;
            client.set(address::REGSPD_SELSP, index, 1)?;
            client.set(run, index, 1)?;
        }
        state.begin_motion(Some(direction));
        drop(state);

        self.shared.wake.signal();
        Ok(())
    }

    /// Single step in the given direction; stops any previous movement.
    pub fn step(&self, axis: i32, forward: bool) -> Result<(), DriverError> {
        let slot = self.slot(axis)?;
        let (run, direction) = if forward {
            (address::SGL_FWD, Direction::Forward)
        } else {
            (address::SGL_BKWD, Direction::Backward)
        };

        let mut state = self.shared.axes[slot].lock().unwrap();
        self.shared
            .client
            .lock()
            .unwrap()
            .set(run, axis - 1, 1)?;
        state.begin_motion(Some(direction));
        drop(state);

        self.shared.wake.signal();
        Ok(())
    }

    /// Abort any current motion. The controller has no dedicated stop
    /// object; a single step against the last movement direction halts
    /// the actor at its current position.
    pub fn stop(&self, axis: i32) -> Result<(), DriverError> {
        let slot = self.slot(axis)?;

        let mut state = self.shared.axes[slot].lock().unwrap();
        let run = match state.direction {
            Direction::Forward => address::SGL_FWD,
            Direction::Backward => address::SGL_BKWD,
        };
        self.shared
            .client
            .lock()
            .unwrap()
            .set(run, axis - 1, 1)?;
        state.end_motion();
        drop(state);

        self.shared.wake.signal();
        Ok(())
    }

    /// Set the actor amplitude in millivolts.
    pub fn set_amplitude(&self, axis: i32, millivolts: i32) -> Result<(), DriverError> {
        self.slot(axis)?;
        self.shared
            .client
            .lock()
            .unwrap()
            .set(address::AMPL, axis - 1, millivolts)?;
        Ok(())
    }

    /// Set the excitation frequency in hertz.
    pub fn set_frequency(&self, axis: i32, hertz: i32) -> Result<(), DriverError> {
        self.slot(axis)?;
        self.shared
            .client
            .lock()
            .unwrap()
            .set(address::FAST_FREQ, axis - 1, hertz)?;
        Ok(())
    }

    /// Raw object read, for diagnostics.
    pub fn get_raw(&self, address: i32, index: i32) -> Result<i32, DriverError> {
        Ok(self.shared.client.lock().unwrap().get(address, index)?)
    }

    /// Raw object write, for diagnostics.
    pub fn set_raw(&self, address: i32, index: i32, value: i32) -> Result<(), DriverError> {
        Ok(self.shared.client.lock().unwrap().set(address, index, value)?)
    }

    fn slot(&self, axis: i32) -> Result<usize, DriverError> {
        if axis < 1 || axis > self.shared.config.axes {
            return Err(DriverError::InvalidAxis {
                axis,
                axes: self.shared.config.axes,
            });
        }
        Ok((axis - 1) as usize)
    }
}

impl Drop for Anc350 {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::{MockShared, MockTransport, Script};
    use std::sync::mpsc;
    use std::time::Instant;
    use ucprotocol::Opcode;

    fn controller(axes: i32) -> (Anc350, Arc<MockShared>) {
        let (transport, shared) = MockTransport::new();
        let controller = Anc350::new(
            ControllerConfig::new(0, axes),
            Box::new(transport),
            CorrelationCounter::new(),
        )
        .unwrap();
        (controller, shared)
    }

    #[test]
    fn rejects_bad_axis_count() {
        let (transport, _) = MockTransport::new();
        let result = Anc350::new(
            ControllerConfig::new(0, 7),
            Box::new(transport),
            CorrelationCounter::new(),
        );
        assert!(matches!(result, Err(DriverError::InvalidConfig(_))));
    }

    #[test]
    fn rejects_inverted_intervals() {
        let (transport, _) = MockTransport::new();
        let config = ControllerConfig::new(0, 3).with_intervals(PollIntervals {
            moving: Duration::from_secs(2),
            idle: Duration::from_secs(1),
        });
        let result = Anc350::new(config, Box::new(transport), CorrelationCounter::new());
        assert!(matches!(result, Err(DriverError::InvalidConfig(_))));
    }

    #[test]
    fn rejects_out_of_range_axis() {
        let (controller, _) = controller(3);
        assert!(matches!(
            controller.move_to(4, 0, false),
            Err(DriverError::InvalidAxis { axis: 4, axes: 3 })
        ));
        assert!(matches!(
            controller.axis_state(0),
            Err(DriverError::InvalidAxis { .. })
        ));
    }

    #[test]
    fn absolute_move_command_sequence() {
        let (controller, shared) = controller(3);
        controller.move_to(1, 5_000, false).unwrap();

        let requests = shared.requests();
        let addresses: Vec<i32> = requests.iter().map(|r| r.address).collect();
        assert_eq!(
            addresses,
            vec![
                address::STOP_EN,
                address::REGSPD_SELSP,
                address::TARGET,
                address::RUN_TARGET
            ]
        );
        for request in &requests {
            assert_eq!(request.opcode, Some(Opcode::Set));
            assert_eq!(request.index, 0);
        }
        assert_eq!(requests[2].value, Some(5_000));
        assert_eq!(requests[3].value, Some(1));

        let state = controller.axis_state(1).unwrap();
        assert!(!state.done);
        assert_eq!(state.direction, Direction::Forward);
    }

    #[test]
    fn relative_move_uses_run_relative() {
        let (controller, shared) = controller(3);
        controller.move_to(2, -3_000, true).unwrap();

        let requests = shared.requests();
        assert_eq!(requests.last().unwrap().address, address::RUN_RELATIVE);
        assert_eq!(requests.last().unwrap().index, 1);

        let state = controller.axis_state(2).unwrap();
        assert_eq!(state.direction, Direction::Backward);
    }

    #[test]
    fn failed_run_command_leaves_done_untouched() {
        let (controller, shared) = controller(3);
        // STOP_EN, REGSPD_SELSP, TARGET acknowledged; RUN_TARGET never
        // answered on either attempt.
        shared.push_many(&[
            Script::Ack { value: 0, reason: 0 },
            Script::Ack { value: 0, reason: 0 },
            Script::Ack { value: 0, reason: 0 },
            Script::Silence,
            Script::Silence,
        ]);

        let err = controller.move_to(1, 5_000, false).unwrap_err();
        assert!(matches!(
            err,
            DriverError::Protocol(ProtocolError::NoMatchingReply { .. })
        ));
        assert!(controller.axis_state(1).unwrap().done);
    }

    #[test]
    fn home_starts_reference_search() {
        let (controller, shared) = controller(3);
        controller.home(2, false).unwrap();

        let requests = shared.requests();
        assert_eq!(requests.last().unwrap().address, address::CONT_BKWD);
        assert_eq!(requests.last().unwrap().index, 1);

        let state = controller.axis_state(2).unwrap();
        assert!(state.homing);
        assert!(!state.done);
        assert_eq!(state.direction, Direction::Backward);
    }

    #[test]
    fn jog_direction_follows_velocity_sign() {
        let (controller, shared) = controller(3);
        controller.jog(1, 1_000).unwrap();

        let requests = shared.requests();
        assert_eq!(requests.last().unwrap().address, address::CONT_FWD);
        assert!(!controller.axis_state(1).unwrap().done);
        assert_eq!(controller.axis_state(1).unwrap().direction, Direction::Forward);

        controller.jog(1, -1_000).unwrap();
        let requests = shared.requests();
        assert_eq!(requests.last().unwrap().address, address::CONT_BKWD);
        assert_eq!(controller.axis_state(1).unwrap().direction, Direction::Backward);
    }

    #[test]
    fn stop_steps_against_last_direction() {
        let (controller, shared) = controller(3);
        controller.home(1, false).unwrap();
        controller.stop(1).unwrap();

        let requests = shared.requests();
        let last = requests.last().unwrap();
        assert_eq!(last.address, address::SGL_BKWD);
        assert_eq!(last.value, Some(1));

        let state = controller.axis_state(1).unwrap();
        assert!(state.done);
        assert!(!state.homing);
    }

    #[test]
    fn initial_status_read_seeds_homed() {
        let (controller, shared) = controller(3);
        shared.set_auto_value(address::STATUS, 0x0800);

        let (tx, _rx) = mpsc::channel();
        controller
            .start(Box::new(move |state: &AxisState| {
                let _ = tx.send(*state);
            }))
            .unwrap();
        controller.shutdown();

        let state = controller.axis_state(2).unwrap();
        assert!(state.homed);
        assert!(!state.moving);
        assert!(!state.forward_limit);
        assert!(!state.backward_limit);
    }

    #[test]
    fn start_polls_all_objects_before_first_cycle() {
        let (transport, shared) = MockTransport::new();
        // Intervals long enough that no poll cycle runs during the test.
        let config = ControllerConfig::new(4, 1).with_intervals(PollIntervals {
            moving: Duration::from_secs(30),
            idle: Duration::from_secs(30),
        });
        let controller =
            Anc350::new(config, Box::new(transport), CorrelationCounter::new()).unwrap();
        shared.set_auto_value(address::COUNTER, 120_000);
        shared.set_auto_value(address::REFCOUNTER, 20_000);
        shared.set_auto_value(address::AMPL, 30_000);

        controller.start(Box::new(|_| {})).unwrap();
        let state = controller.axis_state(1).unwrap();
        controller.shutdown();

        assert_eq!(state.position, 100_000);
        assert_eq!(state.reference, 20_000);
        assert_eq!(state.amplitude, 30_000);
    }

    #[test]
    fn start_twice_is_rejected() {
        let (controller, _shared) = controller(1);
        controller.start(Box::new(|_| {})).unwrap();
        let err = controller.start(Box::new(|_| {})).unwrap_err();
        assert!(matches!(err, DriverError::AlreadyRunning));
        controller.shutdown();
    }

    #[test]
    fn poller_publishes_position() {
        let (transport, shared) = MockTransport::new();
        let config = ControllerConfig::new(1, 1).with_intervals(PollIntervals {
            moving: Duration::from_millis(1),
            idle: Duration::from_millis(5),
        });
        let controller =
            Anc350::new(config, Box::new(transport), CorrelationCounter::new()).unwrap();
        shared.set_auto_value(address::COUNTER, 120_000);
        shared.set_auto_value(address::REFCOUNTER, 20_000);
        shared.set_auto_value(address::AMPL, 30_000);

        let (tx, rx) = mpsc::channel();
        controller
            .start(Box::new(move |state: &AxisState| {
                let _ = tx.send(*state);
            }))
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut seen = None;
        while Instant::now() < deadline {
            match rx.recv_timeout(Duration::from_millis(100)) {
                Ok(state) if state.position == 100_000 => {
                    seen = Some(state);
                    break;
                }
                Ok(_) => continue,
                Err(_) => break,
            }
        }
        controller.shutdown();

        let state = seen.expect("no snapshot with the polled position arrived");
        assert_eq!(state.reference, 20_000);
        assert_eq!(state.amplitude, 30_000);
        assert!(state.done);
        assert_eq!(state.comm_failures, 0);
    }

    #[test]
    fn failed_cycles_raise_comm_failures() {
        let (transport, shared) = MockTransport::new();
        let config = ControllerConfig::new(2, 1).with_intervals(PollIntervals {
            moving: Duration::from_millis(1),
            idle: Duration::from_millis(5),
        });
        let controller =
            Anc350::new(config, Box::new(transport), CorrelationCounter::new()).unwrap();

        let (tx, rx) = mpsc::channel();
        controller
            .start(Box::new(move |state: &AxisState| {
                let _ = tx.send(*state);
            }))
            .unwrap();

        // Four consecutive reads fail (two silent attempts each), spanning
        // at most two poll cycles; at least one cycle records a failure.
        shared.push_many(&[Script::Silence; 8]);

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut saw_failure = false;
        let mut recovered = false;
        while Instant::now() < deadline {
            match rx.recv_timeout(Duration::from_millis(200)) {
                Ok(state) => {
                    if state.comm_failures > 0 {
                        saw_failure = true;
                    } else if saw_failure {
                        recovered = true;
                        break;
                    }
                }
                Err(_) => break,
            }
        }
        controller.shutdown();

        assert!(saw_failure);
        assert!(recovered);
    }

    #[test]
    fn shutdown_interrupts_long_poll_wait() {
        let (transport, _shared) = MockTransport::new();
        let config = ControllerConfig::new(3, 1).with_intervals(PollIntervals {
            moving: Duration::from_secs(10),
            idle: Duration::from_secs(10),
        });
        let controller =
            Anc350::new(config, Box::new(transport), CorrelationCounter::new()).unwrap();
        controller.start(Box::new(|_| {})).unwrap();

        let start = Instant::now();
        controller.shutdown();
        assert!(start.elapsed() < Duration::from_secs(2));
    }
}
