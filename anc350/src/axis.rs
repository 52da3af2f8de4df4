//! Per-axis motion state
//!
//! [`AxisState`] is the pure state machine the poller feeds with each
//! cycle's readings; everything here is arithmetic on the last snapshot,
//! with no I/O. Derived fields follow the controller's conventions:
//! position is always the counter relative to the reference counter, and
//! the single "hump" bit is attributed to a travel limit using the
//! direction the axis last moved in.

use ucprotocol::AxisStatus;

/// Scale factor between sensor units and the integer positions on the
/// wire: one sensor unit (micrometre or millidegree) is 1000 counts.
pub const POSITION_SCALE: i32 = 1000;

/// Position change, in scaled counts, at or below which the movement
/// direction is considered noise and left unchanged.
pub const DIRECTION_DEADBAND: i32 = 500;

/// Direction of the last commanded or observed movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Forward,
    Backward,
}

/// One poll cycle's worth of raw readings. `None` means the exchange for
/// that object failed this cycle and the cached value stays.
#[derive(Debug, Clone, Copy, Default)]
pub struct PollReadings {
    pub status: Option<AxisStatus>,
    /// Amplitude in millivolts.
    pub amplitude: Option<i32>,
    /// Reference counter, scaled counts.
    pub refcounter: Option<i32>,
    /// Position counter, scaled counts.
    pub counter: Option<i32>,
}

/// Snapshot of one axis, updated every poll cycle.
#[derive(Debug, Clone, Copy)]
pub struct AxisState {
    /// Axis number, 1-based.
    pub axis: i32,
    /// Position relative to the reference counter, in scaled counts.
    pub position: i32,
    /// Last known reference (home) counter, in scaled counts.
    pub reference: i32,
    /// Actor amplitude in millivolts.
    pub amplitude: i32,
    /// Last raw status word.
    pub status: AxisStatus,
    /// Actor is currently running.
    pub moving: bool,
    /// No commanded motion is outstanding.
    pub done: bool,
    /// A homing sequence is in progress.
    pub homing: bool,
    /// The reference position is valid.
    pub homed: bool,
    /// Hump detected while moving forward.
    pub forward_limit: bool,
    /// Hump detected while moving backward.
    pub backward_limit: bool,
    /// Direction of the last movement.
    pub direction: Direction,
    /// Failed poll cycles in a row on this controller.
    pub comm_failures: u32,
    /// Communication with the controller considered lost.
    pub comm_lost: bool,
}

impl AxisState {
    pub fn new(axis: i32) -> Self {
        Self {
            axis,
            position: 0,
            reference: 0,
            amplitude: 0,
            status: AxisStatus::empty(),
            moving: false,
            done: true,
            homing: false,
            homed: false,
            forward_limit: false,
            backward_limit: false,
            direction: Direction::Forward,
            comm_failures: 0,
            comm_lost: false,
        }
    }

    /// Record that a motion command was accepted by the controller. The
    /// caller passes the direction when the command implies one.
    pub fn begin_motion(&mut self, direction: Option<Direction>) {
        self.done = false;
        if let Some(direction) = direction {
            self.direction = direction;
        }
    }

    /// Record the start of a homing sequence.
    pub fn begin_homing(&mut self, direction: Direction) {
        self.done = false;
        self.homing = true;
        self.homed = false;
        self.direction = direction;
    }

    /// Record a stop command: any outstanding motion or homing sequence
    /// is considered finished.
    pub fn end_motion(&mut self) {
        self.done = true;
        self.homing = false;
    }

    /// Seed the homed flag from the first status read after construction,
    /// before any homing sequence has run.
    pub fn apply_initial(&mut self, status: AxisStatus) {
        self.status = status;
        self.homed = status.reference_valid();
        self.moving = status.running();
    }

    /// Apply one poll cycle's readings. Returns true when a homing
    /// sequence finished on this cycle (the reference became valid), which
    /// the caller answers with a corrective single step.
    pub fn apply(&mut self, readings: &PollReadings) -> bool {
        let mut homing_completed = false;

        if let Some(status) = readings.status {
            self.status = status;
            self.moving = status.running();
            self.done = !status.running();

            if !status.reference_valid() {
                self.homed = false;
            } else if self.homing {
                self.homing = false;
                self.homed = true;
                self.done = true;
                homing_completed = true;
            }
        }

        if let Some(amplitude) = readings.amplitude {
            self.amplitude = amplitude;
        }
        if let Some(refcounter) = readings.refcounter {
            self.reference = refcounter;
        }
        if let Some(counter) = readings.counter {
            // Position is always relative to the reference counter, valid
            // reference or not.
            let position = counter - self.reference;
            let delta = position - self.position;
            if delta > DIRECTION_DEADBAND {
                self.direction = Direction::Forward;
            } else if delta < -DIRECTION_DEADBAND {
                self.direction = Direction::Backward;
            }
            self.position = position;
        }

        if let Some(status) = readings.status {
            if status.hump() {
                self.forward_limit = self.direction == Direction::Forward;
                self.backward_limit = self.direction == Direction::Backward;
            } else {
                self.forward_limit = false;
                self.backward_limit = false;
            }
        }

        homing_completed
    }

    /// Sensor fault of any kind (error bit or disconnected bit).
    pub fn sensor_fault(&self) -> bool {
        self.status.sensor_error() || self.status.sensor_disconnected()
    }

    /// Position in sensor units (micrometres or millidegrees).
    pub fn position_units(&self) -> f64 {
        f64::from(self.position) / f64::from(POSITION_SCALE)
    }
}
