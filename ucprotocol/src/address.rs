//! Controller object addresses
//!
//! Every controller object is named by a 16-bit-range address; the telegram
//! `index` field selects the axis (up to [`MAX_AXIS`]) or trigger (up to
//! [`MAX_TRIGGER`]) the address applies to, or 0 for global objects.
//!
//! Addresses are opaque integers as far as the protocol is concerned. The
//! notes give the object's unit and scaling where the manual defines one;
//! position-like values are scaled by a factor of 1000 per sensor unit.

/// Maximum index for selecting an axis.
pub const MAX_AXIS: i32 = 0x06;

/// Maximum index for selecting a trigger.
pub const MAX_TRIGGER: i32 = 0x05;

/// Controls sending of asynchronous event telegrams (0 off, 1 on).
pub const ASYNC_EN: i32 = 0x0145;

/// Axis status bit field, read only. See [`crate::AxisStatus`].
pub const STATUS: i32 = 0x0404;

/// Controller-wide temperature status, index 0 only; 0 means
/// overtemperature, 1 means temperature ok. Read only.
pub const TEMP_STATUS: i32 = 0x0560;

/// Position of the axis, scaled by 1000. Read only.
pub const COUNTER: i32 = 0x0415;

/// Reference (home) position of the axis, scaled by 1000. Read only.
pub const REFCOUNTER: i32 = 0x0407;

/// Minimum position for position-limited actors, scaled by 1000.
pub const LEFT_LIMIT: i32 = 0x0441;

/// Maximum position for position-limited actors, scaled by 1000.
pub const RIGHT_LIMIT: i32 = 0x0442;

/// Executes a reset of the position counter.
pub const POS_RESET: i32 = 0x044F;

/// Target position for absolute approaches, scaled by 1000.
pub const TARGET: i32 = 0x0408;

/// Starts the approach to the absolute target position.
pub const RUN_TARGET: i32 = 0x040D;

/// Starts the approach to the relative target position.
pub const RUN_RELATIVE: i32 = 0x0418;

/// Starts the approach to the reference position.
pub const MOVE_REF: i32 = 0x0444;

/// Single step forward; stops any previous movement.
pub const SGL_FWD: i32 = 0x0410;

/// Single step backward; stops any previous movement.
pub const SGL_BKWD: i32 = 0x0411;

/// Continuous positioning forward with the set amplitude/speed parameters.
pub const CONT_FWD: i32 = 0x040E;

/// Continuous positioning backward with the set amplitude/speed parameters.
pub const CONT_BKWD: i32 = 0x040F;

/// Actor amplitude in millivolts; updated by amplitude control while moving.
pub const AMPL: i32 = 0x0400;

/// Excitation signal frequency in hertz.
pub const FAST_FREQ: i32 = 0x0401;

/// Output relay of the amplifier.
pub const RELAIS: i32 = 0x0447;

/// Enables hump detection ("humpenable").
pub const STOP_EN: i32 = 0x0450;

/// Setpoint selector for the speed feedback: 0 speed, 1 amplitude,
/// 2 step width ("amplctrl").
pub const REGSPD_SELSP: i32 = 0x054A;

/// Starts a capacitance measurement on the axis.
pub const CAP_START: i32 = 0x051E;

/// Result of the capacitance measurement, sent when finished. Read only.
pub const CAP_VALUE: i32 = 0x0569;

/// Reference voltage for resistive sensors in millivolts, index 0 only.
pub const SENSOR_VOLT: i32 = 0x0526;

/// Lower trigger threshold position, scaled by 1000.
pub const TRG_LOW: i32 = 0x0530;

/// Upper trigger threshold position, scaled by 1000.
pub const TRG_HIGH: i32 = 0x0531;

/// Trigger polarity.
pub const TRG_POL: i32 = 0x0532;

/// Axis assigned to the trigger.
pub const TRG_AXIS: i32 = 0x0533;

/// Ack result codes.
pub mod reason {
    /// All ok.
    pub const OK: i32 = 0;
    /// Invalid address.
    pub const ADDR: i32 = 1;
    /// Value out of range.
    pub const RANGE: i32 = 2;
    /// Telegram was ignored.
    pub const IGNORED: i32 = 3;
    /// Verify of data failed.
    pub const VERIFY: i32 = 4;
    /// Wrong type of data.
    pub const TYPE: i32 = 5;
    /// Unknown error.
    pub const UNKNOWN: i32 = 99;
}
