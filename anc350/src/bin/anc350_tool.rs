//! CLI tool for the attocube ANC350 piezo motion controller.
//!
//! Subcommands:
//! - `get` / `set`: raw protocol object access
//! - `status`: one-shot axis status decode
//! - `move`: absolute or relative approach, waits for completion
//! - `home`: reference search
//! - `jog` / `step` / `stop`: manual motion
//! - `monitor`: stream axis snapshots from the background poller

use std::sync::mpsc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use anc350::{
    Anc350, AxisState, ControllerConfig, ProtocolClient, SerialTransport, TcpTransport, Transport,
};
use ucprotocol::{address, AxisStatus, CorrelationCounter};

/// Default controller IP address
const DEFAULT_IP: &str = "192.168.1.50";

/// Default serial baud rate
const DEFAULT_BAUD: u32 = 38400;

/// attocube ANC350 Piezo Motion Controller Tool
#[derive(Parser, Debug)]
#[command(name = "anc350_tool")]
#[command(about = "Control tool for the attocube ANC350 piezo motion controller")]
#[command(version)]
struct Args {
    /// Controller IP address (telegram port)
    #[arg(long, global = true, default_value = DEFAULT_IP)]
    ip: String,

    /// Serial device path; used instead of TCP when given
    #[arg(long, global = true)]
    serial: Option<String>,

    /// Serial baud rate
    #[arg(long, global = true, default_value_t = DEFAULT_BAUD)]
    baud: u32,

    /// Number of axes fitted to the controller
    #[arg(long, global = true, default_value_t = 3)]
    axes: i32,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read a raw protocol object
    Get {
        /// Object address (decimal or 0x-prefixed hex)
        #[arg(value_parser = parse_word)]
        address: i32,

        /// Object index (wire axis index, 0-based)
        #[arg(default_value = "0", value_parser = parse_word)]
        index: i32,
    },

    /// Write a raw protocol object
    Set {
        /// Object address (decimal or 0x-prefixed hex)
        #[arg(value_parser = parse_word)]
        address: i32,

        /// Object index (wire axis index, 0-based)
        #[arg(value_parser = parse_word)]
        index: i32,

        /// Value to write
        #[arg(value_parser = parse_word)]
        value: i32,
    },

    /// Read and decode one axis's status word
    Status {
        /// Axis number (1-based)
        #[arg(short, long, default_value = "1")]
        axis: i32,
    },

    /// Move to a position and wait for completion
    Move {
        /// Axis number (1-based)
        #[arg(short, long, default_value = "1")]
        axis: i32,

        /// Target position in scaled counts (1000 per sensor unit)
        position: i32,

        /// Interpret the position as relative to the current one
        #[arg(short, long)]
        relative: bool,

        /// Seconds to wait for the move to finish
        #[arg(short, long, default_value = "30")]
        timeout: u64,
    },

    /// Start a reference search and wait for completion
    Home {
        /// Axis number (1-based)
        #[arg(short, long, default_value = "1")]
        axis: i32,

        /// Search in the backward direction
        #[arg(long)]
        backward: bool,

        /// Seconds to wait for the search to finish
        #[arg(short, long, default_value = "60")]
        timeout: u64,
    },

    /// Continuous movement until stopped
    Jog {
        /// Axis number (1-based)
        #[arg(short, long, default_value = "1")]
        axis: i32,

        /// Signed velocity; negative jogs backward
        #[arg(default_value = "1000", value_parser = parse_word)]
        velocity: i32,
    },

    /// Single step
    Step {
        /// Axis number (1-based)
        #[arg(short, long, default_value = "1")]
        axis: i32,

        /// Step backward instead of forward
        #[arg(long)]
        backward: bool,
    },

    /// Stop any current motion
    Stop {
        /// Axis number (1-based)
        #[arg(short, long, default_value = "1")]
        axis: i32,
    },

    /// Stream axis snapshots
    Monitor {
        /// Seconds to monitor for (0 = until interrupted)
        #[arg(short, long, default_value = "10")]
        seconds: u64,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    match args.command {
        Command::Get { address, index } => cmd_get(&args, address, index),
        Command::Set {
            address,
            index,
            value,
        } => cmd_set(&args, address, index, value),
        Command::Status { axis } => cmd_status(&args, axis),
        Command::Move {
            axis,
            position,
            relative,
            timeout,
        } => cmd_move(&args, axis, position, relative, timeout),
        Command::Home {
            axis,
            backward,
            timeout,
        } => cmd_home(&args, axis, backward, timeout),
        Command::Jog { axis, velocity } => cmd_jog(&args, axis, velocity),
        Command::Step { axis, backward } => cmd_step(&args, axis, backward),
        Command::Stop { axis } => cmd_stop(&args, axis),
        Command::Monitor { seconds } => cmd_monitor(&args, seconds),
    }
}

fn connect(args: &Args) -> Result<Box<dyn Transport>> {
    if let Some(path) = &args.serial {
        info!("Opening serial port {path} at {} baud...", args.baud);
        Ok(Box::new(SerialTransport::open(path, args.baud)?))
    } else {
        info!("Connecting to ANC350 at {}...", args.ip);
        Ok(Box::new(TcpTransport::connect_default_port(&args.ip)?))
    }
}

fn controller(args: &Args) -> Result<Anc350> {
    let transport = connect(args)?;
    Anc350::new(
        ControllerConfig::new(0, args.axes),
        transport,
        CorrelationCounter::new(),
    )
    .context("failed to create controller")
}

fn cmd_get(args: &Args, address: i32, index: i32) -> Result<()> {
    let mut client = ProtocolClient::new(connect(args)?, CorrelationCounter::new());
    let value = client.get(address, index)?;
    println!("0x{address:04X}[{index}] = {value} (0x{value:08X})");
    Ok(())
}

fn cmd_set(args: &Args, address: i32, index: i32, value: i32) -> Result<()> {
    let mut client = ProtocolClient::new(connect(args)?, CorrelationCounter::new());
    client.set(address, index, value)?;
    println!("0x{address:04X}[{index}] <- {value}");
    Ok(())
}

fn cmd_status(args: &Args, axis: i32) -> Result<()> {
    if axis < 1 || axis > args.axes {
        bail!("axis {axis} out of range 1..={}", args.axes);
    }
    let mut client = ProtocolClient::new(connect(args)?, CorrelationCounter::new());
    let index = axis - 1;
    let status = AxisStatus::from_raw(client.get(address::STATUS, index)?);
    let counter = client.get(address::COUNTER, index)?;
    let refcounter = client.get(address::REFCOUNTER, index)?;
    let amplitude = client.get(address::AMPL, index)?;

    println!("axis {axis}:");
    println!("  position   {} (counter {counter}, reference {refcounter})", counter - refcounter);
    println!("  amplitude  {amplitude} mV");
    println!("  running    {}", status.running());
    println!("  referenced {}", status.reference_valid());
    println!("  hump       {}", status.hump());
    println!(
        "  sensor     enabled={} error={} disconnected={}",
        status.sensor_enabled(),
        status.sensor_error(),
        status.sensor_disconnected()
    );
    Ok(())
}

fn cmd_move(args: &Args, axis: i32, position: i32, relative: bool, timeout: u64) -> Result<()> {
    let controller = controller(args)?;
    let rx = start_stream(&controller)?;

    controller.move_to(axis, position, relative)?;
    info!(
        "Moving axis {axis} to {position} ({})",
        if relative { "relative" } else { "absolute" }
    );
    // Snapshots from before the command still say done.
    while rx.try_recv().is_ok() {}

    let state = wait_for(&rx, axis, Duration::from_secs(timeout), |s| s.done)?;
    println!(
        "axis {axis} done at position {} ({:.3} units)",
        state.position,
        state.position_units()
    );
    controller.shutdown();
    Ok(())
}

fn cmd_home(args: &Args, axis: i32, backward: bool, timeout: u64) -> Result<()> {
    let controller = controller(args)?;
    let rx = start_stream(&controller)?;

    controller.home(axis, !backward)?;
    info!("Homing axis {axis}...");
    while rx.try_recv().is_ok() {}

    let state = wait_for(&rx, axis, Duration::from_secs(timeout), |s| s.homed)?;
    println!("axis {axis} homed, reference {}", state.reference);
    controller.shutdown();
    Ok(())
}

fn cmd_jog(args: &Args, axis: i32, velocity: i32) -> Result<()> {
    let controller = controller(args)?;
    controller.jog(axis, velocity)?;
    println!(
        "axis {axis} jogging {}; use `anc350_tool stop` to halt",
        if velocity > 0 { "forward" } else { "backward" }
    );
    Ok(())
}

fn cmd_step(args: &Args, axis: i32, backward: bool) -> Result<()> {
    let controller = controller(args)?;
    controller.step(axis, !backward)?;
    Ok(())
}

fn cmd_stop(args: &Args, axis: i32) -> Result<()> {
    let controller = controller(args)?;
    controller.stop(axis)?;
    println!("axis {axis} stopped");
    Ok(())
}

fn cmd_monitor(args: &Args, seconds: u64) -> Result<()> {
    let controller = controller(args)?;
    let rx = start_stream(&controller)?;

    let deadline = (seconds > 0).then(|| Instant::now() + Duration::from_secs(seconds));
    loop {
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                break;
            }
        }
        match rx.recv_timeout(Duration::from_millis(500)) {
            Ok(state) => println!(
                "axis {} pos={} ampl={}mV moving={} done={} homed={} fwd_lim={} bkwd_lim={} comm_lost={}",
                state.axis,
                state.position,
                state.amplitude,
                state.moving,
                state.done,
                state.homed,
                state.forward_limit,
                state.backward_limit,
                state.comm_lost,
            ),
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
    controller.shutdown();
    Ok(())
}

/// Start the poller with a channel-backed callback.
fn start_stream(controller: &Anc350) -> Result<mpsc::Receiver<AxisState>> {
    let (tx, rx) = mpsc::channel();
    controller.start(Box::new(move |state: &AxisState| {
        let _ = tx.send(*state);
    }))?;
    Ok(rx)
}

/// Wait until a snapshot for `axis` satisfies `pred`.
fn wait_for(
    rx: &mpsc::Receiver<AxisState>,
    axis: i32,
    timeout: Duration,
    pred: impl Fn(&AxisState) -> bool,
) -> Result<AxisState> {
    let deadline = Instant::now() + timeout;
    loop {
        let now = Instant::now();
        if now >= deadline {
            bail!("timed out waiting for axis {axis}");
        }
        match rx.recv_timeout(deadline - now) {
            Ok(state) if state.axis == axis && pred(&state) => return Ok(state),
            Ok(_) => continue,
            Err(_) => bail!("timed out waiting for axis {axis}"),
        }
    }
}

/// Parse a decimal or 0x-prefixed hexadecimal word.
fn parse_word(s: &str) -> Result<i32, String> {
    let parsed = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        i32::from_str_radix(hex, 16)
    } else {
        s.parse()
    };
    parsed.map_err(|e| format!("invalid number '{s}': {e}"))
}
