//! Console commands
//!
//! Short trigger words typed at the console map to symbolic stage commands.
//! Input starting with `g` or `m` passes through as raw G-code. `exit` ends the
//! command loop and is never sent.

use crate::communication::exchange::validate_command;
use crate::firmware::marlin::tracker::StageTimeouts;
use micro3d_core::constants::{
    GCODE_HOME, MCODE_FAN_OFF, MCODE_REPORT_POSITION, SMALLEST_XY, SMALLEST_Z,
};
use micro3d_core::{Axis, Position, ValidationError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Distance of one console step per axis, in millimeters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepSizes {
    /// X and Y step
    pub xy: f64,
    /// Z step
    pub z: f64,
}

impl Default for StepSizes {
    fn default() -> Self {
        Self {
            xy: SMALLEST_XY,
            z: SMALLEST_Z,
        }
    }
}

impl StepSizes {
    pub fn for_axis(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X | Axis::Y => self.xy,
            Axis::Z => self.z,
        }
    }
}

/// G-code typed by the user, already checked for a `G`/`M` prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawGcode(String);

impl RawGcode {
    /// Uppercase and validate user input
    pub fn new(input: &str) -> Result<Self, ValidationError> {
        let upper = input.trim().to_uppercase();
        validate_command(&upper)?;
        Ok(Self(upper))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RawGcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A console command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// One step along an axis, positive or negative
    Step { axis: Axis, positive: bool },
    /// Home all axes
    Home,
    /// Ask the controller where it is
    GetPosition,
    /// Turn a fan off
    FanOff { fan: u8 },
    /// User supplied G-code
    Raw(RawGcode),
    /// Leave the command loop
    Exit,
}

const EXIT_TRIGGER: &str = "exit";

const SYMBOLIC_TRIGGERS: [&str; 10] = [
    "q", "a", "w", "s", "e", "d", "home", "getpos", "fan0", "fan1",
];

fn symbolic(trigger: &str) -> Option<Command> {
    let step = |axis, positive| Some(Command::Step { axis, positive });
    match trigger {
        "q" => step(Axis::X, true),
        "a" => step(Axis::X, false),
        "w" => step(Axis::Y, true),
        "s" => step(Axis::Y, false),
        "e" => step(Axis::Z, true),
        "d" => step(Axis::Z, false),
        "home" => Some(Command::Home),
        "getpos" => Some(Command::GetPosition),
        "fan0" => Some(Command::FanOff { fan: 0 }),
        "fan1" => Some(Command::FanOff { fan: 1 }),
        _ => None,
    }
}

/// Every trigger word the console accepts, `exit` included
pub fn triggers() -> Vec<&'static str> {
    let mut all = vec![EXIT_TRIGGER];
    all.extend(SYMBOLIC_TRIGGERS);
    all
}

impl Command {
    /// Interpret one console line
    ///
    /// Matching is case-insensitive. Input that is neither a trigger nor raw
    /// G-code is rejected with the list of valid triggers.
    pub fn from_input(input: &str) -> Result<Self, ValidationError> {
        let normalized = input.trim().to_lowercase();
        if normalized.is_empty() {
            return Err(ValidationError::EmptyCommand);
        }
        if normalized == EXIT_TRIGGER {
            return Ok(Command::Exit);
        }
        if let Some(command) = symbolic(&normalized) {
            return Ok(command);
        }
        if normalized.starts_with('g') || normalized.starts_with('m') {
            return RawGcode::new(input).map(Command::Raw);
        }
        Err(ValidationError::UnknownTrigger {
            input: input.trim().to_string(),
            valid: format!("{}, or raw G-code starting with g/m", triggers().join(", ")),
        })
    }

    /// Absolute target of a step, for commands that move the stage
    pub fn target(&self, current: &Position, steps: &StepSizes) -> Option<Position> {
        match self {
            Command::Step { axis, positive } => {
                let delta = steps.for_axis(*axis);
                Some(current.offset(*axis, if *positive { delta } else { -delta }))
            }
            _ => None,
        }
    }

    /// Wire form of the command; `None` for `exit`
    pub fn to_gcode(&self, current: &Position, steps: &StepSizes) -> Option<String> {
        match self {
            Command::Step { .. } => self.target(current, steps).map(|p| p.to_gcode()),
            Command::Home => Some(GCODE_HOME.to_string()),
            Command::GetPosition => Some(MCODE_REPORT_POSITION.to_string()),
            Command::FanOff { fan: 0 } => Some(MCODE_FAN_OFF.to_string()),
            Command::FanOff { fan } => Some(format!("{} P{}", MCODE_FAN_OFF, fan)),
            Command::Raw(raw) => Some(raw.as_str().to_string()),
            Command::Exit => None,
        }
    }

    /// How long the controller may take to acknowledge this command
    pub fn timeout(&self, timeouts: &StageTimeouts) -> Duration {
        match self {
            Command::Home => timeouts.home,
            Command::GetPosition => timeouts.position,
            _ => timeouts.command,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Step { axis, positive } => {
                write!(f, "step {}{}", if *positive { '+' } else { '-' }, axis)
            }
            Command::Home => write!(f, "home"),
            Command::GetPosition => write!(f, "getpos"),
            Command::FanOff { fan } => write!(f, "fan{}", fan),
            Command::Raw(raw) => write!(f, "raw `{}`", raw),
            Command::Exit => write!(f, "exit"),
        }
    }
}
