//! Protocol and machine constants
//!
//! Values fixed by the controller firmware or by the wire format. Anything a
//! user may reasonably want to tune lives in `micro3d-settings` instead.

/// Line a Marlin-style controller sends once it has finished a command
pub const COMPLETION_TOKEN: &str = "ok";

/// Stands for the output file in a camera capture command
pub const OUTPUT_PLACEHOLDER: &str = "{output}";

/// Command prefixes the controller firmware accepts (motion and machine families)
pub const COMMAND_PREFIXES: [char; 2] = ['G', 'M'];

/// Values closer to zero than this are sent as exactly zero
pub const ZERO_EPSILON: f64 = 1e-4;

/// Decimal places used when formatting coordinates for the wire
pub const COORDINATE_DECIMALS: usize = 2;

/// Default serial baud rate for 3D-printer controller boards
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Smallest reliable XY move of the stage in millimeters
pub const SMALLEST_XY: f64 = 0.1;

/// Smallest reliable Z move of the stage in millimeters
pub const SMALLEST_Z: f64 = 0.04;

/// Absolute linear move
pub const GCODE_LINEAR_MOVE: &str = "G1";

/// Home all axes
pub const GCODE_HOME: &str = "G28";

/// Report current position
pub const MCODE_REPORT_POSITION: &str = "M114";

/// Disable stepper motors
pub const MCODE_DISABLE_STEPPERS: &str = "M84";

/// Fan off (optionally followed by `P<index>`)
pub const MCODE_FAN_OFF: &str = "M107";
