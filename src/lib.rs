//! # micro3d
//!
//! Console driver for a microscope built on a 3D-printer motion system: an XYZ
//! stage behind a Marlin controller plus a still camera.
//!
//! ## Architecture
//!
//! micro3d is organized as a workspace:
//!
//! 1. **micro3d-core** - Positions, protocol constants, error taxonomy
//! 2. **micro3d-communication** - Serial channel, line framing, command/response
//!    exchange, Marlin stage tracking and a simulated controller
//! 3. **micro3d-settings** - Configuration file
//! 4. **micro3d-imaging** - Camera, focus scoring, autofocus, grid scans, Z stacks
//! 5. **micro3d** - This binary: the interactive shell tying them together

pub mod shell;

pub use micro3d_communication::{
    ExchangeCoordinator, SerialChannel, Stage, VirtualPort, VirtualStage,
};
pub use micro3d_core::{Error, Position, Result};
pub use micro3d_settings::Config;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Initialize logging
///
/// Logs go to stderr so they never interleave with console replies on stdout.
/// `RUST_LOG` adds directives on top of the INFO default; `json` switches to
/// one JSON object per event.
pub fn init_logging(json: bool) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());

    if json {
        let fmt_layer = fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_names(true);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()?;
    } else {
        let fmt_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_level(true)
            .with_thread_names(true)
            .with_line_number(true);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()?;
    }

    Ok(())
}
