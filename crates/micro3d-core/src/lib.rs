//! # micro3d Core
//!
//! Core types shared by every micro3d crate: stage positions, axes,
//! protocol constants and the error taxonomy used across the serial,
//! tracking and imaging layers.

pub mod constants;
pub mod data;
pub mod error;
pub mod stop;

pub use data::{Axis, Position};

pub use error::{
    CaptureError, ConnectionError, Error, ExchangeError, FocusError, ParseError, Result,
    ValidationError,
};
pub use stop::StopSignal;
