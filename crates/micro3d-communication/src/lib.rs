//! # micro3d Communication
//!
//! Serial protocol layer for the micro3d stage controller.
//!
//! Bytes from the controller are framed into lines, a coordinator pairs each
//! command with the lines that answer it, and the Marlin firmware module turns
//! symbolic commands and position reports into tracked stage state.

pub mod communication;
pub mod firmware;

pub use communication::{
    channel::{LineSubscription, SerialChannel},
    exchange::{ExchangeCoordinator, PendingExchange},
    framer::LineFramer,
    serial::{list_ports, select_port, RealSerialPort, SerialPort, SerialPortInfo},
    virtual_port::{VirtualDevice, VirtualPort},
    ConnectionParams, FlowControl, SerialParity,
};

pub use firmware::marlin::{
    command::{Command, RawGcode, StepSizes},
    position_parser::{find_position_report, parse_position_line},
    simulator::VirtualStage,
    tracker::{Stage, StageTimeouts},
};
