//! Stage position tracking
//!
//! The [`Stage`] owns the exchange coordinator together with the last position
//! the controller confirmed. Every operation that moves or queries the stage
//! takes `&mut self`, so motion is exclusive by construction. The tracked
//! position only changes after the controller acknowledged a move or answered
//! a position query.

use crate::communication::exchange::ExchangeCoordinator;
use crate::firmware::marlin::command::{Command, RawGcode, StepSizes};
use crate::firmware::marlin::position_parser::find_position_report;
use micro3d_core::constants::{GCODE_HOME, MCODE_DISABLE_STEPPERS, MCODE_REPORT_POSITION};
use micro3d_core::{Axis, Position, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Deadlines for the kinds of stage commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTimeouts {
    /// Moves and other quick commands
    pub command: Duration,
    /// Homing all axes
    pub home: Duration,
    /// Position queries
    pub position: Duration,
    /// The motor-disable command sent on shutdown
    pub shutdown: Duration,
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            command: Duration::from_secs(5),
            home: Duration::from_secs(30),
            position: Duration::from_secs(5),
            shutdown: Duration::from_secs(2),
        }
    }
}

/// The XYZ stage as seen through its controller
pub struct Stage {
    coordinator: ExchangeCoordinator,
    position: Position,
    steps: StepSizes,
    timeouts: StageTimeouts,
}

impl Stage {
    /// Wrap a coordinator; the position stays at the origin until queried
    pub fn new(coordinator: ExchangeCoordinator, steps: StepSizes, timeouts: StageTimeouts) -> Self {
        Self {
            coordinator,
            position: Position::default(),
            steps,
            timeouts,
        }
    }

    /// Wrap a freshly opened coordinator: drop boot chatter, then learn the position
    pub async fn connect(
        coordinator: ExchangeCoordinator,
        steps: StepSizes,
        timeouts: StageTimeouts,
    ) -> Result<Self> {
        coordinator.purge().await?;
        let mut stage = Self::new(coordinator, steps, timeouts);
        let position = stage.query_position(timeouts.position).await?;
        tracing::info!(port = %stage.coordinator.port_name(), "Stage ready at {}", position);
        Ok(stage)
    }

    /// Last confirmed position; no I/O
    pub fn position(&self) -> Position {
        self.position
    }

    pub fn steps(&self) -> StepSizes {
        self.steps
    }

    pub fn timeouts(&self) -> StageTimeouts {
        self.timeouts
    }

    pub fn coordinator(&self) -> &ExchangeCoordinator {
        &self.coordinator
    }

    /// Absolute move; the tracked position becomes `target` only once acknowledged
    pub async fn move_to(&mut self, target: Position, timeout: Duration) -> Result<Vec<String>> {
        let lines = self.coordinator.send(&target.to_gcode(), timeout).await?;
        self.position = target;
        tracing::debug!("Moved to {}", target);
        Ok(lines)
    }

    /// Relative move along one axis
    pub async fn move_by(&mut self, axis: Axis, delta: f64) -> Result<Vec<String>> {
        let target = self.position.offset(axis, delta);
        self.move_to(target, self.timeouts.command).await
    }

    /// Ask the controller for its position and adopt the answer
    pub async fn query_position(&mut self, timeout: Duration) -> Result<Position> {
        self.report(timeout).await.map(|(position, _)| position)
    }

    /// Home all axes, then re-read the position the controller settled on
    pub async fn home(&mut self) -> Result<Position> {
        self.coordinator.send(GCODE_HOME, self.timeouts.home).await?;
        self.query_position(self.timeouts.position).await
    }

    /// Pass user G-code through; the tracked position is left alone
    pub async fn send_raw(&mut self, raw: &RawGcode) -> Result<Vec<String>> {
        self.coordinator.send(raw.as_str(), self.timeouts.command).await
    }

    /// Run one console command and return the controller's reply lines
    pub async fn execute(&mut self, command: &Command) -> Result<Vec<String>> {
        match command {
            Command::Exit => Ok(Vec::new()),
            Command::Home => {
                let lines = self.coordinator.send(GCODE_HOME, command.timeout(&self.timeouts)).await?;
                self.query_position(self.timeouts.position).await?;
                Ok(lines)
            }
            Command::GetPosition => {
                let (_, lines) = self.report(command.timeout(&self.timeouts)).await?;
                Ok(lines)
            }
            Command::Step { .. } => match command.target(&self.position, &self.steps) {
                Some(target) => self.move_to(target, command.timeout(&self.timeouts)).await,
                None => Ok(Vec::new()),
            },
            Command::Raw(raw) => self.send_raw(raw).await,
            Command::FanOff { .. } => match command.to_gcode(&self.position, &self.steps) {
                Some(gcode) => self.coordinator.send(&gcode, command.timeout(&self.timeouts)).await,
                None => Ok(Vec::new()),
            },
        }
    }

    /// Disable the motors best-effort and release the port; idempotent
    pub async fn shutdown(&self) {
        self.coordinator
            .close(Some(MCODE_DISABLE_STEPPERS), self.timeouts.shutdown)
            .await;
    }

    async fn report(&mut self, timeout: Duration) -> Result<(Position, Vec<String>)> {
        let lines = self.coordinator.send(MCODE_REPORT_POSITION, timeout).await?;
        let position = find_position_report(&lines)?;
        self.position = position;
        tracing::debug!("Controller reports {}", position);
        Ok((position, lines))
    }
}
