//! Interactive console
//!
//! Console lines, end of input and Ctrl-C all arrive as [`Input`] on one
//! channel. Ctrl-C also raises the session's [`StopSignal`], which a focus
//! hunt, grid scan or Z stack in flight checks before every move. Every way out
//! of [`Session::run`] ends in the same teardown, which disables the motors and
//! releases the port exactly once.

use micro3d_communication::{select_port, Command, SerialPortInfo, Stage};
use micro3d_core::{ConnectionError, Error, ExchangeError, Result, StopSignal, ValidationError};
use micro3d_imaging::{
    focus_stage, grid_scan, z_stack, Camera, CommandCamera, DirectorySink, FocusHunt,
    LaplacianVariance, PtoProject,
};
use micro3d_settings::{CameraSettings, Config, ScanSettings};
use std::io::{BufRead, Write};
use std::time::Duration;
use tokio::sync::mpsc;

/// Console words that run imaging sequences
pub const PLANNER_WORDS: [&str; 3] = ["focus", "grid", "stack"];

/// Something for the session loop to react to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Line(String),
    Eof,
    Interrupt,
}

/// Whether the loop keeps reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// A parsed console line
#[derive(Debug, Clone, PartialEq)]
pub enum ShellCommand {
    Stage(Command),
    Focus,
    Grid,
    Stack,
}

impl ShellCommand {
    /// Parse one line; planner words take precedence over stage triggers
    pub fn parse(input: &str) -> std::result::Result<Self, ValidationError> {
        match input.trim().to_lowercase().as_str() {
            "focus" => return Ok(ShellCommand::Focus),
            "grid" => return Ok(ShellCommand::Grid),
            "stack" => return Ok(ShellCommand::Stack),
            _ => {}
        }
        Command::from_input(input)
            .map(ShellCommand::Stage)
            .map_err(|err| match err {
                ValidationError::UnknownTrigger { input, valid } => {
                    ValidationError::UnknownTrigger {
                        input,
                        valid: format!("{}; imaging: {}", valid, PLANNER_WORDS.join(", ")),
                    }
                }
                other => other,
            })
    }
}

/// Ask on `out` which port to use until `input` names a listed one
///
/// Ports that look like a printer controller are marked. End of input while
/// asking is reported as the last invalid selection.
pub fn choose_port<R: BufRead, W: Write>(
    ports: &[SerialPortInfo],
    input: &mut R,
    out: &mut W,
) -> Result<SerialPortInfo> {
    if ports.len() <= 1 {
        return Ok(select_port(ports, None)?);
    }

    for (idx, port) in ports.iter().enumerate() {
        let marker = if port.looks_like_printer() { " *" } else { "" };
        writeln!(out, "{}: {} ({}){}", idx, port.port_name, port.description, marker)?;
    }

    loop {
        write!(out, "Select port [0-{}]: ", ports.len() - 1)?;
        out.flush()?;
        let mut answer = String::new();
        let read = input.read_line(&mut answer)?;
        match select_port(ports, Some(&answer)) {
            Ok(port) => return Ok(port),
            Err(err @ ConnectionError::InvalidSelection { .. }) if read > 0 => {
                writeln!(out, "{}", err)?;
            }
            Err(err) => return Err(err.into()),
        }
    }
}

/// The configured capture program, if any
pub fn camera_from_config(settings: &CameraSettings) -> Result<Option<Box<dyn Camera>>> {
    match &settings.capture_command {
        Some(command) => Ok(Some(Box::new(CommandCamera::new(command)?))),
        None => Ok(None),
    }
}

/// Stage, camera and output shared by one console session
pub struct Session {
    stage: Stage,
    camera: Option<Box<dyn Camera>>,
    sink: DirectorySink,
    scan: ScanSettings,
    hunt: FocusHunt,
    step_z: f64,
    warmup: Duration,
    stop: StopSignal,
    torn_down: bool,
}

impl Session {
    pub fn new(stage: Stage, config: &Config, camera: Option<Box<dyn Camera>>) -> Self {
        Self {
            stage,
            camera,
            sink: DirectorySink::new(config.scan.output_dir.clone()),
            scan: config.scan.clone(),
            hunt: FocusHunt {
                step_z: config.machine.step_z,
                seed_radius: config.focus.seed_radius,
                max_half_width: config.focus.max_half_width,
            },
            step_z: config.machine.step_z,
            warmup: config.camera.warmup(),
            stop: StopSignal::new(),
            torn_down: false,
        }
    }

    pub fn stage(&self) -> &Stage {
        &self.stage
    }

    /// Handle for a signal handler to stop whatever is running
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Run one parsed command and return what to print
    pub async fn execute(&mut self, command: &ShellCommand) -> Result<Vec<String>> {
        self.stop.check()?;
        match command {
            ShellCommand::Stage(command) => {
                let mut lines = self.stage.execute(command).await?;
                if !matches!(command, Command::Raw(_) | Command::FanOff { .. }) {
                    lines.push(format!("Position {}", self.stage.position()));
                }
                Ok(lines)
            }
            ShellCommand::Focus => {
                let camera = Self::camera(&mut self.camera)?;
                let position = focus_stage(
                    &mut self.stage,
                    camera,
                    &LaplacianVariance,
                    &mut self.sink,
                    &self.hunt,
                    self.warmup,
                    &self.stop,
                )
                .await?;
                Ok(vec![format!("Focused at {}", position)])
            }
            ShellCommand::Grid => {
                let camera = Self::camera(&mut self.camera)?;
                let mut project = PtoProject::create(
                    self.sink.dir(),
                    self.scan.image_width,
                    self.scan.image_height,
                )?;
                let spacing = self.stage.steps().xy * self.scan.step_multiplier;
                let captures = grid_scan(
                    &mut self.stage,
                    camera,
                    &mut self.sink,
                    Some(&mut project),
                    self.scan.curve_order,
                    spacing,
                    self.warmup,
                    &self.stop,
                )
                .await?;
                let path = project.finish()?;
                Ok(vec![format!(
                    "Captured {} frames, project {}",
                    captures.len(),
                    path.display()
                )])
            }
            ShellCommand::Stack => {
                let camera = Self::camera(&mut self.camera)?;
                let saved = z_stack(
                    &mut self.stage,
                    camera,
                    &mut self.sink,
                    self.step_z,
                    self.scan.stack_count,
                    self.warmup,
                    &self.stop,
                )
                .await?;
                Ok(vec![format!("Captured {} stack frames", saved.len())])
            }
        }
    }

    fn camera(camera: &mut Option<Box<dyn Camera>>) -> Result<&mut dyn Camera> {
        match camera {
            Some(camera) => Ok(camera.as_mut()),
            None => Err(Error::other(
                "no camera configured; set camera.capture_command",
            )),
        }
    }

    /// Handle one console line, printing replies and errors to `out`
    pub async fn handle_line<W: Write>(&mut self, line: &str, out: &mut W) -> Result<Flow> {
        if line.trim().is_empty() {
            return Ok(Flow::Continue);
        }
        let command = match ShellCommand::parse(line) {
            Ok(command) => command,
            Err(err) => {
                writeln!(out, "{}", err)?;
                return Ok(Flow::Continue);
            }
        };
        if command == ShellCommand::Stage(Command::Exit) {
            return Ok(Flow::Exit);
        }

        match self.execute(&command).await {
            Ok(lines) => {
                for line in lines {
                    writeln!(out, "{}", line)?;
                }
                Ok(Flow::Continue)
            }
            Err(Error::Interrupted) => {
                tracing::info!("{} interrupted at {}", line.trim(), self.stage.position());
                writeln!(out, "Interrupted")?;
                Ok(Flow::Exit)
            }
            Err(err) => {
                tracing::warn!("{} failed: {}", line.trim(), err);
                writeln!(out, "Error: {}", err)?;
                match err {
                    Error::Exchange(ExchangeError::StreamClosed { .. } | ExchangeError::Closed) => {
                        Ok(Flow::Exit)
                    }
                    _ => Ok(Flow::Continue),
                }
            }
        }
    }

    /// Process input until exit, end of input, an interrupt or a lost
    /// controller, then tear down
    pub async fn run<W: Write>(&mut self, mut inputs: mpsc::Receiver<Input>, out: &mut W) -> Result<()> {
        let outcome = loop {
            if self.stop.is_requested() {
                tracing::info!("Interrupted");
                break Ok(());
            }
            let Some(input) = inputs.recv().await else {
                break Ok(());
            };
            match input {
                Input::Line(line) => match self.handle_line(&line, out).await {
                    Ok(Flow::Continue) => {}
                    Ok(Flow::Exit) => break Ok(()),
                    Err(err) => break Err(err),
                },
                Input::Eof => {
                    tracing::info!("Console closed");
                    break Ok(());
                }
                Input::Interrupt => {
                    self.stop.request();
                }
            }
        };
        inputs.close();
        self.teardown().await;
        outcome
    }

    /// Disable the motors and release the port; later calls do nothing
    pub async fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        tracing::info!("Shutting down at {}", self.stage.position());
        self.stage.shutdown().await;
    }
}
