//! Grid scans and Z stacks
//!
//! Both sequences move, capture and save strictly one frame at a time. A failed
//! move or capture stops the sequence; frames already saved stay on disk. A
//! requested stop is honoured before the next move.

use crate::camera::Camera;
use crate::paths::grid_offsets;
use crate::sink::{ImageSink, PtoProject};
use micro3d_communication::Stage;
use micro3d_core::{Position, Result, StopSignal};
use std::path::PathBuf;
use std::time::Duration;

/// One saved grid frame
#[derive(Debug, Clone, PartialEq)]
pub struct GridCapture {
    pub index: usize,
    pub position: Position,
    pub path: PathBuf,
}

/// Absolute targets of a grid scan starting at `start`
///
/// `spacing` is the XY distance in mm between neighbouring cells. Z is kept.
pub fn grid_targets(start: Position, order: u32, spacing: f64) -> Result<Vec<Position>> {
    Ok(grid_offsets(order)?
        .into_iter()
        .map(|(dx, dy)| start.offset_xy(f64::from(dx) * spacing, f64::from(dy) * spacing))
        .collect())
}

pub fn grid_file_name(index: usize, position: &Position) -> String {
    format!("grid_{:04}_{:.2}_{:.2}.png", index, position.x, position.y)
}

pub fn stack_file_name(index: u32) -> String {
    format!("stack_{:04}.png", index)
}

/// Capture a Moore-curve grid around the current position
///
/// When a stitching project is given, every saved frame is appended to it.
#[allow(clippy::too_many_arguments)]
pub async fn grid_scan(
    stage: &mut Stage,
    camera: &mut dyn Camera,
    sink: &mut dyn ImageSink,
    mut project: Option<&mut PtoProject>,
    order: u32,
    spacing: f64,
    warmup: Duration,
    stop: &StopSignal,
) -> Result<Vec<GridCapture>> {
    let targets = grid_targets(stage.position(), order, spacing)?;
    let timeout = stage.timeouts().command;
    tracing::info!(order, frames = targets.len(), "Starting grid scan at {}", stage.position());

    let mut captures = Vec::with_capacity(targets.len());
    for (index, target) in targets.into_iter().enumerate() {
        stop.check()?;
        stage.move_to(target, timeout).await?;
        let image = camera.capture(warmup).await?;
        let name = grid_file_name(index, &target);
        let path = sink.save(&name, &image)?;
        if let Some(project) = project.as_deref_mut() {
            project.push(&name)?;
        }
        captures.push(GridCapture {
            index,
            position: target,
            path,
        });
    }

    tracing::info!(frames = captures.len(), "Grid scan complete");
    Ok(captures)
}

/// Capture `count` frames stepping up in Z from the current position
pub async fn z_stack(
    stage: &mut Stage,
    camera: &mut dyn Camera,
    sink: &mut dyn ImageSink,
    step_z: f64,
    count: u32,
    warmup: Duration,
    stop: &StopSignal,
) -> Result<Vec<PathBuf>> {
    let start = stage.position();
    let timeout = stage.timeouts().command;
    tracing::info!(count, "Starting Z stack at {}", start);

    let mut saved = Vec::with_capacity(count as usize);
    for i in 0..count {
        let target = start.with_z(start.z + f64::from(i) * step_z);
        stop.check()?;
        stage.move_to(target, timeout).await?;
        let image = camera.capture(warmup).await?;
        saved.push(sink.save(&stack_file_name(i), &image)?);
    }
    Ok(saved)
}
