//! Autofocus
//!
//! The hunt samples a focus score at Z positions spaced one Z step apart and
//! keeps them in a [`FocusSampleMap`]. While the best sample sits at either end
//! of the map the bracket is extended one step past that end; as soon as the
//! best sample is interior the stage is moved there. No Z is ever sampled twice.

use crate::camera::Camera;
use crate::sink::ImageSink;
use async_trait::async_trait;
use image::DynamicImage;
use micro3d_communication::Stage;
use micro3d_core::{FocusError, Position, Result, StopSignal};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::time::Duration;

/// Sharpness metric, higher is sharper
pub trait FocusScorer: Send + Sync {
    fn score(&self, image: &DynamicImage) -> f64;
}

/// Variance of the 3x3 Laplacian over the grayscale image
#[derive(Debug, Clone, Copy, Default)]
pub struct LaplacianVariance;

impl FocusScorer for LaplacianVariance {
    fn score(&self, image: &DynamicImage) -> f64 {
        let gray = image.to_luma8();
        let (width, height) = gray.dimensions();
        if width < 3 || height < 3 {
            return 0.0;
        }
        let px = |x: u32, y: u32| f64::from(gray.get_pixel(x, y).0[0]);

        // Welford running variance
        let mut count = 0u64;
        let mut mean = 0.0;
        let mut m2 = 0.0;
        for y in 1..height - 1 {
            for x in 1..width - 1 {
                let response = px(x, y - 1) + px(x - 1, y) + px(x + 1, y) + px(x, y + 1)
                    - 4.0 * px(x, y);
                count += 1;
                let delta = response - mean;
                mean += delta / count as f64;
                m2 += delta * (response - mean);
            }
        }
        m2 / count as f64
    }
}

/// Focus scores keyed by Z, in Z steps from the start of the hunt
#[derive(Debug, Clone)]
pub struct FocusSampleMap {
    start_z: f64,
    step_z: f64,
    samples: BTreeMap<i32, f64>,
}

impl FocusSampleMap {
    pub fn new(start_z: f64, step_z: f64) -> Self {
        Self {
            start_z,
            step_z,
            samples: BTreeMap::new(),
        }
    }

    /// Z of the sample `steps` steps from the start
    pub fn z_at(&self, steps: i32) -> f64 {
        self.start_z + f64::from(steps) * self.step_z
    }

    pub fn contains(&self, steps: i32) -> bool {
        self.samples.contains_key(&steps)
    }

    pub fn score_at(&self, steps: i32) -> Option<f64> {
        self.samples.get(&steps).copied()
    }

    /// Record a score; an existing sample is kept and `false` returned
    pub fn insert(&mut self, steps: i32, score: f64) -> bool {
        match self.samples.entry(steps) {
            Entry::Vacant(slot) => {
                slot.insert(score);
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    /// Highest score; on ties the lowest Z wins
    pub fn best(&self) -> Option<(i32, f64)> {
        self.samples
            .iter()
            .fold(None, |best: Option<(i32, f64)>, (&steps, &score)| match best {
                Some((_, top)) if top >= score => best,
                _ => Some((steps, score)),
            })
    }

    pub fn lowest(&self) -> Option<i32> {
        self.samples.keys().next().copied()
    }

    pub fn highest(&self) -> Option<i32> {
        self.samples.keys().next_back().copied()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// `(z, score)` pairs in ascending Z
    pub fn iter(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.samples.iter().map(|(&k, &s)| (self.z_at(k), s))
    }
}

/// Bracket limits of a hunt
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FocusHunt {
    /// Distance between samples in mm
    pub step_z: f64,
    /// Samples on each side of the start before hunting
    pub seed_radius: u32,
    /// Furthest the bracket may reach from the start, in steps
    pub max_half_width: u32,
}

impl Default for FocusHunt {
    fn default() -> Self {
        Self {
            step_z: micro3d_core::constants::SMALLEST_Z,
            seed_radius: 5,
            max_half_width: 60,
        }
    }
}

/// What the hunt needs from the hardware
#[async_trait]
pub trait FocusProbe: Send {
    /// Move to `z`, capture and return the focus score there
    async fn sample(&mut self, z: f64) -> Result<f64>;

    /// Move to the chosen `z` and report the resulting position
    async fn settle(&mut self, z: f64) -> Result<Position>;
}

async fn take_sample<P: FocusProbe + ?Sized>(
    probe: &mut P,
    map: &mut FocusSampleMap,
    steps: i32,
) -> Result<()> {
    if map.contains(steps) {
        return Ok(());
    }
    let z = map.z_at(steps);
    let score = probe.sample(z).await?;
    if !score.is_finite() {
        return Err(FocusError::InvalidScore { z }.into());
    }
    tracing::info!("Added focus sample Z={:.2} score={:.2}", z, score);
    map.insert(steps, score);
    Ok(())
}

/// Find the sharpest Z around `start_z` and move there
///
/// Returns the settled position together with every sample taken.
pub async fn find_focus<P: FocusProbe + ?Sized>(
    probe: &mut P,
    start_z: f64,
    hunt: &FocusHunt,
) -> Result<(Position, FocusSampleMap)> {
    let mut map = FocusSampleMap::new(start_z, hunt.step_z);
    let seed = hunt.seed_radius.min(hunt.max_half_width) as i32;
    for steps in -seed..=seed {
        take_sample(probe, &mut map, steps).await?;
    }

    loop {
        let (Some((best, best_score)), Some(lowest), Some(highest)) =
            (map.best(), map.lowest(), map.highest())
        else {
            return Err(FocusError::BracketExhausted {
                best_z: start_z,
                best_score: 0.0,
                half_width: hunt.max_half_width,
            }
            .into());
        };

        let next = if best == lowest && best != highest {
            best - 1
        } else if best == highest && best != lowest {
            best + 1
        } else if best == lowest {
            // single sample: nothing to compare against yet
            best + 1
        } else {
            let z = map.z_at(best);
            tracing::info!("Best focus Z={:.2} score={:.2}", z, best_score);
            let position = probe.settle(z).await?;
            return Ok((position, map));
        };

        if next.unsigned_abs() > hunt.max_half_width {
            let err = FocusError::BracketExhausted {
                best_z: map.z_at(best),
                best_score,
                half_width: hunt.max_half_width,
            };
            tracing::warn!("{}", err);
            return Err(err.into());
        }
        take_sample(probe, &mut map, next).await?;
    }
}

/// Focus probe backed by the real stage, camera and sink
///
/// Every sample is kept as `focus_<z>_<score>.png`. A requested stop ends the
/// hunt before the next move.
pub struct StageFocusProbe<'a> {
    stage: &'a mut Stage,
    camera: &'a mut dyn Camera,
    scorer: &'a dyn FocusScorer,
    sink: &'a mut dyn ImageSink,
    warmup: Duration,
    stop: &'a StopSignal,
    origin: Position,
}

impl<'a> StageFocusProbe<'a> {
    /// Probe at the stage's current XY
    pub fn new(
        stage: &'a mut Stage,
        camera: &'a mut dyn Camera,
        scorer: &'a dyn FocusScorer,
        sink: &'a mut dyn ImageSink,
        warmup: Duration,
        stop: &'a StopSignal,
    ) -> Self {
        let origin = stage.position();
        Self {
            stage,
            camera,
            scorer,
            sink,
            warmup,
            stop,
            origin,
        }
    }
}

#[async_trait]
impl FocusProbe for StageFocusProbe<'_> {
    async fn sample(&mut self, z: f64) -> Result<f64> {
        self.stop.check()?;
        let timeout = self.stage.timeouts().command;
        self.stage.move_to(self.origin.with_z(z), timeout).await?;
        let image = self.camera.capture(self.warmup).await?;
        let score = self.scorer.score(&image);
        if score.is_finite() {
            self.sink
                .save(&format!("focus_{:.2}_{}", z, score as i64), &image)?;
        }
        Ok(score)
    }

    async fn settle(&mut self, z: f64) -> Result<Position> {
        self.stop.check()?;
        let timeout = self.stage.timeouts().command;
        self.stage.move_to(self.origin.with_z(z), timeout).await?;
        Ok(self.stage.position())
    }
}

/// Autofocus at the stage's current XY
pub async fn focus_stage(
    stage: &mut Stage,
    camera: &mut dyn Camera,
    scorer: &dyn FocusScorer,
    sink: &mut dyn ImageSink,
    hunt: &FocusHunt,
    warmup: Duration,
    stop: &StopSignal,
) -> Result<Position> {
    let start_z = stage.position().z;
    tracing::info!("Starting focus hunt at {}", stage.position());
    let mut probe = StageFocusProbe::new(stage, camera, scorer, sink, warmup, stop);
    let (position, samples) = find_focus(&mut probe, start_z, hunt).await?;
    tracing::info!(samples = samples.len(), "Focused at {}", position);
    Ok(position)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    #[test]
    fn test_laplacian_flat_image_scores_zero() {
        let flat = DynamicImage::ImageLuma8(GrayImage::from_pixel(8, 8, Luma([90])));
        assert_eq!(LaplacianVariance.score(&flat), 0.0);
    }

    #[test]
    fn test_laplacian_prefers_sharp_edges() {
        let sharp = GrayImage::from_fn(16, 16, |x, _| Luma([if x < 8 { 0 } else { 255 }]));
        let soft = GrayImage::from_fn(16, 16, |x, _| Luma([(x * 16).min(255) as u8]));
        let sharp_score = LaplacianVariance.score(&DynamicImage::ImageLuma8(sharp));
        let soft_score = LaplacianVariance.score(&DynamicImage::ImageLuma8(soft));
        assert!(sharp_score > soft_score);
    }

    #[test]
    fn test_tiny_image() {
        let tiny = DynamicImage::ImageLuma8(GrayImage::new(2, 2));
        assert_eq!(LaplacianVariance.score(&tiny), 0.0);
    }

    #[test]
    fn test_sample_map_is_memoized_and_sorted() {
        let mut map = FocusSampleMap::new(10.0, 0.04);
        assert!(map.insert(1, 5.0));
        assert!(map.insert(-2, 7.0));
        assert!(!map.insert(1, 100.0));
        assert_eq!(map.score_at(1), Some(5.0));
        assert_eq!(map.lowest(), Some(-2));
        assert_eq!(map.highest(), Some(1));
        assert_eq!(map.best(), Some((-2, 7.0)));
        let zs: Vec<f64> = map.iter().map(|(z, _)| z).collect();
        assert!(zs[0] < zs[1]);
        assert!((zs[0] - 9.92).abs() < 1e-9);
    }

    #[test]
    fn test_best_prefers_lowest_z_on_ties() {
        let mut map = FocusSampleMap::new(0.0, 1.0);
        map.insert(3, 1.0);
        map.insert(-1, 1.0);
        map.insert(0, 0.5);
        assert_eq!(map.best(), Some((-1, 1.0)));
    }
}
