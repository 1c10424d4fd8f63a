//! # micro3d Imaging
//!
//! Everything between the stage and the image files:
//! - Space-filling scan paths for grid captures
//! - Focus scoring and the autofocus hunt
//! - Camera capture through an external program
//! - PNG output and the stitching project file
//! - Grid scan and Z stack sequencing

pub mod camera;
pub mod focus;
pub mod paths;
pub mod scan;
pub mod sink;

pub use camera::{Camera, CommandCamera};
pub use focus::{
    find_focus, focus_stage, FocusHunt, FocusProbe, FocusSampleMap, FocusScorer,
    LaplacianVariance, StageFocusProbe,
};
pub use paths::{expand_l_system, grid_offsets, hilbert_curve, moore_curve, to_unit_xy};
pub use scan::{grid_file_name, grid_scan, grid_targets, stack_file_name, z_stack, GridCapture};
pub use sink::{DirectorySink, ImageSink, PtoProject};
