//! Controller firmware support
//!
//! The stage is driven by a repurposed 3D-printer board, so the only firmware
//! dialect is Marlin: `ok` acknowledgements, `M114` position reports, and the
//! usual `G`/`M` command families.

pub mod marlin;
