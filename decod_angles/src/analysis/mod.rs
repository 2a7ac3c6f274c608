pub mod decod_angles;
pub mod predict;
pub mod target_probe;
