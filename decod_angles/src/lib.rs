//! Orientation decoding analyses of MEG classifiers.
//!
//! `run_decod_angles` reduces every subject's generalization-across-time
//! angle predictions into circular tuning statistics;
//! `plot_decod_angles_bias` turns the aggregated results into figures,
//! significance tables and an HTML report.

pub mod analysis;
pub mod config;
pub mod data_handling;
pub mod helper_functions;
pub mod models;
pub mod report;
pub mod stats;
